//! The call coordinator: one instance per signed-in user.
//!
//! User actions (initiate/accept/decline/cancel/hangup/upgrade) and
//! observed signals both funnel through the pure state machine; this
//! module owns the I/O around it: the session store, ring timers, the
//! glare tie-break, notification dispatch, negotiation relay, and
//! cleanup scheduling.
//!
//! Re-entrancy is resolved by the machine's idempotency rules rather
//! than locks held across sends; a second transition racing the first
//! collapses to a no-op when it loses.

use crate::cleanup::CleanupSupervisor;
use crate::config::EngineConfig;
use crate::events::{CallEventHandler, CallStatusInfo, IncomingCallInfo};
use crate::negotiation::NegotiationRelay;
use crate::notify::{NotificationDispatcher, NotificationSink, OutgoingCallInfo};
use crate::policy::InteractionPolicy;
use chrono::Utc;
use dashmap::DashMap;
use ringline_signal_core::{
    apply, resolve_glare, CallSession, CallStatus, CancelReason, ChannelId, Effect, MediaKind,
    SessionEvent, SessionId, SessionStore, Signal, SignalBody, SignalError, SignalResult, UserId,
};
use ringline_signal_transport::{SignalTransport, TransportError};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

struct Inner {
    local: UserId,
    config: EngineConfig,
    transport: Arc<dyn SignalTransport>,
    policy: Arc<dyn InteractionPolicy>,
    store: SessionStore,
    ring_timers: DashMap<SessionId, oneshot::Sender<()>>,
    notifications: NotificationDispatcher,
    negotiation: NegotiationRelay,
    cleanup: CleanupSupervisor,
    handler: Arc<dyn CallEventHandler>,
}

#[derive(Clone)]
pub struct CallCoordinator {
    inner: Arc<Inner>,
}

impl CallCoordinator {
    pub fn new(
        local: UserId,
        config: EngineConfig,
        transport: Arc<dyn SignalTransport>,
        policy: Arc<dyn InteractionPolicy>,
        sink: Arc<dyn NotificationSink>,
        handler: Arc<dyn CallEventHandler>,
    ) -> Self {
        let notifications = NotificationDispatcher::new(sink, &config);
        let negotiation = NegotiationRelay::new(transport.clone());
        let cleanup = CleanupSupervisor::new(transport.clone(), &config);
        Self {
            inner: Arc::new(Inner {
                local,
                config,
                transport,
                policy,
                store: SessionStore::new(),
                ring_timers: DashMap::new(),
                notifications,
                negotiation,
                cleanup,
                handler,
            }),
        }
    }

    pub fn local_user(&self) -> &UserId {
        &self.inner.local
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    /// Start consuming signals addressed to the local user. The stream
    /// is infinite; the task runs until aborted or the transport closes.
    pub fn run(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut stream = this.inner.transport.observe(&this.inner.local);
            while let Some(signal) = stream.next().await {
                this.handle_signal(signal).await;
            }
            debug!(user = %this.inner.local, "signal stream ended");
        })
    }

    /// Place a call. The session exists only after the notification
    /// signal is confirmed queued; a transport failure leaves nothing
    /// behind.
    pub async fn initiate(
        &self,
        callee: UserId,
        channel: ChannelId,
        media_kind: MediaKind,
    ) -> SignalResult<SessionId> {
        let local = self.inner.local.clone();

        if !self.inner.policy.can_signal(&local, &callee).await {
            let err = SignalError::PolicyViolation {
                user_a: local,
                user_b: callee,
            };
            self.inner.handler.on_call_failed(None, err.clone()).await;
            return Err(err);
        }

        let session = CallSession::new(local.clone(), callee.clone(), channel.clone(), media_kind);

        // Simultaneous mutual call already ringing inbound?
        if let Some(mirror) = self.inner.store.find_glare_counterpart(&session).await {
            if let Some(outcome) = resolve_glare(&session, &mirror) {
                if outcome.loser == session.session_id {
                    info!(
                        session_id = %session.session_id,
                        winner = %outcome.winner,
                        "outgoing call lost glare tie-break before sending"
                    );
                    let lost = self.record_glare_loss(session).await?;
                    return Ok(lost);
                }
                // Our call wins; the inbound mirror is the loser.
                self.cancel_glare_loser(mirror).await;
            }
        }

        let notify = Signal::new(
            session.session_id.clone(),
            local.clone(),
            callee.clone(),
            channel.clone(),
            SignalBody::CallNotification { media_kind },
        );
        if let Err(e) = self.inner.transport.send(&callee, notify).await {
            let err = map_transport_err(e, &callee);
            warn!(callee = %callee, error = %err, "call notification failed to send");
            self.inner.handler.on_call_failed(None, err.clone()).await;
            return Err(err);
        }

        self.inner.store.insert(session.clone()).await?;
        self.start_ring_timer(session.session_id.clone());
        self.inner
            .notifications
            .show_outgoing(OutgoingCallInfo {
                session_id: session.session_id.clone(),
                callee,
                channel,
                media_kind,
            })
            .await;
        Ok(session.session_id)
    }

    /// Accept an incoming ringing call. Re-checks policy: a block that
    /// landed mid-ring fails the accept instead of letting the session
    /// proceed.
    pub async fn accept(&self, session_id: &SessionId) -> SignalResult<()> {
        let session = self.inner.store.get(session_id).await?;

        if !self
            .inner
            .policy
            .can_signal(&session.caller, &session.callee)
            .await
        {
            let err = SignalError::PolicyViolation {
                user_a: session.caller.clone(),
                user_b: session.callee.clone(),
            };
            self.inner
                .handler
                .on_call_failed(Some(session_id.clone()), err.clone())
                .await;
            return Err(err);
        }

        let event = SessionEvent::Accept {
            by: self.inner.local.clone(),
        };
        self.dispatch(session, event, true).await
    }

    pub async fn decline(&self, session_id: &SessionId) -> SignalResult<()> {
        let session = self.inner.store.get(session_id).await?;
        let event = SessionEvent::Decline {
            by: self.inner.local.clone(),
        };
        self.dispatch(session, event, false).await
    }

    pub async fn cancel(&self, session_id: &SessionId) -> SignalResult<()> {
        let session = self.inner.store.get(session_id).await?;
        let event = SessionEvent::Cancel {
            by: self.inner.local.clone(),
            reason: CancelReason::CallerCancelled,
        };
        self.dispatch(session, event, false).await
    }

    pub async fn hangup(&self, session_id: &SessionId) -> SignalResult<()> {
        let session = self.inner.store.get(session_id).await?;
        let event = SessionEvent::Hangup {
            by: self.inner.local.clone(),
        };
        self.dispatch(session, event, false).await
    }

    /// Upgrade an accepted audio call to video. Status is untouched;
    /// the peer receives an OFFER tagged `renegotiate`.
    pub async fn upgrade(&self, session_id: &SessionId, sdp: String) -> SignalResult<()> {
        let session = self.inner.store.get(session_id).await?;
        let event = SessionEvent::Upgrade {
            by: self.inner.local.clone(),
            to: MediaKind::Video,
            sdp,
        };
        self.dispatch(session, event, true).await
    }

    /// System-triggered: the ringing timer fired. Safe to call any
    /// number of times; only the first lands.
    pub async fn expire(&self, session_id: &SessionId) -> SignalResult<()> {
        let session = match self.inner.store.get(session_id).await {
            Ok(session) => session,
            Err(_) => return Ok(()),
        };
        self.dispatch(session, SessionEvent::Expire, false).await
    }

    // --- negotiation (legal once the session is accepted) ---

    pub async fn send_offer(&self, session_id: &SessionId, sdp: String) -> SignalResult<()> {
        let (session, peer) = self.accepted_session_and_peer(session_id).await?;
        self.inner
            .negotiation
            .send_offer(session_id, &self.inner.local, &peer, &session.channel, sdp, false)
            .await
            .map_err(|e| map_transport_err(e, &peer))
    }

    pub async fn send_answer(&self, session_id: &SessionId, sdp: String) -> SignalResult<()> {
        let (session, peer) = self.accepted_session_and_peer(session_id).await?;
        self.inner
            .negotiation
            .send_answer(session_id, &self.inner.local, &peer, &session.channel, sdp)
            .await
            .map_err(|e| map_transport_err(e, &peer))
    }

    pub async fn send_candidate(
        &self,
        session_id: &SessionId,
        candidate: String,
    ) -> SignalResult<()> {
        let (session, peer) = self.accepted_session_and_peer(session_id).await?;
        self.inner
            .negotiation
            .send_candidate(session_id, &self.inner.local, &peer, &session.channel, candidate)
            .await
            .map_err(|e| map_transport_err(e, &peer))
    }

    /// A peer's transport-level disconnect, ungraceful or not: ringing
    /// sessions with them expire, accepted ones end as if they hung up.
    pub async fn handle_peer_disconnect(&self, peer: &UserId) {
        for session in self.inner.store.active_for_user(peer).await {
            match session.status {
                CallStatus::Ringing => {
                    let _ = self.dispatch(session, SessionEvent::Expire, false).await;
                }
                CallStatus::Accepted => {
                    let _ = self
                        .dispatch(session, SessionEvent::RemoteHangup, false)
                        .await;
                }
                _ => {}
            }
        }
    }

    /// Feed one observed signal through the machine. Public so tests
    /// and alternative pumps can push signals directly.
    pub async fn handle_signal(&self, signal: Signal) {
        if signal.to != self.inner.local {
            debug!(to = %signal.to, "ignoring signal addressed elsewhere");
            return;
        }

        match signal.body.clone() {
            SignalBody::CallNotification { media_kind } => {
                self.handle_call_notification(signal, media_kind).await;
            }
            SignalBody::CallDeclined => {
                self.apply_remote(&signal.session_id, SessionEvent::RemoteDeclined)
                    .await;
            }
            SignalBody::Hangup => {
                self.apply_remote(&signal.session_id, SessionEvent::RemoteHangup)
                    .await;
            }
            SignalBody::StatusUpdate { status } => {
                let event = match status {
                    CallStatus::Accepted => SessionEvent::RemoteAccepted,
                    CallStatus::Declined => SessionEvent::RemoteDeclined,
                    CallStatus::Expired => SessionEvent::Expire,
                    CallStatus::Cancelled | CallStatus::Ended => SessionEvent::RemoteHangup,
                    CallStatus::Ringing => return,
                };
                self.apply_remote(&signal.session_id, event).await;
            }
            SignalBody::Offer { renegotiate, .. } => {
                self.handle_offer(signal, renegotiate).await;
            }
            SignalBody::Answer { .. } | SignalBody::IceCandidate { .. } => {
                self.forward_negotiation(signal).await;
            }
        }
    }

    // --- internals ---

    async fn handle_call_notification(&self, signal: Signal, media_kind: MediaKind) {
        let session_id = signal.session_id.clone();

        // Duplicate delivery across redundant channels, or replay of a
        // retained record: the session is already known.
        if self.inner.store.get(&session_id).await.is_ok() {
            debug!(session_id = %session_id, "duplicate call notification ignored");
            return;
        }

        let inbound = CallSession {
            session_id: session_id.clone(),
            caller: signal.from.clone(),
            callee: self.inner.local.clone(),
            channel: signal.channel.clone(),
            media_kind,
            status: CallStatus::Ringing,
            created_at: Utc::now(),
            cancel_reason: None,
        };

        if let Some(mirror) = self.inner.store.find_glare_counterpart(&inbound).await {
            if let Some(outcome) = resolve_glare(&inbound, &mirror) {
                if outcome.loser == inbound.session_id {
                    info!(
                        session_id = %inbound.session_id,
                        winner = %outcome.winner,
                        "inbound call lost glare tie-break"
                    );
                    let _ = self.record_glare_loss(inbound).await;
                    return;
                }
                // The inbound call wins; cancel our own outgoing leg.
                info!(
                    session_id = %inbound.session_id,
                    cancelled = %mirror.session_id,
                    "inbound call won glare tie-break"
                );
                let event = SessionEvent::Cancel {
                    by: self.inner.local.clone(),
                    reason: CancelReason::GlareLoser,
                };
                let _ = self.dispatch(mirror, event, false).await;
            }
        }

        if let Err(e) = self.inner.store.insert(inbound.clone()).await {
            debug!(session_id = %session_id, error = %e, "inbound session raced an insert");
            return;
        }

        // The callee runs its own ringing timer; expiry is idempotent
        // across both sides.
        self.start_ring_timer(session_id.clone());

        let info = IncomingCallInfo {
            session_id,
            caller: inbound.caller,
            channel: inbound.channel,
            media_kind,
        };
        self.inner.notifications.show_incoming(info.clone()).await;
        self.inner.handler.on_incoming_call(info).await;
    }

    async fn handle_offer(&self, signal: Signal, renegotiate: bool) {
        let session_id = signal.session_id.clone();
        let mut session = match self.inner.store.get(&session_id).await {
            Ok(session) => session,
            Err(_) => {
                debug!(session_id = %session_id, "offer for unknown session dropped");
                return;
            }
        };
        if session.status != CallStatus::Accepted {
            debug!(
                session_id = %session_id,
                status = %session.status,
                "offer outside accepted session dropped"
            );
            return;
        }

        if renegotiate && session.media_kind == MediaKind::Audio {
            session.media_kind = MediaKind::Video;
            if self.inner.store.update(session.clone()).await.is_ok() {
                self.inner
                    .handler
                    .on_remote_upgrade(session_id.clone(), MediaKind::Video)
                    .await;
            }
        }

        self.inner.negotiation.note_offer_observed(&session_id).await;
        self.forward_negotiation(signal).await;
    }

    async fn forward_negotiation(&self, signal: Signal) {
        if self.inner.store.get(&signal.session_id).await.is_err() {
            debug!(session_id = %signal.session_id, "negotiation signal for unknown session dropped");
            return;
        }
        if let Some(payload) = NegotiationRelay::payload_of(&signal.body) {
            self.inner
                .handler
                .on_negotiation_signal(signal.session_id, signal.from, payload)
                .await;
        }
    }

    async fn apply_remote(&self, session_id: &SessionId, event: SessionEvent) {
        let session = match self.inner.store.get(session_id).await {
            Ok(session) => session,
            Err(_) => {
                debug!(session_id = %session_id, "signal for unknown session dropped");
                return;
            }
        };
        let _ = self.dispatch(session, event, false).await;
    }

    /// Run one event through the machine and commit the result.
    ///
    /// `surface`: report machine errors via the handler and the return
    /// value (accept/upgrade); otherwise they are benign races and are
    /// only logged.
    async fn dispatch(
        &self,
        session: CallSession,
        event: SessionEvent,
        surface: bool,
    ) -> SignalResult<()> {
        let session_id = session.session_id.clone();
        let applied = match apply(&session, &event, &self.inner.local) {
            Ok(applied) => applied,
            Err(e) => {
                if surface {
                    self.inner
                        .handler
                        .on_call_failed(Some(session_id), e.clone())
                        .await;
                    return Err(e);
                }
                debug!(session_id = %session_id, error = %e, "benign race, event dropped");
                return Ok(());
            }
        };

        if applied.is_noop() {
            // An accept that already committed locally may still owe the
            // caller its status signal (the first send failed). Retrying
            // the accept re-emits it instead of silently succeeding.
            if surface {
                if let SessionEvent::Accept { .. } = event {
                    return self.resend_accept_status(&session).await;
                }
            }
            return Ok(());
        }
        self.commit(session, applied, surface).await
    }

    /// Re-send STATUS_UPDATE(ACCEPTED) for a session that is already
    /// accepted locally. Touches no session state.
    async fn resend_accept_status(&self, session: &CallSession) -> SignalResult<()> {
        let peer = match session.peer_of(&self.inner.local) {
            Some(peer) => peer.clone(),
            None => return Ok(()),
        };
        let signal = Signal::new(
            session.session_id.clone(),
            self.inner.local.clone(),
            peer.clone(),
            session.channel.clone(),
            SignalBody::StatusUpdate {
                status: CallStatus::Accepted,
            },
        );
        debug!(session_id = %session.session_id, "re-sending accept status on retry");
        if let Err(e) = self.inner.transport.send(&peer, signal).await {
            let err = map_transport_err(e, &peer);
            self.inner
                .handler
                .on_call_failed(Some(session.session_id.clone()), err.clone())
                .await;
            return Err(err);
        }
        Ok(())
    }

    async fn commit(
        &self,
        mut session: CallSession,
        applied: ringline_signal_core::Applied,
        surface: bool,
    ) -> SignalResult<()> {
        let session_id = session.session_id.clone();
        let previous = applied.previous;

        if let Some(next) = applied.next_status {
            session.status = next;
        }
        if let Some(kind) = applied.media_kind {
            session.media_kind = kind;
        }
        if let Some(reason) = applied.cancel_reason {
            session.cancel_reason = Some(reason);
        }
        self.inner.store.update(session.clone()).await?;

        for effect in &applied.effects {
            match effect {
                Effect::CancelRingTimer => {
                    if let Some((_, cancel)) = self.inner.ring_timers.remove(&session_id) {
                        let _ = cancel.send(());
                    }
                }
                Effect::DismissPrompt => {
                    self.inner.notifications.dismiss(&session_id).await;
                }
                Effect::BeginNegotiation => {
                    debug!(session_id = %session_id, "negotiation open");
                }
                Effect::ScheduleCleanup => {
                    self.inner.negotiation.forget(&session_id);
                    self.inner.cleanup.schedule(&session);
                }
            }
        }

        for signal in applied.signals {
            let to = signal.to.clone();
            if let Err(e) = self.inner.transport.send(&to, signal).await {
                let err = map_transport_err(e, &to);
                if surface {
                    self.inner
                        .handler
                        .on_call_failed(Some(session_id.clone()), err.clone())
                        .await;
                    return Err(err);
                }
                warn!(session_id = %session_id, error = %err, "outbound signal dropped");
            }
        }

        info!(
            session_id = %session_id,
            from = %previous,
            to = %session.status,
            "session transition"
        );
        self.inner
            .handler
            .on_call_state_changed(CallStatusInfo {
                session_id,
                previous,
                status: session.status,
                media_kind: session.media_kind,
                cancel_reason: session.cancel_reason,
            })
            .await;
        Ok(())
    }

    /// Record a glare-losing session directly as CANCELLED. The losing
    /// leg never rings anyone; it exists so the UI can explain the
    /// collision.
    async fn record_glare_loss(&self, mut session: CallSession) -> SignalResult<SessionId> {
        let previous = session.status;
        session.status = CallStatus::Cancelled;
        session.cancel_reason = Some(CancelReason::GlareLoser);
        self.inner.store.insert(session.clone()).await?;
        self.inner.cleanup.schedule(&session);
        self.inner
            .handler
            .on_call_state_changed(CallStatusInfo {
                session_id: session.session_id.clone(),
                previous,
                status: session.status,
                media_kind: session.media_kind,
                cancel_reason: session.cancel_reason,
            })
            .await;
        Ok(session.session_id)
    }

    /// Cancel the losing inbound mirror of a glare pair we did not
    /// initiate. Not a caller-side cancel, so it bypasses the machine
    /// and writes the terminal state directly.
    async fn cancel_glare_loser(&self, mut mirror: CallSession) {
        info!(
            session_id = %mirror.session_id,
            "cancelling inbound mirror after losing glare tie-break"
        );
        let previous = mirror.status;
        mirror.status = CallStatus::Cancelled;
        mirror.cancel_reason = Some(CancelReason::GlareLoser);
        if self.inner.store.update(mirror.clone()).await.is_err() {
            return;
        }
        if let Some((_, cancel)) = self.inner.ring_timers.remove(&mirror.session_id) {
            let _ = cancel.send(());
        }
        self.inner.notifications.dismiss(&mirror.session_id).await;
        self.inner.cleanup.schedule(&mirror);
        self.inner
            .handler
            .on_call_state_changed(CallStatusInfo {
                session_id: mirror.session_id.clone(),
                previous,
                status: mirror.status,
                media_kind: mirror.media_kind,
                cancel_reason: mirror.cancel_reason,
            })
            .await;
    }

    async fn accepted_session_and_peer(
        &self,
        session_id: &SessionId,
    ) -> SignalResult<(CallSession, UserId)> {
        let session = self.inner.store.get(session_id).await?;
        if session.status != CallStatus::Accepted {
            return Err(SignalError::IllegalTransition {
                session_id: session_id.clone(),
                status: session.status,
                event: "Negotiate",
            });
        }
        let peer = session
            .peer_of(&self.inner.local)
            .cloned()
            .ok_or_else(|| SignalError::NotAParticipant {
                session_id: session_id.clone(),
                user: self.inner.local.clone(),
            })?;
        Ok((session, peer))
    }

    fn start_ring_timer(&self, session_id: SessionId) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.inner.ring_timers.insert(session_id.clone(), cancel_tx);

        let this = self.clone();
        let timeout = self.inner.config.ring_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_rx => {
                    debug!(session_id = %session_id, "ring timer cancelled");
                }
                _ = tokio::time::sleep(timeout) => {
                    this.inner.ring_timers.remove(&session_id);
                    debug!(session_id = %session_id, "ring timer fired");
                    let _ = this.expire(&session_id).await;
                }
            }
        });
    }
}

fn map_transport_err(e: TransportError, to: &UserId) -> SignalError {
    match e {
        TransportError::Unavailable { user } => SignalError::TransportUnavailable { user },
        _ => SignalError::TransportUnavailable { user: to.clone() },
    }
}
