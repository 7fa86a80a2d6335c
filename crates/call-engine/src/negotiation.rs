//! Negotiation relay: verbatim OFFER/ANSWER/ICE forwarding between the
//! two participants of an accepted session.
//!
//! The only ordering imposed is causal: an ANSWER is held until the
//! corresponding OFFER has been observed. Candidates pass through in
//! whatever order they arrive; the media layer buffers.

use crate::events::NegotiationPayload;
use dashmap::{DashMap, DashSet};
use ringline_signal_core::{SessionId, Signal, SignalBody, UserId};
use ringline_signal_transport::{SignalTransport, TransportResult};
use std::sync::Arc;
use tracing::{debug, warn};

struct HeldAnswer {
    to: UserId,
    signal: Signal,
}

pub struct NegotiationRelay {
    transport: Arc<dyn SignalTransport>,
    /// Sessions for which an offer has been observed locally.
    offer_seen: DashSet<SessionId>,
    /// Answers waiting for their offer.
    held_answers: DashMap<SessionId, Vec<HeldAnswer>>,
}

impl NegotiationRelay {
    pub fn new(transport: Arc<dyn SignalTransport>) -> Self {
        Self {
            transport,
            offer_seen: DashSet::new(),
            held_answers: DashMap::new(),
        }
    }

    pub async fn send_offer(
        &self,
        session_id: &SessionId,
        from: &UserId,
        to: &UserId,
        channel: &ringline_signal_core::ChannelId,
        sdp: String,
        renegotiate: bool,
    ) -> TransportResult<()> {
        let signal = Signal::new(
            session_id.clone(),
            from.clone(),
            to.clone(),
            channel.clone(),
            SignalBody::Offer { sdp, renegotiate },
        );
        self.transport.send(to, signal).await
    }

    /// Send an answer, or hold it if the offer has not been observed
    /// yet. Holding preserves offer -> answer causality when the app
    /// races ahead of the transport.
    pub async fn send_answer(
        &self,
        session_id: &SessionId,
        from: &UserId,
        to: &UserId,
        channel: &ringline_signal_core::ChannelId,
        sdp: String,
    ) -> TransportResult<()> {
        let signal = Signal::new(
            session_id.clone(),
            from.clone(),
            to.clone(),
            channel.clone(),
            SignalBody::Answer { sdp },
        );
        if !self.offer_seen.contains(session_id) {
            debug!(session_id = %session_id, "holding answer until offer observed");
            self.held_answers
                .entry(session_id.clone())
                .or_default()
                .push(HeldAnswer {
                    to: to.clone(),
                    signal,
                });
            return Ok(());
        }
        self.transport.send(to, signal).await
    }

    pub async fn send_candidate(
        &self,
        session_id: &SessionId,
        from: &UserId,
        to: &UserId,
        channel: &ringline_signal_core::ChannelId,
        candidate: String,
    ) -> TransportResult<()> {
        let signal = Signal::new(
            session_id.clone(),
            from.clone(),
            to.clone(),
            channel.clone(),
            SignalBody::IceCandidate { candidate },
        );
        self.transport.send(to, signal).await
    }

    /// Record that an offer for this session has been observed and flush
    /// any answers that were waiting on it.
    pub async fn note_offer_observed(&self, session_id: &SessionId) {
        self.offer_seen.insert(session_id.clone());
        if let Some((_, held)) = self.held_answers.remove(session_id) {
            for answer in held {
                if let Err(e) = self.transport.send(&answer.to, answer.signal).await {
                    warn!(session_id = %session_id, error = %e, "flushing held answer failed");
                }
            }
        }
    }

    /// Forget a finished session's bookkeeping.
    pub fn forget(&self, session_id: &SessionId) {
        self.offer_seen.remove(session_id);
        self.held_answers.remove(session_id);
    }

    /// Classify an inbound signal body as a negotiation payload, if it
    /// is one.
    pub fn payload_of(body: &SignalBody) -> Option<NegotiationPayload> {
        match body {
            SignalBody::Offer { sdp, renegotiate } => Some(NegotiationPayload::Offer {
                sdp: sdp.clone(),
                renegotiate: *renegotiate,
            }),
            SignalBody::Answer { sdp } => Some(NegotiationPayload::Answer { sdp: sdp.clone() }),
            SignalBody::IceCandidate { candidate } => Some(NegotiationPayload::IceCandidate {
                candidate: candidate.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringline_signal_transport::{BusTransport, SignalBus};
    use tokio_stream::StreamExt;

    fn setup() -> (Arc<SignalBus>, NegotiationRelay) {
        let bus = SignalBus::new("calls");
        let relay = NegotiationRelay::new(Arc::new(BusTransport::new(bus.clone())));
        (bus, relay)
    }

    #[tokio::test]
    async fn answer_is_held_until_offer_observed() {
        let (bus, relay) = setup();
        let session = SessionId::new();
        let alice: UserId = "alice".into();
        let bob: UserId = "bob".into();
        let channel = "ch-1".into();

        relay
            .send_answer(&session, &bob, &alice, &channel, "answer-sdp".into())
            .await
            .unwrap();
        assert!(bus.records_for(&alice).is_empty(), "answer leaked early");

        relay.note_offer_observed(&session).await;
        let records = bus.records_for(&alice);
        assert_eq!(records.len(), 1);
        assert!(matches!(
            records[0].signal.body,
            SignalBody::Answer { .. }
        ));
    }

    #[tokio::test]
    async fn candidates_pass_through_any_time() {
        let (bus, relay) = setup();
        let session = SessionId::new();
        let channel = "ch-1".into();

        relay
            .send_candidate(&session, &"bob".into(), &"alice".into(), &channel, "c1".into())
            .await
            .unwrap();
        assert_eq!(bus.records_for(&"alice".into()).len(), 1);
    }

    #[tokio::test]
    async fn offer_reaches_peer_with_renegotiate_flag() {
        let (bus, relay) = setup();
        let session = SessionId::new();
        let channel = "ch-1".into();
        let bob: UserId = "bob".into();

        let transport = BusTransport::new(bus.clone());
        let mut stream = transport.observe(&bob);

        relay
            .send_offer(&session, &"alice".into(), &bob, &channel, "v=0".into(), true)
            .await
            .unwrap();

        let got = stream.next().await.unwrap();
        match got.body {
            SignalBody::Offer { renegotiate, .. } => assert!(renegotiate),
            other => panic!("expected offer, got {:?}", other),
        }
    }
}
