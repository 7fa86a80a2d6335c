//! Relay client: a [`SignalTransport`] over the dedicated socket.

use super::protocol::{ClientEvent, ServerEvent};
use crate::adapter::{SignalStream, SignalTransport};
use crate::errors::{TransportError, TransportResult};
use async_trait::async_trait;
use ringline_signal_core::{ChannelId, SessionId, Signal, SignalBody, UserId};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// Channel presence changes observed over the relay.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Joined {
        user: UserId,
        participants: Vec<UserId>,
    },
    Left {
        user: UserId,
    },
}

/// A connected, authenticated relay client.
pub struct RelayClient {
    user: UserId,
    channel: ChannelId,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    observers: Arc<Mutex<Vec<mpsc::UnboundedSender<Signal>>>>,
    presence_rx: Mutex<Option<mpsc::UnboundedReceiver<PresenceEvent>>>,
}

impl RelayClient {
    /// Connect and authenticate as `user` scoped to `channel`.
    pub async fn connect(
        addr: SocketAddr,
        user: UserId,
        channel: ChannelId,
    ) -> TransportResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, mut write_half) = stream.into_split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let Ok(mut line) = serde_json::to_string(&event) else {
                    continue;
                };
                line.push('\n');
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        outbound
            .send(ClientEvent::Authenticate {
                user_id: user.0.clone(),
                channel_id: channel.0.clone(),
            })
            .map_err(|_| TransportError::LinkDown("relay writer gone".into()))?;

        let observers: Arc<Mutex<Vec<mpsc::UnboundedSender<Signal>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let (presence_tx, presence_rx) = mpsc::unbounded_channel();

        let reader_observers = observers.clone();
        let self_user = user.clone();
        let self_channel = channel.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let event = match serde_json::from_str::<ServerEvent>(&line) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!(error = %e, "unparseable relay server event");
                        continue;
                    }
                };
                dispatch_server_event(
                    event,
                    &self_user,
                    &self_channel,
                    &reader_observers,
                    &presence_tx,
                );
            }
            debug!(user = %self_user, "relay connection closed");
        });

        Ok(Self {
            user,
            channel,
            outbound,
            observers,
            presence_rx: Mutex::new(Some(presence_rx)),
        })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Presence event stream. Takeable once.
    pub fn presence_events(&self) -> Option<mpsc::UnboundedReceiver<PresenceEvent>> {
        self.presence_rx.lock().expect("presence lock").take()
    }
}

fn dispatch_server_event(
    event: ServerEvent,
    me: &UserId,
    channel: &ChannelId,
    observers: &Arc<Mutex<Vec<mpsc::UnboundedSender<Signal>>>>,
    presence_tx: &mpsc::UnboundedSender<PresenceEvent>,
) {
    let signal = match event {
        ServerEvent::UserJoined {
            user_id,
            channel_participants,
        } => {
            let _ = presence_tx.send(PresenceEvent::Joined {
                user: UserId::new(user_id),
                participants: channel_participants.into_iter().map(UserId::new).collect(),
            });
            return;
        }
        ServerEvent::UserLeft { user_id } => {
            let _ = presence_tx.send(PresenceEvent::Left {
                user: UserId::new(user_id),
            });
            return;
        }
        ServerEvent::Error { message } => {
            warn!(user = %me, message = %message, "relay error event");
            return;
        }
        ServerEvent::Offer {
            from,
            call_id,
            sdp,
            renegotiate,
        } => Signal::new(
            SessionId(call_id),
            UserId::new(from),
            me.clone(),
            channel.clone(),
            SignalBody::Offer { sdp, renegotiate },
        ),
        ServerEvent::Answer { from, call_id, sdp } => Signal::new(
            SessionId(call_id),
            UserId::new(from),
            me.clone(),
            channel.clone(),
            SignalBody::Answer { sdp },
        ),
        ServerEvent::IceCandidate {
            from,
            call_id,
            candidate,
        } => Signal::new(
            SessionId(call_id),
            UserId::new(from),
            me.clone(),
            channel.clone(),
            SignalBody::IceCandidate { candidate },
        ),
        ServerEvent::Hangup { from, call_id } => Signal::new(
            SessionId(call_id),
            UserId::new(from),
            me.clone(),
            channel.clone(),
            SignalBody::Hangup,
        ),
        ServerEvent::CallDeclined { from, call_id } => Signal::new(
            SessionId(call_id),
            UserId::new(from),
            me.clone(),
            channel.clone(),
            SignalBody::CallDeclined,
        ),
        ServerEvent::CallNotification {
            from,
            call_id,
            channel_id,
            media_kind,
        } => Signal::new(
            SessionId(call_id),
            UserId::new(from),
            me.clone(),
            ChannelId::new(channel_id),
            SignalBody::CallNotification { media_kind },
        ),
        ServerEvent::StatusUpdate {
            from,
            call_id,
            status,
        } => Signal::new(
            SessionId(call_id),
            UserId::new(from),
            me.clone(),
            channel.clone(),
            SignalBody::StatusUpdate { status },
        ),
    };

    let mut observers = observers.lock().expect("observer lock");
    observers.retain(|tx| tx.send(signal.clone()).is_ok());
}

#[async_trait]
impl SignalTransport for RelayClient {
    async fn send(&self, to: &UserId, signal: Signal) -> TransportResult<()> {
        let target = to.0.clone();
        let call_id = signal.session_id.0.clone();
        let event = match signal.body {
            SignalBody::Offer { sdp, renegotiate } => ClientEvent::Offer {
                target_user_id: target,
                call_id,
                sdp,
                renegotiate,
            },
            SignalBody::Answer { sdp } => ClientEvent::Answer {
                target_user_id: target,
                call_id,
                sdp,
            },
            SignalBody::IceCandidate { candidate } => ClientEvent::IceCandidate {
                target_user_id: target,
                call_id,
                candidate,
            },
            SignalBody::Hangup => ClientEvent::Hangup {
                target_user_id: target,
                call_id,
            },
            SignalBody::CallDeclined => ClientEvent::CallDeclined {
                target_user_id: target,
                call_id,
            },
            SignalBody::CallNotification { media_kind } => ClientEvent::CallNotification {
                target_user_id: target,
                call_id,
                channel_id: signal.channel.0.clone(),
                media_kind,
            },
            SignalBody::StatusUpdate { status } => ClientEvent::StatusUpdate {
                target_user_id: target,
                call_id,
                status,
            },
        };

        // Success means queued to the writer task, nothing more.
        self.outbound
            .send(event)
            .map_err(|_| TransportError::LinkDown("relay connection closed".into()))
    }

    fn observe(&self, me: &UserId) -> SignalStream {
        if *me != self.user {
            warn!(me = %me, authenticated = %self.user, "observe for a different user than authenticated");
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().expect("observer lock").push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }
}
