//! The relay server: a TCP accept loop with an in-memory address book
//! and channel membership index.
//!
//! Both maps are owned by one `RelayState` instance injected into the
//! connection tasks; nothing here is a module-level singleton. Routing
//! is fire-and-forget: an event for an unknown target is dropped with a
//! debug log, never an error back to the sender.

use super::protocol::{ClientEvent, ServerEvent};
use crate::errors::TransportResult;
use dashmap::DashMap;
use ringline_signal_core::{ChannelId, UserId};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Notice that a client's socket dropped while it was still present.
/// The cleanup supervisor turns these into hangup/expire synthesis.
#[derive(Debug, Clone)]
pub struct Disconnect {
    pub user: UserId,
    pub channel: ChannelId,
}

struct ConnectionHandle {
    /// Identifies which socket currently owns the address-book entry.
    /// A reconnect replaces the entry; the superseded socket's teardown
    /// must not clear the new owner's presence.
    conn_id: u64,
    channel_id: String,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Shared relay state: userId -> connection, channelId -> present users.
pub struct RelayState {
    connections: DashMap<String, ConnectionHandle>,
    channels: DashMap<String, HashSet<String>>,
    next_conn_id: AtomicU64,
    disconnect_tx: mpsc::UnboundedSender<Disconnect>,
}

impl RelayState {
    pub fn participants(&self, channel_id: &str) -> Vec<String> {
        self.channels
            .get(channel_id)
            .map(|set| {
                let mut users: Vec<String> = set.iter().cloned().collect();
                users.sort();
                users
            })
            .unwrap_or_default()
    }

    pub fn is_present(&self, user_id: &str) -> bool {
        self.connections.contains_key(user_id)
    }

    fn send_to(&self, user_id: &str, event: ServerEvent) {
        match self.connections.get(user_id) {
            Some(conn) => {
                let _ = conn.tx.send(event);
            }
            None => {
                // Fire-and-forget: unknown target, drop.
                debug!(target_user = %user_id, "dropping event for unknown target");
            }
        }
    }

    fn broadcast_to_channel(&self, channel_id: &str, except: &str, event: ServerEvent) {
        let members = self.participants(channel_id);
        for member in members {
            if member != except {
                self.send_to(&member, event.clone());
            }
        }
    }
}

/// The relay server. `bind` it, then `run` the accept loop.
pub struct RelayServer {
    listener: TcpListener,
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Bind the listener. Returns the server and the stream of
    /// disconnect notices.
    pub async fn bind(addr: SocketAddr) -> TransportResult<(Self, mpsc::UnboundedReceiver<Disconnect>)> {
        let listener = TcpListener::bind(addr).await?;
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RelayState {
            connections: DashMap::new(),
            channels: DashMap::new(),
            next_conn_id: AtomicU64::new(0),
            disconnect_tx,
        });
        info!(addr = %listener.local_addr()?, "relay server listening");
        Ok((Self { listener, state }, disconnect_rx))
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<RelayState> {
        self.state.clone()
    }

    /// Accept loop; one task per connection. Runs until the listener
    /// errors or the task is aborted.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "relay connection accepted");
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, state).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "relay accept failed");
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<RelayState>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(mut line) = serde_json::to_string(&event) else {
                continue;
            };
            line.push('\n');
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    // The first event must authenticate the connection.
    let (user_id, channel_id) = match lines.next_line().await {
        Ok(Some(line)) => match serde_json::from_str::<ClientEvent>(&line) {
            Ok(ClientEvent::Authenticate {
                user_id,
                channel_id,
            }) => (user_id, channel_id),
            Ok(_) | Err(_) => {
                let _ = tx.send(ServerEvent::Error {
                    message: "expected authenticate".into(),
                });
                drop(tx);
                let _ = writer.await;
                return;
            }
        },
        _ => return,
    };

    info!(user = %user_id, channel = %channel_id, "relay client authenticated");
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    state.connections.insert(
        user_id.clone(),
        ConnectionHandle {
            conn_id,
            channel_id: channel_id.clone(),
            tx: tx.clone(),
        },
    );
    state
        .channels
        .entry(channel_id.clone())
        .or_default()
        .insert(user_id.clone());

    let participants = state.participants(&channel_id);
    let joined = ServerEvent::UserJoined {
        user_id: user_id.clone(),
        channel_participants: participants,
    };
    // The joining client gets the roster too.
    let _ = tx.send(joined.clone());
    state.broadcast_to_channel(&channel_id, &user_id, joined);

    while let Ok(Some(line)) = lines.next_line().await {
        let event = match serde_json::from_str::<ClientEvent>(&line) {
            Ok(event) => event,
            Err(e) => {
                debug!(user = %user_id, error = %e, "unparseable relay event");
                let _ = tx.send(ServerEvent::Error {
                    message: format!("bad event: {}", e),
                });
                continue;
            }
        };

        match event.target().map(str::to_owned) {
            Some(target) => {
                if let Some(relayed) = event.into_relayed(user_id.clone()) {
                    state.send_to(&target, relayed);
                }
            }
            None => {
                debug!(user = %user_id, "ignoring re-authenticate");
            }
        }
    }

    // Socket dropped (gracefully or not). A reconnect may already have
    // replaced the address-book entry; only the socket that still owns
    // it clears presence and tells the room.
    let owned = state
        .connections
        .remove_if(&user_id, |_, handle| handle.conn_id == conn_id)
        .is_some();
    if owned {
        if let Some(mut members) = state.channels.get_mut(&channel_id) {
            members.remove(&user_id);
        }
        state.broadcast_to_channel(
            &channel_id,
            &user_id,
            ServerEvent::UserLeft {
                user_id: user_id.clone(),
            },
        );
        let _ = state.disconnect_tx.send(Disconnect {
            user: UserId::new(user_id.clone()),
            channel: ChannelId::new(channel_id),
        });
        info!(user = %user_id, "relay client disconnected");
    } else {
        debug!(user = %user_id, "superseded socket closed after reconnect");
    }

    drop(tx);
    let _ = writer.await;
}
