//! End-to-end relay tests: real sockets, two authenticated clients.

use ringline_signal_core::{MediaKind, SessionId, Signal, SignalBody, UserId};
use ringline_signal_transport::relay::{PresenceEvent, RelayClient, RelayServer};
use ringline_signal_transport::SignalTransport;
use std::time::Duration;
use tokio::time::timeout;
use tokio_stream::StreamExt;

async fn start_server() -> (
    std::net::SocketAddr,
    tokio::sync::mpsc::UnboundedReceiver<ringline_signal_transport::relay::Disconnect>,
) {
    let (server, disconnects) = RelayServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, disconnects)
}

fn offer(from: &str, to: &str) -> Signal {
    Signal::new(
        SessionId("call-42".into()),
        UserId::from(from),
        UserId::from(to),
        "ch-1".into(),
        SignalBody::Offer {
            sdp: "v=0".into(),
            renegotiate: false,
        },
    )
}

#[tokio::test]
async fn offer_round_trips_between_clients() {
    let (addr, _disconnects) = start_server().await;

    let alice = RelayClient::connect(addr, "alice".into(), "ch-1".into())
        .await
        .unwrap();
    let bob = RelayClient::connect(addr, "bob".into(), "ch-1".into())
        .await
        .unwrap();
    assert_eq!(bob.user(), &UserId::from("bob"));

    let mut inbox = bob.observe(&"bob".into());

    // Presence must include bob before routing can succeed; wait for the
    // join to come back around.
    let mut presence = alice.presence_events().unwrap();
    loop {
        match timeout(Duration::from_secs(5), presence.recv()).await {
            Ok(Some(PresenceEvent::Joined { user, .. })) if user == UserId::from("bob") => break,
            Ok(Some(_)) => continue,
            other => panic!("bob never joined: {:?}", other),
        }
    }

    alice
        .send(&"bob".into(), offer("alice", "bob"))
        .await
        .unwrap();

    let got = timeout(Duration::from_secs(5), inbox.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.from, UserId::from("alice"));
    assert_eq!(got.to, UserId::from("bob"));
    assert_eq!(got.session_id, SessionId("call-42".into()));
    assert!(matches!(got.body, SignalBody::Offer { .. }));
}

#[tokio::test]
async fn unknown_target_is_silently_dropped() {
    let (addr, _disconnects) = start_server().await;

    let alice = RelayClient::connect(addr, "alice".into(), "ch-1".into())
        .await
        .unwrap();

    // No error comes back; the event just vanishes server-side.
    alice
        .send(&"carol".into(), offer("alice", "carol"))
        .await
        .unwrap();

    // The connection stays usable afterwards.
    alice
        .send(
            &"carol".into(),
            Signal::new(
                SessionId("call-43".into()),
                "alice".into(),
                "carol".into(),
                "ch-1".into(),
                SignalBody::CallNotification {
                    media_kind: MediaKind::Audio,
                },
            ),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn socket_drop_clears_presence_and_reports_disconnect() {
    let (server, mut disconnects) = RelayServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let state = server.state();
    tokio::spawn(server.run());

    let alice = RelayClient::connect(addr, "alice".into(), "ch-1".into())
        .await
        .unwrap();
    let mut presence = alice.presence_events().unwrap();

    let bob = RelayClient::connect(addr, "bob".into(), "ch-1".into())
        .await
        .unwrap();
    loop {
        match timeout(Duration::from_secs(5), presence.recv()).await {
            Ok(Some(PresenceEvent::Joined { user, .. })) if user == UserId::from("bob") => break,
            Ok(Some(_)) => continue,
            other => panic!("bob never joined: {:?}", other),
        }
    }
    assert!(state.is_present("bob"));
    assert_eq!(state.participants("ch-1"), vec!["alice", "bob"]);

    drop(bob);

    loop {
        match timeout(Duration::from_secs(5), presence.recv()).await {
            Ok(Some(PresenceEvent::Left { user })) if user == UserId::from("bob") => break,
            Ok(Some(_)) => continue,
            other => panic!("bob never left: {:?}", other),
        }
    }

    let notice = timeout(Duration::from_secs(5), disconnects.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.user, UserId::from("bob"));
    assert!(!state.is_present("bob"));
    assert_eq!(state.participants("ch-1"), vec!["alice"]);
}

#[tokio::test]
async fn reconnect_supersedes_stale_socket_without_losing_presence() {
    let (server, mut disconnects) = RelayServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let state = server.state();
    tokio::spawn(server.run());

    let alice = RelayClient::connect(addr, "alice".into(), "ch-1".into())
        .await
        .unwrap();
    let mut presence = alice.presence_events().unwrap();

    // Bob connects, then reconnects before the first socket is torn
    // down: the flaky-network case.
    let stale = RelayClient::connect(addr, "bob".into(), "ch-1".into())
        .await
        .unwrap();
    let fresh = RelayClient::connect(addr, "bob".into(), "ch-1".into())
        .await
        .unwrap();
    let mut inbox = fresh.observe(&"bob".into());

    // Both authentications broadcast a join; wait for the second so the
    // fresh connection is known to hold the address-book entry.
    let mut joins = 0;
    while joins < 2 {
        match timeout(Duration::from_secs(5), presence.recv()).await {
            Ok(Some(PresenceEvent::Joined { user, .. })) if user == UserId::from("bob") => {
                joins += 1;
            }
            Ok(Some(_)) => continue,
            other => panic!("bob never rejoined: {:?}", other),
        }
    }

    drop(stale);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The stale socket's close must not evict the live connection.
    assert!(state.is_present("bob"));
    assert_eq!(state.participants("ch-1"), vec!["alice", "bob"]);
    assert!(disconnects.try_recv().is_err(), "spurious disconnect notice");

    // Routing still reaches the live socket.
    alice
        .send(&"bob".into(), offer("alice", "bob"))
        .await
        .unwrap();
    let got = timeout(Duration::from_secs(5), inbox.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.from, UserId::from("alice"));
    assert!(matches!(got.body, SignalBody::Offer { .. }));
}
