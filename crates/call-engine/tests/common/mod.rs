//! Shared harness: two coordinators wired to one in-process bus.

// Not every suite uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use ringline_call_engine::{
    BlockListPolicy, CallCoordinator, CallEventHandler, CallStatusInfo, EngineConfig,
    IncomingCallInfo, MemoryBlockStore, NegotiationPayload, NullSink,
};
use ringline_signal_core::{MediaKind, SessionId, SignalError, UserId};
use ringline_signal_transport::{BusTransport, SignalBus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Records everything the engine reports, for later assertions.
#[derive(Default)]
pub struct Recorder {
    incoming: Mutex<Vec<IncomingCallInfo>>,
    transitions: Mutex<Vec<CallStatusInfo>>,
    upgrades: Mutex<Vec<(SessionId, MediaKind)>>,
    negotiation: Mutex<Vec<(SessionId, UserId, NegotiationPayload)>>,
    failures: Mutex<Vec<(Option<SessionId>, SignalError)>>,
}

impl Recorder {
    pub fn incoming(&self) -> Vec<IncomingCallInfo> {
        self.incoming.lock().unwrap().clone()
    }

    pub fn transitions(&self) -> Vec<CallStatusInfo> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn upgrades(&self) -> Vec<(SessionId, MediaKind)> {
        self.upgrades.lock().unwrap().clone()
    }

    pub fn negotiation(&self) -> Vec<(SessionId, UserId, NegotiationPayload)> {
        self.negotiation.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<(Option<SessionId>, SignalError)> {
        self.failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallEventHandler for Recorder {
    async fn on_incoming_call(&self, info: IncomingCallInfo) {
        self.incoming.lock().unwrap().push(info);
    }

    async fn on_call_state_changed(&self, info: CallStatusInfo) {
        self.transitions.lock().unwrap().push(info);
    }

    async fn on_remote_upgrade(&self, session_id: SessionId, media_kind: MediaKind) {
        self.upgrades.lock().unwrap().push((session_id, media_kind));
    }

    async fn on_negotiation_signal(
        &self,
        session_id: SessionId,
        from: UserId,
        payload: NegotiationPayload,
    ) {
        self.negotiation
            .lock()
            .unwrap()
            .push((session_id, from, payload));
    }

    async fn on_call_failed(&self, session_id: Option<SessionId>, error: SignalError) {
        self.failures.lock().unwrap().push((session_id, error));
    }
}

/// `alice` and `bob` on the same bus, both pumping their signal
/// streams.
pub struct Pair {
    pub bus: Arc<SignalBus>,
    pub blocks: Arc<MemoryBlockStore>,
    pub alice: CallCoordinator,
    pub bob: CallCoordinator,
    pub alice_events: Arc<Recorder>,
    pub bob_events: Arc<Recorder>,
    pumps: Vec<JoinHandle<()>>,
}

impl Pair {
    pub async fn new(config: EngineConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let bus = SignalBus::new(config.namespace.clone());
        let blocks = Arc::new(MemoryBlockStore::new());

        let (alice, alice_events) = coordinator("alice", &config, &bus, &blocks);
        let (bob, bob_events) = coordinator("bob", &config, &bus, &blocks);
        let pumps = vec![alice.run(), bob.run()];

        Self {
            bus,
            blocks,
            alice,
            bob,
            alice_events,
            bob_events,
            pumps,
        }
    }
}

impl Drop for Pair {
    fn drop(&mut self) {
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

fn coordinator(
    user: &str,
    config: &EngineConfig,
    bus: &Arc<SignalBus>,
    blocks: &Arc<MemoryBlockStore>,
) -> (CallCoordinator, Arc<Recorder>) {
    let events = Arc::new(Recorder::default());
    let coordinator = CallCoordinator::new(
        user.into(),
        config.clone(),
        Arc::new(BusTransport::new(bus.clone())),
        Arc::new(BlockListPolicy::new(blocks.clone())),
        Arc::new(NullSink),
        events.clone(),
    );
    (coordinator, events)
}

/// Scheduler barrier: with the clock paused, a short sleep parks this
/// task until every other runnable task has drained.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}
