//! Engine configuration. Every timing literal in the design is a field
//! here, never a constant at a use site.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an unanswered call rings before it expires.
    pub ring_timeout: Duration,
    /// How long the incoming-call prompt stays on screen without user
    /// action. UI-only; does not affect the session.
    pub prompt_window: Duration,
    /// Delay before transport records of a terminated call are removed,
    /// so a late observer still sees the terminal status.
    pub cleanup_grace: Duration,
    /// Pause between best-effort cleanup retries.
    pub cleanup_retry: Duration,
    /// Cleanup attempts before giving up (the records will be orphaned
    /// but harmless; a warning is logged).
    pub cleanup_max_attempts: u32,
    /// Namespace prefix for bus record paths.
    pub namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(60),
            prompt_window: Duration::from_secs(10),
            cleanup_grace: Duration::from_secs(3),
            cleanup_retry: Duration::from_secs(1),
            cleanup_max_attempts: 3,
            namespace: "calls".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = timeout;
        self
    }

    pub fn with_prompt_window(mut self, window: Duration) -> Self {
        self.prompt_window = window;
        self
    }

    pub fn with_cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace = grace;
        self
    }

    pub fn with_cleanup_retry(mut self, retry: Duration, max_attempts: u32) -> Self {
        self.cleanup_retry = retry;
        self.cleanup_max_attempts = max_attempts;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}
