//! Session data model and registry.

pub mod session_loop;

use dashmap::DashMap;
use serde_json::Value;

use crate::protocol_constants::SESSION_IDLE_TIMEOUT_MS;
use crate::utils::now_millis;

/// Coarse lifecycle state exposed on [`Session`], distinct from the
/// arbitrator's finer-grained [`crate::arbitrator::ArbitratorState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    Idle,
    Listening,
    Responding,
    Ended,
}

/// Session identity and bookkeeping, independent of the arbitrator.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: u64,
    pub last_activity: u64,
    pub lifecycle: SessionLifecycle,
    pub metadata: Value,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            created_at: now,
            last_activity: now,
            lifecycle: SessionLifecycle::Idle,
            metadata: Value::Null,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = now_millis();
    }

    #[must_use]
    pub fn is_idle_expired(&self, idle_timeout_ms: u64) -> bool {
        now_millis().saturating_sub(self.last_activity) >= idle_timeout_ms
    }
}

/// Registry of live sessions, keyed by session id. Shared across the
/// server's connection handlers; each entry is independently owned by its
/// session loop, so the registry itself only tracks liveness for GC.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    last_activity: DashMap<String, u64>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: impl Into<String>) {
        self.last_activity.insert(session_id.into(), now_millis());
    }

    pub fn touch(&self, session_id: &str) {
        if let Some(mut entry) = self.last_activity.get_mut(session_id) {
            *entry = now_millis();
        }
    }

    pub fn remove(&self, session_id: &str) {
        self.last_activity.remove(session_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_activity.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_activity.is_empty()
    }

    /// Returns the ids of every session idle for at least
    /// [`SESSION_IDLE_TIMEOUT_MS`], for the caller to tear down.
    #[must_use]
    pub fn sweep_expired(&self) -> Vec<String> {
        self.sweep_expired_with_timeout(SESSION_IDLE_TIMEOUT_MS)
    }

    #[must_use]
    pub fn sweep_expired_with_timeout(&self, idle_timeout_ms: u64) -> Vec<String> {
        let now = now_millis();
        self.last_activity
            .iter()
            .filter(|entry| now.saturating_sub(*entry.value()) >= idle_timeout_ms)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_idle_and_fresh() {
        let session = Session::new("s1");
        assert_eq!(session.lifecycle, SessionLifecycle::Idle);
        assert!(!session.is_idle_expired(10 * 60 * 1000));
    }

    #[test]
    fn registry_tracks_and_sweeps() {
        let registry = SessionRegistry::new();
        registry.register("s1");
        assert_eq!(registry.len(), 1);
        assert!(registry.sweep_expired_with_timeout(0).contains(&"s1".to_string()));
        registry.remove("s1");
        assert!(registry.is_empty());
    }
}
