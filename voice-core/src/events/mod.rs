//! Event Fabric: the open-schema record stream that carries everything the
//! arbitrator, admission gate, policy pipeline, and reasoning adapter emit.
//!
//! Subsystems never call each other directly to report what happened; they
//! emit a [`BroadcastEvent`] through an [`emitter::EventEmitter`] and let the
//! session loop and any audit sink observe it.

pub mod emitter;

use serde::Serialize;
use serde_json::Value;

use crate::utils::now_millis;

/// An open-schema discriminated event record.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_id: String,
    pub session_id: String,
    pub t_ms: u64,
    pub source: EventSource,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
}

impl Event {
    /// Builds a new event stamped with the current time.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        source: EventSource,
        event_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            t_ms: now_millis(),
            source,
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Which subsystem produced an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Arbitrator,
    AdmissionGate,
    PolicyGate,
    Reasoning,
    Retrieval,
    Session,
}

/// Arbitrator owner-change / lane signal events, per the lane arbitrator's
/// play/stop vocabulary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum ArbitratorEvent {
    PlayReflex,
    StopReflex,
    PlayLaneB,
    StopLaneB,
    PlayFallback,
    StopFallback,
    ResponseComplete,
    OwnerChanged { owner: String },
    StateChanged { state: String },
}

/// Policy gate pipeline outcomes, surfaced for audit even when no action is
/// taken on the decision.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyEvent {
    Decision {
        decision: String,
        reason_codes: Vec<String>,
        severity: u8,
    },
    Override {
        from: String,
        to: String,
    },
}

/// A single tagged wrapper around every category of event the fabric
/// carries, so a broadcast subscriber can match on category without needing
/// to know which subsystem module defined it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum BroadcastEvent {
    Arbitrator(ArbitratorEvent),
    Policy(PolicyEvent),
    Raw(Event),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_stamps_session_and_time() {
        let event = Event::new(
            "sess-1",
            EventSource::AdmissionGate,
            "chunk_dropped",
            serde_json::json!({"reason": "cooldown"}),
        );
        assert_eq!(event.session_id, "sess-1");
        assert!(event.t_ms > 0);
    }
}
