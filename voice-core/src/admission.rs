//! Audio Admission Gate: decides whether an inbound client audio chunk may
//! be forwarded to the reasoning adapter.
//!
//! Prevents three pathologies: assistant audio leaking back into the
//! microphone and being re-recognized, stale chunks arriving after an
//! explicit stop, and audio being sent while the assistant owns the
//! speaker.

use crate::arbitrator::ArbitratorState;
use crate::audio::AudioChunk;
use crate::utils::now_millis;

/// Why a chunk was dropped, in gate-check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    StopLatch,
    UpstreamNotReady,
    WrongLifecycleState,
    Cooldown,
    LowEnergy,
}

/// The admission gate's verdict for a single chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdmissionDecision {
    Forward,
    Drop(DropReason),
}

/// Per-session state for the admission gate: the stop-latch and the two
/// cooldown anchors.
#[derive(Debug, Default)]
pub struct AdmissionGate {
    stop_latch: bool,
    last_response_end_time: Option<u64>,
    last_playback_end_time: Option<u64>,
}

impl AdmissionGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_latched(&self) -> bool {
        self.stop_latch
    }

    /// The cooldown anchor: the latest of the two recorded end times.
    #[must_use]
    pub fn cooldown_anchor(&self) -> Option<u64> {
        match (self.last_response_end_time, self.last_playback_end_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Evaluates the six ordered gates for one inbound chunk.
    pub fn check(
        &self,
        chunk: &AudioChunk,
        arbitrator_state: ArbitratorState,
        upstream_connected: bool,
        cooldown_ms: u64,
        min_rms: f64,
    ) -> AdmissionDecision {
        if self.stop_latch {
            return AdmissionDecision::Drop(DropReason::StopLatch);
        }
        if !upstream_connected {
            return AdmissionDecision::Drop(DropReason::UpstreamNotReady);
        }
        if arbitrator_state != ArbitratorState::Listening {
            return AdmissionDecision::Drop(DropReason::WrongLifecycleState);
        }
        if let Some(anchor) = self.cooldown_anchor() {
            if anchor > 0 && now_millis().saturating_sub(anchor) < cooldown_ms {
                return AdmissionDecision::Drop(DropReason::Cooldown);
            }
        }
        if chunk.rms() < min_rms {
            return AdmissionDecision::Drop(DropReason::LowEnergy);
        }
        AdmissionDecision::Forward
    }

    /// `audio.stop` / `audio.cancel`: latches the gate.
    pub fn latch(&mut self) {
        self.stop_latch = true;
    }

    /// `session.start` / `user.barge_in` / commit-skipped recovery:
    /// unlatches the gate to re-open the microphone.
    pub fn unlatch(&mut self) {
        self.stop_latch = false;
    }

    /// `playback.ended`: records the client-side cooldown anchor.
    pub fn on_playback_ended(&mut self) {
        self.last_playback_end_time = Some(now_millis());
    }

    /// `response_complete` from the arbitrator: records the server-side
    /// cooldown anchor and unlatches.
    pub fn on_response_complete(&mut self) {
        self.last_response_end_time = Some(now_millis());
        self.unlatch();
    }
}
