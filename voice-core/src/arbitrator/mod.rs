//! Lane Arbitrator: owns the speaker for a session, deciding who plays
//! (reflex, Lane B, or safe fallback) and when to preempt, cool down, or
//! cancel.

pub mod timers;

use serde::Serialize;

use crate::utils::now_millis;

/// The arbitrator's state machine states. Initial `Idle`, terminal `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitratorState {
    Idle,
    Listening,
    BResponding,
    APlaying,
    BPlaying,
    FallbackPlaying,
    Ended,
}

/// Who currently owns the speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    None,
    Reflex,
    LaneB,
    Fallback,
}

/// A side effect of an arbitrator operation. The session loop is
/// responsible for acting on each one (arming timers, driving lane
/// producers, emitting fabric events).
#[derive(Debug, Clone, PartialEq)]
pub enum ArbitratorSignal {
    StateChange { from: ArbitratorState, to: ArbitratorState },
    OwnerChange { from: Owner, to: Owner },
    PlayReflex,
    StopReflex,
    PlayLaneB,
    StopLaneB,
    PlayFallback,
    StopFallback,
    ResponseComplete,
    ArmReflexTimer { delay_ms: u64 },
    ArmReflexTimeout { delay_ms: u64 },
    ArmTransitionGap { delay_ms: u64 },
}

/// The per-session lane arbitrator. All methods are synchronous and
/// expected to run behind the session's single serialized control path; no
/// two operations may interleave.
#[derive(Debug)]
pub struct Arbitrator {
    state: ArbitratorState,
    owner: Owner,
    response_in_progress: bool,
    suppress_lane_b_done: bool,
    speech_end_time: Option<u64>,
    b_ready_time: Option<u64>,
    /// Set while waiting out the transition gap between stopping the reflex
    /// lane and starting Lane B playback.
    pending_lane_b_after_gap: bool,
    /// Set once `stop_reflex` has been emitted for the current reflex
    /// playback, so a later event in the same `A_PLAYING` span (lane B
    /// readiness, lane B done, barge-in, policy cancel) doesn't emit a
    /// second one for the same `play_reflex`.
    reflex_already_stopped: bool,
}

impl Default for Arbitrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Arbitrator {
    /// Creates a new arbitrator in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArbitratorState::Idle,
            owner: Owner::None,
            response_in_progress: false,
            suppress_lane_b_done: false,
            speech_end_time: None,
            b_ready_time: None,
            pending_lane_b_after_gap: false,
            reflex_already_stopped: false,
        }
    }

    /// Pushes `StopReflex` unless it was already emitted for the current
    /// reflex playback. Owner stays `Reflex` until the caller transitions
    /// state; it is not a function of this flag.
    fn stop_reflex_once(&mut self, out: &mut Vec<ArbitratorSignal>) {
        if !self.reflex_already_stopped {
            self.reflex_already_stopped = true;
            out.push(ArbitratorSignal::StopReflex);
        }
    }

    #[must_use]
    pub fn state(&self) -> ArbitratorState {
        self.state
    }

    #[must_use]
    pub fn owner(&self) -> Owner {
        self.owner
    }

    #[must_use]
    pub fn response_in_progress(&self) -> bool {
        self.response_in_progress
    }

    #[must_use]
    pub fn speech_end_time(&self) -> Option<u64> {
        self.speech_end_time
    }

    fn transition(&mut self, to: ArbitratorState, out: &mut Vec<ArbitratorSignal>) {
        let from = self.state;
        if from != to {
            self.state = to;
            out.push(ArbitratorSignal::StateChange { from, to });
        }
    }

    fn change_owner(&mut self, to: Owner, out: &mut Vec<ArbitratorSignal>) {
        let from = self.owner;
        if from != to {
            self.owner = to;
            out.push(ArbitratorSignal::OwnerChange { from, to });
        }
    }

    /// `IDLE -> LISTENING`. The only valid transition out of `Idle`.
    pub fn start_session(&mut self) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        if self.state == ArbitratorState::Idle {
            self.transition(ArbitratorState::Listening, &mut out);
        }
        out
    }

    /// Any state `-> ENDED`. Cancels timers (the caller is responsible for
    /// actually cancelling the [`timers::Timers`]); emits `stop_fallback` if
    /// the session was in `FallbackPlaying`.
    pub fn end_session(&mut self) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        if self.state == ArbitratorState::Ended {
            return out;
        }
        if self.state == ArbitratorState::FallbackPlaying {
            out.push(ArbitratorSignal::StopFallback);
        }
        self.change_owner(Owner::None, &mut out);
        self.transition(ArbitratorState::Ended, &mut out);
        out
    }

    /// `LISTENING -> B_RESPONDING`. No-op (caller should warn) otherwise,
    /// and no-op if a response is already in progress.
    pub fn on_user_speech_ended(
        &mut self,
        lane_a_enabled: bool,
        min_delay_before_reflex_ms: u64,
    ) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        if self.state != ArbitratorState::Listening || self.response_in_progress {
            return out;
        }
        self.speech_end_time = Some(now_millis());
        self.response_in_progress = true;
        self.transition(ArbitratorState::BResponding, &mut out);
        if lane_a_enabled {
            out.push(ArbitratorSignal::ArmReflexTimer {
                delay_ms: min_delay_before_reflex_ms,
            });
        }
        out
    }

    /// Reflex-arming timer fired. Transitions to `A_PLAYING` if still
    /// `B_RESPONDING`, then returns a signal to arm the reflex timeout.
    pub fn on_reflex_armed(&mut self, max_reflex_duration_ms: u64) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        if self.state != ArbitratorState::BResponding {
            return out;
        }
        self.transition(ArbitratorState::APlaying, &mut out);
        self.change_owner(Owner::Reflex, &mut out);
        self.reflex_already_stopped = false;
        out.push(ArbitratorSignal::PlayReflex);
        out.push(ArbitratorSignal::ArmReflexTimeout {
            delay_ms: max_reflex_duration_ms,
        });
        out
    }

    /// Reflex-timeout timer fired. Stops the reflex lane if still playing;
    /// Lane B is expected soon, so the state and owner do not change — the
    /// reflex lane stays the nominal occupant of `A_PLAYING` until Lane B
    /// actually takes over.
    pub fn on_reflex_timeout(&mut self) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        if self.state != ArbitratorState::APlaying {
            return out;
        }
        self.stop_reflex_once(&mut out);
        out
    }

    /// Records `bReadyTime`, cancels reflex timers (caller's
    /// responsibility), and transitions toward `B_PLAYING`.
    pub fn on_lane_b_ready(&mut self, transition_gap_ms: u64) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        self.b_ready_time = Some(now_millis());
        match self.state {
            ArbitratorState::APlaying => {
                self.stop_reflex_once(&mut out);
                self.pending_lane_b_after_gap = true;
                out.push(ArbitratorSignal::ArmTransitionGap {
                    delay_ms: transition_gap_ms,
                });
            }
            ArbitratorState::BResponding => {
                self.transition(ArbitratorState::BPlaying, &mut out);
                self.change_owner(Owner::LaneB, &mut out);
                out.push(ArbitratorSignal::PlayLaneB);
            }
            _ => {}
        }
        out
    }

    /// Transition-gap timer fired after stopping the reflex lane. Starts
    /// Lane B playback if still pending.
    pub fn on_transition_gap_elapsed(&mut self) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        if !self.pending_lane_b_after_gap {
            return out;
        }
        self.pending_lane_b_after_gap = false;
        self.transition(ArbitratorState::BPlaying, &mut out);
        self.change_owner(Owner::LaneB, &mut out);
        out.push(ArbitratorSignal::PlayLaneB);
        out
    }

    /// `onLaneBDone`. Expected path `B_PLAYING -> LISTENING`; several
    /// defensive paths cover unexpected states.
    pub fn on_lane_b_done(&mut self) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        if self.suppress_lane_b_done {
            self.suppress_lane_b_done = false;
            return out;
        }
        if self.state == ArbitratorState::FallbackPlaying {
            return out;
        }
        match self.state {
            ArbitratorState::BPlaying => {
                self.complete_cycle(&mut out);
            }
            ArbitratorState::Listening | ArbitratorState::BResponding => {
                self.complete_cycle(&mut out);
            }
            ArbitratorState::APlaying => {
                self.stop_reflex_once(&mut out);
                self.complete_cycle(&mut out);
            }
            _ => {
                self.response_in_progress = false;
                self.pending_lane_b_after_gap = false;
                self.change_owner(Owner::None, &mut out);
                self.transition(ArbitratorState::Listening, &mut out);
            }
        }
        out
    }

    fn complete_cycle(&mut self, out: &mut Vec<ArbitratorSignal>) {
        self.response_in_progress = false;
        self.pending_lane_b_after_gap = false;
        self.change_owner(Owner::None, out);
        self.transition(ArbitratorState::Listening, out);
        out.push(ArbitratorSignal::ResponseComplete);
    }

    /// `onUserBargeIn`. Stops whatever is playing and returns to
    /// `Listening`, except from `Idle`/`Ended`.
    pub fn on_user_barge_in(&mut self) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        match self.state {
            ArbitratorState::Idle | ArbitratorState::Ended => return out,
            ArbitratorState::APlaying => {
                self.stop_reflex_once(&mut out);
            }
            ArbitratorState::BPlaying => {
                out.push(ArbitratorSignal::StopLaneB);
            }
            ArbitratorState::FallbackPlaying => {
                out.push(ArbitratorSignal::StopFallback);
            }
            _ => {}
        }
        self.response_in_progress = false;
        self.pending_lane_b_after_gap = false;
        self.change_owner(Owner::None, &mut out);
        self.transition(ArbitratorState::Listening, &mut out);
        out
    }

    /// `onPolicyCancel`. Always ends up `FallbackPlaying` (unless already
    /// there, in which case it just cuts the residual Lane B stream).
    pub fn on_policy_cancel(&mut self) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        if self.state == ArbitratorState::FallbackPlaying {
            self.suppress_lane_b_done = true;
            out.push(ArbitratorSignal::StopLaneB);
            return out;
        }
        match self.state {
            ArbitratorState::APlaying => self.stop_reflex_once(&mut out),
            ArbitratorState::BPlaying => out.push(ArbitratorSignal::StopLaneB),
            _ => {}
        }
        self.suppress_lane_b_done = true;
        self.pending_lane_b_after_gap = false;
        self.change_owner(Owner::Fallback, &mut out);
        self.transition(ArbitratorState::FallbackPlaying, &mut out);
        self.response_in_progress = true;
        out.push(ArbitratorSignal::PlayFallback);
        out
    }

    /// `onFallbackComplete`. `FallbackPlaying -> Listening`.
    pub fn on_fallback_complete(&mut self) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        if self.state != ArbitratorState::FallbackPlaying {
            return out;
        }
        self.response_in_progress = false;
        self.change_owner(Owner::None, &mut out);
        self.transition(ArbitratorState::Listening, &mut out);
        out.push(ArbitratorSignal::ResponseComplete);
        out
    }

    /// External reset used when an upstream commit was skipped for being
    /// too small. Collapses `B_RESPONDING` back to `Listening`.
    pub fn reset_response_in_progress(&mut self) -> Vec<ArbitratorSignal> {
        let mut out = Vec::new();
        self.response_in_progress = false;
        if self.state == ArbitratorState::BResponding {
            self.transition(ArbitratorState::Listening, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_preemption_owner_sequence() {
        let mut arb = Arbitrator::new();
        arb.start_session();
        assert_eq!(arb.state(), ArbitratorState::Listening);

        let signals = arb.on_user_speech_ended(true, 100);
        assert!(signals.contains(&ArbitratorSignal::ArmReflexTimer { delay_ms: 100 }));
        assert_eq!(arb.state(), ArbitratorState::BResponding);

        let signals = arb.on_reflex_armed(3000);
        assert_eq!(arb.owner(), Owner::Reflex);
        assert_eq!(arb.state(), ArbitratorState::APlaying);
        assert!(signals.contains(&ArbitratorSignal::PlayReflex));

        let signals = arb.on_lane_b_ready(120);
        assert!(signals.contains(&ArbitratorSignal::StopReflex));
        assert!(signals.contains(&ArbitratorSignal::ArmTransitionGap { delay_ms: 120 }));
        assert_eq!(arb.state(), ArbitratorState::APlaying);
        assert_eq!(arb.owner(), Owner::Reflex);

        let signals = arb.on_transition_gap_elapsed();
        assert!(signals.contains(&ArbitratorSignal::PlayLaneB));
        assert_eq!(arb.state(), ArbitratorState::BPlaying);
        assert_eq!(arb.owner(), Owner::LaneB);
    }

    #[test]
    fn reflex_timeout_then_lane_b_ready_stops_reflex_exactly_once() {
        let mut arb = Arbitrator::new();
        arb.start_session();
        arb.on_user_speech_ended(true, 100);
        arb.on_reflex_armed(3000);
        assert_eq!(arb.state(), ArbitratorState::APlaying);

        let timeout_signals = arb.on_reflex_timeout();
        assert_eq!(
            timeout_signals.iter().filter(|s| **s == ArbitratorSignal::StopReflex).count(),
            1
        );
        assert_eq!(arb.state(), ArbitratorState::APlaying);
        assert_eq!(arb.owner(), Owner::Reflex);

        let ready_signals = arb.on_lane_b_ready(120);
        assert_eq!(
            ready_signals.iter().filter(|s| **s == ArbitratorSignal::StopReflex).count(),
            0,
            "reflex was already stopped by the timeout; lane_b_ready must not stop it again"
        );
        assert!(ready_signals.contains(&ArbitratorSignal::ArmTransitionGap { delay_ms: 120 }));
        assert_eq!(arb.owner(), Owner::Reflex);

        let gap_signals = arb.on_transition_gap_elapsed();
        assert!(gap_signals.contains(&ArbitratorSignal::PlayLaneB));
        assert_eq!(arb.owner(), Owner::LaneB);
    }

    #[test]
    fn on_user_speech_ended_is_noop_outside_listening() {
        let mut arb = Arbitrator::new();
        assert!(arb.on_user_speech_ended(true, 100).is_empty());
        assert_eq!(arb.state(), ArbitratorState::Idle);
    }

    #[test]
    fn policy_cancel_from_b_playing_latches_suppress() {
        let mut arb = Arbitrator::new();
        arb.start_session();
        arb.on_user_speech_ended(false, 100);
        arb.on_lane_b_ready(120);
        assert_eq!(arb.state(), ArbitratorState::BPlaying);

        let signals = arb.on_policy_cancel();
        assert!(signals.contains(&ArbitratorSignal::StopLaneB));
        assert!(signals.contains(&ArbitratorSignal::PlayFallback));
        assert_eq!(arb.state(), ArbitratorState::FallbackPlaying);

        // onLaneBDone arriving late must be suppressed.
        assert!(arb.on_lane_b_done().is_empty());
    }

    #[test]
    fn fallback_complete_returns_to_listening() {
        let mut arb = Arbitrator::new();
        arb.start_session();
        arb.on_user_speech_ended(false, 100);
        arb.on_policy_cancel();
        let signals = arb.on_fallback_complete();
        assert!(signals.contains(&ArbitratorSignal::ResponseComplete));
        assert_eq!(arb.state(), ArbitratorState::Listening);
    }

    #[test]
    fn barge_in_from_b_playing_stops_and_returns_to_listening() {
        let mut arb = Arbitrator::new();
        arb.start_session();
        arb.on_user_speech_ended(false, 100);
        arb.on_lane_b_ready(120);
        let signals = arb.on_user_barge_in();
        assert!(signals.contains(&ArbitratorSignal::StopLaneB));
        assert_eq!(arb.state(), ArbitratorState::Listening);
    }

    #[test]
    fn reset_response_in_progress_collapses_b_responding() {
        let mut arb = Arbitrator::new();
        arb.start_session();
        arb.on_user_speech_ended(false, 100);
        assert_eq!(arb.state(), ArbitratorState::BResponding);
        arb.reset_response_in_progress();
        assert_eq!(arb.state(), ArbitratorState::Listening);
        assert!(!arb.response_in_progress());
    }

    #[test]
    fn end_session_from_fallback_stops_it() {
        let mut arb = Arbitrator::new();
        arb.start_session();
        arb.on_user_speech_ended(false, 100);
        arb.on_policy_cancel();
        let signals = arb.end_session();
        assert!(signals.contains(&ArbitratorSignal::StopFallback));
        assert_eq!(arb.state(), ArbitratorState::Ended);
    }
}
