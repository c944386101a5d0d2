//! Cancellable, generation-counted timers for the lane arbitrator.
//!
//! The arbitrator itself never blocks on I/O (per the concurrency model), so
//! timers are armed by spawning a background sleep that reports back through
//! a channel the session loop already selects on, rather than calling back
//! into the arbitrator directly from the timer task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::runtime::TaskSpawner;

/// Which of the arbitrator's timers fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Reflex-arming timer, armed by `onUserSpeechEnded`.
    ReflexArm,
    /// Reflex-timeout timer, armed once the reflex lane starts playing.
    ReflexTimeout,
    /// Gap between stopping the reflex lane and starting Lane B playback.
    TransitionGap,
}

/// A timer-fired notification delivered to the session loop.
#[derive(Debug, Clone, Copy)]
pub struct TimerFired {
    pub kind: TimerKind,
    generation: u64,
}

/// Arms and cancels the arbitrator's three timers.
///
/// Each timer kind has its own generation counter. Cancelling a timer simply
/// bumps its counter, which makes any outstanding sleep's eventual send a
/// no-op once it wakes, since [`Timers::is_current`] will reject it.
#[derive(Debug, Default)]
pub struct Timers {
    reflex_arm_generation: Arc<AtomicU64>,
    reflex_timeout_generation: Arc<AtomicU64>,
    transition_gap_generation: Arc<AtomicU64>,
}

impl Timers {
    /// Creates a new set of timers, all initially unarmed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, kind: TimerKind) -> &Arc<AtomicU64> {
        match kind {
            TimerKind::ReflexArm => &self.reflex_arm_generation,
            TimerKind::ReflexTimeout => &self.reflex_timeout_generation,
            TimerKind::TransitionGap => &self.transition_gap_generation,
        }
    }

    /// Arms `kind` to fire after `delay_ms`, sending a [`TimerFired`] on
    /// `sender` if it is not cancelled first.
    pub fn arm(
        &self,
        kind: TimerKind,
        spawner: &dyn TaskSpawner,
        delay_ms: u64,
        sender: UnboundedSender<TimerFired>,
    ) {
        let counter = self.counter(kind).clone();
        let generation = counter.fetch_add(1, Ordering::SeqCst) + 1;
        spawner.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if counter.load(Ordering::SeqCst) == generation {
                let _ = sender.send(TimerFired { kind, generation });
            }
        });
    }

    /// Cancels the reflex-arming and reflex-timeout timers.
    ///
    /// Per the concurrency model, policy cancellation, barge-in, session
    /// end, and Lane-B-ready must all cancel both reflex timers.
    pub fn cancel_reflex_timers(&self) {
        self.reflex_arm_generation.fetch_add(1, Ordering::SeqCst);
        self.reflex_timeout_generation
            .fetch_add(1, Ordering::SeqCst);
    }

    /// Cancels the transition-gap timer.
    pub fn cancel_transition_gap(&self) {
        self.transition_gap_generation
            .fetch_add(1, Ordering::SeqCst);
    }

    /// Cancels every timer. Used on session end.
    pub fn cancel_all(&self) {
        self.cancel_reflex_timers();
        self.cancel_transition_gap();
    }

    /// Returns whether `fired` still corresponds to the live generation of
    /// its timer kind, i.e. it was not cancelled after being armed.
    #[must_use]
    pub fn is_current(&self, fired: TimerFired) -> bool {
        self.counter(fired.kind).load(Ordering::SeqCst) == fired.generation
    }
}
