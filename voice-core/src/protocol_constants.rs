//! Tunable constants shared across the arbitrator, admission gate, and
//! reasoning adapter. Values are documented with their physical rationale
//! since several are safety-relevant (echo suppression, claim rewriting).

// --- Admission gate ---------------------------------------------------

/// Minimum time since the last response/playback ended before inbound audio
/// is admitted, in milliseconds. Must exceed typical room reverb (RT60).
pub const RESPONSE_COOLDOWN_MS: u64 = 1_500;

/// Minimum RMS energy (PCM16 amplitude units) for an inbound chunk to be
/// forwarded upstream. Approximately -44 dBFS; between the noise floor and
/// a whisper.
pub const MIN_AUDIO_RMS: f64 = 200.0;

// --- Lane arbitrator timers --------------------------------------------

/// Delay after `onUserSpeechEnded` before the reflex lane is armed, in
/// milliseconds, if Lane B has not yet responded.
pub const MIN_DELAY_BEFORE_REFLEX_MS: u64 = 100;

/// Maximum duration the reflex lane may play before being force-stopped, in
/// milliseconds.
pub const MAX_REFLEX_DURATION_MS: u64 = 3_000;

/// Gap observed between stopping the reflex lane and starting Lane B
/// playback, in milliseconds, to avoid an audible splice.
pub const TRANSITION_GAP_MS: u64 = 120;

// --- Reasoning adapter --------------------------------------------------

/// Minimum buffered audio duration, in milliseconds, before `commitAudio`
/// will attempt an upstream commit.
pub const MIN_BUFFER_DURATION_MS: u64 = 100;

/// Time to wait since the last audio append before issuing the upstream
/// commit, in milliseconds, to avoid truncating trailing speech.
pub const SAFETY_WINDOW_MS: u64 = 50;

/// Reconnect backoff delays, in milliseconds, applied in order with the
/// last value repeated for any further attempt.
pub const RECONNECT_BACKOFF_MS: [u64; 3] = [200, 500, 1_000];

// --- Policy gate pipeline ------------------------------------------------

/// Minimum lowercased word-overlap ratio for a claims candidate to be
/// treated as a partial match against an approved claim.
pub const PARTIAL_MATCH_THRESHOLD: f64 = 0.6;

/// Decision severity at or above which the `OverrideController` upgrades a
/// `refuse`/`escalate` decision to `cancel_output`.
pub const CANCEL_OVERRIDE_SEVERITY: u8 = 4;

// --- Retrieval ------------------------------------------------------------

/// Maximum length, in characters, that a retrieval query topic is trimmed
/// to before being embedded in response instructions.
pub const MAX_TOPIC_CHARS: usize = 120;

/// Default topic used when the query is empty.
pub const DEFAULT_TOPIC: &str = "NextGen AI";

// --- Session lifecycle ----------------------------------------------------

/// How long a session may remain idle (no inbound client traffic) before it
/// becomes eligible for garbage collection, in milliseconds.
pub const SESSION_IDLE_TIMEOUT_MS: u64 = 10 * 60 * 1_000;

/// Interval between session registry GC sweeps, in milliseconds.
pub const SESSION_GC_INTERVAL_MS: u64 = 30 * 1_000;
