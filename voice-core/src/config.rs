//! Session-independent tuning knobs for the orchestrator core.
//!
//! [`Config`] holds the values that [`crate::protocol_constants`] documents
//! as tunable. The server layers CLI flags, environment variables, and a
//! YAML file on top of [`Config::default`]; this module only owns
//! validation of the resulting values.

use serde::{Deserialize, Serialize};

use crate::error::{VoiceError, VoiceResult};
use crate::protocol_constants as pc;

/// Tuning knobs for a single orchestrator instance, shared read-only across
/// all sessions it hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether Lane A (reflex) is enabled at all. When `false`,
    /// `onUserSpeechEnded` never arms the reflex timer.
    pub lane_a_enabled: bool,

    /// Cooldown window after the last response/playback end before inbound
    /// audio is admitted, in milliseconds.
    pub cooldown_ms: u64,

    /// Minimum RMS energy for inbound audio to be forwarded upstream.
    pub min_rms: f64,

    /// Delay before the reflex lane is armed after speech ends.
    pub min_delay_before_reflex_ms: u64,

    /// Maximum reflex playback duration before force-stop.
    pub max_reflex_duration_ms: u64,

    /// Gap between stopping the reflex lane and starting Lane B playback.
    pub transition_gap_ms: u64,

    /// Minimum buffered audio duration before a commit is attempted.
    pub min_buffer_duration_ms: u64,

    /// Safety wait since the last audio append before committing upstream.
    pub safety_window_ms: u64,

    /// Word-overlap threshold for a partial claims match.
    pub partial_match_threshold: f64,

    /// Severity at or above which refuse/escalate is upgraded to
    /// cancel_output.
    pub cancel_override_severity: u8,

    /// Idle timeout after which a session becomes eligible for GC.
    pub session_idle_timeout_ms: u64,

    /// Interval between session registry GC sweeps.
    pub session_gc_interval_ms: u64,

    /// Retrieval: number of top-scoring facts to consider before budget
    /// trimming.
    pub retrieval_top_k: usize,

    /// Retrieval: maximum instruction token budget.
    pub retrieval_max_tokens: usize,

    /// Retrieval: maximum instruction byte budget.
    pub retrieval_max_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lane_a_enabled: true,
            cooldown_ms: pc::RESPONSE_COOLDOWN_MS,
            min_rms: pc::MIN_AUDIO_RMS,
            min_delay_before_reflex_ms: pc::MIN_DELAY_BEFORE_REFLEX_MS,
            max_reflex_duration_ms: pc::MAX_REFLEX_DURATION_MS,
            transition_gap_ms: pc::TRANSITION_GAP_MS,
            min_buffer_duration_ms: pc::MIN_BUFFER_DURATION_MS,
            safety_window_ms: pc::SAFETY_WINDOW_MS,
            partial_match_threshold: pc::PARTIAL_MATCH_THRESHOLD,
            cancel_override_severity: pc::CANCEL_OVERRIDE_SEVERITY,
            session_idle_timeout_ms: pc::SESSION_IDLE_TIMEOUT_MS,
            session_gc_interval_ms: pc::SESSION_GC_INTERVAL_MS,
            retrieval_top_k: 5,
            retrieval_max_tokens: 512,
            retrieval_max_bytes: 4_096,
        }
    }
}

impl Config {
    /// Validates that all values fall within documented physical ranges.
    ///
    /// This does not enforce exact defaults, only that operators cannot
    /// configure values that would defeat the safety rationale behind a
    /// constant (e.g. a cooldown shorter than plausible room reverb).
    pub fn validate(&self) -> VoiceResult<()> {
        if self.cooldown_ms < 300 {
            return Err(VoiceError::Configuration(format!(
                "cooldown_ms {} is below the minimum plausible room RT60 of 300ms",
                self.cooldown_ms
            )));
        }
        if !(0.0..=32_768.0).contains(&self.min_rms) {
            return Err(VoiceError::Configuration(format!(
                "min_rms {} is outside the PCM16 amplitude range",
                self.min_rms
            )));
        }
        if self.min_buffer_duration_ms == 0 {
            return Err(VoiceError::Configuration(
                "min_buffer_duration_ms must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.partial_match_threshold) {
            return Err(VoiceError::Configuration(format!(
                "partial_match_threshold {} must be within [0.0, 1.0]",
                self.partial_match_threshold
            )));
        }
        if self.retrieval_top_k == 0 {
            return Err(VoiceError::Configuration(
                "retrieval_top_k must be greater than zero".into(),
            ));
        }
        if self.session_gc_interval_ms == 0 {
            return Err(VoiceError::Configuration(
                "session_gc_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_too_short_cooldown() {
        let mut config = Config::default();
        config.cooldown_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_partial_match_threshold() {
        let mut config = Config::default();
        config.partial_match_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
