//! Lane producers: pre-approved canned audio played by the reflex and
//! fallback lanes. Lane B (reasoning) is the [`crate::reasoning::ReasoningAdapter`]
//! itself and has no producer here.

pub mod fallback;
pub mod reflex;

use crate::audio::AudioChunk;

/// A source of pre-approved audio chunks for a preemptible lane.
pub trait LaneProducer: Send + Sync {
    /// Returns the chunks that make up this lane's utterance, in playback
    /// order. Producers hold fixed, pre-approved clips; nothing here is
    /// generated per-request.
    fn chunks(&self) -> Vec<AudioChunk>;

    /// A human-readable label for logging/audit.
    fn label(&self) -> &str;
}
