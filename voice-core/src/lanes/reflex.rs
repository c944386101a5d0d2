//! Reflex lane (Lane A): a short pre-approved filler utterance played
//! while waiting for Lane B, preemptible at any time.

use crate::audio::AudioChunk;

use super::LaneProducer;

/// Plays a fixed filler clip, e.g. "mm-hmm, let me check on that".
pub struct ReflexEngine {
    label: String,
    clip: Vec<AudioChunk>,
}

impl ReflexEngine {
    #[must_use]
    pub fn new(label: impl Into<String>, clip: Vec<AudioChunk>) -> Self {
        Self {
            label: label.into(),
            clip,
        }
    }
}

impl LaneProducer for ReflexEngine {
    fn chunks(&self) -> Vec<AudioChunk> {
        self.clip.clone()
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_configured_clip() {
        let engine = ReflexEngine::new("filler", vec![AudioChunk::new(vec![1, 2, 3, 4])]);
        assert_eq!(engine.chunks().len(), 1);
        assert_eq!(engine.label(), "filler");
    }
}
