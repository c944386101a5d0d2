//! Fallback lane: a safe pre-approved utterance played when the policy
//! gate pipeline cancels an in-flight assistant response.

use crate::audio::AudioChunk;

use super::LaneProducer;

/// Plays a fixed safe-fallback clip, e.g. "I'm not able to help with that
/// right now.".
pub struct FallbackPlayer {
    label: String,
    clip: Vec<AudioChunk>,
}

impl FallbackPlayer {
    #[must_use]
    pub fn new(label: impl Into<String>, clip: Vec<AudioChunk>) -> Self {
        Self {
            label: label.into(),
            clip,
        }
    }
}

impl LaneProducer for FallbackPlayer {
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
        let player = FallbackPlayer::new("safe_fallback", vec![AudioChunk::new(vec![5, 6])]);
        assert_eq!(player.chunks().len(), 1);
        assert_eq!(player.label(), "safe_fallback");
    }
}
