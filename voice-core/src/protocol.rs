//! Client <-> server wire message taxonomy.
//!
//! Transport-agnostic: the server crate is responsible for framing these
//! over WebSocket text frames as JSON.

use serde::{Deserialize, Serialize};

use crate::reasoning::VoiceMode;

/// Messages a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename = "session.start")]
    SessionStart {
        fingerprint: Option<String>,
        #[serde(rename = "userAgent")]
        user_agent: Option<String>,
        #[serde(rename = "voiceMode")]
        voice_mode: Option<WireVoiceMode>,
    },
    #[serde(rename = "session.set_mode")]
    SessionSetMode {
        #[serde(rename = "voiceMode")]
        voice_mode: WireVoiceMode,
    },
    #[serde(rename = "audio.chunk")]
    AudioChunk {
        data: String,
        format: Option<String>,
        #[serde(rename = "sampleRate")]
        sample_rate: Option<u32>,
    },
    #[serde(rename = "audio.stop")]
    AudioStop,
    #[serde(rename = "audio.cancel")]
    AudioCancel,
    #[serde(rename = "audio.commit")]
    AudioCommit,
    #[serde(rename = "playback.ended")]
    PlaybackEnded,
    #[serde(rename = "user.barge_in")]
    UserBargeIn,
    #[serde(rename = "session.end")]
    SessionEnd,
}

/// Wire representation of [`VoiceMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireVoiceMode {
    PushToTalk,
    OpenMic,
}

impl From<WireVoiceMode> for VoiceMode {
    fn from(mode: WireVoiceMode) -> Self {
        match mode {
            WireVoiceMode::PushToTalk => VoiceMode::PushToTalk,
            WireVoiceMode::OpenMic => VoiceMode::OpenMic,
        }
    }
}

impl From<VoiceMode> for WireVoiceMode {
    fn from(mode: VoiceMode) -> Self {
        match mode {
            VoiceMode::PushToTalk => WireVoiceMode::PushToTalk,
            VoiceMode::OpenMic => WireVoiceMode::OpenMic,
        }
    }
}

/// Which lane produced an outgoing `audio.chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneTag {
    Reflex,
    LaneB,
    Fallback,
}

/// Messages the server may send.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename = "session.ready")]
    SessionReady { #[serde(rename = "sessionId")] session_id: String },
    #[serde(rename = "provider.ready")]
    ProviderReady {
        #[serde(rename = "isReturningUser")]
        is_returning_user: bool,
        #[serde(rename = "previousSessionCount")]
        previous_session_count: u32,
        #[serde(rename = "voiceMode")]
        voice_mode: WireVoiceMode,
    },
    #[serde(rename = "lane.state_changed")]
    LaneStateChanged { from: String, to: String, cause: String },
    #[serde(rename = "lane.owner_changed")]
    LaneOwnerChanged { from: String, to: String, cause: String },
    #[serde(rename = "audio.chunk")]
    AudioChunk {
        data: String,
        format: String,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
        lane: LaneTag,
    },
    #[serde(rename = "transcript")]
    Transcript {
        text: String,
        confidence: f64,
        #[serde(rename = "isFinal")]
        is_final: bool,
        timestamp: u64,
    },
    #[serde(rename = "user_transcript")]
    UserTranscript {
        text: String,
        confidence: f64,
        #[serde(rename = "isFinal")]
        is_final: bool,
        timestamp: u64,
    },
    #[serde(rename = "speech.started")]
    SpeechStarted,
    #[serde(rename = "speech.stopped")]
    SpeechStopped,
    #[serde(rename = "response.start")]
    ResponseStart,
    #[serde(rename = "response.end")]
    ResponseEnd { #[serde(rename = "ttfbMs")] ttfb_ms: Option<u64> },
    #[serde(rename = "audio.stop.ack")]
    AudioStopAck,
    #[serde(rename = "audio.cancel.ack")]
    AudioCancelAck,
    #[serde(rename = "user.barge_in.ack")]
    UserBargeInAck,
    #[serde(rename = "session.mode_changed")]
    SessionModeChanged { #[serde(rename = "voiceMode")] voice_mode: WireVoiceMode },
    #[serde(rename = "commit.skipped")]
    CommitSkipped { reason: String },
    #[serde(rename = "error")]
    Error { error: String },
}

impl ServerMessage {
    #[must_use]
    pub fn commit_skipped_buffer_too_small() -> Self {
        Self::CommitSkipped {
            reason: "buffer_too_small".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audio_chunk_client_message() {
        let json = r#"{"type":"audio.chunk","data":"AAA=","format":"pcm16","sampleRate":24000}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::AudioChunk { .. }));
    }

    #[test]
    fn unknown_type_fails_to_parse_as_a_specific_variant() {
        let json = r#"{"type":"nonsense.message"}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn serializes_commit_skipped_with_reason() {
        let msg = ServerMessage::commit_skipped_buffer_too_small();
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"reason\":\"buffer_too_small\""));
    }
}
