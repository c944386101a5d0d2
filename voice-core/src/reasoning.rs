//! Reasoning adapter: the collaborator contract for the upstream provider
//! that actually understands and responds to speech. The core only depends
//! on the [`ReasoningAdapter`] trait; a real provider integration lives
//! outside this crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::AudioChunk;
use crate::error::ReasoningError;
use crate::protocol_constants::{
    MIN_BUFFER_DURATION_MS, RECONNECT_BACKOFF_MS, SAFETY_WINDOW_MS,
};

/// Upstream turn-detection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceMode {
    /// Server VAD disabled; the client explicitly marks end of turn.
    PushToTalk,
    /// Server VAD enabled with a tuned threshold and longer silence window.
    OpenMic,
}

/// Events the adapter surfaces asynchronously, outside of a direct call's
/// return value.
#[derive(Debug, Clone)]
pub enum ReasoningEvent {
    SpeechStarted,
    SpeechStopped,
    ResponseStart,
    ResponseEnd { ttfb_ms: Option<u64> },
    Audio { chunk: Arc<AudioChunk> },
    Transcript { delta: Option<String>, final_text: Option<String> },
    UserTranscript { text: String },
    FirstAudioReady { ttfb_ms: u64 },
    Error { message: String },
}

/// Builds the dynamically-constructed RAG instructions string for a commit
/// confirmation, given the accumulated user transcript so far.
pub trait ResponseInstructionsProvider: Send + Sync {
    fn build(&self, transcript: &str) -> Option<String>;
}

/// The upstream provider contract. All mutating operations are async since
/// they may perform network I/O; state queries are synchronous.
#[async_trait]
pub trait ReasoningAdapter: Send + Sync {
    async fn connect(&self, session_id: &str) -> Result<(), ReasoningError>;
    async fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn is_responding(&self) -> bool;

    /// Appends audio to the upstream input buffer.
    async fn send_audio(&self, chunk: AudioChunk);

    /// The two-phase commit protocol described in the adapter contract.
    /// Returns `false` if the buffered duration was too small to commit.
    async fn commit_audio(&self) -> bool;

    async fn clear_input_buffer(&self);
    async fn cancel(&self);
    fn set_voice_mode(&self, mode: VoiceMode);
    fn set_conversation_context(&self, text: String);
    fn set_response_instructions_provider(&self, provider: Arc<dyn ResponseInstructionsProvider>);
}

/// 24kHz mono PCM16: 2 bytes/sample * 24,000 samples/sec.
const BYTES_PER_SECOND_24KHZ_PCM16: usize = 2 * 24_000;
const MAX_BUFFERED_BYTES: usize = BYTES_PER_SECOND_24KHZ_PCM16 * 5;
const MAX_QUEUE_ENTRIES: usize = 50;

/// Adapter used when no upstream provider is configured. Every call either
/// no-ops or reports `NotConnected`; it never emits events.
#[derive(Debug, Default)]
pub struct NullReasoningAdapter {
    connected: AtomicBool,
}

impl NullReasoningAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReasoningAdapter for NullReasoningAdapter {
    async fn connect(&self, _session_id: &str) -> Result<(), ReasoningError> {
        Err(ReasoningError::NotConnected)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn is_responding(&self) -> bool {
        false
    }

    async fn send_audio(&self, _chunk: AudioChunk) {}

    async fn commit_audio(&self) -> bool {
        false
    }

    async fn clear_input_buffer(&self) {}

    async fn cancel(&self) {}

    fn set_voice_mode(&self, _mode: VoiceMode) {}

    fn set_conversation_context(&self, _text: String) {}

    fn set_response_instructions_provider(&self, _provider: Arc<dyn ResponseInstructionsProvider>) {}
}

#[derive(Default)]
struct ScriptedState {
    connected: bool,
    responding: bool,
    buffered_bytes: usize,
    pending_commit: bool,
    voice_mode: Option<VoiceMode>,
    provider: Option<Arc<dyn ResponseInstructionsProvider>>,
    transcript_so_far: String,
}

/// A scripted test double for the reasoning adapter contract, grounded in
/// the same spirit as a hand-rolled fake client: deterministic, in-memory,
/// with no real network I/O.
pub struct ScriptedReasoningAdapter {
    state: Mutex<ScriptedState>,
    events: UnboundedSender<ReasoningEvent>,
    /// If set, `commit_audio` always reports the buffer as too small.
    pub force_buffer_too_small: AtomicBool,
}

impl ScriptedReasoningAdapter {
    #[must_use]
    pub fn new(events: UnboundedSender<ReasoningEvent>) -> Self {
        Self {
            state: Mutex::new(ScriptedState::default()),
            events,
            force_buffer_too_small: AtomicBool::new(false),
        }
    }

    fn emit(&self, event: ReasoningEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl ReasoningAdapter for ScriptedReasoningAdapter {
    async fn connect(&self, _session_id: &str) -> Result<(), ReasoningError> {
        let mut state = self.state.lock();
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.responding = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn is_responding(&self) -> bool {
        self.state.lock().responding
    }

    async fn send_audio(&self, chunk: AudioChunk) {
        let mut state = self.state.lock();
        state.buffered_bytes += chunk.data.len();
        if state.buffered_bytes > MAX_BUFFERED_BYTES {
            state.buffered_bytes = MAX_BUFFERED_BYTES;
        }
    }

    async fn commit_audio(&self) -> bool {
        let buffered_ms = {
            let state = self.state.lock();
            (state.buffered_bytes * 1000 / BYTES_PER_SECOND_24KHZ_PCM16) as u64
        };
        if self.force_buffer_too_small.load(Ordering::SeqCst)
            || buffered_ms < MIN_BUFFER_DURATION_MS
        {
            let mut state = self.state.lock();
            state.buffered_bytes = 0;
            return false;
        }

        tokio::time::sleep(Duration::from_millis(SAFETY_WINDOW_MS)).await;

        let (already_responding, provider, transcript) = {
            let mut state = self.state.lock();
            state.pending_commit = false;
            let already_responding = state.responding;
            if !already_responding {
                state.responding = true;
            }
            (already_responding, state.provider.clone(), state.transcript_so_far.clone())
        };

        if !already_responding {
            let instructions = provider.and_then(|p| p.build(&transcript));
            self.emit(ReasoningEvent::ResponseStart);
            if let Some(instructions) = instructions {
                tracing::debug!(len = instructions.len(), "built response instructions");
            }
        }

        let mut state = self.state.lock();
        state.buffered_bytes = 0;
        true
    }

    async fn clear_input_buffer(&self) {
        let mut state = self.state.lock();
        state.buffered_bytes = 0;
    }

    async fn cancel(&self) {
        let mut state = self.state.lock();
        state.responding = false;
    }

    fn set_voice_mode(&self, mode: VoiceMode) {
        self.state.lock().voice_mode = Some(mode);
    }

    fn set_conversation_context(&self, text: String) {
        self.state.lock().transcript_so_far = text;
    }

    fn set_response_instructions_provider(&self, provider: Arc<dyn ResponseInstructionsProvider>) {
        self.state.lock().provider = Some(provider);
    }
}

/// Reconnects with exponential backoff and a cap on attempts, per the
/// reconnect contract: never issue a new connect without a session id.
pub async fn reconnect_with_backoff(
    adapter: &dyn ReasoningAdapter,
    session_id: &str,
    max_attempts: usize,
) -> Result<(), ReasoningError> {
    let mut last_err = ReasoningError::NotConnected;
    for attempt in 0..max_attempts {
        match adapter.connect(session_id).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = err;
                let delay_ms = RECONNECT_BACKOFF_MS
                    .get(attempt)
                    .copied()
                    .unwrap_or_else(|| *RECONNECT_BACKOFF_MS.last().unwrap());
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_adapter_never_connects() {
        let adapter = NullReasoningAdapter::new();
        assert!(adapter.connect("s1").await.is_err());
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn scripted_adapter_commits_after_enough_buffer() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let adapter = ScriptedReasoningAdapter::new(tx);
        adapter.connect("s1").await.unwrap();

        // 24kHz * 2 bytes/sample * 0.2s = enough for 200ms buffered.
        let chunk = AudioChunk::new(vec![0u8; BYTES_PER_SECOND_24KHZ_PCM16 / 5]);
        adapter.send_audio(chunk).await;
        assert!(adapter.commit_audio().await);
    }

    #[tokio::test]
    async fn scripted_adapter_rejects_too_small_buffer() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let adapter = ScriptedReasoningAdapter::new(tx);
        adapter.connect("s1").await.unwrap();
        adapter.send_audio(AudioChunk::new(vec![0u8; 10])).await;
        assert!(!adapter.commit_audio().await);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_with_backoff_gives_up_after_max_attempts() {
        let adapter = NullReasoningAdapter::new();
        let result = reconnect_with_backoff(&adapter, "s1", 2).await;
        assert!(result.is_err());
    }
}
