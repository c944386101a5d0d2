//! End-to-end scenarios driven through a real `SessionLoop`, wiring the
//! arbitrator, admission gate, and policy pipeline together the way
//! `voice-server`'s WebSocket handler does, but against
//! `ScriptedReasoningAdapter` instead of a socket.

use std::sync::Arc;

use voice_core::events::emitter::NoopEventEmitter;
use voice_core::lanes::fallback::FallbackPlayer;
use voice_core::lanes::reflex::ReflexEngine;
use voice_core::policy::claims::{ClaimsChecker, ClaimsRegistry};
use voice_core::policy::disclaimers::DisclaimerCatalog;
use voice_core::policy::moderation::Moderator;
use voice_core::policy::pii::{PiiMode, PiiRedactor};
use voice_core::protocol::{ClientMessage, ServerMessage, WireVoiceMode};
use voice_core::reasoning::{ReasoningEvent, ScriptedReasoningAdapter};
use voice_core::retrieval::facts::FactsCatalog;
use voice_core::runtime::TokioSpawner;
use voice_core::session::session_loop::SharedResources;
use voice_core::{Config, OverrideController, PolicyGate, RetrievalService, Session, SessionLoop};

const SAMPLE_FACTS: &str = "\
{\"id\":\"NXTG-001\",\"text\":\"NextGen AI median response latency is 420 milliseconds\",\"source\":\"bench\",\"timestamp\":\"2026-02-01\",\"category\":\"performance\"}\n\
{\"id\":\"NXTG-002\",\"text\":\"NextGen AI supports twelve spoken languages\",\"source\":\"launch\",\"timestamp\":\"2026-01-01\"}\n";

fn shared_resources(moderator: Moderator, claims: ClaimsRegistry) -> Arc<SharedResources> {
    let facts = FactsCatalog::from_jsonl(SAMPLE_FACTS).unwrap();
    let disclaimers = DisclaimerCatalog::empty();
    let policy = Arc::new(PolicyGate::new(
        PiiRedactor::new(PiiMode::Redact),
        moderator,
        ClaimsChecker::new(claims),
    ));
    Arc::new(SharedResources {
        policy,
        override_controller: OverrideController::new(4),
        retrieval: Arc::new(RetrievalService::new(facts, disclaimers.clone())),
        disclaimers: Arc::new(disclaimers),
        config: Arc::new(Config::default()),
        emitter: Arc::new(NoopEventEmitter),
        spawner: Arc::new(TokioSpawner::current()),
    })
}

/// 3,000 loud PCM16 samples: ~125ms of audio at 24kHz, comfortably above
/// both the admission gate's RMS floor and the adapter's minimum buffered
/// duration for a committable turn.
fn loud_chunk_base64() -> String {
    use base64::Engine;
    let mut data = Vec::new();
    for _ in 0..3_000 {
        data.extend_from_slice(&10_000i16.to_le_bytes());
    }
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// A full happy-path turn: start, admitted audio, commit, streamed
/// assistant transcript, clean completion.
#[tokio::test]
async fn full_turn_streams_transcript_and_completes() {
    let shared = shared_resources(
        Moderator::new(voice_core::policy::moderation::ModerationMode::FlatPatterns(vec![])),
        ClaimsRegistry::empty(),
    );
    let (timer_tx, _timer_rx) = tokio::sync::mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<ReasoningEvent>();
    let reasoning = Arc::new(ScriptedReasoningAdapter::new(event_tx));

    let mut session_loop = SessionLoop::new(
        Session::new("scenario-1"),
        reasoning.clone(),
        Arc::new(ReflexEngine::new("filler", vec![])),
        Arc::new(FallbackPlayer::new("fallback", vec![])),
        shared,
        timer_tx,
    );

    let start_out = session_loop
        .handle_client_message(ClientMessage::SessionStart {
            fingerprint: None,
            user_agent: None,
            voice_mode: Some(WireVoiceMode::PushToTalk),
        })
        .await;
    assert!(matches!(start_out[0], ServerMessage::SessionReady { .. }));
    assert!(reasoning.is_connected());

    let chunk_out = session_loop
        .handle_client_message(ClientMessage::AudioChunk {
            data: loud_chunk_base64(),
            format: None,
            sample_rate: None,
        })
        .await;
    assert!(chunk_out.is_empty());

    let commit_out = session_loop.handle_client_message(ClientMessage::AudioCommit).await;
    assert!(commit_out.is_empty(), "buffered audio should commit cleanly");

    let response_start = event_rx.recv().await.expect("response.start event");
    assert!(matches!(response_start, ReasoningEvent::ResponseStart));
    let out = session_loop.handle_reasoning_event(response_start);
    assert!(matches!(out[0], ServerMessage::ResponseStart));

    let first_audio = session_loop.handle_reasoning_event(ReasoningEvent::FirstAudioReady { ttfb_ms: 180 });
    assert!(first_audio.iter().any(|m| matches!(m, ServerMessage::LaneStateChanged { to, .. } if to == "BPlaying")));

    let transcript_out = session_loop.handle_reasoning_event(ReasoningEvent::Transcript {
        delta: None,
        final_text: Some("NextGen AI is ready to help.".to_string()),
    });
    assert!(matches!(
        transcript_out[0],
        ServerMessage::Transcript { ref text, is_final: true, .. } if text == "NextGen AI is ready to help."
    ));

    let end_out = session_loop.handle_reasoning_event(ReasoningEvent::ResponseEnd { ttfb_ms: Some(180) });
    assert!(end_out.iter().any(|m| matches!(m, ServerMessage::LaneStateChanged { to, .. } if to == "Listening")));
    assert!(end_out.iter().any(|m| matches!(m, ServerMessage::ResponseEnd { .. })));
}

/// S5 driven end to end: a self-harm utterance during Lane B playback
/// escalates through the policy gate, gets upgraded to `cancel_output` by
/// the override controller, and the arbitrator falls back.
#[tokio::test]
async fn self_harm_transcript_triggers_fallback_end_to_end() {
    use voice_core::policy::moderation::{ModerationCategory, ModerationMode};
    use regex::Regex;

    let moderator = Moderator::new(ModerationMode::Categorized(vec![ModerationCategory {
        name: "SELF_HARM".to_string(),
        patterns: vec![Regex::new(r"(?i)hurt myself").unwrap()],
        severity: 4,
        decision: voice_core::Decision::Escalate,
    }]));
    let shared = shared_resources(moderator, ClaimsRegistry::empty());

    let (timer_tx, _timer_rx) = tokio::sync::mpsc::unbounded_channel();
    let (event_tx, _event_rx) = tokio::sync::mpsc::unbounded_channel::<ReasoningEvent>();
    let reasoning = Arc::new(ScriptedReasoningAdapter::new(event_tx));

    let mut session_loop = SessionLoop::new(
        Session::new("scenario-2"),
        reasoning,
        Arc::new(ReflexEngine::new("filler", vec![])),
        Arc::new(FallbackPlayer::new("fallback", vec![])),
        shared,
        timer_tx,
    );

    session_loop
        .handle_client_message(ClientMessage::SessionStart {
            fingerprint: None,
            user_agent: None,
            voice_mode: None,
        })
        .await;
    session_loop.handle_client_message(ClientMessage::AudioCommit).await;
    session_loop.handle_reasoning_event(ReasoningEvent::FirstAudioReady { ttfb_ms: 120 });

    let out = session_loop.handle_reasoning_event(ReasoningEvent::Transcript {
        delta: None,
        final_text: Some("I want to hurt myself".to_string()),
    });

    assert!(out
        .iter()
        .any(|m| matches!(m, ServerMessage::LaneStateChanged { to, .. } if to == "FallbackPlaying")));
    assert!(out
        .iter()
        .any(|m| matches!(m, ServerMessage::LaneOwnerChanged { to, .. } if to == "Fallback")));

    let fallback_out = session_loop
        .handle_client_message(ClientMessage::PlaybackEnded)
        .await;
    assert!(fallback_out
        .iter()
        .any(|m| matches!(m, ServerMessage::LaneStateChanged { to, .. } if to == "Listening")));
}

/// S6, driven through the session loop's own RAG instructions builder
/// rather than calling the retrieval service directly.
#[tokio::test]
async fn response_instructions_embed_capped_facts_pack() {
    let shared = shared_resources(
        Moderator::new(voice_core::policy::moderation::ModerationMode::FlatPatterns(vec![])),
        ClaimsRegistry::empty(),
    );
    let (timer_tx, _timer_rx) = tokio::sync::mpsc::unbounded_channel();
    let (event_tx, _event_rx) = tokio::sync::mpsc::unbounded_channel::<ReasoningEvent>();
    let reasoning = Arc::new(ScriptedReasoningAdapter::new(event_tx));

    let mut session_loop = SessionLoop::new(
        Session::new("scenario-3"),
        reasoning,
        Arc::new(ReflexEngine::new("filler", vec![])),
        Arc::new(FallbackPlayer::new("fallback", vec![])),
        shared,
        timer_tx,
    );

    session_loop
        .handle_client_message(ClientMessage::SessionStart {
            fingerprint: None,
            user_agent: None,
            voice_mode: None,
        })
        .await;
    session_loop.handle_reasoning_event(ReasoningEvent::UserTranscript {
        text: "what is your latency".to_string(),
    });

    let instructions = session_loop.build_response_instructions();
    assert!(instructions.starts_with("For questions about NextGen AI"));
    assert!(instructions.contains("FACTS_PACK="));
}

/// Session end is idempotent and stops a fallback clip in progress.
#[tokio::test]
async fn session_end_from_fallback_is_idempotent() {
    let moderator = Moderator::new(voice_core::policy::moderation::ModerationMode::FlatPatterns(vec![]));
    let shared = shared_resources(moderator, ClaimsRegistry::empty());
    let (timer_tx, _timer_rx) = tokio::sync::mpsc::unbounded_channel();
    let (event_tx, _event_rx) = tokio::sync::mpsc::unbounded_channel::<ReasoningEvent>();
    let reasoning = Arc::new(ScriptedReasoningAdapter::new(event_tx));

    let mut session_loop = SessionLoop::new(
        Session::new("scenario-4"),
        reasoning,
        Arc::new(ReflexEngine::new("filler", vec![])),
        Arc::new(FallbackPlayer::new("fallback", vec![])),
        shared,
        timer_tx,
    );

    session_loop
        .handle_client_message(ClientMessage::SessionStart {
            fingerprint: None,
            user_agent: None,
            voice_mode: None,
        })
        .await;

    let first_end = session_loop.handle_client_message(ClientMessage::SessionEnd).await;
    let second_end = session_loop.handle_client_message(ClientMessage::SessionEnd).await;
    assert!(second_end.is_empty(), "ending an already-ended session is a no-op");
    assert!(!first_end.is_empty());
}
