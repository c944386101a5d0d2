//! The session's serialized control path: dispatches client messages and
//! reasoning-adapter events to the arbitrator, admission gate, and policy
//! pipeline, and turns their outputs into outbound wire messages.
//!
//! All methods here run on the session's single task; nothing in this
//! module may be called concurrently for the same session.

use std::sync::Arc;

use base64::Engine;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::admission::{AdmissionDecision, AdmissionGate, DropReason};
use crate::arbitrator::timers::{TimerFired, TimerKind, Timers};
use crate::arbitrator::{Arbitrator, ArbitratorSignal, ArbitratorState, Owner};
use crate::audio::AudioChunk;
use crate::config::Config;
use crate::events::emitter::EventEmitter;
use crate::events::{ArbitratorEvent, BroadcastEvent, Event, EventSource, PolicyEvent};
use crate::lanes::LaneProducer;
use crate::policy::disclaimers::DisclaimerCatalog;
use crate::policy::pii::PiiMode;
use crate::policy::{Decision, OverrideController, PolicyGate, PolicyInput, Role};
use crate::protocol::{ClientMessage, LaneTag, ServerMessage, WireVoiceMode};
use crate::reasoning::{ReasoningAdapter, ReasoningEvent, ResponseInstructionsProvider};
use crate::retrieval::{build_instructions, FactsPackCaps, RetrievalService};
use crate::runtime::TaskSpawner;
use crate::utils::now_millis;

use super::Session;

fn arbitrator_state_label(state: ArbitratorState) -> String {
    format!("{state:?}")
}

fn owner_label(owner: Owner) -> String {
    format!("{owner:?}")
}

fn lane_for_owner(owner: Owner) -> Option<LaneTag> {
    match owner {
        Owner::Reflex => Some(LaneTag::Reflex),
        Owner::LaneB => Some(LaneTag::LaneB),
        Owner::Fallback => Some(LaneTag::Fallback),
        Owner::None => None,
    }
}

fn encode_chunk(chunk: &AudioChunk, lane: LaneTag) -> ServerMessage {
    ServerMessage::AudioChunk {
        data: base64::engine::general_purpose::STANDARD.encode(&chunk.data),
        format: "pcm16".to_string(),
        sample_rate: 24_000,
        lane,
    }
}

/// Everything a session needs that is shared read-only across sessions.
pub struct SharedResources {
    pub policy: Arc<PolicyGate>,
    pub override_controller: OverrideController,
    pub retrieval: Arc<RetrievalService>,
    pub disclaimers: Arc<DisclaimerCatalog>,
    pub config: Arc<Config>,
    pub emitter: Arc<dyn EventEmitter>,
    pub spawner: Arc<dyn TaskSpawner>,
}

/// The per-session orchestrator. Owns everything private to one session:
/// the arbitrator, admission gate, timers, reasoning adapter handle, and
/// lane producers.
pub struct SessionLoop {
    pub session: Session,
    arbitrator: Arbitrator,
    admission: AdmissionGate,
    timers: Timers,
    reasoning: Arc<dyn ReasoningAdapter>,
    reflex: Arc<dyn LaneProducer>,
    fallback: Arc<dyn LaneProducer>,
    shared: Arc<SharedResources>,
    timer_sender: UnboundedSender<TimerFired>,
    accumulated_user_transcript: String,
    /// Disclaimer ids owed on the next final assistant transcript, fed both
    /// by the policy gate's `required_disclaimer_id` and by the facts pack
    /// the response context builder assembles. Shared with the installed
    /// [`ResponseInstructionsProvider`], which runs from the reasoning
    /// adapter's commit path rather than this loop's own call stack.
    pending_disclaimer_ids: Arc<Mutex<Vec<String>>>,
}

/// Builds the RAG instructions string for a commit confirmation: redacts
/// PII from the transcript when configured, queries retrieval, emits the
/// `rag`/`tool` event quartet with citations, and queues the pack's
/// disclaimers for the next final assistant transcript.
fn run_response_context_builder(
    shared: &SharedResources,
    session_id: &str,
    transcript: &str,
    pending_disclaimer_ids: &Mutex<Vec<String>>,
) -> String {
    let query = if shared.policy.pii.mode() == PiiMode::Redact {
        shared.policy.pii.redact_text(transcript).0
    } else {
        transcript.to_string()
    };

    shared.emitter.emit(BroadcastEvent::Raw(Event::new(
        session_id,
        EventSource::Retrieval,
        "rag.query",
        serde_json::json!({"query": query}),
    )));
    shared.emitter.emit(BroadcastEvent::Raw(Event::new(
        session_id,
        EventSource::Retrieval,
        "tool.call",
        serde_json::json!({"tool": "retrieve_facts_pack"}),
    )));

    let caps = FactsPackCaps {
        top_k: shared.config.retrieval_top_k,
        max_tokens: shared.config.retrieval_max_tokens,
        max_bytes: shared.config.retrieval_max_bytes,
    };
    let pack = shared.retrieval.retrieve_facts_pack(&query, caps);
    let citations: Vec<String> = pack.facts.iter().map(|f| f.id.clone()).collect();

    shared.emitter.emit(BroadcastEvent::Raw(Event::new(
        session_id,
        EventSource::Retrieval,
        "tool.result",
        serde_json::json!({"fact_count": pack.facts.len()}),
    )));
    shared.emitter.emit(BroadcastEvent::Raw(Event::new(
        session_id,
        EventSource::Retrieval,
        "rag.result",
        serde_json::json!({"topic": pack.topic, "citations": citations}),
    )));

    if !pack.disclaimers.is_empty() {
        let mut pending = pending_disclaimer_ids.lock();
        for id in &pack.disclaimers {
            if !pending.contains(id) {
                pending.push(id.clone());
            }
        }
    }

    build_instructions(&pack)
}

/// Installed on the reasoning adapter at session start so the facts pack
/// actually reaches the commit path, rather than only being exercised by
/// callers that invoke [`SessionLoop::build_response_instructions`] directly.
struct SessionResponseInstructionsProvider {
    shared: Arc<SharedResources>,
    session_id: String,
    pending_disclaimer_ids: Arc<Mutex<Vec<String>>>,
}

impl ResponseInstructionsProvider for SessionResponseInstructionsProvider {
    fn build(&self, transcript: &str) -> Option<String> {
        Some(run_response_context_builder(
            &self.shared,
            &self.session_id,
            transcript,
            &self.pending_disclaimer_ids,
        ))
    }
}

impl SessionLoop {
    #[must_use]
    pub fn new(
        session: Session,
        reasoning: Arc<dyn ReasoningAdapter>,
        reflex: Arc<dyn LaneProducer>,
        fallback: Arc<dyn LaneProducer>,
        shared: Arc<SharedResources>,
        timer_sender: UnboundedSender<TimerFired>,
    ) -> Self {
        Self {
            session,
            arbitrator: Arbitrator::new(),
            admission: AdmissionGate::new(),
            timers: Timers::new(),
            reasoning,
            reflex,
            fallback,
            shared,
            timer_sender,
            accumulated_user_transcript: String::new(),
            pending_disclaimer_ids: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Dispatches one inbound client message, returning the outbound
    /// messages it produced.
    pub async fn handle_client_message(&mut self, message: ClientMessage) -> Vec<ServerMessage> {
        self.session.touch();
        match message {
            ClientMessage::SessionStart { voice_mode, .. } => self.on_session_start(voice_mode).await,
            ClientMessage::SessionSetMode { voice_mode } => {
                self.reasoning.set_voice_mode(voice_mode.into());
                vec![ServerMessage::SessionModeChanged { voice_mode }]
            }
            ClientMessage::AudioChunk { data, .. } => self.on_audio_chunk(&data).await,
            ClientMessage::AudioStop => {
                self.on_stop_or_cancel().await;
                vec![ServerMessage::AudioStopAck]
            }
            ClientMessage::AudioCancel => {
                self.on_stop_or_cancel().await;
                vec![ServerMessage::AudioCancelAck]
            }
            ClientMessage::AudioCommit => self.on_audio_commit().await,
            ClientMessage::PlaybackEnded => {
                self.admission.on_playback_ended();
                if self.arbitrator.state() == ArbitratorState::FallbackPlaying {
                    let signals = self.arbitrator.on_fallback_complete();
                    return self.apply_signals(signals);
                }
                Vec::new()
            }
            ClientMessage::UserBargeIn => {
                self.admission.unlatch();
                let signals = self.arbitrator.on_user_barge_in();
                let mut out = self.apply_signals(signals);
                out.push(ServerMessage::UserBargeInAck);
                out
            }
            ClientMessage::SessionEnd => self.on_session_end().await,
        }
    }

    async fn on_session_start(&mut self, voice_mode: Option<crate::protocol::WireVoiceMode>) -> Vec<ServerMessage> {
        self.admission.unlatch();
        if let Some(mode) = voice_mode {
            self.reasoning.set_voice_mode(mode.into());
        }
        let _ = self.reasoning.connect(&self.session.id).await;
        self.reasoning.set_response_instructions_provider(Arc::new(SessionResponseInstructionsProvider {
            shared: self.shared.clone(),
            session_id: self.session.id.clone(),
            pending_disclaimer_ids: self.pending_disclaimer_ids.clone(),
        }));
        let signals = self.arbitrator.start_session();
        let mut out = vec![ServerMessage::SessionReady {
            session_id: self.session.id.clone(),
        }];
        out.extend(self.apply_signals(signals));
        out.push(ServerMessage::ProviderReady {
            is_returning_user: false,
            previous_session_count: 0,
            voice_mode: voice_mode.unwrap_or(WireVoiceMode::OpenMic),
        });
        out
    }

    async fn on_audio_chunk(&mut self, base64_data: &str) -> Vec<ServerMessage> {
        let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(base64_data) else {
            return vec![ServerMessage::Error {
                error: "invalid base64 audio chunk".to_string(),
            }];
        };
        let chunk = AudioChunk::new(bytes);
        let decision = self.admission.check(
            &chunk,
            self.arbitrator.state(),
            self.reasoning.is_connected(),
            self.shared.config.cooldown_ms,
            self.shared.config.min_rms,
        );
        match decision {
            AdmissionDecision::Forward => {
                self.reasoning.send_audio(chunk).await;
                self.session.touch();
            }
            AdmissionDecision::Drop(reason) => {
                self.shared.emitter.emit(BroadcastEvent::Raw(crate::events::Event::new(
                    self.session.id.clone(),
                    crate::events::EventSource::AdmissionGate,
                    "chunk_dropped",
                    serde_json::json!({"reason": drop_reason_label(reason)}),
                )));
            }
        }
        Vec::new()
    }

    async fn on_stop_or_cancel(&mut self) {
        self.admission.latch();
        self.reasoning.clear_input_buffer().await;
        if self.reasoning.is_responding() {
            self.reasoning.cancel().await;
        }
        if matches!(
            self.arbitrator.state(),
            ArbitratorState::BResponding | ArbitratorState::BPlaying
        ) {
            self.arbitrator.reset_response_in_progress();
        }
    }

    async fn on_audio_commit(&mut self) -> Vec<ServerMessage> {
        self.admission.latch();
        if self.arbitrator.state() == ArbitratorState::Listening {
            let signals = self.arbitrator.on_user_speech_ended(
                self.shared.config.lane_a_enabled,
                self.shared.config.min_delay_before_reflex_ms,
            );
            let _ = self.apply_signals(signals);
        }
        let committed = self.reasoning.commit_audio().await;
        if committed {
            Vec::new()
        } else {
            self.arbitrator.reset_response_in_progress();
            self.admission.unlatch();
            vec![ServerMessage::commit_skipped_buffer_too_small()]
        }
    }

    async fn on_session_end(&mut self) -> Vec<ServerMessage> {
        self.timers.cancel_all();
        let signals = self.arbitrator.end_session();
        self.reasoning.disconnect().await;
        self.apply_signals(signals)
    }

    /// Reacts to the reflex/reasoning/fallback-timer firing. Stale timers
    /// (cancelled after arming) are ignored.
    pub fn handle_timer_fired(&mut self, fired: TimerFired) -> Vec<ServerMessage> {
        if !self.timers.is_current(fired) {
            return Vec::new();
        }
        let signals = match fired.kind {
            TimerKind::ReflexArm => self.arbitrator.on_reflex_armed(self.shared.config.max_reflex_duration_ms),
            TimerKind::ReflexTimeout => self.arbitrator.on_reflex_timeout(),
            TimerKind::TransitionGap => self.arbitrator.on_transition_gap_elapsed(),
        };
        self.apply_signals(signals)
    }

    /// Reacts to an event surfaced by the reasoning adapter.
    pub fn handle_reasoning_event(&mut self, event: ReasoningEvent) -> Vec<ServerMessage> {
        match event {
            ReasoningEvent::SpeechStarted => vec![ServerMessage::SpeechStarted],
            ReasoningEvent::SpeechStopped => vec![ServerMessage::SpeechStopped],
            ReasoningEvent::ResponseStart => {
                let signals = Vec::new();
                let mut out = self.apply_signals(signals);
                out.push(ServerMessage::ResponseStart);
                out
            }
            ReasoningEvent::FirstAudioReady { ttfb_ms } => {
                let signals = self
                    .arbitrator
                    .on_lane_b_ready(self.shared.config.transition_gap_ms);
                self.shared.emitter.emit(BroadcastEvent::Raw(crate::events::Event::new(
                    self.session.id.clone(),
                    crate::events::EventSource::Reasoning,
                    "first_audio_ready",
                    serde_json::json!({"ttfbMs": ttfb_ms}),
                )));
                self.apply_signals(signals)
            }
            ReasoningEvent::ResponseEnd { ttfb_ms } => {
                let signals = self.arbitrator.on_lane_b_done();
                let mut out = self.apply_signals(signals);
                out.push(ServerMessage::ResponseEnd { ttfb_ms });
                out
            }
            ReasoningEvent::Audio { chunk } => {
                let lane = lane_for_owner(self.arbitrator.owner()).unwrap_or(LaneTag::LaneB);
                vec![encode_chunk(&chunk, lane)]
            }
            ReasoningEvent::Transcript { delta, final_text } => {
                self.handle_assistant_transcript(delta, final_text)
            }
            ReasoningEvent::UserTranscript { text } => {
                self.accumulated_user_transcript.push_str(&text);
                self.accumulated_user_transcript.push(' ');
                self.reasoning
                    .set_conversation_context(self.accumulated_user_transcript.clone());
                let outcome = self.shared.policy.run(&PolicyInput {
                    text: &text,
                    role: Role::User,
                    metadata: None,
                });
                let display_text = outcome.safe_rewrite.unwrap_or(text);
                vec![ServerMessage::UserTranscript {
                    text: display_text,
                    confidence: 1.0,
                    is_final: true,
                    timestamp: now_millis(),
                }]
            }
            ReasoningEvent::Error { message } => vec![ServerMessage::Error { error: message }],
        }
    }

    fn handle_assistant_transcript(
        &mut self,
        delta: Option<String>,
        final_text: Option<String>,
    ) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        if let Some(delta) = delta {
            out.push(ServerMessage::Transcript {
                text: delta,
                confidence: 1.0,
                is_final: false,
                timestamp: now_millis(),
            });
        }
        if let Some(text) = final_text {
            let outcome = self.shared.policy.run(&PolicyInput {
                text: &text,
                role: Role::Assistant,
                metadata: None,
            });
            let (outcome, overridden) = self.shared.override_controller.apply(outcome);
            if overridden {
                self.shared.emitter.emit(BroadcastEvent::Policy(PolicyEvent::Override {
                    from: "refuse_or_escalate".to_string(),
                    to: "cancel_output".to_string(),
                }));
            }
            self.shared.emitter.emit(BroadcastEvent::Policy(PolicyEvent::Decision {
                decision: format!("{:?}", outcome.decision),
                reason_codes: outcome.reason_codes.clone(),
                severity: outcome.severity,
            }));

            if outcome.decision == Decision::CancelOutput {
                let signals = self.arbitrator.on_policy_cancel();
                out.extend(self.apply_signals(signals));
                return out;
            }

            let mut final_text = outcome.safe_rewrite.unwrap_or(text);
            if let Some(disclaimer_id) = outcome.required_disclaimer_id {
                let mut pending = self.pending_disclaimer_ids.lock();
                if !pending.contains(&disclaimer_id) {
                    pending.push(disclaimer_id);
                }
            }
            let owed_disclaimer_ids: Vec<String> = self.pending_disclaimer_ids.lock().drain(..).collect();
            for disclaimer_id in owed_disclaimer_ids {
                if let Some(disclaimer) = self.shared.disclaimers.resolve(&disclaimer_id) {
                    final_text.push(' ');
                    final_text.push_str(&disclaimer.text);
                }
            }
            out.push(ServerMessage::Transcript {
                text: final_text,
                confidence: 1.0,
                is_final: true,
                timestamp: now_millis(),
            });
        }
        out
    }

    /// Builds the RAG instructions string for the accumulated user
    /// transcript so far, running the full response context builder (PII
    /// redaction, retrieval events, disclaimer queuing) rather than just
    /// assembling the instructions string.
    #[must_use]
    pub fn build_response_instructions(&self) -> String {
        run_response_context_builder(
            &self.shared,
            &self.session.id,
            &self.accumulated_user_transcript,
            &self.pending_disclaimer_ids,
        )
    }

    fn apply_signals(&mut self, signals: Vec<ArbitratorSignal>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        for signal in signals {
            match signal {
                ArbitratorSignal::StateChange { from, to } => {
                    self.shared.emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::StateChanged {
                        state: arbitrator_state_label(to),
                    }));
                    out.push(ServerMessage::LaneStateChanged {
                        from: arbitrator_state_label(from),
                        to: arbitrator_state_label(to),
                        cause: "arbitrator".to_string(),
                    });
                }
                ArbitratorSignal::OwnerChange { from, to } => {
                    self.shared.emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::OwnerChanged {
                        owner: owner_label(to),
                    }));
                    out.push(ServerMessage::LaneOwnerChanged {
                        from: owner_label(from),
                        to: owner_label(to),
                        cause: "arbitrator".to_string(),
                    });
                }
                ArbitratorSignal::PlayReflex => {
                    self.shared.emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::PlayReflex));
                    for chunk in self.reflex.chunks() {
                        out.push(encode_chunk(&chunk, LaneTag::Reflex));
                    }
                }
                ArbitratorSignal::StopReflex => {
                    self.timers.cancel_reflex_timers();
                    self.shared.emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::StopReflex));
                }
                ArbitratorSignal::PlayLaneB => {
                    self.shared.emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::PlayLaneB));
                }
                ArbitratorSignal::StopLaneB => {
                    self.shared.emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::StopLaneB));
                }
                ArbitratorSignal::PlayFallback => {
                    self.shared.emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::PlayFallback));
                    for chunk in self.fallback.chunks() {
                        out.push(encode_chunk(&chunk, LaneTag::Fallback));
                    }
                }
                ArbitratorSignal::StopFallback => {
                    self.shared.emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::StopFallback));
                }
                ArbitratorSignal::ResponseComplete => {
                    self.admission.on_response_complete();
                    self.timers.cancel_transition_gap();
                    self.shared.emitter.emit(BroadcastEvent::Arbitrator(ArbitratorEvent::ResponseComplete));
                }
                ArbitratorSignal::ArmReflexTimer { delay_ms } => {
                    self.timers.arm(
                        TimerKind::ReflexArm,
                        self.shared.spawner.as_ref(),
                        delay_ms,
                        self.timer_sender.clone(),
                    );
                }
                ArbitratorSignal::ArmReflexTimeout { delay_ms } => {
                    self.timers.arm(
                        TimerKind::ReflexTimeout,
                        self.shared.spawner.as_ref(),
                        delay_ms,
                        self.timer_sender.clone(),
                    );
                }
                ArbitratorSignal::ArmTransitionGap { delay_ms } => {
                    self.timers.arm(
                        TimerKind::TransitionGap,
                        self.shared.spawner.as_ref(),
                        delay_ms,
                        self.timer_sender.clone(),
                    );
                }
            }
        }
        out
    }
}

fn drop_reason_label(reason: DropReason) -> &'static str {
    match reason {
        DropReason::StopLatch => "stop_latch",
        DropReason::UpstreamNotReady => "upstream_not_ready",
        DropReason::WrongLifecycleState => "wrong_lifecycle_state",
        DropReason::Cooldown => "cooldown",
        DropReason::LowEnergy => "low_energy",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::NoopEventEmitter;
    use crate::lanes::fallback::FallbackPlayer;
    use crate::lanes::reflex::ReflexEngine;
    use crate::policy::claims::{ClaimsChecker, ClaimsRegistry};
    use crate::policy::moderation::{Moderator, ModerationMode};
    use crate::policy::pii::{PiiMode, PiiRedactor};
    use crate::reasoning::NullReasoningAdapter;
    use crate::retrieval::facts::FactsCatalog;
    use crate::runtime::TokioSpawner;

    fn test_shared() -> Arc<SharedResources> {
        let policy = Arc::new(PolicyGate::new(
            PiiRedactor::new(PiiMode::Redact),
            Moderator::new(ModerationMode::FlatPatterns(vec![])),
            ClaimsChecker::new(ClaimsRegistry::empty()),
        ));
        Arc::new(SharedResources {
            policy,
            override_controller: OverrideController::new(4),
            retrieval: Arc::new(RetrievalService::new(FactsCatalog::unready(), DisclaimerCatalog::empty())),
            disclaimers: Arc::new(DisclaimerCatalog::empty()),
            config: Arc::new(Config::default()),
            emitter: Arc::new(NoopEventEmitter),
            spawner: Arc::new(TokioSpawner::current()),
        })
    }

    fn test_loop(shared: Arc<SharedResources>) -> (SessionLoop, tokio::sync::mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let session_loop = SessionLoop::new(
            Session::new("s1"),
            Arc::new(NullReasoningAdapter::new()),
            Arc::new(ReflexEngine::new("filler", vec![])),
            Arc::new(FallbackPlayer::new("fallback", vec![])),
            shared,
            tx,
        );
        (session_loop, rx)
    }

    #[tokio::test]
    async fn session_start_emits_ready_messages() {
        let shared = test_shared();
        let (mut session_loop, _rx) = test_loop(shared);
        let out = session_loop
            .handle_client_message(ClientMessage::SessionStart {
                fingerprint: None,
                user_agent: None,
                voice_mode: None,
            })
            .await;
        assert!(matches!(out[0], ServerMessage::SessionReady { .. }));
    }

    #[tokio::test]
    async fn s4_commit_too_small_notifies_client_and_resets() {
        let shared = test_shared();
        let (mut session_loop, _rx) = test_loop(shared);
        session_loop
            .handle_client_message(ClientMessage::SessionStart {
                fingerprint: None,
                user_agent: None,
                voice_mode: None,
            })
            .await;
        let out = session_loop.handle_client_message(ClientMessage::AudioCommit).await;
        assert!(matches!(out.last(), Some(ServerMessage::CommitSkipped { reason }) if reason == "buffer_too_small"));
        assert!(!session_loop.admission.is_latched());
    }

    #[tokio::test]
    async fn unknown_audio_is_dropped_before_session_start() {
        let shared = test_shared();
        let (mut session_loop, _rx) = test_loop(shared);
        let mut data = Vec::new();
        for _ in 0..100 {
            data.extend_from_slice(&10_000i16.to_le_bytes());
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
        let out = session_loop.handle_client_message(ClientMessage::AudioChunk {
            data: encoded,
            format: None,
            sample_rate: None,
        }).await;
        assert!(out.is_empty());
    }
}
