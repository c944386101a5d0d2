//! Voice Core - shared library for the voice interaction orchestrator.
//!
//! This crate implements the server-side logic that sits between a duplex
//! voice client and an upstream reasoning provider: lane arbitration
//! (deciding who owns the speaker), audio admission gating, a layered policy
//! pipeline over assistant output, and budget-bounded retrieval grounding.
//!
//! # Architecture
//!
//! - [`arbitrator`]: Lane Arbitrator state machine (reflex, Lane B, fallback)
//! - [`admission`]: Audio Admission Gate, deciding which inbound chunks reach
//!   the reasoning adapter
//! - [`policy`]: Policy Gate Pipeline (PII redaction, moderation, claims
//!   verification) and the override controller
//! - [`retrieval`]: TF-IDF fact index and budget-bounded RAG context builder
//! - [`reasoning`]: the [`reasoning::ReasoningAdapter`] collaborator contract
//! - [`lanes`]: pre-approved canned-clip producers for the reflex and
//!   fallback lanes
//! - [`events`]: the Event Fabric pub-sub record stream
//! - [`session`]: session data model, registry, and the per-session
//!   orchestration loop
//! - [`protocol`]: client/server wire message taxonomy
//! - [`error`]: centralized error types
//!
//! # Abstraction traits
//!
//! - [`runtime::TaskSpawner`]: spawning background tasks (timers, reconnects)
//! - [`events::emitter::EventEmitter`]: observing the Event Fabric
//! - [`reasoning::ReasoningAdapter`]: the upstream provider collaborator
//!
//! Each has a deterministic test double so the orchestration logic can be
//! exercised without a real provider or real time.

pub mod admission;
pub mod arbitrator;
pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod lanes;
pub mod lifecycle;
pub mod policy;
pub mod protocol;
pub mod protocol_constants;
pub mod reasoning;
pub mod retrieval;
pub mod runtime;
pub mod session;
pub mod utils;

pub use admission::{AdmissionDecision, AdmissionGate, DropReason};
pub use arbitrator::{Arbitrator, ArbitratorSignal, ArbitratorState, Owner};
pub use config::Config;
pub use error::{ErrorCode, KnowledgeError, ReasoningError, VoiceError, VoiceResult};
pub use events::emitter::EventEmitter;
pub use events::{ArbitratorEvent, BroadcastEvent, Event, EventSource, PolicyEvent};
pub use lifecycle::{Lifecycle, NoopLifecycle, ServerLifecycle};
pub use policy::{Decision, OverrideController, PolicyGate, PolicyInput, PolicyOutcome, Role};
pub use protocol::{ClientMessage, LaneTag, ServerMessage, WireVoiceMode};
pub use reasoning::{ReasoningAdapter, ReasoningEvent, VoiceMode};
pub use retrieval::{FactsPack, FactsPackCaps, RetrievalService};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::session_loop::{SessionLoop, SharedResources};
pub use session::{Session, SessionLifecycle, SessionRegistry};
pub use utils::{new_session_id, now_millis};
