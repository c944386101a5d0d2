//! Application bootstrap and dependency wiring.
//!
//! The composition root: the one place where the knowledge catalogs are
//! loaded from disk, the policy pipeline and retrieval service are built
//! on top of them, and the whole set of per-session-shared collaborators
//! is wired into a single [`SharedResources`] every session loop borrows.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use voice_core::audio::AudioChunk;
use voice_core::events::emitter::{EventEmitter, LoggingEventEmitter};
use voice_core::lanes::fallback::FallbackPlayer;
use voice_core::lanes::reflex::ReflexEngine;
use voice_core::lanes::LaneProducer;
use voice_core::policy::claims::{ClaimsChecker, ClaimsRegistry};
use voice_core::policy::disclaimers::DisclaimerCatalog;
use voice_core::policy::moderation::Moderator;
use voice_core::policy::pii::{PiiMode, PiiRedactor};
use voice_core::retrieval::facts::FactsCatalog;
use voice_core::runtime::{TaskSpawner, TokioSpawner};
use voice_core::session::session_loop::SharedResources;
use voice_core::session::SessionRegistry;
use voice_core::{Lifecycle, OverrideController, PolicyGate, RetrievalService, ServerLifecycle};

use crate::config::ServerConfig;

const FACTS_FILE: &str = "nxtg_facts.jsonl";
const DISCLAIMERS_FILE: &str = "disclaimers.json";
const CLAIMS_FILE: &str = "allowed_claims.json";

/// Self-harm disallowed patterns for the default moderator. A real
/// deployment would source a larger, reviewed list; this is the minimal
/// set needed to exercise the escalation path end to end.
const SELF_HARM_PATTERNS: &[&str] = &[r"\bhurt myself\b", r"\bkill myself\b", r"\bend my life\b"];

/// Container for everything bootstrapped at startup.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Collaborators shared read-only across every session loop.
    pub shared: Arc<SharedResources>,
    /// Tracks live sessions for idle-timeout GC.
    pub sessions: Arc<SessionRegistry>,
    /// Backs the `/health` readiness signal.
    pub lifecycle: Arc<ServerLifecycle>,
    /// Pre-approved reflex (Lane A) filler clip, shared across sessions.
    pub reflex: Arc<dyn LaneProducer>,
    /// Pre-approved safe-fallback clip, shared across sessions.
    pub fallback: Arc<dyn LaneProducer>,
}

/// Resolves the knowledge directory per the lookup rule in the external
/// interfaces: an explicit path, else `./knowledge`, else `../knowledge`.
fn resolve_knowledge_dir(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }
    let cwd = PathBuf::from("knowledge");
    if cwd.is_dir() {
        return Some(cwd);
    }
    let parent = PathBuf::from("../knowledge");
    if parent.is_dir() {
        return Some(parent);
    }
    None
}

/// Loads the three knowledge catalogs from `dir`, degrading to the
/// documented not-ready/empty fallbacks on a missing or unreadable file
/// rather than failing startup.
fn load_knowledge(dir: Option<&Path>) -> (FactsCatalog, DisclaimerCatalog, ClaimsRegistry) {
    let Some(dir) = dir else {
        tracing::warn!("no knowledge directory found; retrieval and claims checks are disabled");
        return (
            FactsCatalog::unready(),
            DisclaimerCatalog::empty(),
            ClaimsRegistry::empty(),
        );
    };

    let facts = match std::fs::read_to_string(dir.join(FACTS_FILE)) {
        Ok(raw) => FactsCatalog::from_jsonl(&raw).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to parse facts catalog; retrieval disabled");
            FactsCatalog::unready()
        }),
        Err(err) => {
            tracing::warn!(error = %err, file = FACTS_FILE, "facts catalog missing; retrieval disabled");
            FactsCatalog::unready()
        }
    };

    let disclaimers = match std::fs::read_to_string(dir.join(DISCLAIMERS_FILE)) {
        Ok(raw) => DisclaimerCatalog::from_json(&raw).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to parse disclaimer catalog");
            DisclaimerCatalog::empty()
        }),
        Err(err) => {
            tracing::warn!(error = %err, file = DISCLAIMERS_FILE, "disclaimer catalog missing");
            DisclaimerCatalog::empty()
        }
    };

    let claims = match std::fs::read_to_string(dir.join(CLAIMS_FILE)) {
        Ok(raw) => ClaimsRegistry::from_json(&raw).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "failed to parse claims registry");
            ClaimsRegistry::empty()
        }),
        Err(err) => {
            tracing::warn!(error = %err, file = CLAIMS_FILE, "claims registry missing");
            ClaimsRegistry::empty()
        }
    };

    (facts, disclaimers, claims)
}

fn default_moderator() -> Moderator {
    let patterns: Vec<Regex> = SELF_HARM_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("built-in pattern is valid regex"))
        .collect();
    Moderator::with_self_harm_escalation(patterns)
}

/// A short, fixed silence clip: the reflex/fallback lanes exist to play
/// pre-approved canned audio, never generated content, so there is no
/// synthesis step here — only a stand-in clip until a real one is
/// supplied via the knowledge directory.
fn canned_clip(duration_ms: u64) -> Vec<AudioChunk> {
    const BYTES_PER_MS_24KHZ_PCM16: usize = 48;
    vec![AudioChunk::new(vec![
        0u8;
        duration_ms as usize * BYTES_PER_MS_24KHZ_PCM16
    ])]
}

/// Bootstraps every shared service from configuration.
///
/// Wiring order: knowledge catalogs first (leaves), then the policy gate
/// and retrieval service built on top of them, then the shared-resources
/// bundle every session loop borrows, then the session registry and
/// lifecycle tracker the server binary needs independently of any one
/// session.
pub fn bootstrap_services(config: &ServerConfig) -> anyhow::Result<BootstrappedServices> {
    let knowledge_dir = resolve_knowledge_dir(config.knowledge_dir.as_deref());
    let (facts, disclaimers, claims) = load_knowledge(knowledge_dir.as_deref());

    let retrieval = Arc::new(RetrievalService::new(facts, disclaimers.clone()));
    let disclaimers = Arc::new(disclaimers);

    let policy = Arc::new(PolicyGate::new(
        PiiRedactor::new(PiiMode::Redact),
        default_moderator(),
        ClaimsChecker::new(claims),
    ));
    let override_controller = OverrideController::new(config.core.cancel_override_severity);

    let spawner: Arc<dyn TaskSpawner> = Arc::new(TokioSpawner::current());
    let emitter: Arc<dyn EventEmitter> = Arc::new(LoggingEventEmitter);

    let shared = Arc::new(SharedResources {
        policy,
        override_controller,
        retrieval,
        disclaimers,
        config: Arc::new(config.core.clone()),
        emitter,
        spawner,
    });

    let reflex: Arc<dyn LaneProducer> =
        Arc::new(ReflexEngine::new("reflex_filler", canned_clip(400)));
    let fallback: Arc<dyn LaneProducer> =
        Arc::new(FallbackPlayer::new("safe_fallback", canned_clip(800)));

    let lifecycle = Arc::new(ServerLifecycle::new());
    lifecycle.on_ready();

    Ok(BootstrappedServices {
        shared,
        sessions: Arc::new(SessionRegistry::new()),
        lifecycle,
        reflex,
        fallback,
    })
}
