//! Server configuration: YAML file + environment variable overrides, the
//! same two-layer precedence `thaumic-server` uses, with CLI flags applied
//! by the caller on top of the result.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use voice_core::Config as CoreConfig;

/// Server-level configuration, including the orchestrator's own tuning
/// knobs flattened in so operators can override any of them from one YAML
/// document.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// First port to try binding the WebSocket/HTTP listener to.
    pub bind_port: u16,

    /// Last port to try, inclusive, if `bind_port` is taken.
    pub bind_port_range_end: u16,

    /// Directory holding `nxtg_facts.jsonl`, `disclaimers.json`, and
    /// `allowed_claims.json`. Defaults to `./knowledge`, falling back to
    /// `../knowledge` per the knowledge-file lookup rule.
    pub knowledge_dir: Option<PathBuf>,

    /// Orchestrator tuning knobs shared read-only across sessions.
    #[serde(flatten)]
    pub core: CoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 8787,
            bind_port_range_end: 8797,
            knowledge_dir: None,
            core: CoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from an optional YAML file, then applies
    /// environment variable overrides, then validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file: {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file: {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config
            .core
            .validate()
            .context("invalid orchestrator configuration")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("VOICE_BIND_PORT") {
            if let Ok(port) = raw.parse() {
                self.bind_port = port;
            }
        }
        if let Ok(raw) = std::env::var("VOICE_BIND_PORT_RANGE_END") {
            if let Ok(port) = raw.parse() {
                self.bind_port_range_end = port;
            }
        }
        if let Ok(raw) = std::env::var("VOICE_KNOWLEDGE_DIR") {
            self.knowledge_dir = Some(PathBuf::from(raw));
        }
        if let Ok(raw) = std::env::var("VOICE_COOLDOWN_MS") {
            if let Ok(ms) = raw.parse() {
                self.core.cooldown_ms = ms;
            }
        }
        if let Ok(raw) = std::env::var("VOICE_MIN_RMS") {
            if let Ok(rms) = raw.parse() {
                self.core.min_rms = rms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerConfig::default();
        config.core.validate().unwrap();
        assert_eq!(config.bind_port, 8787);
    }

    #[test]
    fn env_override_applies_on_top_of_yaml() {
        std::env::set_var("VOICE_BIND_PORT", "9999");
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.bind_port, 9999);
        std::env::remove_var("VOICE_BIND_PORT");
    }
}
