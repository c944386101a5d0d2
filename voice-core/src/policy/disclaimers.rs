//! Disclaimer catalog: resolves a `requiredDisclaimerId` to display text.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::KnowledgeError;

/// One entry from `disclaimers.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Disclaimer {
    pub id: String,
    pub text: String,
    pub category: Option<String>,
    #[serde(default)]
    pub required_for: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DisclaimerFile {
    disclaimers: Vec<Disclaimer>,
}

/// Read-only, shared across sessions after construction.
#[derive(Debug, Default, Clone)]
pub struct DisclaimerCatalog {
    by_id: HashMap<String, Disclaimer>,
}

impl DisclaimerCatalog {
    /// Parses a `disclaimers.json` document.
    pub fn from_json(raw: &str) -> Result<Self, KnowledgeError> {
        let parsed: DisclaimerFile =
            serde_json::from_str(raw).map_err(|source| KnowledgeError::Parse {
                path: "disclaimers.json".to_string(),
                source,
            })?;
        let by_id = parsed
            .disclaimers
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        Ok(Self { by_id })
    }

    /// An empty catalog, used when the file failed to load.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks up a disclaimer by id. Logs a warning and returns `None` if
    /// the id is unknown, rather than failing the response.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<&Disclaimer> {
        let found = self.by_id.get(id);
        if found.is_none() {
            tracing::warn!(disclaimer_id = id, "unknown disclaimer id requested");
        }
        found
    }

    /// Returns every disclaimer whose `required_for` list contains `bucket`.
    #[must_use]
    pub fn required_for(&self, bucket: &str) -> Vec<&Disclaimer> {
        self.by_id
            .values()
            .filter(|d| d.required_for.iter().any(|r| r == bucket))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "disclaimers": [
            {"id": "DISC-001", "text": "Results may vary.", "required_for": ["all_sessions"]},
            {"id": "DISC-002", "text": "Not medical advice.", "category": "health", "required_for": ["performance_claims"]}
        ]
    }"#;

    #[test]
    fn resolves_known_id() {
        let catalog = DisclaimerCatalog::from_json(SAMPLE).unwrap();
        assert_eq!(catalog.resolve("DISC-001").unwrap().text, "Results may vary.");
    }

    #[test]
    fn unknown_id_returns_none() {
        let catalog = DisclaimerCatalog::from_json(SAMPLE).unwrap();
        assert!(catalog.resolve("DISC-999").is_none());
    }

    #[test]
    fn required_for_filters_by_bucket() {
        let catalog = DisclaimerCatalog::from_json(SAMPLE).unwrap();
        let all_sessions = catalog.required_for("all_sessions");
        assert_eq!(all_sessions.len(), 1);
        assert_eq!(all_sessions[0].id, "DISC-001");
    }

    #[test]
    fn empty_catalog_resolves_nothing() {
        let catalog = DisclaimerCatalog::empty();
        assert!(catalog.resolve("DISC-001").is_none());
    }
}
