//! Facts catalog: the knowledge base retrieval queries against.

use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

/// One line of `nxtg_facts.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub text: String,
    pub source: String,
    pub timestamp: String,
    pub category: Option<String>,
}

/// Read-only, shared across sessions after construction.
#[derive(Debug, Default)]
pub struct FactsCatalog {
    facts: Vec<Fact>,
    ready: bool,
}

impl FactsCatalog {
    /// Parses a `nxtg_facts.jsonl` document, one JSON object per line.
    /// Blank lines are skipped.
    pub fn from_jsonl(raw: &str) -> Result<Self, KnowledgeError> {
        let mut facts = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fact: Fact = serde_json::from_str(line).map_err(|source| KnowledgeError::Parse {
                path: "nxtg_facts.jsonl".to_string(),
                source,
            })?;
            facts.push(fact);
        }
        Ok(Self { facts, ready: true })
    }

    /// A catalog that failed to load; reports not-ready and has no facts.
    #[must_use]
    pub fn unready() -> Self {
        Self {
            facts: Vec::new(),
            ready: false,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[must_use]
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Fact> {
        self.facts.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jsonl_skipping_blank_lines() {
        let raw = "{\"id\":\"NXTG-001\",\"text\":\"Fact one\",\"source\":\"doc\",\"timestamp\":\"2026-01-01\"}\n\n{\"id\":\"NXTG-002\",\"text\":\"Fact two\",\"source\":\"doc\",\"timestamp\":\"2026-01-02\",\"category\":\"performance\"}\n";
        let catalog = FactsCatalog::from_jsonl(raw).unwrap();
        assert!(catalog.is_ready());
        assert_eq!(catalog.facts().len(), 2);
        assert_eq!(catalog.facts()[1].category.as_deref(), Some("performance"));
    }

    #[test]
    fn unready_catalog_has_no_facts() {
        let catalog = FactsCatalog::unready();
        assert!(!catalog.is_ready());
        assert!(catalog.facts().is_empty());
    }
}
