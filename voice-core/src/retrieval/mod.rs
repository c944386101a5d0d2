//! Retrieval service: TF-IDF fact lookup and budget-bounded RAG response
//! context construction.

pub mod facts;
pub mod index;

use serde::Serialize;

use self::facts::{Fact, FactsCatalog};
use self::index::TfIdfIndex;
use crate::policy::disclaimers::DisclaimerCatalog;
use crate::protocol_constants::{DEFAULT_TOPIC, MAX_TOPIC_CHARS};

/// Caps applied when assembling a [`FactsPack`].
#[derive(Debug, Clone, Copy)]
pub struct FactsPackCaps {
    pub top_k: usize,
    pub max_tokens: usize,
    pub max_bytes: usize,
}

/// The budget-bounded bundle of facts and disclaimers handed to the
/// reasoning adapter as grounding for a response.
#[derive(Debug, Clone, Serialize)]
pub struct FactsPack {
    pub topic: String,
    pub facts: Vec<Fact>,
    pub disclaimers: Vec<String>,
}

impl FactsPack {
    fn empty(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            facts: Vec::new(),
            disclaimers: Vec::new(),
        }
    }

    fn approx_size(&self) -> (usize, usize) {
        let json = serde_json::to_string(self).unwrap_or_default();
        let bytes = json.as_bytes().len();
        let tokens = (json.chars().count() as f64 / 4.0).ceil() as usize;
        (bytes, tokens)
    }

    fn fits(&self, caps: &FactsPackCaps) -> bool {
        let (bytes, tokens) = self.approx_size();
        bytes <= caps.max_bytes && tokens <= caps.max_tokens
    }
}

fn build_topic(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return DEFAULT_TOPIC.to_string();
    }
    if trimmed.chars().count() <= MAX_TOPIC_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().take(MAX_TOPIC_CHARS).collect()
    }
}

fn dedupe(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Combines the frozen TF-IDF index, facts catalog, and disclaimer catalog
/// into the one service sessions query against. Constructed once at
/// startup and shared read-only across sessions.
pub struct RetrievalService {
    index: TfIdfIndex,
    facts: FactsCatalog,
    disclaimers: DisclaimerCatalog,
}

impl RetrievalService {
    #[must_use]
    pub fn new(facts: FactsCatalog, disclaimers: DisclaimerCatalog) -> Self {
        let docs: Vec<String> = facts.facts().iter().map(|f| f.text.clone()).collect();
        let index = TfIdfIndex::build(&docs);
        Self {
            index,
            facts,
            disclaimers,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.facts.is_ready()
    }

    /// Returns the top-scoring facts for `query`, highest score first.
    #[must_use]
    pub fn query(&self, query: &str, top_k: usize) -> Vec<&Fact> {
        self.index
            .query(query, top_k)
            .into_iter()
            .filter_map(|(idx, _)| self.facts.get(idx))
            .collect()
    }

    /// Assembles a budget-bounded [`FactsPack`] for `query`.
    pub fn retrieve_facts_pack(&self, query: &str, caps: FactsPackCaps) -> FactsPack {
        if !self.facts.is_ready() {
            return FactsPack::empty(DEFAULT_TOPIC);
        }

        let topic = build_topic(query);
        let candidates = self.query(query, caps.top_k);

        let mut disclaimer_ids: Vec<String> = self
            .disclaimers
            .required_for("all_sessions")
            .into_iter()
            .map(|d| d.id.clone())
            .collect();

        let lowered_query = query.to_lowercase();
        if lowered_query.contains("performance") || lowered_query.contains("latency") {
            disclaimer_ids.extend(
                self.disclaimers
                    .required_for("performance_claims")
                    .into_iter()
                    .map(|d| d.id.clone()),
            );
        }
        for fact in &candidates {
            if let Some(category) = &fact.category {
                disclaimer_ids.extend(
                    self.disclaimers
                        .required_for(category)
                        .into_iter()
                        .map(|d| d.id.clone()),
                );
            }
        }
        disclaimer_ids = dedupe(disclaimer_ids);

        let mut pack = FactsPack {
            topic: topic.clone(),
            facts: Vec::new(),
            disclaimers: disclaimer_ids,
        };

        if !pack.fits(&caps) {
            pack.disclaimers.clear();
        }

        for fact in candidates {
            let mut trial = pack.clone();
            trial.facts.push(fact.clone());
            if trial.fits(&caps) {
                pack = trial;
            }
        }

        while !pack.fits(&caps) {
            if !pack.facts.is_empty() {
                pack.facts.pop();
            } else if !pack.disclaimers.is_empty() {
                pack.disclaimers.pop();
            } else if pack.topic.chars().count() > 1 {
                let half = (pack.topic.chars().count() / 2).max(1);
                pack.topic = pack.topic.chars().take(half).collect();
            } else {
                break;
            }
        }

        pack
    }
}

/// Builds the instructions string embedded in the `response.create` call
/// sent to the reasoning adapter on commit confirmation.
#[must_use]
pub fn build_instructions(pack: &FactsPack) -> String {
    let json = serde_json::to_string(pack).unwrap_or_else(|_| "{}".to_string());
    format!(
        "For questions about {}, use ONLY the facts in FACTS_PACK. Do not use outside knowledge or speculation. When stating a fact, include its fact ID in brackets like [NXTG-001]. If the facts are insufficient, ask a brief clarifying question instead of guessing.\nFACTS_PACK={json}",
        pack.topic
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_service() -> RetrievalService {
        let facts = FactsCatalog::from_jsonl(
            "{\"id\":\"NXTG-001\",\"text\":\"NextGen AI offers low latency voice responses\",\"source\":\"doc\",\"timestamp\":\"2026-01-01\",\"category\":\"performance_claims\"}\n{\"id\":\"NXTG-002\",\"text\":\"NextGen AI supports multiple languages\",\"source\":\"doc\",\"timestamp\":\"2026-01-01\"}\n",
        )
        .unwrap();
        let disclaimers = DisclaimerCatalog::from_json(
            r#"{"disclaimers": [
                {"id": "DISC-ALL", "text": "General disclaimer.", "required_for": ["all_sessions"]},
                {"id": "DISC-PERF", "text": "Performance varies.", "required_for": ["performance_claims"]}
            ]}"#,
        )
        .unwrap();
        RetrievalService::new(facts, disclaimers)
    }

    #[test]
    fn empty_registry_returns_default_topic_pack() {
        let service = RetrievalService::new(FactsCatalog::unready(), DisclaimerCatalog::empty());
        let pack = service.retrieve_facts_pack("latency", FactsPackCaps { top_k: 5, max_tokens: 512, max_bytes: 4096 });
        assert_eq!(pack.topic, DEFAULT_TOPIC);
        assert!(pack.facts.is_empty());
        assert!(pack.disclaimers.is_empty());
    }

    #[test]
    fn performance_keyword_pulls_performance_disclaimer() {
        let service = sample_service();
        let pack = service.retrieve_facts_pack(
            "what is your latency",
            FactsPackCaps { top_k: 5, max_tokens: 512, max_bytes: 4096 },
        );
        assert!(pack.disclaimers.contains(&"DISC-ALL".to_string()));
        assert!(pack.disclaimers.contains(&"DISC-PERF".to_string()));
    }

    #[test]
    fn tiny_byte_budget_drops_disclaimers_then_facts() {
        let service = sample_service();
        let pack = service.retrieve_facts_pack(
            "latency",
            FactsPackCaps { top_k: 5, max_tokens: 512, max_bytes: 40 },
        );
        assert!(pack.disclaimers.is_empty());
        assert!(pack.facts.is_empty());
    }

    #[test]
    fn instructions_string_embeds_topic_and_pack_json() {
        let pack = FactsPack {
            topic: "NextGen AI".to_string(),
            facts: vec![],
            disclaimers: vec![],
        };
        let instructions = build_instructions(&pack);
        assert!(instructions.starts_with("For questions about NextGen AI"));
        assert!(instructions.contains("FACTS_PACK={"));
    }
}
