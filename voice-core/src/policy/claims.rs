//! Claims checker: verifies assistant claims against an approved-claims
//! registry and a disallowed-pattern list.

use std::collections::HashSet;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{Decision, PartialOutcome};
use crate::error::KnowledgeError;
use crate::protocol_constants::PARTIAL_MATCH_THRESHOLD;

/// One entry from `allowed_claims.json`'s `allowed_claims`/`claims` list.
#[derive(Debug, Clone, Deserialize)]
pub struct AllowedClaim {
    pub id: String,
    #[serde(alias = "text")]
    pub claim: String,
    pub source: Option<String>,
    pub category: Option<String>,
    #[serde(default, alias = "required_disclaimer_ids")]
    pub required_disclaimer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaimsFile {
    #[serde(alias = "claims")]
    allowed_claims: Vec<AllowedClaim>,
    #[serde(default)]
    disallowed_patterns: Vec<String>,
}

/// Read-only, shared across sessions after construction.
#[derive(Debug, Default)]
pub struct ClaimsRegistry {
    claims: Vec<AllowedClaim>,
    disallowed_patterns: Vec<Regex>,
}

impl ClaimsRegistry {
    /// Parses an `allowed_claims.json` document.
    pub fn from_json(raw: &str) -> Result<Self, KnowledgeError> {
        let parsed: ClaimsFile =
            serde_json::from_str(raw).map_err(|source| KnowledgeError::Parse {
                path: "allowed_claims.json".to_string(),
                source,
            })?;
        let disallowed_patterns = parsed
            .disallowed_patterns
            .iter()
            .filter_map(|p| Regex::new(&format!("(?i){}", regex::escape(p))).ok())
            .collect();
        Ok(Self {
            claims: parsed.allowed_claims,
            disallowed_patterns,
        })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&AllowedClaim> {
        self.claims.iter().find(|c| c.id.eq_ignore_ascii_case(id))
    }
}

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn word_overlap_ratio(claim_words: &HashSet<String>, proposed_words: &HashSet<String>) -> f64 {
    if claim_words.is_empty() {
        return 0.0;
    }
    let intersection = claim_words.intersection(proposed_words).count();
    intersection as f64 / claim_words.len() as f64
}

fn format_pattern_code(pattern: &str) -> String {
    let upper_snake: String = pattern
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("DISALLOWED_PATTERN:{upper_snake}")
}

/// Evaluates assistant claim candidates against the registry.
pub struct ClaimsChecker {
    registry: ClaimsRegistry,
}

impl ClaimsChecker {
    #[must_use]
    pub fn new(registry: ClaimsRegistry) -> Self {
        Self { registry }
    }

    /// Extracts the candidate set: the final transcript text plus any
    /// metadata-supplied claim texts/IDs.
    fn extract_candidates(text: &str, metadata: Option<&Value>) -> Vec<String> {
        let mut candidates = vec![text.to_string()];
        if let Some(metadata) = metadata {
            for path in [
                &["claims"][..],
                &["claim_ids"][..],
                &["response", "claims"][..],
                &["response", "claim_ids"][..],
            ] {
                if let Some(value) = dig(metadata, path) {
                    collect_candidate_strings(value, &mut candidates);
                }
            }
        }
        candidates
    }

    fn check_one(&self, candidate: &str) -> PartialOutcome {
        let claim_id_pattern = Regex::new(r"(?i)\bCLAIM-\d{3,}\b").unwrap();
        if claim_id_pattern.is_match(candidate) {
            return self.check_claim_id(candidate);
        }
        self.check_text(candidate)
    }

    fn check_claim_id(&self, candidate: &str) -> PartialOutcome {
        match self.registry.by_id(candidate.trim()) {
            Some(claim) => PartialOutcome {
                decision: Decision::Allow,
                reason_codes: vec![],
                severity: 0,
                safe_rewrite: None,
                required_disclaimer_id: claim.required_disclaimer_id.clone(),
            },
            None => PartialOutcome {
                decision: Decision::Allow,
                reason_codes: vec!["UNVERIFIED_CLAIM_ID".to_string()],
                severity: 1,
                safe_rewrite: None,
                required_disclaimer_id: None,
            },
        }
    }

    fn check_text(&self, candidate: &str) -> PartialOutcome {
        for pattern in &self.registry.disallowed_patterns {
            if pattern.is_match(candidate) {
                let best_match = self.best_text_match(candidate);
                return PartialOutcome {
                    decision: Decision::Rewrite,
                    reason_codes: vec![
                        "CLAIMS_DISALLOWED".to_string(),
                        format_pattern_code(pattern.as_str()),
                    ],
                    severity: 3,
                    safe_rewrite: best_match.map(|c| c.claim.clone()),
                    required_disclaimer_id: None,
                };
            }
        }

        let normalized = candidate.trim().to_lowercase();
        if let Some(exact) = self
            .registry
            .claims
            .iter()
            .find(|c| c.claim.trim().to_lowercase() == normalized)
        {
            return PartialOutcome {
                decision: Decision::Allow,
                reason_codes: vec![],
                severity: 0,
                safe_rewrite: None,
                required_disclaimer_id: exact.required_disclaimer_id.clone(),
            };
        }

        let proposed_words = words(candidate);
        let mut best: Option<(&AllowedClaim, f64)> = None;
        for claim in &self.registry.claims {
            let claim_words = words(&claim.claim);
            let ratio = word_overlap_ratio(&claim_words, &proposed_words);
            if best.as_ref().map_or(true, |(_, best_ratio)| ratio > *best_ratio) {
                best = Some((claim, ratio));
            }
        }
        if let Some((claim, ratio)) = best {
            if ratio > PARTIAL_MATCH_THRESHOLD {
                return PartialOutcome {
                    decision: Decision::Rewrite,
                    reason_codes: vec!["CLAIMS_RISK".to_string()],
                    severity: 2,
                    safe_rewrite: Some(claim.claim.clone()),
                    required_disclaimer_id: claim.required_disclaimer_id.clone(),
                };
            }
        }

        if !self.registry.is_empty() {
            return PartialOutcome {
                decision: Decision::Allow,
                reason_codes: vec!["UNVERIFIED_CLAIM".to_string()],
                severity: 1,
                safe_rewrite: None,
                required_disclaimer_id: None,
            };
        }

        PartialOutcome::default()
    }

    fn best_text_match(&self, candidate: &str) -> Option<&AllowedClaim> {
        let proposed_words = words(candidate);
        self.registry
            .claims
            .iter()
            .map(|c| (c, word_overlap_ratio(&words(&c.claim), &proposed_words)))
            .filter(|(_, ratio)| *ratio > 0.0)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(c, _)| c)
    }

    /// Evaluates every candidate extracted from `text`/`metadata` and merges
    /// their outcomes by the pipeline's priority-then-severity rule.
    pub fn check(&self, text: &str, metadata: Option<&Value>) -> PartialOutcome {
        let candidates = Self::extract_candidates(text, metadata);
        let mut merged = PartialOutcome::default();
        let mut reason_codes = Vec::new();
        for candidate in &candidates {
            let result = self.check_one(candidate);
            for code in result.reason_codes {
                if !reason_codes.contains(&code) {
                    reason_codes.push(code);
                }
            }
            let result_wins = match result.decision.cmp(&merged.decision) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => result.severity > merged.severity,
                std::cmp::Ordering::Less => false,
            };
            if result_wins {
                merged.decision = result.decision;
                merged.severity = result.severity;
                merged.safe_rewrite = result.safe_rewrite;
            }
            if merged.required_disclaimer_id.is_none() {
                merged.required_disclaimer_id = result.required_disclaimer_id;
            }
        }
        merged.reason_codes = reason_codes;
        merged
    }
}

fn dig<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn collect_candidate_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_candidate_strings(item, out);
            }
        }
        Value::Object(map) => {
            for key in ["text", "claim", "id"] {
                if let Some(Value::String(s)) = map.get(key) {
                    out.push(s.clone());
                    return;
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> ClaimsRegistry {
        ClaimsRegistry::from_json(
            r#"{
                "allowed_claims": [
                    {"id": "CLAIM-001", "claim": "Our product is FDA approved", "required_disclaimer_id": "DISC-001"}
                ],
                "disallowed_patterns": ["guaranteed cure"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn s7_partial_claim_match_rewrites_with_safe_text() {
        let checker = ClaimsChecker::new(sample_registry());
        let outcome = checker.check(
            "Our product is FDA approved and highly effective",
            None,
        );
        assert_eq!(outcome.decision, Decision::Rewrite);
        assert!(outcome.reason_codes.contains(&"CLAIMS_RISK".to_string()));
        assert_eq!(outcome.safe_rewrite.unwrap(), "Our product is FDA approved");
    }

    #[test]
    fn exact_match_allows_and_carries_disclaimer() {
        let checker = ClaimsChecker::new(sample_registry());
        let outcome = checker.check("our product is fda approved", None);
        assert_eq!(outcome.decision, Decision::Allow);
        assert_eq!(outcome.required_disclaimer_id.as_deref(), Some("DISC-001"));
    }

    #[test]
    fn disallowed_pattern_rewrites_at_severity_three() {
        let checker = ClaimsChecker::new(sample_registry());
        let outcome = checker.check("this is a guaranteed cure for everything", None);
        assert_eq!(outcome.decision, Decision::Rewrite);
        assert_eq!(outcome.severity, 3);
        assert!(outcome.reason_codes.contains(&"CLAIMS_DISALLOWED".to_string()));
    }

    #[test]
    fn unrelated_text_is_unverified_when_registry_nonempty() {
        let checker = ClaimsChecker::new(sample_registry());
        let outcome = checker.check("the weather is sunny today", None);
        assert_eq!(outcome.decision, Decision::Allow);
        assert!(outcome.reason_codes.contains(&"UNVERIFIED_CLAIM".to_string()));
    }

    #[test]
    fn empty_registry_is_clean_allow() {
        let checker = ClaimsChecker::new(ClaimsRegistry::empty());
        let outcome = checker.check("anything goes here", None);
        assert_eq!(outcome.decision, Decision::Allow);
        assert!(outcome.reason_codes.is_empty());
    }

    #[test]
    fn metadata_claim_ids_are_checked_too() {
        let checker = ClaimsChecker::new(sample_registry());
        let metadata = serde_json::json!({"claim_ids": ["CLAIM-999"]});
        let outcome = checker.check("our product is fda approved", Some(&metadata));
        assert!(outcome.reason_codes.contains(&"UNVERIFIED_CLAIM_ID".to_string()));
    }
}
