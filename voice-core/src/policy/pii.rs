//! PII redactor: detects and optionally redacts common PII patterns before
//! moderation and claims checks see the text.

use regex::Regex;

use super::PartialOutcome;
use crate::policy::Decision;

/// How the redactor reacts to a detected match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiMode {
    /// Replace matches with `[KIND_REDACTED]` and decide `rewrite`.
    Redact,
    /// Leave the text intact, decide `allow` with low-severity reason codes.
    Flag,
}

#[derive(Debug, Clone)]
struct PiiPattern {
    kind: &'static str,
    regex: Regex,
}

/// Detects PII via a configurable set of patterns. Ships with US phone,
/// email, SSN, and 16-digit credit card patterns by default.
#[derive(Debug, Clone)]
pub struct PiiRedactor {
    mode: PiiMode,
    patterns: Vec<PiiPattern>,
}

impl PiiRedactor {
    /// Builds a redactor with the default pattern set.
    #[must_use]
    pub fn new(mode: PiiMode) -> Self {
        Self {
            mode,
            patterns: Self::default_patterns(),
        }
    }

    fn default_patterns() -> Vec<PiiPattern> {
        vec![
            PiiPattern {
                kind: "EMAIL",
                regex: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
            },
            PiiPattern {
                kind: "PHONE",
                regex: Regex::new(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b")
                    .unwrap(),
            },
            PiiPattern {
                kind: "SSN",
                regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
            },
            PiiPattern {
                kind: "CREDIT_CARD",
                regex: Regex::new(r"\b(?:\d[ -]?){16}\b").unwrap(),
            },
        ]
    }

    /// The mode this redactor was configured with.
    #[must_use]
    pub fn mode(&self) -> PiiMode {
        self.mode
    }

    /// Standalone utility, also used by the audit layer: redacts every
    /// configured pattern regardless of mode and returns the kinds found.
    #[must_use]
    pub fn redact_text(&self, text: &str) -> (String, Vec<String>) {
        let mut redacted = text.to_string();
        let mut kinds = Vec::new();
        for pattern in &self.patterns {
            if pattern.regex.is_match(&redacted) {
                kinds.push(pattern.kind.to_string());
                let replacement = format!("[{}_REDACTED]", pattern.kind);
                redacted = pattern
                    .regex
                    .replace_all(&redacted, replacement.as_str())
                    .into_owned();
            }
        }
        (redacted, kinds)
    }

    /// Evaluates `text` per the configured mode.
    pub fn check(&self, text: &str) -> PartialOutcome {
        let mut detected = Vec::new();
        for pattern in &self.patterns {
            if pattern.regex.is_match(text) {
                detected.push(pattern.kind.to_string());
            }
        }
        if detected.is_empty() {
            return PartialOutcome::default();
        }

        match self.mode {
            PiiMode::Redact => {
                let (redacted, kinds) = self.redact_text(text);
                let mut reason_codes = vec!["PII_DETECTED".to_string()];
                reason_codes.extend(kinds.iter().map(|k| format!("PII_DETECTED:{k}")));
                PartialOutcome {
                    decision: Decision::Rewrite,
                    reason_codes,
                    severity: 3,
                    safe_rewrite: Some(redacted),
                    required_disclaimer_id: None,
                }
            }
            PiiMode::Flag => {
                let mut reason_codes = vec!["PII_DETECTED".to_string()];
                reason_codes.extend(detected.iter().map(|k| format!("PII_DETECTED:{k}")));
                PartialOutcome {
                    decision: Decision::Allow,
                    reason_codes,
                    severity: 1,
                    safe_rewrite: None,
                    required_disclaimer_id: None,
                }
            }
        }
    }
}
