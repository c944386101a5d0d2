//! Moderator: flat or categorized pattern matching against disallowed
//! content.

use regex::Regex;

use super::{Decision, PartialOutcome};

/// A named category of disallowed content with its own severity and
/// resulting decision.
#[derive(Debug, Clone)]
pub struct ModerationCategory {
    pub name: String,
    pub patterns: Vec<Regex>,
    pub severity: u8,
    pub decision: Decision,
}

/// The moderator's matching strategy.
#[derive(Debug, Clone)]
pub enum ModerationMode {
    /// Any match against a flat pattern list is a `refuse`, severity 4.
    FlatPatterns(Vec<Regex>),
    /// First matching category wins.
    Categorized(Vec<ModerationCategory>),
}

/// Evaluates text against configured disallowed-content patterns.
#[derive(Debug, Clone)]
pub struct Moderator {
    mode: ModerationMode,
}

impl Moderator {
    #[must_use]
    pub fn new(mode: ModerationMode) -> Self {
        Self { mode }
    }

    /// A categorized moderator with a self-harm category that escalates to
    /// human handoff rather than a flat refuse.
    #[must_use]
    pub fn with_self_harm_escalation(patterns: Vec<Regex>) -> Self {
        Self::new(ModerationMode::Categorized(vec![ModerationCategory {
            name: "SELF_HARM".to_string(),
            patterns,
            severity: 4,
            decision: Decision::Escalate,
        }]))
    }

    pub fn check(&self, text: &str) -> PartialOutcome {
        let lowered = text.to_lowercase();
        match &self.mode {
            ModerationMode::FlatPatterns(patterns) => {
                if patterns.iter().any(|p| p.is_match(&lowered)) {
                    PartialOutcome {
                        decision: Decision::Refuse,
                        reason_codes: vec!["MODERATION_VIOLATION".to_string()],
                        severity: 4,
                        safe_rewrite: None,
                        required_disclaimer_id: None,
                    }
                } else {
                    PartialOutcome::default()
                }
            }
            ModerationMode::Categorized(categories) => {
                for category in categories {
                    if category.patterns.iter().any(|p| p.is_match(&lowered)) {
                        return PartialOutcome {
                            decision: category.decision,
                            reason_codes: vec![
                                "MODERATION_VIOLATION".to_string(),
                                format!("MODERATION:{}", category.name),
                            ],
                            severity: category.severity,
                            safe_rewrite: None,
                            required_disclaimer_id: None,
                        };
                    }
                }
                PartialOutcome::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_pattern_match_refuses_at_severity_four() {
        let moderator = Moderator::new(ModerationMode::FlatPatterns(vec![
            Regex::new(r"\bbuild a bomb\b").unwrap(),
        ]));
        let outcome = moderator.check("how do I build a bomb");
        assert_eq!(outcome.decision, Decision::Refuse);
        assert_eq!(outcome.severity, 4);
        assert!(outcome.reason_codes.contains(&"MODERATION_VIOLATION".to_string()));
    }

    #[test]
    fn self_harm_category_escalates_instead_of_refusing() {
        let moderator =
            Moderator::with_self_harm_escalation(vec![Regex::new(r"\bhurt myself\b").unwrap()]);
        let outcome = moderator.check("I want to hurt myself");
        assert_eq!(outcome.decision, Decision::Escalate);
        assert!(outcome
            .reason_codes
            .contains(&"MODERATION:SELF_HARM".to_string()));
    }

    #[test]
    fn clean_text_passes() {
        let moderator = Moderator::new(ModerationMode::FlatPatterns(vec![]));
        let outcome = moderator.check("tell me about your product");
        assert_eq!(outcome.decision, Decision::Allow);
    }
}
