//! Policy Gate Pipeline: the layered content evaluator (PII redactor,
//! moderator, claims checker) that emits a single binding decision on a
//! piece of transcript text.

pub mod claims;
pub mod disclaimers;
pub mod moderation;
pub mod pii;

use std::time::Instant;

use serde::Serialize;

/// Priority-ordered decision. Derives `Ord` from declaration order, which
/// matches `allow < rewrite < refuse < escalate < cancel_output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Rewrite,
    Refuse,
    Escalate,
    CancelOutput,
}

/// Whose text is being evaluated. The claims checker only runs for
/// `Assistant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Input to a single policy gate run.
#[derive(Debug, Clone)]
pub struct PolicyInput<'a> {
    pub text: &'a str,
    pub role: Role,
    pub metadata: Option<&'a serde_json::Value>,
}

/// The binding output of a policy gate run.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyOutcome {
    pub decision: Decision,
    pub reason_codes: Vec<String>,
    pub severity: u8,
    pub safe_rewrite: Option<String>,
    pub required_disclaimer_id: Option<String>,
    pub check_duration_ms: u64,
    pub checks_run: Vec<String>,
}

impl PolicyOutcome {
    fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason_codes: Vec::new(),
            severity: 0,
            safe_rewrite: None,
            required_disclaimer_id: None,
            check_duration_ms: 0,
            checks_run: Vec::new(),
        }
    }

    /// Merges `other` into `self` per the pipeline's decision-merging rule:
    /// highest-priority decision wins, ties broken by higher severity,
    /// reason codes accumulate deduplicated, and the first non-null
    /// disclaimer id is kept.
    fn merge(mut self, other: PartialOutcome) -> Self {
        for code in other.reason_codes {
            if !self.reason_codes.contains(&code) {
                self.reason_codes.push(code);
            }
        }
        let other_wins = match other.decision.cmp(&self.decision) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => other.severity > self.severity,
            std::cmp::Ordering::Less => false,
        };
        if other_wins {
            self.decision = other.decision;
            self.severity = other.severity;
            self.safe_rewrite = other.safe_rewrite.or(self.safe_rewrite.take());
        }
        if self.required_disclaimer_id.is_none() {
            self.required_disclaimer_id = other.required_disclaimer_id;
        }
        self
    }

    /// Whether the pipeline should stop evaluating further checks.
    fn should_short_circuit(&self) -> bool {
        self.decision == Decision::CancelOutput
            || ((self.decision == Decision::Refuse || self.decision == Decision::Escalate)
                && self.severity >= 4)
    }
}

/// A single check's contribution before it is merged into the running
/// [`PolicyOutcome`].
#[derive(Debug, Clone, Default)]
pub struct PartialOutcome {
    pub decision: Decision,
    pub reason_codes: Vec<String>,
    pub severity: u8,
    pub safe_rewrite: Option<String>,
    pub required_disclaimer_id: Option<String>,
}

impl Default for Decision {
    fn default() -> Self {
        Self::Allow
    }
}

/// The ordered PII -> moderator -> claims pipeline. Pure per call; holds no
/// session-scoped mutable state of its own.
pub struct PolicyGate {
    pub pii: pii::PiiRedactor,
    pub moderator: moderation::Moderator,
    pub claims: claims::ClaimsChecker,
}

impl PolicyGate {
    #[must_use]
    pub fn new(
        pii: pii::PiiRedactor,
        moderator: moderation::Moderator,
        claims: claims::ClaimsChecker,
    ) -> Self {
        Self {
            pii,
            moderator,
            claims,
        }
    }

    /// Runs the ordered checks against `input`, short-circuiting per the
    /// pipeline's rules, and returns the merged binding decision.
    pub fn run(&self, input: &PolicyInput<'_>) -> PolicyOutcome {
        let start = Instant::now();
        let mut outcome = PolicyOutcome::allow();
        let mut checks_run = Vec::new();
        let mut effective_text = input.text.to_string();

        checks_run.push("pii".to_string());
        let pii_result = self.pii.check(&effective_text);
        if let Some(rewrite) = &pii_result.safe_rewrite {
            effective_text = rewrite.clone();
        }
        outcome = outcome.merge(pii_result);

        if !outcome.should_short_circuit() {
            checks_run.push("moderation".to_string());
            let moderation_result = self.moderator.check(&effective_text);
            outcome = outcome.merge(moderation_result);
        }

        if !outcome.should_short_circuit() && input.role == Role::Assistant {
            checks_run.push("claims".to_string());
            let claims_result = self.claims.check(&effective_text, input.metadata);
            outcome = outcome.merge(claims_result);
        }

        outcome.checks_run = checks_run;
        outcome.check_duration_ms = start.elapsed().as_millis() as u64;
        outcome
    }
}

/// Upgrades a severity-qualifying refuse/escalate decision to
/// `cancel_output`, emitting a `control.override` record via the returned
/// flag.
pub struct OverrideController {
    pub cancel_threshold_severity: u8,
}

impl OverrideController {
    #[must_use]
    pub fn new(cancel_threshold_severity: u8) -> Self {
        Self {
            cancel_threshold_severity,
        }
    }

    /// Returns the possibly-upgraded outcome, and `true` if an override was
    /// applied (the caller should emit a `control.override` audit record).
    pub fn apply(&self, mut outcome: PolicyOutcome) -> (PolicyOutcome, bool) {
        let qualifies = matches!(outcome.decision, Decision::Refuse | Decision::Escalate)
            && outcome.severity >= self.cancel_threshold_severity;
        if qualifies {
            outcome.decision = Decision::CancelOutput;
            (outcome, true)
        } else {
            (outcome, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_priority_orders_correctly() {
        assert!(Decision::Allow < Decision::Rewrite);
        assert!(Decision::Rewrite < Decision::Refuse);
        assert!(Decision::Refuse < Decision::Escalate);
        assert!(Decision::Escalate < Decision::CancelOutput);
    }

    #[test]
    fn override_controller_upgrades_high_severity_refuse() {
        let controller = OverrideController::new(4);
        let outcome = PolicyOutcome {
            decision: Decision::Refuse,
            reason_codes: vec!["MODERATION_VIOLATION".into()],
            severity: 4,
            safe_rewrite: None,
            required_disclaimer_id: None,
            check_duration_ms: 0,
            checks_run: vec![],
        };
        let (upgraded, overridden) = controller.apply(outcome);
        assert!(overridden);
        assert_eq!(upgraded.decision, Decision::CancelOutput);
    }

    #[test]
    fn override_controller_leaves_low_severity_alone() {
        let controller = OverrideController::new(4);
        let outcome = PolicyOutcome {
            decision: Decision::Rewrite,
            reason_codes: vec![],
            severity: 2,
            safe_rewrite: None,
            required_disclaimer_id: None,
            check_duration_ms: 0,
            checks_run: vec![],
        };
        let (same, overridden) = controller.apply(outcome);
        assert!(!overridden);
        assert_eq!(same.decision, Decision::Rewrite);
    }
}
