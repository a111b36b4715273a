//! Block/allow decision for WAF mode

use super::finding::Finding;
use super::rules::{RuleAction, RuleSet};

/// Outcome of the action resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the exchange must be blocked
    pub blocked: bool,

    /// Rule that triggered the block
    pub rule_id: Option<String>,
}

impl Decision {
    /// Allow decision
    pub fn allow() -> Self {
        Self {
            blocked: false,
            rule_id: None,
        }
    }

    /// Block decision caused by a rule
    pub fn block(rule_id: impl Into<String>) -> Self {
        Self {
            blocked: true,
            rule_id: Some(rule_id.into()),
        }
    }
}

/// Action of a rule as reported to the decision layer: `allow`, `drop` or
/// empty when the rule sets none or is unknown.
pub fn get_action(rules: &RuleSet, rule_id: &str) -> &'static str {
    rules.action(rule_id).map(|a| a.as_str()).unwrap_or("")
}

/// Decide whether findings block the exchange.
///
/// Any finding whose rule does not explicitly allow blocks. Findings from
/// outside the rule set (other validators) have no action and so block too.
pub fn resolve(rules: &RuleSet, findings: &[Finding]) -> Decision {
    findings
        .iter()
        .find(|f| rules.action(&f.rule_id) != Some(RuleAction::Allow))
        .map(|f| Decision::block(f.rule_id.clone()))
        .unwrap_or_else(Decision::allow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::waf::rules::{Rule, Severity};

    fn rules() -> RuleSet {
        let mut set = RuleSet::new();
        for yaml in [
            "id: unset\ninfo:\n  severity: high\n  action: ''\n",
            "id: allow\ninfo:\n  severity: high\n  action: allow\n",
            "id: drop\ninfo:\n  severity: high\n  action: Drop\n",
        ] {
            set.add(Rule::from_yaml(yaml).unwrap()).unwrap();
        }
        set
    }

    fn finding(rule_id: &str) -> Finding {
        Finding::new(rule_id, Severity::High, "x")
    }

    #[test]
    fn test_get_action() {
        let set = rules();
        assert_eq!(get_action(&set, "unset"), "");
        assert_eq!(get_action(&set, "allow"), "allow");
        assert_eq!(get_action(&set, "drop"), "drop");
        assert_eq!(get_action(&set, "missing"), "");
    }

    #[test]
    fn test_unset_action_blocks() {
        let decision = resolve(&rules(), &[finding("unset")]);
        assert!(decision.blocked);
        assert_eq!(decision.rule_id.as_deref(), Some("unset"));
    }

    #[test]
    fn test_allow_only_allows() {
        assert!(!resolve(&rules(), &[finding("allow")]).blocked);
        assert!(!resolve(&rules(), &[finding("allow"), finding("allow")]).blocked);
    }

    #[test]
    fn test_any_drop_blocks() {
        let decision = resolve(&rules(), &[finding("allow"), finding("drop")]);
        assert_eq!(decision, Decision::block("drop"));
    }

    #[test]
    fn test_no_findings_allows() {
        assert_eq!(resolve(&rules(), &[]), Decision::allow());
    }
}
