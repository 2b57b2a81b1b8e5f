use crate::domain::intent::Intent;
use crate::domain::rule::AutomationRule;
use crate::thresholds::GENERAL_RULE_FALLBACK_CONFIDENCE;

/// Selects the single effective automation rule for a classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuleMatcher {
    general_fallback_below: u8,
}

impl Default for RuleMatcher {
    fn default() -> Self {
        Self { general_fallback_below: GENERAL_RULE_FALLBACK_CONFIDENCE }
    }
}

impl RuleMatcher {
    pub fn new(general_fallback_below: u8) -> Self {
        Self { general_fallback_below }
    }

    /// 1. active rule for exactly `classification`;
    /// 2. otherwise, when `confidence` is below the fallback threshold, the active `general` rule.
    ///
    /// Ties among several active rules for the same classification resolve to the
    /// oldest one so that the choice is stable across runs.
    pub fn find_rule<'a>(
        &self,
        rules: &'a [AutomationRule],
        classification: Intent,
        confidence: u8,
    ) -> Option<&'a AutomationRule> {
        if let Some(rule) = oldest_active(rules, classification) {
            return Some(rule);
        }
        if classification != Intent::General && confidence < self.general_fallback_below {
            return oldest_active(rules, Intent::General);
        }
        None
    }
}

fn oldest_active(rules: &[AutomationRule], classification: Intent) -> Option<&AutomationRule> {
    rules
        .iter()
        .filter(|rule| rule.active && rule.classification == classification)
        .min_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        })
}
