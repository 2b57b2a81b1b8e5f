use serde::{Deserialize, Serialize};

pub const ESCALATION_CONFIDENCE: u8 = 60;
pub const GENERAL_RULE_FALLBACK_CONFIDENCE: u8 = 70;
pub const SENTIMENT_URGENT_NEGATIVE: u8 = 75;
pub const SENTIMENT_URGENT_CONFIDENCE: u8 = 90;
pub const SENTIMENT_HIGH_NEGATIVE: u8 = 85;
pub const SENTIMENT_HIGH_CONFIDENCE: u8 = 80;
pub const LOW_CONFIDENCE_HIGH_PRIORITY: u8 = 40;

/// Decision constants. Defaults are the named constants above; the `[thresholds]`
/// config section is the only place they can be overridden.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// Confidence strictly below this escalates.
    pub escalation_confidence: u8,
    /// Confidence strictly below this may use the `general` catch-all rule.
    pub general_rule_fallback_confidence: u8,
    pub sentiment_urgent_negative: u8,
    pub sentiment_urgent_confidence: u8,
    pub sentiment_high_negative: u8,
    pub sentiment_high_confidence: u8,
    /// Escalations below this confidence default to high priority.
    pub low_confidence_high_priority: u8,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            escalation_confidence: ESCALATION_CONFIDENCE,
            general_rule_fallback_confidence: GENERAL_RULE_FALLBACK_CONFIDENCE,
            sentiment_urgent_negative: SENTIMENT_URGENT_NEGATIVE,
            sentiment_urgent_confidence: SENTIMENT_URGENT_CONFIDENCE,
            sentiment_high_negative: SENTIMENT_HIGH_NEGATIVE,
            sentiment_high_confidence: SENTIMENT_HIGH_CONFIDENCE,
            low_confidence_high_priority: LOW_CONFIDENCE_HIGH_PRIORITY,
        }
    }
}
