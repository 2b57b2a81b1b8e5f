//! Sentiment verdicts and the escalation override derived from them.

use serde::{Deserialize, Serialize};

use crate::domain::intent::Priority;
use crate::thresholds::DecisionThresholds;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Mixed => "mixed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

/// All scores are percentages in `0..=100`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentScores {
    pub negative: u8,
    pub neutral: u8,
    pub positive: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub sentiment: SentimentLabel,
    pub scores: SentimentScores,
    pub confidence: u8,
}

impl SentimentAnalysis {
    pub fn negative(negative: u8, confidence: u8) -> Self {
        Self {
            sentiment: SentimentLabel::Negative,
            scores: SentimentScores {
                negative: negative.min(100),
                neutral: 0,
                positive: 100u8.saturating_sub(negative.min(100)),
            },
            confidence: confidence.min(100),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.sentiment == SentimentLabel::Negative
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentOverride {
    pub priority: Priority,
    pub reason: String,
}

/// The urgent band is checked first; scores must strictly exceed each threshold.
pub fn evaluate_override(
    analysis: &SentimentAnalysis,
    thresholds: &DecisionThresholds,
) -> Option<SentimentOverride> {
    if !analysis.is_negative() {
        return None;
    }
    let negative = analysis.scores.negative;
    let confidence = analysis.confidence;

    let priority = if negative > thresholds.sentiment_urgent_negative
        && confidence > thresholds.sentiment_urgent_confidence
    {
        Priority::Urgent
    } else if negative > thresholds.sentiment_high_negative
        && confidence > thresholds.sentiment_high_confidence
    {
        Priority::High
    } else {
        return None;
    };

    Some(SentimentOverride {
        priority,
        reason: format!(
            "strongly negative sentiment (negative {negative}%, confidence {confidence}%)"
        ),
    })
}

const ADJUSTMENT_FLOOR: u8 = 50;

/// Confidence attached to approval items. Negative scores above 50 subtract half
/// of the excess.
pub fn sentiment_adjusted_confidence(confidence: u8, analysis: Option<&SentimentAnalysis>) -> u8 {
    let confidence = confidence.min(100);
    let Some(analysis) = analysis.filter(|analysis| analysis.is_negative()) else {
        return confidence;
    };
    let excess = analysis.scores.negative.min(100).saturating_sub(ADJUSTMENT_FLOOR);
    confidence.saturating_sub(excess / 2)
}

#[cfg(test)]
mod tests {
    use super::{
        evaluate_override, sentiment_adjusted_confidence, SentimentAnalysis, SentimentLabel,
        SentimentScores,
    };
    use crate::domain::intent::Priority;
    use crate::thresholds::DecisionThresholds;

    #[test]
    fn angry_and_certain_is_urgent() {
        let verdict =
            evaluate_override(&SentimentAnalysis::negative(90, 95), &DecisionThresholds::default())
                .expect("override fires");

        assert_eq!(verdict.priority, Priority::Urgent);
        assert!(verdict.reason.contains("negative 90%"));
    }

    #[test]
    fn very_negative_with_lower_confidence_is_high() {
        let verdict =
            evaluate_override(&SentimentAnalysis::negative(88, 85), &DecisionThresholds::default())
                .expect("override fires");

        assert_eq!(verdict.priority, Priority::High);
    }

    #[test]
    fn thresholds_are_strict() {
        let thresholds = DecisionThresholds::default();

        assert!(evaluate_override(&SentimentAnalysis::negative(75, 95), &thresholds).is_none());
        assert!(evaluate_override(&SentimentAnalysis::negative(80, 90), &thresholds).is_none());
        assert!(evaluate_override(&SentimentAnalysis::negative(85, 85), &thresholds).is_none());
    }

    #[test]
    fn non_negative_sentiment_never_overrides() {
        let analysis = SentimentAnalysis {
            sentiment: SentimentLabel::Mixed,
            scores: SentimentScores { negative: 99, neutral: 0, positive: 1 },
            confidence: 99,
        };

        assert!(evaluate_override(&analysis, &DecisionThresholds::default()).is_none());
    }

    #[test]
    fn adjusted_confidence_drops_half_the_excess_negativity() {
        assert_eq!(sentiment_adjusted_confidence(88, Some(&SentimentAnalysis::negative(70, 90))), 78);
        assert_eq!(sentiment_adjusted_confidence(88, Some(&SentimentAnalysis::negative(40, 90))), 88);
        assert_eq!(sentiment_adjusted_confidence(10, Some(&SentimentAnalysis::negative(100, 99))), 0);
        assert_eq!(sentiment_adjusted_confidence(88, None), 88);
    }
}
