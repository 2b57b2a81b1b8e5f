//! Business Safety Guard.
//!
//! Every candidate reply passes through [`SafetyGuard::validate`] immediately
//! before dispatch, whatever produced it. Rules are data: a table of
//! `(id, matcher, risk, correction)` entries evaluated independently, so adding a
//! rule never touches the evaluation loop.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use replyguard_core::domain::intent::Intent;
use replyguard_core::domain::tenant::TenantSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// How a critical violation is repaired instead of sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    None,
    /// Offer the pause that was asked for and nothing else.
    PauseOnly,
}

pub struct GuardInput<'a> {
    pub response: &'a str,
    pub request: &'a str,
    pub classification: Intent,
    pub competitors: &'a [String],
}

pub struct GuardRule {
    pub id: &'static str,
    pub description: &'static str,
    pub risk: RiskLevel,
    pub correction: Correction,
    pub matches: fn(&GuardInput<'_>) -> bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub description: String,
    pub risk: RiskLevel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub violations: Vec<Violation>,
    pub risk_level: Option<RiskLevel>,
    pub corrected_response: Option<String>,
}

/// What may actually leave the building.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Send { body: String, corrected: bool },
    Block,
}

impl SafetyVerdict {
    pub fn decision(&self, original: &str) -> GuardDecision {
        if let Some(corrected) = &self.corrected_response {
            return GuardDecision::Send { body: corrected.clone(), corrected: true };
        }
        if self.safe {
            GuardDecision::Send { body: original.to_string(), corrected: false }
        } else {
            GuardDecision::Block
        }
    }

    pub fn rule_ids(&self) -> String {
        self.violations.iter().map(|violation| violation.rule_id.as_str()).collect::<Vec<_>>().join(",")
    }
}

/// Request-scoped guard. Competitor names and the signature come from tenant settings.
pub struct SafetyGuard {
    rules: Vec<GuardRule>,
    competitors: Vec<String>,
    signature: String,
}

impl SafetyGuard {
    pub fn for_tenant(settings: &TenantSettings) -> Self {
        Self::with_rules(standard_rules(), settings)
    }

    pub fn with_rules(rules: Vec<GuardRule>, settings: &TenantSettings) -> Self {
        Self {
            rules,
            competitors: settings.competitors.clone(),
            signature: settings.support_signature.clone(),
        }
    }

    pub fn validate(
        &self,
        candidate_response: &str,
        customer_request: &str,
        classification: Intent,
    ) -> SafetyVerdict {
        let input = GuardInput {
            response: candidate_response,
            request: customer_request,
            classification,
            competitors: &self.competitors,
        };

        let triggered = self.rules.iter().filter(|rule| (rule.matches)(&input)).collect::<Vec<_>>();
        let risk_level = triggered.iter().map(|rule| rule.risk).max();

        let corrected_response = triggered
            .iter()
            .filter(|rule| rule.risk == RiskLevel::Critical)
            .find_map(|rule| self.correct(rule.correction));

        SafetyVerdict {
            safe: risk_level.map_or(true, |risk| risk < RiskLevel::High),
            violations: triggered
                .iter()
                .map(|rule| Violation {
                    rule_id: rule.id.to_string(),
                    description: rule.description.to_string(),
                    risk: rule.risk,
                })
                .collect(),
            risk_level,
            corrected_response,
        }
    }

    fn correct(&self, correction: Correction) -> Option<String> {
        match correction {
            Correction::None => None,
            Correction::PauseOnly => Some(format!(
                "Hi,\n\nThanks for reaching out. We'd be happy to pause your subscription for you. \
                 Just reply with how long you'd like the pause to last and we'll take care of it.\n\n{}",
                self.signature
            )),
        }
    }
}

pub fn standard_rules() -> Vec<GuardRule> {
    vec![
        GuardRule {
            id: "cancellation_offered_for_pause",
            description: "offers permanent cancellation when the customer asked to pause",
            risk: RiskLevel::Critical,
            correction: Correction::PauseOnly,
            matches: cancellation_offered_for_pause,
        },
        GuardRule {
            id: "unprompted_downgrade",
            description: "suggests a cheaper plan the customer did not ask about",
            risk: RiskLevel::High,
            correction: Correction::None,
            matches: unprompted_downgrade,
        },
        GuardRule {
            id: "unauthorized_discount",
            description: "offers a discount outside a discount or refund conversation",
            risk: RiskLevel::High,
            correction: Correction::None,
            matches: unauthorized_discount,
        },
        GuardRule {
            id: "negative_product_disclosure",
            description: "volunteers negative product attributes",
            risk: RiskLevel::High,
            correction: Correction::None,
            matches: negative_product_disclosure,
        },
        GuardRule {
            id: "unrequested_refund",
            description: "offers a refund the customer never asked for",
            risk: RiskLevel::High,
            correction: Correction::None,
            matches: unrequested_refund,
        },
        GuardRule {
            id: "competitor_mentioned",
            description: "names a competitor",
            risk: RiskLevel::High,
            correction: Correction::None,
            matches: competitor_mentioned,
        },
        GuardRule {
            id: "policy_overdisclosure",
            description: "spells out policy limitations the customer did not ask about",
            risk: RiskLevel::Medium,
            correction: Correction::None,
            matches: policy_overdisclosure,
        },
    ]
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static PATTERN: OnceLock<Regex> = OnceLock::new();
            PATTERN.get_or_init(|| Regex::new($re).expect("guard pattern must compile"))
        }
    };
}

pattern!(pause_re, r"(?i)\b(pause|paus(ed|ing)|skip|hold off|put on hold|break)\b");
pattern!(
    permanent_cancel_re,
    r"(?i)\bcancel\w*\b[^.!?\n]{0,80}\b(permanent\w*|for good|entirely|altogether|forever)\b|\b(permanent\w*|for good)\b[^.!?\n]{0,80}\bcancel"
);
pattern!(
    downgrade_re,
    r"(?i)\b(cheaper|less expensive|lower[- ]priced|downgrade\w*|basic plan|budget plan|starter plan)\b"
);
pattern!(price_talk_re, r"(?i)\b(cheap\w*|price\w*|cost\w*|expensive|afford\w*|downgrade\w*|budget|plan)\b");
pattern!(
    discount_offer_re,
    r"(?i)\b\d{1,2}\s?%\s?off\b|\b(promo|discount|coupon) code\b|\buse code\b"
);
pattern!(discount_talk_re, r"(?i)\b(discount|promo|coupon|code|deal|sale|offer)\w*\b");
pattern!(
    negative_product_re,
    r"(?i)\b(defect\w*|recall\w*|contaminat\w*|side effects?|known (issue|problem)s?|poor quality|low quality|complaints? about|tends to (break|fail|leak))\b"
);
pattern!(refund_offer_re, r"(?i)\b(refund\w*|money back|reimburse\w*)\b");
pattern!(
    refund_talk_re,
    r"(?i)\b(refund\w*|money back|reimburs\w*|charged?|charges|overcharg\w*|credit|billed|return\w*|damaged|broken|wrong item)\b"
);
pattern!(competitor_word_re, r"(?i)\bcompetitors?\b");
pattern!(
    policy_limit_re,
    r"(?i)\b(we (cannot|can't|do not|don't) (guarantee|accept|offer|allow)|no longer (offer|accept|allow)|not eligible for any|our policy (does not|doesn't) allow|exception to (our|the) policy|loophole)\b"
);

/// Only a request that actually mentions pausing can be answered with the
/// pause-only correction. A plan switch or other subscription change is not.
fn cancellation_offered_for_pause(input: &GuardInput<'_>) -> bool {
    pause_re().is_match(input.request)
        && pause_re().is_match(input.response)
        && permanent_cancel_re().is_match(input.response)
}

fn unprompted_downgrade(input: &GuardInput<'_>) -> bool {
    downgrade_re().is_match(input.response) && !price_talk_re().is_match(input.request)
}

fn unauthorized_discount(input: &GuardInput<'_>) -> bool {
    !matches!(input.classification, Intent::DiscountInquiry | Intent::PromoRefund)
        && discount_offer_re().is_match(input.response)
        && !discount_talk_re().is_match(input.request)
}

fn negative_product_disclosure(input: &GuardInput<'_>) -> bool {
    negative_product_re().is_match(input.response) && !negative_product_re().is_match(input.request)
}

fn unrequested_refund(input: &GuardInput<'_>) -> bool {
    !matches!(input.classification, Intent::PromoRefund | Intent::PaymentIssue | Intent::ReturnRequest)
        && refund_offer_re().is_match(input.response)
        && !refund_talk_re().is_match(input.request)
}

fn competitor_mentioned(input: &GuardInput<'_>) -> bool {
    if competitor_word_re().is_match(input.response) {
        return true;
    }
    let response = input.response.to_lowercase();
    input
        .competitors
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .any(|name| contains_word(&response, &name))
}

fn policy_overdisclosure(input: &GuardInput<'_>) -> bool {
    policy_limit_re().is_match(input.response)
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use replyguard_core::domain::intent::Intent;
    use replyguard_core::domain::tenant::{TenantId, TenantSettings};

    use super::{standard_rules, GuardDecision, GuardInput, RiskLevel, SafetyGuard};

    fn guard() -> SafetyGuard {
        let mut settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        settings.competitors = vec!["BeanBox".to_string()];
        settings.support_signature = "The Brewly Team".to_string();
        SafetyGuard::for_tenant(&settings)
    }

    #[test]
    fn permanent_cancellation_on_pause_request_is_critical_and_corrected() {
        let verdict = guard().validate(
            "We can pause your plan, or if you prefer we can cancel your subscription permanently.",
            "Can I pause my subscription for a month?",
            Intent::SubscriptionChanges,
        );

        assert!(!verdict.safe);
        assert_eq!(verdict.risk_level, Some(RiskLevel::Critical));
        let corrected = verdict.corrected_response.clone().expect("pause-only correction");
        assert!(corrected.contains("pause"));
        assert!(!corrected.to_lowercase().contains("cancel"));
        assert!(corrected.contains("The Brewly Team"));
        assert!(matches!(verdict.decision("original"), GuardDecision::Send { corrected: true, .. }));
    }

    #[test]
    fn customer_asking_to_cancel_is_not_a_pause_violation() {
        let verdict = guard().validate(
            "Your subscription has been cancelled permanently. If you ever want a pause instead, let us know.",
            "Please cancel my account for good.",
            Intent::AccountCancellation,
        );
        assert!(verdict.violations.iter().all(|v| v.rule_id != "cancellation_offered_for_pause"));
    }

    #[test]
    fn plan_switch_is_not_corrected_into_a_pause() {
        let response = "Done! You're on the annual plan now. If you ever need a break you can pause, \
                        or cancel permanently from your account page.";
        let verdict = guard().validate(
            response,
            "Please switch me to the annual plan.",
            Intent::SubscriptionChanges,
        );

        assert!(verdict.violations.iter().all(|v| v.rule_id != "cancellation_offered_for_pause"));
        assert!(verdict.corrected_response.is_none());
        assert!(matches!(verdict.decision(response), GuardDecision::Send { corrected: false, .. }));
    }

    #[test]
    fn clean_order_status_reply_is_safe() {
        let verdict = guard().validate(
            "Your order #4821 shipped yesterday via UPS and should arrive Friday.",
            "Where is order #4821?",
            Intent::OrderStatus,
        );

        assert!(verdict.safe);
        assert!(verdict.violations.is_empty());
        assert_eq!(verdict.risk_level, None);
        assert_eq!(
            verdict.decision("x"),
            GuardDecision::Send { body: "x".to_string(), corrected: false }
        );
    }

    #[test]
    fn high_risk_violations_block_dispatch() {
        let cases = [
            ("You might prefer our cheaper basic plan.", "How do I update my card?", Intent::PaymentIssue),
            ("Use code SAVE20 for 20% off!", "Where is my parcel?", Intent::OrderStatus),
            ("That batch had a known issue with leaking lids.", "How do I descale?", Intent::ProductQuestion),
            ("We've issued a refund to your card.", "Can I change my address?", Intent::AddressChange),
            ("Unlike BeanBox, we roast weekly.", "How fresh is the coffee?", Intent::ProductQuestion),
        ];

        for (response, request, intent) in cases {
            let verdict = guard().validate(response, request, intent);
            assert!(!verdict.safe, "expected block for: {response}");
            assert_eq!(verdict.risk_level, Some(RiskLevel::High));
            assert_eq!(verdict.decision(response), GuardDecision::Block);
        }
    }

    #[test]
    fn refund_talk_in_refund_conversations_is_allowed() {
        let verdict = guard().validate(
            "We've issued a refund of $5.00 for order #4821.",
            "I was overcharged on order #4821",
            Intent::PromoRefund,
        );
        assert!(verdict.safe);
    }

    #[test]
    fn medium_risk_is_logged_but_allowed() {
        let verdict = guard().validate(
            "We no longer accept returns on opened bags, but we can replace it.",
            "My bag arrived torn.",
            Intent::ReturnRequest,
        );

        assert!(verdict.safe);
        assert_eq!(verdict.risk_level, Some(RiskLevel::Medium));
        assert_eq!(verdict.rule_ids(), "policy_overdisclosure");
    }

    #[test]
    fn rule_table_ids_are_unique() {
        let rules = standard_rules();
        let mut ids = rules.iter().map(|rule| rule.id).collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn rules_can_be_evaluated_in_isolation() {
        let rules = standard_rules();
        let competitors = vec!["BeanBox".to_string()];
        let input = GuardInput {
            response: "beanboxes are great",
            request: "hi",
            classification: Intent::General,
            competitors: &competitors,
        };
        let competitor = rules.iter().find(|rule| rule.id == "competitor_mentioned").expect("rule");
        assert!(!(competitor.matches)(&input));
    }
}
