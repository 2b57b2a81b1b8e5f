//! Refund and promotion arithmetic interpreted from rule configuration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundKind {
    /// `value` is a percentage of the order total.
    Percentage,
    /// `value` is a flat amount in the order currency.
    FixedAmount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundPolicy {
    pub kind: RefundKind,
    pub value: Decimal,
    #[serde(default)]
    pub min_order_total: Option<Decimal>,
    #[serde(default)]
    pub max_order_total: Option<Decimal>,
    #[serde(default)]
    pub cap: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundOutcome {
    Eligible { amount: Decimal, capped: bool },
    Ineligible { reason: String },
}

impl RefundPolicy {
    pub fn percentage(value: Decimal) -> Self {
        Self { kind: RefundKind::Percentage, value, min_order_total: None, max_order_total: None, cap: None }
    }

    pub fn fixed(value: Decimal) -> Self {
        Self { kind: RefundKind::FixedAmount, value, min_order_total: None, max_order_total: None, cap: None }
    }

    pub fn with_cap(mut self, cap: Decimal) -> Self {
        self.cap = Some(cap);
        self
    }

    pub fn with_order_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_order_total = min;
        self.max_order_total = max;
        self
    }

    pub fn calculate(&self, order_total: Decimal) -> RefundOutcome {
        if order_total <= Decimal::ZERO {
            return RefundOutcome::Ineligible {
                reason: "the order has no refundable balance".to_string(),
            };
        }
        if let Some(min) = self.min_order_total {
            if order_total < min {
                return RefundOutcome::Ineligible {
                    reason: format!("orders under ${} are not eligible for this refund", min.round_dp(2)),
                };
            }
        }
        if let Some(max) = self.max_order_total {
            if order_total > max {
                return RefundOutcome::Ineligible {
                    reason: format!("orders over ${} are not eligible for this refund", max.round_dp(2)),
                };
            }
        }

        let raw = match self.kind {
            RefundKind::Percentage => order_total * self.value / Decimal::ONE_HUNDRED,
            RefundKind::FixedAmount => self.value,
        };
        let mut amount = raw.min(order_total).max(Decimal::ZERO);

        let mut capped = false;
        if let Some(cap) = self.cap {
            if amount > cap {
                amount = cap;
                capped = true;
            }
        }

        let amount = amount.round_dp(2);
        if amount.is_zero() {
            return RefundOutcome::Ineligible {
                reason: "the configured refund works out to nothing for this order".to_string(),
            };
        }

        RefundOutcome::Eligible { amount, capped }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoAudience {
    FirstTimeCustomers,
    ReturningCustomers,
    Everyone,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoOffer {
    pub code: String,
    pub description: String,
    pub audience: PromoAudience,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl PromoOffer {
    fn applies_to(&self, first_time: bool, now: DateTime<Utc>) -> bool {
        if !self.active || self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return false;
        }
        match self.audience {
            PromoAudience::FirstTimeCustomers => first_time,
            PromoAudience::ReturningCustomers => !first_time,
            PromoAudience::Everyone => true,
        }
    }
}

/// Picks the offer for a customer with `prior_orders` completed orders.
/// Audience-specific offers win over `Everyone` offers; otherwise configuration order.
pub fn select_promo(offers: &[PromoOffer], prior_orders: u32, now: DateTime<Utc>) -> Option<&PromoOffer> {
    let first_time = prior_orders == 0;
    let eligible = offers.iter().filter(|offer| offer.applies_to(first_time, now));
    let mut fallback = None;
    for offer in eligible {
        if offer.audience != PromoAudience::Everyone {
            return Some(offer);
        }
        fallback.get_or_insert(offer);
    }
    fallback
}
