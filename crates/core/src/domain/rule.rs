use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::intent::Intent;
use crate::domain::tenant::TenantId;
use crate::offers::{PromoOffer, RefundPolicy};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStrategy {
    /// Run the classification-specific handler.
    Handler,
    /// Render `RuleConfig::template`.
    Template,
}

impl ResponseStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handler => "handler",
            Self::Template => "template",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "handler" => Some(Self::Handler),
            "template" => Some(Self::Template),
            _ => None,
        }
    }
}

/// Data interpreted by the handlers. Stored as JSON alongside the rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub refund: Option<RefundPolicy>,
    #[serde(default)]
    pub promotions: Vec<PromoOffer>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub tenant_id: TenantId,
    pub name: String,
    pub classification: Intent,
    pub active: bool,
    pub requires_approval: bool,
    pub strategy: ResponseStrategy,
    pub config: RuleConfig,
    pub trigger_count: u32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationRule {
    pub fn builder(tenant_id: TenantId, classification: Intent) -> AutomationRuleBuilder {
        AutomationRuleBuilder::new(tenant_id, classification)
    }
}

pub struct AutomationRuleBuilder {
    rule: AutomationRule,
}

impl AutomationRuleBuilder {
    fn new(tenant_id: TenantId, classification: Intent) -> Self {
        let now = Utc::now();
        Self {
            rule: AutomationRule {
                id: RuleId::generate(),
                tenant_id,
                name: format!("{} auto-reply", classification.as_str()),
                classification,
                active: true,
                requires_approval: false,
                strategy: ResponseStrategy::Handler,
                config: RuleConfig::default(),
                trigger_count: 0,
                last_triggered_at: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.rule.id = RuleId(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.rule.name = name.into();
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.rule.active = active;
        self
    }

    pub fn requires_approval(mut self, requires_approval: bool) -> Self {
        self.rule.requires_approval = requires_approval;
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.rule.strategy = ResponseStrategy::Template;
        self.rule.config.template = Some(template.into());
        self
    }

    pub fn refund(mut self, policy: RefundPolicy) -> Self {
        self.rule.config.refund = Some(policy);
        self
    }

    pub fn promotion(mut self, offer: PromoOffer) -> Self {
        self.rule.config.promotions.push(offer);
        self
    }

    pub fn build(self) -> AutomationRule {
        self.rule
    }
}
