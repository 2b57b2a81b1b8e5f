use replyguard_core::config::LoadOptions;
use replyguard_core::domain::intent::Intent;
use replyguard_core::domain::rule::AutomationRule;
use replyguard_core::domain::tenant::{TenantId, TenantSettings};
use replyguard_core::offers::RefundPolicy;
use replyguard_db::repositories::{
    RepositoryError, RuleRepository, SqlRuleRepository, SqlTenantSettingsRepository,
    TenantSettingsRepository,
};
use replyguard_db::DbPool;
use rust_decimal::Decimal;

use crate::commands::{with_migrated_pool, CommandResult};

const DEFAULT_REFUND_PERCENT: i64 = 10;
const DEFAULT_REFUND_CAP: i64 = 25;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedSummary {
    pub settings_created: bool,
    pub rules_created: Vec<Intent>,
    pub rules_skipped: Vec<Intent>,
}

pub fn run(options: &LoadOptions, tenant: &str, company_name: Option<&str>) -> CommandResult {
    let tenant = tenant.trim();
    if tenant.is_empty() {
        return CommandResult::failure("seed", "invalid_input", "--tenant must not be empty", 2);
    }
    let tenant_id = TenantId(tenant.to_string());

    let seeded = with_migrated_pool("seed", options, |pool| async move {
        seed_tenant(&pool, &tenant_id, company_name)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))
    });

    match seeded {
        Ok(summary) => CommandResult::success("seed", describe(tenant, &summary)),
        Err(failure) => failure,
    }
}

/// Idempotent: existing settings are kept and intents that already have a rule are skipped.
pub async fn seed_tenant(
    pool: &DbPool,
    tenant_id: &TenantId,
    company_name: Option<&str>,
) -> Result<SeedSummary, RepositoryError> {
    let settings_repo = SqlTenantSettingsRepository::new(pool.clone());
    let settings_created = match settings_repo.find(tenant_id).await? {
        Some(_) => false,
        None => {
            let mut settings = TenantSettings::defaults_for(tenant_id.clone());
            if let Some(name) = company_name.map(str::trim).filter(|name| !name.is_empty()) {
                settings.company_name = name.to_string();
            }
            settings_repo.save(settings).await?;
            true
        }
    };

    let rules = SqlRuleRepository::new(pool.clone());
    let existing = rules.list_for_tenant(tenant_id).await?;
    let mut summary = SeedSummary { settings_created, rules_created: Vec::new(), rules_skipped: Vec::new() };

    for rule in default_rules(tenant_id) {
        let intent = rule.classification;
        if existing.iter().any(|current| current.classification == intent) {
            summary.rules_skipped.push(intent);
            continue;
        }
        rules.save(rule).await?;
        summary.rules_created.push(intent);
    }

    Ok(summary)
}

/// The escalation family never consults rules, so it gets none.
pub fn default_rules(tenant_id: &TenantId) -> Vec<AutomationRule> {
    Intent::ALL
        .iter()
        .copied()
        .filter(|intent| !matches!(intent, Intent::Escalation | Intent::HumanEscalation))
        .map(|intent| {
            let mut builder = AutomationRule::builder(tenant_id.clone(), intent)
                .id(format!("{}-{}", tenant_id.0, intent.as_str()))
                .requires_approval(needs_review(intent));
            if intent == Intent::PromoRefund {
                builder = builder.refund(
                    RefundPolicy::percentage(Decimal::new(DEFAULT_REFUND_PERCENT, 0))
                        .with_cap(Decimal::new(DEFAULT_REFUND_CAP, 0)),
                );
            }
            builder.build()
        })
        .collect()
}

/// Replies that move money or change an order or account go to a reviewer first.
fn needs_review(intent: Intent) -> bool {
    matches!(
        intent,
        Intent::PromoRefund
            | Intent::OrderCancellation
            | Intent::AccountCancellation
            | Intent::SubscriptionChanges
            | Intent::AddressChange
    )
}

fn describe(tenant: &str, summary: &SeedSummary) -> String {
    let names = |intents: &[Intent]| {
        if intents.is_empty() {
            "none".to_string()
        } else {
            intents.iter().map(Intent::as_str).collect::<Vec<_>>().join(", ")
        }
    };
    format!(
        "seeded tenant {tenant}: settings {}, rules created: {}, rules kept: {}",
        if summary.settings_created { "created" } else { "kept" },
        names(&summary.rules_created),
        names(&summary.rules_skipped),
    )
}
