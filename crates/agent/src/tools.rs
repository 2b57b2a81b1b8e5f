//! Collaborators the engine calls out to. Every one of them may fail; callers
//! decide what failure means for the email at hand.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use replyguard_core::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order_number: String,
    pub status: String,
    pub total: Decimal,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub estimated_delivery: Option<NaiveDate>,
    /// Carrier-provided delivery prediction, when the carrier offers one.
    pub carrier_prediction: Option<String>,
}

#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn find_order(&self, tenant_id: &TenantId, order_number: &str)
        -> Result<Option<OrderDetails>>;
    async fn completed_order_count(&self, tenant_id: &TenantId, customer: &str) -> Result<u32>;
}

/// Result of a multi-step fulfillment or account workflow. `message` is what
/// the customer should be told.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait FulfillmentWorkflows: Send + Sync {
    async fn cancel_order(
        &self,
        tenant_id: &TenantId,
        order_number: &str,
        customer: &str,
    ) -> Result<WorkflowOutcome>;
    async fn change_address(
        &self,
        tenant_id: &TenantId,
        order_number: Option<&str>,
        customer: &str,
        request: &str,
    ) -> Result<WorkflowOutcome>;
}

#[async_trait]
pub trait SubscriptionManager: Send + Sync {
    async fn apply_change(
        &self,
        tenant_id: &TenantId,
        customer: &str,
        request: &str,
    ) -> Result<WorkflowOutcome>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub tenant_id: TenantId,
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    /// `Ok(false)` means the transport refused the message.
    async fn send(&self, email: &OutboundEmail) -> Result<bool>;
}

/// Stand-in for integrations that have not been wired up. Every call fails,
/// which the engine turns into fallbacks or escalations.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredIntegration;

#[async_trait]
impl OrderLookup for UnconfiguredIntegration {
    async fn find_order(
        &self,
        _tenant_id: &TenantId,
        _order_number: &str,
    ) -> Result<Option<OrderDetails>> {
        bail!("order lookup integration is not configured")
    }

    async fn completed_order_count(&self, _tenant_id: &TenantId, _customer: &str) -> Result<u32> {
        bail!("order lookup integration is not configured")
    }
}

#[async_trait]
impl FulfillmentWorkflows for UnconfiguredIntegration {
    async fn cancel_order(
        &self,
        _tenant_id: &TenantId,
        _order_number: &str,
        _customer: &str,
    ) -> Result<WorkflowOutcome> {
        bail!("fulfillment integration is not configured")
    }

    async fn change_address(
        &self,
        _tenant_id: &TenantId,
        _order_number: Option<&str>,
        _customer: &str,
        _request: &str,
    ) -> Result<WorkflowOutcome> {
        bail!("fulfillment integration is not configured")
    }
}

#[async_trait]
impl SubscriptionManager for UnconfiguredIntegration {
    async fn apply_change(
        &self,
        _tenant_id: &TenantId,
        _customer: &str,
        _request: &str,
    ) -> Result<WorkflowOutcome> {
        bail!("subscription integration is not configured")
    }
}

#[async_trait]
impl EmailDispatcher for UnconfiguredIntegration {
    async fn send(&self, _email: &OutboundEmail) -> Result<bool> {
        bail!("email dispatch is not configured")
    }
}

/// The engine's external collaborators, shared across emails.
#[derive(Clone)]
pub struct Collaborators {
    pub orders: Arc<dyn OrderLookup>,
    pub fulfillment: Arc<dyn FulfillmentWorkflows>,
    pub subscriptions: Arc<dyn SubscriptionManager>,
    pub dispatcher: Arc<dyn EmailDispatcher>,
}

impl Collaborators {
    pub fn unconfigured() -> Self {
        Self {
            orders: Arc::new(UnconfiguredIntegration),
            fulfillment: Arc::new(UnconfiguredIntegration),
            subscriptions: Arc::new(UnconfiguredIntegration),
            dispatcher: Arc::new(UnconfiguredIntegration),
        }
    }
}

#[cfg(test)]
mod tests {
    use replyguard_core::domain::tenant::TenantId;

    use super::{Collaborators, OutboundEmail};

    #[tokio::test]
    async fn unconfigured_collaborators_fail_loudly() {
        let collaborators = Collaborators::unconfigured();
        let tenant = TenantId("t1".to_string());

        assert!(collaborators.orders.find_order(&tenant, "4821").await.is_err());
        assert!(collaborators.subscriptions.apply_change(&tenant, "c@example.com", "pause").await.is_err());
        let email = OutboundEmail {
            tenant_id: tenant,
            to: "c@example.com".to_string(),
            from: "help@shop.io".to_string(),
            subject: "Re: hi".to_string(),
            html: "<p>hi</p>".to_string(),
            text: "hi".to_string(),
        };
        assert!(collaborators.dispatcher.send(&email).await.is_err());
    }
}
