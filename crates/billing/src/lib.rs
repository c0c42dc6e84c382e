//! Fincast Billing
//!
//! Payment lifecycle for the Ezee gateway: webhook ingestion into the
//! payment record store, on-demand subscription reconciliation, and the
//! cancellation flow. Everything here is request-driven; no background
//! tasks, no timers.

pub mod client;
pub mod error;
pub mod payments;
pub mod subscriptions;
pub mod webhooks;

pub use client::{EzeeClient, EzeeConfig, EzeeResponse, EzeeResult};
pub use error::{BillingError, BillingResult};
pub use payments::{PaymentStore, TerminalWrite};
pub use subscriptions::{map_provider_status, CancelOutcome, StatusReport, SubscriptionService};
pub use webhooks::{decide, parse_notice, Ack, Decision, PaymentNotice, WebhookService};

use sqlx::PgPool;

/// The billing services behind a single constructor, shared via app state
pub struct BillingService {
    pub webhooks: WebhookService,
    pub subscriptions: SubscriptionService,
}

impl BillingService {
    pub fn new(gateway: EzeeClient, pool: PgPool) -> Self {
        Self {
            webhooks: WebhookService::new(pool.clone()),
            subscriptions: SubscriptionService::new(gateway, pool),
        }
    }
}
