//! Subscription reconciliation and cancellation
//!
//! Local subscription state is reconciled against Ezee on demand, when the
//! owner asks for it; there is no polling loop. Reconciliation only ever
//! moves a subscription along the forward edges of its state machine, so a
//! stale or wrong gateway answer can delay a transition but never undo one.
//!
//! Cancellation is gateway-first: when Ezee holds a recurring billing
//! agreement for the subscription, no local row changes until Ezee confirms
//! the agreement is gone. A local `canceled` flag with live remote billing
//! charges the user for nothing; the reverse merely shows a stale status.

use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fincast_shared::{Subscription, SubscriptionStatus, SubscriptionTier};

use crate::client::EzeeClient;
use crate::error::{BillingError, BillingResult};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, status, tier, ezee_transaction_number, \
     amount_cents, currency, billing_frequency, last_payment_at, created_at";

/// Map an Ezee status label onto the local state machine.
///
/// The match is exact and case sensitive. Ezee's labels are a fixed
/// vocabulary; anything else (new labels, typos, error text leaking into the
/// message field) maps to nothing and must not be persisted.
pub fn map_provider_status(provider: &str) -> Option<SubscriptionStatus> {
    match provider {
        "Active" => Some(SubscriptionStatus::Active),
        "Cancelled by user" => Some(SubscriptionStatus::Canceled),
        "Ended" => Some(SubscriptionStatus::Ended),
        _ => None,
    }
}

/// Result of an on-demand status reconciliation
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Local status after reconciliation
    pub status: SubscriptionStatus,
    /// Raw status label Ezee reported, when the gateway was consulted
    pub ezee_status: Option<String>,
    /// Note for the caller when no reconciliation happened
    pub message: Option<String>,
    /// The subscription row after reconciliation
    pub subscription: Subscription,
}

/// Result of a cancellation request
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub status: SubscriptionStatus,
    pub message: String,
}

/// Service for subscription status reconciliation and cancellation
pub struct SubscriptionService {
    gateway: EzeeClient,
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(gateway: EzeeClient, pool: PgPool) -> Self {
        Self { gateway, pool }
    }

    /// Load a subscription, scoped to its owner.
    ///
    /// Ownership is part of the lookup itself: asking for someone else's
    /// subscription is indistinguishable from asking for a missing one.
    pub async fn find_for_user(
        &self,
        subscription_id: Uuid,
        user_id: Uuid,
    ) -> BillingResult<Subscription> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 AND user_id = $2"
        ))
        .bind(subscription_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))
    }

    /// Reconcile a subscription's local status against Ezee and report both
    /// sides to the caller.
    pub async fn check_status(
        &self,
        subscription_id: Uuid,
        user_id: Uuid,
    ) -> BillingResult<StatusReport> {
        let subscription = self.find_for_user(subscription_id, user_id).await?;

        let Some(transaction_number) = subscription.ezee_transaction_number.clone() else {
            // Nothing to reconcile against until the first payment lands.
            return Ok(StatusReport {
                status: subscription.status,
                ezee_status: None,
                message: Some("Awaiting first payment; no gateway record yet".to_string()),
                subscription,
            });
        };

        let provider_status = self.gateway.subscription_status(&transaction_number).await?;

        let Some(mapped) = map_provider_status(&provider_status) else {
            warn!(
                subscription_id = %subscription.id,
                provider_status = %provider_status,
                "Unrecognized gateway status label, leaving local status unchanged"
            );
            return Ok(StatusReport {
                status: subscription.status,
                ezee_status: Some(provider_status),
                message: Some("Gateway reported an unrecognized status".to_string()),
                subscription,
            });
        };

        let subscription = self.apply_forward_transition(subscription, mapped).await?;

        Ok(StatusReport {
            status: subscription.status,
            ezee_status: Some(provider_status),
            message: None,
            subscription,
        })
    }

    /// Persist `next` if it differs from the stored status and the move is a
    /// legal forward edge. Anything else leaves the row untouched.
    ///
    /// The UPDATE is guarded on the status the transition was validated
    /// against; if the row changed while the gateway was being consulted
    /// (a cancel committing in that window, say), the stale write matches
    /// zero rows and the re-read row is reported instead.
    async fn apply_forward_transition(
        &self,
        mut subscription: Subscription,
        next: SubscriptionStatus,
    ) -> BillingResult<Subscription> {
        if subscription.status == next {
            return Ok(subscription);
        }

        if !subscription.status.can_transition_to(next) {
            warn!(
                subscription_id = %subscription.id,
                current = %subscription.status,
                reported = %next,
                "Skipping non-forward status transition"
            );
            return Ok(subscription);
        }

        let result =
            sqlx::query("UPDATE subscriptions SET status = $2 WHERE id = $1 AND status = $3")
                .bind(subscription.id)
                .bind(next)
                .bind(subscription.status)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            // Whatever committed during the gateway round-trip wins.
            debug!(
                subscription_id = %subscription.id,
                expected = %subscription.status,
                reported = %next,
                "Subscription changed concurrently, skipping stale transition"
            );
            return self
                .find_for_user(subscription.id, subscription.user_id)
                .await;
        }

        info!(
            subscription_id = %subscription.id,
            from = %subscription.status,
            to = %next,
            "Subscription status reconciled"
        );

        subscription.status = next;
        Ok(subscription)
    }

    /// Cancel a subscription on behalf of its owner.
    ///
    /// Closed subscriptions answer success without writing anything.
    /// Subscriptions with a gateway link are canceled at Ezee first; a
    /// transport or business failure there aborts the whole flow with local
    /// state untouched. The local writes (subscription flip plus user
    /// downgrade) commit in one transaction.
    pub async fn cancel(
        &self,
        subscription_id: Uuid,
        user_id: Uuid,
    ) -> BillingResult<CancelOutcome> {
        let subscription = self.find_for_user(subscription_id, user_id).await?;

        if subscription.status.is_terminal() {
            info!(
                subscription_id = %subscription.id,
                status = %subscription.status,
                "Cancel requested for closed subscription, nothing to do"
            );
            return Ok(CancelOutcome {
                status: subscription.status,
                message: "Subscription is already canceled".to_string(),
            });
        }

        match &subscription.ezee_transaction_number {
            None => {
                // Never billed, so there is no gateway agreement to tear down.
                info!(
                    subscription_id = %subscription.id,
                    "Canceling locally, subscription has no gateway record"
                );
            }
            Some(transaction_number) => {
                let confirmation = self.gateway.cancel_subscription(transaction_number).await?;
                info!(
                    subscription_id = %subscription.id,
                    confirmation = %confirmation,
                    "Gateway confirmed cancellation"
                );
            }
        }

        self.mark_canceled(&subscription).await?;

        Ok(CancelOutcome {
            status: SubscriptionStatus::Canceled,
            message: "Subscription canceled".to_string(),
        })
    }

    /// Flip the subscription to canceled and downgrade the owner's user row,
    /// atomically.
    async fn mark_canceled(&self, subscription: &Subscription) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE subscriptions SET status = $2 WHERE id = $1")
            .bind(subscription.id)
            .bind(SubscriptionStatus::Canceled)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE users SET tier = $2, subscription_status = $3 WHERE id = $1")
            .bind(subscription.user_id)
            .bind(SubscriptionTier::Free)
            .bind(SubscriptionStatus::Canceled)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            "Subscription canceled and user downgraded"
        );

        Ok(())
    }
}
