//! Common types used across Fincast
//!
//! Status enums are stored as lowercase VARCHAR and decoded directly by sqlx;
//! the transition rules that keep payment and subscription rows consistent
//! live here so every crate enforces the same state machines.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle of a payment record.
///
/// `pending` rows are created when a payment is initiated and settle to
/// `completed` or `failed` when the gateway posts its notification. A
/// `failed` payment may still complete later (the gateway retries declined
/// cards), so `failed` is not terminal. `completed` is: once a payment
/// completes, nothing may modify it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl PaymentStatus {
    /// Whether this record may never be modified again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// Lifecycle of a subscription.
///
/// Transitions are forward-only: `pending → active`, `pending → canceled`,
/// `active → canceled`, `active → ended`. Gateway reconciliation must never
/// move a subscription backwards (e.g. a stale "Active" reply cannot revive
/// a canceled subscription).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Canceled,
    Ended,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SubscriptionStatus {
    /// Whether `next` is a legal forward transition from this status
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Canceled)
                | (Self::Active, Self::Canceled)
                | (Self::Active, Self::Ended)
        )
    }

    /// Whether this status has no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Ended)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Canceled => write!(f, "canceled"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "canceled" => Ok(Self::Canceled),
            "ended" => Ok(Self::Ended),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

/// Subscription tier for billing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Business,
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        Self::Free
    }
}

impl SubscriptionTier {
    /// Whether this tier is billed through the gateway
    pub fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Business => write!(f, "business"),
        }
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "business" => Ok(Self::Business),
            _ => Err(format!("Invalid subscription tier: {}", s)),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// User model
///
/// `tier` and `subscription_status` mirror the user's current subscription so
/// entitlement checks never need a join. The cancellation flow is the only
/// writer of these mirrors in this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub tier: SubscriptionTier,
    pub subscription_status: Option<SubscriptionStatus>,
    pub created_at: OffsetDateTime,
}

/// Subscription model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub tier: SubscriptionTier,
    /// Gateway-side transaction reference, attached by the first successful
    /// payment notification. Absent until then.
    pub ezee_transaction_number: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub billing_frequency: String,
    pub last_payment_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl Subscription {
    /// Whether the gateway knows about this subscription yet
    pub fn has_gateway_link(&self) -> bool {
        self.ezee_transaction_number.is_some()
    }
}

/// Payment record model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    /// Merchant-side reference sent to the gateway when the payment was created
    pub order_id: Option<String>,
    /// Gateway-side reference, learned from the payment notification
    pub transaction_number: Option<String>,
    pub status: PaymentStatus,
    pub response_code: Option<String>,
    pub response_description: Option<String>,
    pub subscription_id: Option<Uuid>,
    pub processed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Tests
// =============================================================================
