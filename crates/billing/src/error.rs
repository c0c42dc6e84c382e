//! Billing error types

use thiserror::Error;

/// Billing-specific errors
///
/// Gateway failures are split in two: [`BillingError::GatewayTransport`] is
/// HTTP-level (could not reach Ezee, or it answered outside 2xx) and
/// [`BillingError::GatewayBusiness`] is an Ezee envelope with
/// `result.status != 1`. Callers that must not proceed on either treat both
/// as failure; logs and API responses keep them distinguishable.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Request body could not be parsed: {0}")]
    MalformedBody(String),

    #[error("Missing required fields: {0}")]
    MissingFields(&'static str),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Gateway request failed with HTTP status {status}")]
    GatewayTransport { status: u16 },

    #[error("Gateway declined the operation: {0}")]
    GatewayBusiness(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        // Connect/timeout errors carry no HTTP status; those surface as 0.
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        BillingError::GatewayTransport { status }
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
