//! Payment record store
//!
//! Lookups and the single guarded write that settles a payment. The guard
//! (`status <> 'completed'`) is what makes `completed` terminal even when the
//! gateway delivers the same notification twice concurrently: the second
//! UPDATE matches zero rows instead of overwriting response metadata.

use sqlx::PgPool;
use uuid::Uuid;

use fincast_shared::{Payment, PaymentStatus};

use crate::error::BillingResult;

const PAYMENT_COLUMNS: &str = "id, order_id, transaction_number, status, response_code, \
     response_description, subscription_id, processed_at, created_at";

/// Outcome of a terminal write attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalWrite {
    /// The row moved to the requested terminal status
    Applied,
    /// The row was already completed; nothing was written
    AlreadyCompleted,
}

/// Store for payment records
pub struct PaymentStore {
    pool: PgPool,
}

impl PaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up a payment by the merchant-side order reference
    pub async fn find_by_order_id(&self, order_id: &str) -> BillingResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Look up a payment by the gateway-side transaction reference
    pub async fn find_by_transaction_number(
        &self,
        transaction_number: &str,
    ) -> BillingResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_number = $1"
        ))
        .bind(transaction_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Settle a payment to `completed` or `failed`, recording the gateway's
    /// response metadata and the processing time.
    ///
    /// The UPDATE is guarded on `status <> 'completed'`; zero affected rows
    /// means another delivery already completed the payment and this write
    /// was a duplicate.
    pub async fn mark_terminal(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        transaction_number: &str,
        response_code: &str,
        response_description: Option<&str>,
    ) -> BillingResult<TerminalWrite> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                transaction_number = $3,
                response_code = $4,
                response_description = $5,
                processed_at = NOW()
            WHERE id = $1
              AND status <> 'completed'
            "#,
        )
        .bind(payment_id)
        .bind(status)
        .bind(transaction_number)
        .bind(response_code)
        .bind(response_description)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(TerminalWrite::AlreadyCompleted)
        } else {
            Ok(TerminalWrite::Applied)
        }
    }
}
