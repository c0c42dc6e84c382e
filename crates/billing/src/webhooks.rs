//! Payment webhook ingestion
//!
//! Ezee posts payment notifications without signatures and in whichever body
//! format the processing bank behind it emits: multipart/form-data,
//! urlencoded, JSON, and sometimes no Content-Type at all. Parsing is
//! therefore tolerant, but the acknowledgment policy is strict the other
//! way: once a body parses and carries the required fields, the
//! notification is acknowledged with 200 no matter what we find inside,
//! because a non-2xx answer makes Ezee redeliver forever. Only genuinely
//! malformed or field-incomplete bodies earn a 400.
//!
//! The decision of what a notice does to a payment is a pure function
//! ([`decide`]); all I/O lives in [`WebhookService::ingest`].

use std::collections::HashMap;

use futures::stream;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use fincast_shared::PaymentStatus;

use crate::error::{BillingError, BillingResult};
use crate::payments::{PaymentStore, TerminalWrite};

/// A parsed payment notification.
///
/// `ResponseCode` and `TransactionNumber` are mandatory on the wire;
/// `order_id` and `ResponseDescription` are optional and empty strings are
/// treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotice {
    pub response_code: String,
    pub transaction_number: String,
    pub order_id: Option<String>,
    pub response_description: Option<String>,
}

impl PaymentNotice {
    /// Whether the gateway reports this payment as successful.
    /// `"1"` exactly; `"01"`, `"10"` and friends are failures.
    pub fn is_success(&self) -> bool {
        self.response_code == "1"
    }
}

/// What a notice does to a payment in a given state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The record is already completed; acknowledge without writing
    AlreadyCompleted,
    /// Settle the record to this terminal status
    Apply(PaymentStatus),
}

/// Decide the effect of `notice` on a payment currently in `current`.
///
/// Completed records are immutable, so any further notice for them is a
/// duplicate. Failed records may still complete: the gateway re-charges
/// declined cards and posts a fresh success notice when one goes through.
pub fn decide(current: PaymentStatus, notice: &PaymentNotice) -> Decision {
    if current.is_terminal() {
        return Decision::AlreadyCompleted;
    }
    if notice.is_success() {
        Decision::Apply(PaymentStatus::Completed)
    } else {
        Decision::Apply(PaymentStatus::Failed)
    }
}

/// Acknowledged ingestion outcomes. Every one of these answers HTTP 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The notice settled a payment to this status
    Processed(PaymentStatus),
    /// The payment was already completed; nothing was written
    Duplicate,
    /// No payment record matches the notice; nothing was written
    Ignored,
}

// =============================================================================
// Body parsing
// =============================================================================

/// Parse a raw webhook body into a [`PaymentNotice`], dispatching on the
/// request Content-Type.
///
/// With no Content-Type the body shape is sniffed: a leading `{` is tried
/// as JSON, anything else is decoded as a urlencoded form.
pub async fn parse_notice(
    content_type: Option<&str>,
    body: &[u8],
) -> BillingResult<PaymentNotice> {
    let fields = match content_type {
        Some(ct) if ct.starts_with("multipart/form-data") => parse_multipart(ct, body).await?,
        Some(ct) if ct.starts_with("application/json") => parse_json(text_body(body)?)?,
        Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
            parse_urlencoded(text_body(body)?)
        }
        _ => {
            let text = text_body(body)?;
            if text.trim_start().starts_with('{') {
                parse_json(text)?
            } else {
                parse_urlencoded(text)
            }
        }
    };

    notice_from_fields(fields)
}

fn text_body(body: &[u8]) -> BillingResult<&str> {
    std::str::from_utf8(body)
        .map_err(|_| BillingError::MalformedBody("body is not valid UTF-8".to_string()))
}

async fn parse_multipart(content_type: &str, body: &[u8]) -> BillingResult<HashMap<String, String>> {
    let boundary = content_type
        .split(';')
        .find_map(|part| {
            let part = part.trim();
            part.strip_prefix("boundary=")
                .map(|b| b.trim_matches('"').to_string())
        })
        .ok_or_else(|| BillingError::MalformedBody("multipart boundary missing".to_string()))?;

    let body = body.to_vec();
    let stream = stream::once(async move { Ok::<Vec<u8>, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BillingError::MalformedBody(format!("invalid multipart body: {e}")))?
    {
        let Some(name) = field.name().map(|s| s.to_string()) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|e| BillingError::MalformedBody(format!("unreadable multipart field: {e}")))?;
        fields.insert(name, value);
    }

    Ok(fields)
}

fn parse_json(body: &str) -> BillingResult<HashMap<String, String>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| BillingError::MalformedBody(format!("invalid JSON body: {e}")))?;

    let serde_json::Value::Object(map) = value else {
        return Err(BillingError::MalformedBody(
            "JSON body is not an object".to_string(),
        ));
    };

    let mut fields = HashMap::new();
    for (name, value) in map {
        match value {
            serde_json::Value::String(s) => {
                fields.insert(name, s);
            }
            // Some processors send ResponseCode as a bare number.
            serde_json::Value::Number(n) => {
                fields.insert(name, n.to_string());
            }
            _ => {}
        }
    }

    Ok(fields)
}

fn parse_urlencoded(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect()
}

fn notice_from_fields(mut fields: HashMap<String, String>) -> BillingResult<PaymentNotice> {
    let response_code = fields.remove("ResponseCode").filter(|v| !v.is_empty());
    let transaction_number = fields.remove("TransactionNumber").filter(|v| !v.is_empty());

    match (response_code, transaction_number) {
        (Some(response_code), Some(transaction_number)) => Ok(PaymentNotice {
            response_code,
            transaction_number,
            order_id: fields.remove("order_id").filter(|v| !v.is_empty()),
            response_description: fields.remove("ResponseDescription").filter(|v| !v.is_empty()),
        }),
        (None, Some(_)) => Err(BillingError::MissingFields("ResponseCode")),
        (Some(_), None) => Err(BillingError::MissingFields("TransactionNumber")),
        (None, None) => Err(BillingError::MissingFields("ResponseCode, TransactionNumber")),
    }
}

// =============================================================================
// Ingestion
// =============================================================================

/// Service that applies parsed payment notifications to the store
pub struct WebhookService {
    store: PaymentStore,
    pool: PgPool,
}

impl WebhookService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            store: PaymentStore::new(pool.clone()),
            pool,
        }
    }

    /// Ingest a parsed notification.
    ///
    /// The payment is located by `order_id` when the notice carries one,
    /// otherwise by `TransactionNumber`. The two lookups are exclusive: a
    /// notice with an order id that matches nothing is ignored, not retried
    /// against the transaction number.
    pub async fn ingest(&self, notice: &PaymentNotice) -> BillingResult<Ack> {
        let payment = match &notice.order_id {
            Some(order_id) => self.store.find_by_order_id(order_id).await?,
            None => {
                self.store
                    .find_by_transaction_number(&notice.transaction_number)
                    .await?
            }
        };

        let Some(payment) = payment else {
            warn!(
                order_id = notice.order_id.as_deref(),
                transaction_number = %notice.transaction_number,
                "Payment notification matches no record, acknowledging"
            );
            return Ok(Ack::Ignored);
        };

        let target = match decide(payment.status, notice) {
            Decision::AlreadyCompleted => {
                info!(
                    payment_id = %payment.id,
                    transaction_number = %notice.transaction_number,
                    "Payment already completed, acknowledging duplicate"
                );
                return Ok(Ack::Duplicate);
            }
            Decision::Apply(status) => status,
        };

        let write = self
            .store
            .mark_terminal(
                payment.id,
                target,
                &notice.transaction_number,
                &notice.response_code,
                notice.response_description.as_deref(),
            )
            .await?;

        if write == TerminalWrite::AlreadyCompleted {
            // Lost the race against a concurrent delivery of the same notice.
            info!(
                payment_id = %payment.id,
                "Payment completed concurrently, acknowledging duplicate"
            );
            return Ok(Ack::Duplicate);
        }

        info!(
            payment_id = %payment.id,
            status = %target,
            response_code = %notice.response_code,
            "Payment settled"
        );

        if target == PaymentStatus::Completed {
            if let Some(subscription_id) = payment.subscription_id {
                // The payment is settled at this point. An attach failure is
                // logged, never surfaced to the gateway; the set-once
                // COALESCE lets a later successful notice supply the number.
                if let Err(err) = self
                    .attach_transaction(subscription_id, &notice.transaction_number)
                    .await
                {
                    warn!(
                        subscription_id = %subscription_id,
                        error = %err,
                        "Failed to attach transaction number to subscription"
                    );
                }
            }
        }

        Ok(Ack::Processed(target))
    }

    /// Record a successful payment on the linked subscription.
    ///
    /// The transaction number is set-once (`COALESCE`), so a replayed
    /// success notice cannot overwrite the reference the first one attached.
    async fn attach_transaction(
        &self,
        subscription_id: Uuid,
        transaction_number: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET ezee_transaction_number = COALESCE(ezee_transaction_number, $2),
                last_payment_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(transaction_number)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
