//! Payment gateway webhook endpoint
//!
//! Ezee redelivers any notification that is not answered with a 2xx, so the
//! acknowledgment policy is deliberately lopsided: only a body that cannot
//! be parsed into a notice earns a 400. Everything after a successful parse,
//! including storage failures, is acknowledged with a plain `OK` and left to
//! logs and reconciliation.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
};
use tracing::{error, info};

use fincast_billing::{parse_notice, Ack};

use crate::state::AppState;

/// Receive a payment notification from Ezee.
///
/// Answers plain text: `400` with the parse error for malformed or
/// field-incomplete bodies, `200 OK` for everything else.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    let notice = match parse_notice(content_type, &body).await {
        Ok(notice) => notice,
        Err(err) => {
            info!(error = %err, "Rejecting unparseable payment notification");
            return (StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    match state.billing.webhooks.ingest(&notice).await {
        Ok(Ack::Processed(status)) => {
            info!(
                transaction_number = %notice.transaction_number,
                status = %status,
                "Payment notification processed"
            );
        }
        Ok(Ack::Duplicate) => {
            info!(
                transaction_number = %notice.transaction_number,
                "Duplicate payment notification acknowledged"
            );
        }
        Ok(Ack::Ignored) => {
            info!(
                transaction_number = %notice.transaction_number,
                "Unmatched payment notification acknowledged"
            );
        }
        Err(err) => {
            // Parsed but not applied; still acknowledged, per the policy above.
            error!(
                transaction_number = %notice.transaction_number,
                error = %err,
                "Failed to apply payment notification"
            );
        }
    }

    (StatusCode::OK, "OK".to_string())
}
