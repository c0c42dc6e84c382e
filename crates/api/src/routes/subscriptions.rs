//! Subscription status and cancellation endpoints

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use fincast_shared::{Subscription, SubscriptionStatus, SubscriptionTier};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Request body shared by the status and cancel endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub subscription_id: String,
}

impl SubscriptionRequest {
    fn parsed_id(&self) -> ApiResult<Uuid> {
        Uuid::parse_str(&self.subscription_id)
            .map_err(|_| ApiError::BadRequest("subscriptionId must be a valid UUID".to_string()))
    }
}

/// Subscription fields exposed to the owner
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub id: Uuid,
    pub status: SubscriptionStatus,
    pub tier: SubscriptionTier,
    pub amount_cents: i64,
    pub currency: String,
    pub billing_frequency: String,
    pub last_payment_at: Option<String>,
    pub created_at: String,
}

impl From<Subscription> for SubscriptionSummary {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            status: sub.status,
            tier: sub.tier,
            amount_cents: sub.amount_cents,
            currency: sub.currency,
            billing_frequency: sub.billing_frequency,
            last_payment_at: sub
                .last_payment_at
                .map(|t| t.format(&Rfc3339).unwrap_or_default()),
            created_at: sub.created_at.format(&Rfc3339).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub status: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ezee_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub subscription: SubscriptionSummary,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub status: SubscriptionStatus,
    pub message: String,
}

/// Reconcile a subscription against the gateway and return its status
pub async fn status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<SubscriptionRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let subscription_id = req.parsed_id()?;

    let report = state
        .billing
        .subscriptions
        .check_status(subscription_id, auth_user.user_id)
        .await?;

    Ok(Json(StatusResponse {
        success: true,
        status: report.status,
        ezee_status: report.ezee_status,
        message: report.message,
        subscription: report.subscription.into(),
    }))
}

/// Cancel a subscription at the gateway and locally
pub async fn cancel(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<SubscriptionRequest>,
) -> ApiResult<Json<CancelResponse>> {
    let subscription_id = req.parsed_id()?;

    let outcome = state
        .billing
        .subscriptions
        .cancel(subscription_id, auth_user.user_id)
        .await?;

    Ok(Json(CancelResponse {
        success: true,
        status: outcome.status,
        message: outcome.message,
    }))
}
