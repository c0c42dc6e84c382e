//! Ezee gateway client
//!
//! Ezee exposes a form-POST API authenticated by two static headers
//! (`licence_key` and `site`) and answers every call with the same JSON
//! envelope: `{"result": {"status": 1, "message": "..."}}`. A `status` of 1
//! means the operation succeeded and `message` carries the payload (for the
//! status endpoint, the remote subscription state). Any other `status` is a
//! business-level refusal.

use serde::Deserialize;

use crate::error::{BillingError, BillingResult};

const DEFAULT_BASE_URL: &str = "https://sandbox.ezeepay.io";

/// Configuration for the Ezee gateway
#[derive(Debug, Clone)]
pub struct EzeeConfig {
    /// Gateway base URL, no trailing slash
    pub base_url: String,
    /// Merchant licence key, sent as the `licence_key` header
    pub licence_key: String,
    /// Site identifier, sent as the `site` header
    pub site: String,
}

impl EzeeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            base_url: std::env::var("EZEE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            licence_key: std::env::var("EZEE_LICENCE_KEY")
                .map_err(|_| BillingError::Config("EZEE_LICENCE_KEY not set".to_string()))?,
            site: std::env::var("EZEE_SITE")
                .map_err(|_| BillingError::Config("EZEE_SITE not set".to_string()))?,
        })
    }
}

/// Response envelope returned by every Ezee endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EzeeResponse {
    pub result: EzeeResult,
}

/// Inner result of an Ezee response
#[derive(Debug, Clone, Deserialize)]
pub struct EzeeResult {
    pub status: i64,
    #[serde(default)]
    pub message: String,
}

impl EzeeResponse {
    /// Split the envelope into success payload vs business refusal.
    ///
    /// Transport already succeeded by the time an envelope exists; a non-1
    /// `status` here is Ezee itself declining the operation.
    pub fn into_business_result(self) -> BillingResult<String> {
        if self.result.status == 1 {
            Ok(self.result.message)
        } else {
            let message = if self.result.message.is_empty() {
                format!("gateway status {}", self.result.status)
            } else {
                self.result.message
            };
            Err(BillingError::GatewayBusiness(message))
        }
    }
}

/// HTTP client for the Ezee gateway
#[derive(Debug, Clone)]
pub struct EzeeClient {
    http: reqwest::Client,
    config: EzeeConfig,
}

impl EzeeClient {
    pub fn new(config: EzeeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Create a client configured from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(EzeeConfig::from_env()?))
    }

    /// POST a form to an Ezee endpoint and decode the response envelope.
    ///
    /// Fields with a `None` value are omitted from the body entirely; Ezee
    /// treats an empty string as a present-but-blank value, which is never
    /// what we mean.
    pub async fn send(
        &self,
        path: &str,
        fields: &[(&str, Option<&str>)],
    ) -> BillingResult<EzeeResponse> {
        let form: Vec<(&str, &str)> = fields
            .iter()
            .filter_map(|(name, value)| value.map(|v| (*name, v)))
            .collect();

        let response = self
            .http
            .post(format!("{}{}", self.config.base_url, path))
            .header("licence_key", &self.config.licence_key)
            .header("site", &self.config.site)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(path, status = status.as_u16(), "Ezee request failed");
            return Err(BillingError::GatewayTransport {
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    /// Query the remote state of a subscription.
    ///
    /// On success the returned string is Ezee's status label for the
    /// subscription (e.g. "Active", "Cancelled by user", "Ended").
    pub async fn subscription_status(&self, transaction_number: &str) -> BillingResult<String> {
        self.send(
            "/v1/subscription/status/",
            &[("TransactionNumber", Some(transaction_number))],
        )
        .await?
        .into_business_result()
    }

    /// Cancel a subscription at the gateway
    pub async fn cancel_subscription(&self, transaction_number: &str) -> BillingResult<String> {
        self.send(
            "/v1/subscription/cancel/",
            &[("TransactionNumber", Some(transaction_number))],
        )
        .await?
        .into_business_result()
    }
}
