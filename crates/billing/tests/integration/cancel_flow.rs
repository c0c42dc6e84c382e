//! Cancellation and status reconciliation against a mocked gateway

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use fincast_billing::BillingError;
use fincast_shared::SubscriptionStatus;

use crate::helpers;

async fn subscription_status(pool: &sqlx::PgPool, subscription_id: Uuid) -> String {
    sqlx::query_scalar("SELECT status FROM subscriptions WHERE id = $1")
        .bind(subscription_id)
        .fetch_one(pool)
        .await
        .expect("Failed to fetch subscription status")
}

async fn user_row(pool: &sqlx::PgPool, user_id: Uuid) -> (String, Option<String>) {
    sqlx::query_as("SELECT tier, subscription_status FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("Failed to fetch user row")
}

// ============================================================================
// Test Cases: Cancellation
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_cancel_without_gateway_link_is_local_only() {
    // Given: an active subscription that was never billed
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    let gateway_mock = server
        .mock("POST", "/v1/subscription/cancel/")
        .expect(0)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "active", None).await;

    // When: the owner cancels
    let outcome = billing
        .subscriptions
        .cancel(subscription_id, user_id)
        .await
        .expect("Cancel should succeed");

    // Then: local state flips without a gateway call
    assert_eq!(outcome.status, SubscriptionStatus::Canceled);
    assert_eq!(outcome.message, "Subscription canceled");
    assert_eq!(subscription_status(&pool, subscription_id).await, "canceled");

    let (tier, user_status) = user_row(&pool, user_id).await;
    assert_eq!(tier, "free");
    assert_eq!(user_status.as_deref(), Some("canceled"));

    gateway_mock.assert_async().await;

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_cancel_closed_subscription_is_idempotent() {
    // Given: a subscription that is already canceled, owner still on a paid
    // tier so any stray write would be visible
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    let gateway_mock = server
        .mock("POST", "/v1/subscription/cancel/")
        .expect(0)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "canceled", Some("TXN-closed")).await;

    // When: cancel is requested again
    let outcome = billing
        .subscriptions
        .cancel(subscription_id, user_id)
        .await
        .expect("Repeat cancel should succeed");

    // Then: success with zero writes anywhere
    assert_eq!(outcome.status, SubscriptionStatus::Canceled);
    assert_eq!(outcome.message, "Subscription is already canceled");

    let (tier, user_status) = user_row(&pool, user_id).await;
    assert_eq!(tier, "pro", "Repeat cancel must not touch the user row");
    assert_eq!(user_status, None);

    gateway_mock.assert_async().await;

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_cancel_gateway_business_failure_writes_nothing() {
    // Given: a gateway-linked subscription and a gateway that refuses
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/subscription/cancel/")
        .with_status(200)
        .with_body(r#"{"result":{"status":0,"message":"Transaction not found"}}"#)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "active", Some("TXN-refused")).await;

    // When: the owner cancels
    let err = billing
        .subscriptions
        .cancel(subscription_id, user_id)
        .await
        .expect_err("Cancel should propagate the refusal");

    // Then: business refusal surfaces and local state is untouched
    assert!(
        matches!(err, BillingError::GatewayBusiness(ref m) if m == "Transaction not found")
    );
    assert_eq!(subscription_status(&pool, subscription_id).await, "active");

    let (tier, _) = user_row(&pool, user_id).await;
    assert_eq!(tier, "pro");

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_cancel_gateway_transport_failure_writes_nothing() {
    // Given: a gateway-linked subscription and a gateway answering 502
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/subscription/cancel/")
        .with_status(502)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "active", Some("TXN-down")).await;

    // When: the owner cancels
    let err = billing
        .subscriptions
        .cancel(subscription_id, user_id)
        .await
        .expect_err("Cancel should propagate the transport failure");

    // Then: transport failure surfaces and local state is untouched
    assert!(matches!(err, BillingError::GatewayTransport { status: 502 }));
    assert_eq!(subscription_status(&pool, subscription_id).await, "active");

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_cancel_with_gateway_link_downgrades_user() {
    // Given: a gateway-linked active subscription
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    let gateway_mock = server
        .mock("POST", "/v1/subscription/cancel/")
        .match_body(mockito::Matcher::UrlEncoded(
            "TransactionNumber".into(),
            "TXN-live".into(),
        ))
        .with_status(200)
        .with_body(r#"{"result":{"status":1,"message":"Cancelled"}}"#)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "business").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "active", Some("TXN-live")).await;

    // When: the owner cancels
    let outcome = billing
        .subscriptions
        .cancel(subscription_id, user_id)
        .await
        .expect("Cancel should succeed");

    // Then: the gateway was told first, then both local rows changed together
    assert_eq!(outcome.status, SubscriptionStatus::Canceled);
    assert_eq!(subscription_status(&pool, subscription_id).await, "canceled");

    let (tier, user_status) = user_row(&pool, user_id).await;
    assert_eq!(tier, "free");
    assert_eq!(user_status.as_deref(), Some("canceled"));

    gateway_mock.assert_async().await;

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_cancel_wrong_owner_is_not_found() {
    // Given: a subscription owned by someone else
    let pool = helpers::setup_test_pool().await;
    let billing = helpers::test_billing(pool.clone(), "http://127.0.0.1:9".to_string());

    let owner_id = helpers::create_test_user(&pool, "pro").await;
    let stranger_id = helpers::create_test_user(&pool, "free").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, owner_id, "active", None).await;

    // When: a non-owner tries to cancel it
    let err = billing
        .subscriptions
        .cancel(subscription_id, stranger_id)
        .await
        .expect_err("Non-owner cancel should fail");

    // Then: the subscription is reported missing, not forbidden
    assert!(matches!(err, BillingError::SubscriptionNotFound(_)));
    assert_eq!(subscription_status(&pool, subscription_id).await, "active");

    helpers::cleanup_test_data(&pool, stranger_id).await;
    helpers::cleanup_test_data(&pool, owner_id).await;
}

// ============================================================================
// Test Cases: Status Reconciliation
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_status_persists_reported_end() {
    // Given: a locally-active subscription that Ezee says has ended
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/subscription/status/")
        .with_status(200)
        .with_body(r#"{"result":{"status":1,"message":"Ended"}}"#)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "active", Some("TXN-ended")).await;

    // When: the owner asks for the status
    let report = billing
        .subscriptions
        .check_status(subscription_id, user_id)
        .await
        .expect("Status check should succeed");

    // Then: the forward transition persists and both sides are reported
    assert_eq!(report.status, SubscriptionStatus::Ended);
    assert_eq!(report.ezee_status.as_deref(), Some("Ended"));
    assert_eq!(report.message, None);
    assert_eq!(subscription_status(&pool, subscription_id).await, "ended");

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_status_unknown_label_changes_nothing() {
    // Given: a gateway answering with a label outside the fixed vocabulary
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/subscription/status/")
        .with_status(200)
        .with_body(r#"{"result":{"status":1,"message":"Suspended"}}"#)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "active", Some("TXN-odd")).await;

    // When: the owner asks for the status
    let report = billing
        .subscriptions
        .check_status(subscription_id, user_id)
        .await
        .expect("Status check should succeed");

    // Then: the raw label is reported, local state stays as it was
    assert_eq!(report.status, SubscriptionStatus::Active);
    assert_eq!(report.ezee_status.as_deref(), Some("Suspended"));
    assert_eq!(
        report.message.as_deref(),
        Some("Gateway reported an unrecognized status")
    );
    assert_eq!(subscription_status(&pool, subscription_id).await, "active");

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_status_without_transaction_number_skips_gateway() {
    // Given: a subscription with no gateway link yet
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    let gateway_mock = server
        .mock("POST", "/v1/subscription/status/")
        .expect(0)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "pending", None).await;

    // When: the owner asks for the status
    let report = billing
        .subscriptions
        .check_status(subscription_id, user_id)
        .await
        .expect("Status check should succeed");

    // Then: the local state answers and Ezee is never contacted
    assert_eq!(report.status, SubscriptionStatus::Pending);
    assert_eq!(report.ezee_status, None);
    assert_eq!(
        report.message.as_deref(),
        Some("Awaiting first payment; no gateway record yet")
    );

    gateway_mock.assert_async().await;

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_status_never_regresses_canceled_subscription() {
    // Given: a canceled subscription that Ezee still reports as active
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/subscription/status/")
        .with_status(200)
        .with_body(r#"{"result":{"status":1,"message":"Active"}}"#)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "free").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "canceled", Some("TXN-stale")).await;

    // When: the owner asks for the status
    let report = billing
        .subscriptions
        .check_status(subscription_id, user_id)
        .await
        .expect("Status check should succeed");

    // Then: the backward transition is skipped
    assert_eq!(report.status, SubscriptionStatus::Canceled);
    assert_eq!(report.ezee_status.as_deref(), Some("Active"));
    assert_eq!(subscription_status(&pool, subscription_id).await, "canceled");

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_status_gateway_failure_leaves_status_unchanged() {
    // Given: a gateway answering 500
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/subscription/status/")
        .with_status(500)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "active", Some("TXN-flaky")).await;

    // When: the owner asks for the status
    let err = billing
        .subscriptions
        .check_status(subscription_id, user_id)
        .await
        .expect_err("Status check should propagate the failure");

    // Then: the failure surfaces and nothing was written
    assert!(matches!(err, BillingError::GatewayTransport { status: 500 }));
    assert_eq!(subscription_status(&pool, subscription_id).await, "active");

    helpers::cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
#[ignore]
async fn test_status_write_loses_race_to_concurrent_cancel() {
    // Given: an active subscription and a gateway that answers "Ended"
    // only after a long pause
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/subscription/status/")
        .with_status(200)
        .with_chunked_body(|writer| {
            std::thread::sleep(Duration::from_millis(500));
            writer.write_all(br#"{"result":{"status":1,"message":"Ended"}}"#)
        })
        .create_async()
        .await;

    let billing = Arc::new(helpers::test_billing(pool.clone(), server.url()));
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "active", Some("TXN-racing")).await;

    // When: a cancel commits while the status check waits on the gateway
    let check = tokio::spawn({
        let billing = Arc::clone(&billing);
        async move {
            billing
                .subscriptions
                .check_status(subscription_id, user_id)
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    sqlx::query("UPDATE subscriptions SET status = 'canceled' WHERE id = $1")
        .bind(subscription_id)
        .execute(&pool)
        .await
        .expect("Failed to cancel concurrently");

    let report = check
        .await
        .expect("Status check task panicked")
        .expect("Status check should succeed");

    // Then: the stale "Ended" write is skipped and canceled stays terminal
    assert_eq!(report.status, SubscriptionStatus::Canceled);
    assert_eq!(subscription_status(&pool, subscription_id).await, "canceled");

    helpers::cleanup_test_data(&pool, user_id).await;
}

// ============================================================================
// Test Cases: Full Lifecycle
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_full_lifecycle_payment_to_cancellation() {
    // Given: a fresh pending subscription with a pending payment, and a
    // gateway that will report the subscription active and confirm a cancel
    let pool = helpers::setup_test_pool().await;
    let mut server = mockito::Server::new_async().await;

    let txn = format!("TXN-{}", Uuid::new_v4());
    let status_mock = server
        .mock("POST", "/v1/subscription/status/")
        .match_body(mockito::Matcher::UrlEncoded(
            "TransactionNumber".into(),
            txn.clone(),
        ))
        .with_status(200)
        .with_body(r#"{"result":{"status":1,"message":"Active"}}"#)
        .create_async()
        .await;
    let cancel_mock = server
        .mock("POST", "/v1/subscription/cancel/")
        .match_body(mockito::Matcher::UrlEncoded(
            "TransactionNumber".into(),
            txn.clone(),
        ))
        .with_status(200)
        .with_body(r#"{"result":{"status":1,"message":"Cancelled"}}"#)
        .create_async()
        .await;

    let billing = helpers::test_billing(pool.clone(), server.url());
    let user_id = helpers::create_test_user(&pool, "pro").await;
    let subscription_id =
        helpers::create_test_subscription(&pool, user_id, "pending", None).await;
    let order_id = format!("ORD-{}", Uuid::new_v4());
    helpers::create_test_payment(&pool, subscription_id, Some(&order_id), None, "pending").await;

    // When: the first payment succeeds
    let notice = fincast_billing::PaymentNotice {
        response_code: "1".to_string(),
        transaction_number: txn.clone(),
        order_id: Some(order_id.clone()),
        response_description: Some("Approved".to_string()),
    };
    billing
        .webhooks
        .ingest(&notice)
        .await
        .expect("Ingest should succeed");

    // Then: the payment is completed and the transaction number attached
    let payment_status: String =
        sqlx::query_scalar("SELECT status FROM payments WHERE order_id = $1")
            .bind(&order_id)
            .fetch_one(&pool)
            .await
            .expect("Failed to fetch payment status");
    assert_eq!(payment_status, "completed");

    let sub_txn: Option<String> =
        sqlx::query_scalar("SELECT ezee_transaction_number FROM subscriptions WHERE id = $1")
            .bind(subscription_id)
            .fetch_one(&pool)
            .await
            .expect("Failed to fetch subscription row");
    assert_eq!(sub_txn.as_deref(), Some(txn.as_str()));

    // When: the owner checks the status
    let report = billing
        .subscriptions
        .check_status(subscription_id, user_id)
        .await
        .expect("Status check should succeed");

    // Then: the attached number reached the gateway and pending became active
    assert_eq!(report.status, SubscriptionStatus::Active);
    assert_eq!(subscription_status(&pool, subscription_id).await, "active");
    status_mock.assert_async().await;

    // When: the owner cancels
    let outcome = billing
        .subscriptions
        .cancel(subscription_id, user_id)
        .await
        .expect("Cancel should succeed");

    // Then: the gateway confirmed and the user lost the paid tier
    assert_eq!(outcome.status, SubscriptionStatus::Canceled);
    assert_eq!(subscription_status(&pool, subscription_id).await, "canceled");
    cancel_mock.assert_async().await;

    let (tier, user_status) = user_row(&pool, user_id).await;
    assert_eq!(tier, "free");
    assert_eq!(user_status.as_deref(), Some("canceled"));

    helpers::cleanup_test_data(&pool, user_id).await;
}
