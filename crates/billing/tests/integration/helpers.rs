//! Shared fixtures for the DB-backed integration tests

use sqlx::PgPool;
use uuid::Uuid;

use fincast_billing::{BillingService, EzeeClient, EzeeConfig};

/// Connect to the integration test database
pub async fn setup_test_pool() -> PgPool {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests");

    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database")
}

/// Billing service whose gateway points at `base_url` (a mockito server,
/// or an address nothing listens on for tests that must not call out)
pub fn test_billing(pool: PgPool, base_url: String) -> BillingService {
    let gateway = EzeeClient::new(EzeeConfig {
        base_url,
        licence_key: "lk_test_123".to_string(),
        site: "fincast-test".to_string(),
    });
    BillingService::new(gateway, pool)
}

/// Create a test user on the given tier
pub async fn create_test_user(pool: &PgPool, tier: &str) -> Uuid {
    let user_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, tier, created_at)
        VALUES ($1, $2, $3, NOW())
        "#,
    )
    .bind(user_id)
    .bind(format!("test-user-{}@example.com", user_id))
    .bind(tier)
    .execute(pool)
    .await
    .expect("Failed to create test user");

    user_id
}

/// Create a test subscription. A `None` transaction number leaves the
/// subscription without a gateway link.
pub async fn create_test_subscription(
    pool: &PgPool,
    user_id: Uuid,
    status: &str,
    transaction_number: Option<&str>,
) -> Uuid {
    let subscription_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO subscriptions
            (id, user_id, status, tier, ezee_transaction_number,
             amount_cents, currency, billing_frequency, created_at)
        VALUES ($1, $2, $3, 'pro', $4, 2900, 'USD', 'monthly', NOW())
        "#,
    )
    .bind(subscription_id)
    .bind(user_id)
    .bind(status)
    .bind(transaction_number)
    .execute(pool)
    .await
    .expect("Failed to create test subscription");

    subscription_id
}

/// Create a test payment linked to a subscription
pub async fn create_test_payment(
    pool: &PgPool,
    subscription_id: Uuid,
    order_id: Option<&str>,
    transaction_number: Option<&str>,
    status: &str,
) -> Uuid {
    let payment_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO payments (id, order_id, transaction_number, status, subscription_id, created_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        "#,
    )
    .bind(payment_id)
    .bind(order_id)
    .bind(transaction_number)
    .bind(status)
    .bind(subscription_id)
    .execute(pool)
    .await
    .expect("Failed to create test payment");

    payment_id
}

/// Cleanup test data after test completion
pub async fn cleanup_test_data(pool: &PgPool, user_id: Uuid) {
    // Delete in order to respect foreign key constraints

    sqlx::query(
        "DELETE FROM payments WHERE subscription_id IN \
         (SELECT id FROM subscriptions WHERE user_id = $1)",
    )
    .bind(user_id)
    .execute(pool)
    .await
    .ok(); // Ignore errors during cleanup

    sqlx::query("DELETE FROM subscriptions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .ok();

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .ok();
}
