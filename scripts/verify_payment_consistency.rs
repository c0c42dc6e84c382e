#!/usr/bin/env rust-script
//! Payment Lifecycle Consistency Verification Script
//!
//! Detects drift between payments, subscriptions, and user entitlements
//! for the fincast billing subsystem. Read-only: reports, never repairs.
//!
//! ## Usage
//! ```bash
//! rust-script scripts/verify_payment_consistency.rs
//! ```
//!
//! ## Environment Variables
//! - DATABASE_URL: PostgreSQL connection string
//!
//! ## Exit Code
//! Non-zero when any check finds violations.
//!
//! ```cargo
//! [dependencies]
//! tokio = { version = "1.40", features = ["full"] }
//! sqlx = { version = "0.8", features = ["runtime-tokio", "postgres", "uuid"] }
//! uuid = { version = "1.10", features = ["v4"] }
//! dotenvy = "0.15"
//! ```

use std::env;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("Fincast Payment Lifecycle Consistency Verification");
    println!("===================================================\n");

    // Load environment variables
    dotenvy::dotenv().ok();

    let database_url = env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set");

    let pool = sqlx::postgres::PgPool::connect(&database_url).await?;

    println!("✓ Connected to database\n");

    // ========================================================================
    // Check 1: Completed payments carry a processed_at timestamp
    // ========================================================================
    println!("Check 1: Verifying completed payments have processed_at...");

    let unstamped_payments: Vec<(uuid::Uuid, Option<String>)> = sqlx::query_as(
        r#"
        SELECT id, transaction_number
        FROM payments
        WHERE status = 'completed'
          AND processed_at IS NULL
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if unstamped_payments.is_empty() {
        println!("  ✓ All completed payments have processed_at");
    } else {
        println!(
            "  ⚠ Found {} completed payments without processed_at",
            unstamped_payments.len()
        );
        for (payment_id, txn) in &unstamped_payments {
            println!(
                "    - {}: transaction {}",
                payment_id,
                txn.as_deref().unwrap_or("<none>")
            );
        }
    }

    // ========================================================================
    // Check 2: Gateway-linked subscriptions have a completed payment
    // ========================================================================
    println!("\nCheck 2: Verifying gateway-linked subscriptions were paid...");

    let unpaid_linked: Vec<(uuid::Uuid, String)> = sqlx::query_as(
        r#"
        SELECT s.id, s.ezee_transaction_number
        FROM subscriptions s
        WHERE s.ezee_transaction_number IS NOT NULL
          AND NOT EXISTS (
              SELECT 1 FROM payments p
              WHERE p.subscription_id = s.id
                AND p.status = 'completed'
          )
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if unpaid_linked.is_empty() {
        println!("  ✓ Every transaction number is backed by a completed payment");
    } else {
        println!(
            "  ⚠ Found {} subscriptions with a transaction number but no completed payment",
            unpaid_linked.len()
        );
        for (subscription_id, txn) in &unpaid_linked {
            println!("    - {}: transaction {}", subscription_id, txn);
        }
    }

    // ========================================================================
    // Check 3: Canceled subscriptions downgraded their user
    // ========================================================================
    println!("\nCheck 3: Verifying canceled subscriptions downgraded the user...");

    // Users with another live subscription keep their tier.
    let stale_paid_users: Vec<(uuid::Uuid, uuid::Uuid, String)> = sqlx::query_as(
        r#"
        SELECT s.id, u.id, u.tier
        FROM subscriptions s
        JOIN users u ON u.id = s.user_id
        WHERE s.status IN ('canceled', 'ended')
          AND u.tier <> 'free'
          AND NOT EXISTS (
              SELECT 1 FROM subscriptions live
              WHERE live.user_id = u.id
                AND live.status IN ('pending', 'active')
          )
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if stale_paid_users.is_empty() {
        println!("  ✓ No closed subscription left its user on a paid tier");
    } else {
        println!(
            "  ⚠ Found {} closed subscriptions whose user still has a paid tier",
            stale_paid_users.len()
        );
        for (subscription_id, user_id, tier) in &stale_paid_users {
            println!("    - {}: user {} still on {}", subscription_id, user_id, tier);
        }
    }

    // ========================================================================
    // Check 4: Active subscriptions granted their tier
    // ========================================================================
    println!("\nCheck 4: Verifying active subscriptions granted the tier...");

    let ungranted_users: Vec<(uuid::Uuid, uuid::Uuid)> = sqlx::query_as(
        r#"
        SELECT s.id, s.user_id
        FROM subscriptions s
        JOIN users u ON u.id = s.user_id
        WHERE s.status = 'active'
          AND u.tier = 'free'
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if ungranted_users.is_empty() {
        println!("  ✓ Every active subscription has a paid user tier");
    } else {
        println!(
            "  ⚠ Found {} active subscriptions whose user is still free",
            ungranted_users.len()
        );
        for (subscription_id, user_id) in &ungranted_users {
            println!("    - {}: user {}", subscription_id, user_id);
        }
    }

    // ========================================================================
    // Check 5: Completed payments attached their transaction number
    // ========================================================================
    println!("\nCheck 5: Verifying completed payments attached a transaction number...");

    // The attach is a separate write after the payment settles; when it
    // fails, only a later successful notice repairs it.
    let unattached_payments: Vec<(uuid::Uuid, uuid::Uuid)> = sqlx::query_as(
        r#"
        SELECT p.id, s.id
        FROM payments p
        JOIN subscriptions s ON s.id = p.subscription_id
        WHERE p.status = 'completed'
          AND s.ezee_transaction_number IS NULL
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if unattached_payments.is_empty() {
        println!("  ✓ Every completed payment reached its subscription");
    } else {
        println!(
            "  ⚠ Found {} completed payments whose subscription has no transaction number",
            unattached_payments.len()
        );
        for (payment_id, subscription_id) in &unattached_payments {
            println!("    - {}: subscription {}", payment_id, subscription_id);
        }
    }

    // ========================================================================
    // Summary Report
    // ========================================================================
    println!("\n========================================");
    println!("Summary");
    println!("========================================");

    let total_issues = unstamped_payments.len()
        + unpaid_linked.len()
        + stale_paid_users.len()
        + ungranted_users.len()
        + unattached_payments.len();

    if total_issues == 0 {
        println!("✓ No payment lifecycle inconsistencies detected!");
    } else {
        println!("⚠ Found {} total issues", total_issues);
        println!("\nRecommendations:");
        println!("1. Replay the affected payment notifications from the gateway log");
        println!("2. Re-run the cancellation flow for stale user tiers");
        println!("3. Verify webhook ingestion is acknowledging deliveries");
        std::process::exit(1);
    }

    Ok(())
}
