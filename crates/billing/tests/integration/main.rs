//! DB-backed integration tests for the payment lifecycle
//!
//! These tests exercise webhook ingestion, status reconciliation, and
//! cancellation against a real Postgres schema, with the Ezee gateway
//! played by mockito.
//!
//! ## Test Coverage
//! - Success/failure/duplicate webhook notices and replay protection
//! - order_id-exclusive payment lookup
//! - Gateway-first cancellation and the user downgrade that follows it
//! - Forward-only status reconciliation
//! - Full lifecycle from first payment through cancellation
//!
//! ## Running Tests
//! ```bash
//! export TEST_DATABASE_URL="postgres://localhost/fincast_test"
//! cargo test -p fincast-billing --test integration -- --ignored --test-threads=1
//! ```

mod helpers;

mod cancel_flow;
