//! Fincast API Library
//!
//! This crate contains the HTTP server components for the fincast billing
//! API: configuration, JWT auth, and the route handlers over
//! `fincast-billing`.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
