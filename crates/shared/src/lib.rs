//! Fincast Shared Types and Utilities
//!
//! This crate contains the domain types and database helpers shared across
//! the Fincast platform.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
