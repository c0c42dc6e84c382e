//! Shared application state

use std::sync::Arc;

use fincast_billing::BillingService;
use sqlx::PgPool;

use crate::auth::{AuthState, JwtManager};
use crate::config::Config;

/// Shared state passed to all request handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub billing: Arc<BillingService>,
    pub jwt_manager: JwtManager,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool, billing: BillingService) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        Self {
            config: Arc::new(config),
            pool,
            billing: Arc::new(billing),
            jwt_manager,
        }
    }

    /// State handed to the auth middleware layer
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }
}
