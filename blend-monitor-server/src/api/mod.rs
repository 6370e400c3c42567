pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use crate::alerts::AlertThresholds;
use crate::config::{ApiToken, Config};
use crate::db::Store;
use crate::npm::RegistrySource;
use crate::retry::RetryPolicy;

/// Request-independent settings the handlers read.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub package_name: String,
    pub trend_days: i64,
    pub retry: RetryPolicy,
    pub thresholds: AlertThresholds,
    pub tokens: Vec<ApiToken>,
    pub health_timeout: Duration,
}

impl ApiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            package_name: config.package_name.clone(),
            trend_days: config.trend_days,
            retry: config.retry,
            thresholds: config.thresholds,
            tokens: config.api_tokens.clone(),
            health_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<dyn RegistrySource>,
    pub settings: Arc<ApiSettings>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, registry: Arc<dyn RegistrySource>, settings: ApiSettings) -> Self {
        Self {
            store,
            registry,
            settings: Arc::new(settings),
        }
    }
}
