//! # Configuration
//!
//! Router settings and the basket catalog, loaded from layered TOML files and
//! environment variables by [`ConfigManager`].

pub mod loader;

pub use loader::ConfigManager;

use crate::catalog::BasketCatalog;
use crate::constants::*;
use crate::error::{Result, RoutingError};
use crate::models::BasketDefinition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub aging: AgingConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub reclaim: ReclaimConfig,
    #[serde(default)]
    pub baskets: Vec<BasketDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/basket_router_development".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgingConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub sweep_interval_seconds: u64,
    /// Retries of one batch after a transient store error
    pub max_batch_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: DEFAULT_BATCH_SIZE,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            max_batch_retries: DEFAULT_MAX_BATCH_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl AgingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
    /// Re-classification attempts after a lost race on one order event
    pub max_reclassify_attempts: u32,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            max_reclassify_attempts: DEFAULT_MAX_RECLASSIFY_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub max_future_order_skew_hours: i64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_future_order_skew_hours: DEFAULT_MAX_FUTURE_ORDER_SKEW_HOURS,
        }
    }
}

impl RoutingConfig {
    pub fn max_future_order_skew(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_future_order_skew_hours)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimConfig {
    pub concurrency: usize,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_RECLAIM_CONCURRENCY,
        }
    }
}

impl RouterConfig {
    /// Reject settings the router cannot run with, including an invalid catalog
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(RoutingError::Configuration(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.aging.batch_size == 0 {
            return Err(RoutingError::Configuration(
                "aging.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.aging.sweep_interval_seconds == 0 {
            return Err(RoutingError::Configuration(
                "aging.sweep_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.aging.retry_base_delay_ms > self.aging.retry_max_delay_ms {
            return Err(RoutingError::Configuration(format!(
                "aging.retry_base_delay_ms ({}) exceeds aging.retry_max_delay_ms ({})",
                self.aging.retry_base_delay_ms, self.aging.retry_max_delay_ms
            )));
        }
        if self.events.channel_capacity == 0 {
            return Err(RoutingError::Configuration(
                "events.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.events.max_reclassify_attempts == 0 {
            return Err(RoutingError::Configuration(
                "events.max_reclassify_attempts must be greater than 0".to_string(),
            ));
        }
        if self.routing.max_future_order_skew_hours < 0 {
            return Err(RoutingError::Configuration(
                "routing.max_future_order_skew_hours must not be negative".to_string(),
            ));
        }
        if self.reclaim.concurrency == 0 {
            return Err(RoutingError::Configuration(
                "reclaim.concurrency must be greater than 0".to_string(),
            ));
        }
        self.catalog()?;
        Ok(())
    }

    pub fn catalog(&self) -> Result<BasketCatalog> {
        Ok(BasketCatalog::new(self.baskets.clone())?)
    }
}
