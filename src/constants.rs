//! # System Constants
//!
//! Defaults and fixed identifiers shared across the router.

/// Directory role ids that identify field-sales (telesales) agents.
/// Every other role is treated as privileged.
pub const FIELD_SALES_ROLE_IDS: &[i32] = &[6, 7];

/// SQLSTATE codes treated as transient: serialization failure, deadlock,
/// lock not available.
pub const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01", "55P03"];

pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 3600;
pub const DEFAULT_MAX_BATCH_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;
pub const DEFAULT_MAX_RECLASSIFY_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_FUTURE_ORDER_SKEW_HOURS: i64 = 24;
pub const DEFAULT_RECLAIM_CONCURRENCY: usize = 8;

/// Routing event names published on the event channel
pub mod events {
    pub const TRANSITION_COMMITTED: &str = "basket.transition_committed";
    pub const ENTRY_REFRESHED: &str = "basket.entry_refreshed";
    pub const OPERATOR_ALERT: &str = "basket.operator_alert";
    pub const SWEEP_COMPLETED: &str = "basket.sweep_completed";
    pub const RECLAIM_COMPLETED: &str = "basket.reclaim_completed";
}

/// Environment variables consulted by configuration and logging
pub mod env {
    pub const ENVIRONMENT: &str = "BASKET_ROUTER_ENV";
    pub const FALLBACK_ENVIRONMENT: &str = "APP_ENV";
    pub const CONFIG_DIR: &str = "BASKET_ROUTER_CONFIG_DIR";
    pub const ENV_PREFIX: &str = "BASKET_ROUTER";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const LOG_FORMAT: &str = "BASKET_ROUTER_LOG_FORMAT";
}
