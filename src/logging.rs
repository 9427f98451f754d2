//! # Structured Logging
//!
//! Environment-aware `tracing` setup plus helpers for the audit-style events
//! the router emits on every transition and sweep.

use crate::constants::env as env_keys;
use crate::models::{AgentId, BasketId, CustomerId, TriggerKind};
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// `RUST_LOG` overrides the environment's default level. Setting
/// `BASKET_ROUTER_LOG_FORMAT=json` switches the console output to JSON lines.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var(env_keys::LOG_FORMAT)
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // Another subscriber may already be installed (tests, embedding hosts)
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var(env_keys::ENVIRONMENT)
        .or_else(|_| std::env::var(env_keys::FALLBACK_ENVIRONMENT))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Log one committed basket transition
#[allow(clippy::too_many_arguments)]
pub fn log_transition(
    customer_id: CustomerId,
    from: BasketId,
    to: BasketId,
    trigger: TriggerKind,
    triggering_agent: Option<AgentId>,
    agent_before: Option<AgentId>,
    agent_after: Option<AgentId>,
    log_id: Option<i64>,
) {
    tracing::info!(
        customer_id = customer_id.0,
        from_basket = from.0,
        to_basket = to.0,
        trigger = %trigger,
        triggering_agent = triggering_agent.map(|a| a.0),
        agent_before = agent_before.map(|a| a.0),
        agent_after = agent_after.map(|a| a.0),
        log_id = log_id,
        timestamp = %Utc::now().to_rfc3339(),
        "BASKET_TRANSITION"
    );
}

/// Log the per-run summary of an aging sweep or reclaim
pub fn log_batch_summary(
    operation: &str,
    run_id: &str,
    basket: Option<BasketId>,
    succeeded: usize,
    failed: usize,
    duration_ms: u64,
    dry_run: bool,
) {
    tracing::info!(
        operation = %operation,
        run_id = %run_id,
        basket = basket.map(|b| b.0),
        succeeded = succeeded,
        failed = failed,
        duration_ms = duration_ms,
        dry_run = dry_run,
        timestamp = %Utc::now().to_rfc3339(),
        "BATCH_SUMMARY"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels_by_environment() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "warn");
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
    }
}
