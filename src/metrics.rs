//! # Routing Metrics
//!
//! OpenTelemetry instruments for transitions, classifications and sweeps.
//! Instruments are created against the global meter provider; without an
//! installed provider they are no-ops.
//!
//! ## Usage
//!
//! ```rust
//! use basket_router::metrics::*;
//! use opentelemetry::KeyValue;
//!
//! transitions_committed_total().add(
//!     1,
//!     &[
//!         KeyValue::new("trigger", "periodic_aging"),
//!         KeyValue::new("to_basket", 39_i64),
//!     ],
//! );
//! ```

use opentelemetry::metrics::{Counter, Histogram, Meter};
use std::sync::OnceLock;

static ROUTER_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    ROUTER_METER.get_or_init(|| opentelemetry::global::meter("basket-router"))
}

/// Committed basket mutations
///
/// Labels:
/// - trigger: order_event, periodic_aging, manual_reclaim, fix_script
/// - to_basket: target basket id
pub fn transitions_committed_total() -> Counter<u64> {
    meter()
        .u64_counter("basket_router.transitions.committed.total")
        .with_description("Total number of committed basket transitions")
        .build()
}

/// Transitions rejected before any write
///
/// Labels:
/// - reason: error kind
pub fn transitions_rejected_total() -> Counter<u64> {
    meter()
        .u64_counter("basket_router.transitions.rejected.total")
        .with_description("Total number of transitions rejected before writing")
        .build()
}

/// Transitions that lost a race against a concurrent writer
pub fn transitions_superseded_total() -> Counter<u64> {
    meter()
        .u64_counter("basket_router.transitions.superseded.total")
        .with_description("Total number of transitions superseded by a concurrent write")
        .build()
}

/// Customers left in place because classification was ambiguous
pub fn classification_ambiguous_total() -> Counter<u64> {
    meter()
        .u64_counter("basket_router.classification.ambiguous.total")
        .with_description("Total number of ambiguous classifications raised to operators")
        .build()
}

/// Customers examined by aging sweeps
///
/// Labels:
/// - basket: swept basket id
/// - outcome: moved, held, skipped, failed
pub fn sweep_customers_total() -> Counter<u64> {
    meter()
        .u64_counter("basket_router.sweep.customers.total")
        .with_description("Total number of customers examined by aging sweeps")
        .build()
}

/// Duration of one basket sweep in milliseconds
pub fn sweep_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("basket_router.sweep.duration")
        .with_description("Aging sweep duration per basket in milliseconds")
        .with_unit("ms")
        .build()
}
