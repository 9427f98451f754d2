//! # Drivers
//!
//! Everything that decides *when* to transition a customer. All drivers share
//! the one classifier and the one executor.
//!
//! - [`aging::AgingDriver`]: scheduled sweeps over baskets with a dwell timeout
//! - [`realtime::RealtimeDriver`]: order-status change hook
//! - [`reclaim::ReclaimDriver`]: operator-triggered bulk release to the pool

pub mod aging;
pub mod realtime;
pub mod reclaim;
pub mod retry;

pub use aging::{AgingDriver, BasketSweepReport, MoveReason, PlannedMove, SweepReport};
pub use realtime::{RealtimeDriver, RealtimeOutcome, ReclassifyCause};
pub use reclaim::{BasketFilter, BasketSelector, ReclaimDriver, ReclaimReport, ReclaimRequest};
pub use retry::RetryPolicy;

use crate::error::RoutingError;
use crate::models::CustomerId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cooperative stop signal. Drivers check it only at batch boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the driver can run again
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// One customer a batch operation could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerFailure {
    pub customer_id: CustomerId,
    pub kind: String,
    pub message: String,
}

impl CustomerFailure {
    pub fn new(customer_id: CustomerId, error: &RoutingError) -> Self {
        Self {
            customer_id,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}
