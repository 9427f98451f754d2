//! # Order Event Listener
//!
//! Consumes order-status notifications from an `mpsc` channel and hands them
//! to the [`RealtimeDriver`] one at a time. Events that still fail after the
//! driver's own re-classification attempts go to the dead-letter channel,
//! when one is configured, so the calling pipeline can redeliver them.

use crate::drivers::{CancellationHandle, RealtimeDriver};
use crate::models::{CustomerId, OrderId, OrderStatus};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub customer_id: CustomerId,
    pub order_id: OrderId,
    pub new_status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedOrderEvent {
    pub event: OrderStatusChanged,
    pub error: String,
    pub transient: bool,
}

#[derive(Debug, Default)]
pub struct ListenerStats {
    pub events_received: AtomicU64,
    pub events_processed: AtomicU64,
    pub events_failed: AtomicU64,
}

impl ListenerStats {
    pub fn received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.events_failed.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct OrderEventListener {
    receiver: mpsc::Receiver<OrderStatusChanged>,
    driver: Arc<RealtimeDriver>,
    dead_letter: Option<mpsc::Sender<FailedOrderEvent>>,
    cancel: CancellationHandle,
    stats: Arc<ListenerStats>,
}

impl OrderEventListener {
    pub fn new(receiver: mpsc::Receiver<OrderStatusChanged>, driver: Arc<RealtimeDriver>) -> Self {
        Self {
            receiver,
            driver,
            dead_letter: None,
            cancel: CancellationHandle::new(),
            stats: Arc::new(ListenerStats::default()),
        }
    }

    /// Channel pair with the listener on the receiving end
    pub fn channel(
        driver: Arc<RealtimeDriver>,
        capacity: usize,
    ) -> (mpsc::Sender<OrderStatusChanged>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self::new(receiver, driver))
    }

    pub fn with_dead_letter(mut self, dead_letter: mpsc::Sender<FailedOrderEvent>) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Process events until the channel closes or the listener is cancelled
    pub async fn run(mut self) {
        info!("Order event listener started");
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Order event listener cancelled");
                    break;
                }
                event = self.receiver.recv() => event,
            };

            let Some(event) = event else {
                info!("Order event channel closed; listener stopping");
                break;
            };
            self.handle(event).await;
        }

        info!(
            received = self.stats.received(),
            processed = self.stats.processed(),
            failed = self.stats.failed(),
            "Order event listener stopped"
        );
    }

    async fn handle(&self, event: OrderStatusChanged) {
        self.stats.events_received.fetch_add(1, Ordering::Relaxed);

        match self
            .driver
            .on_order_status_changed(event.customer_id, &event.order_id, &event.new_status)
            .await
        {
            Ok(outcome) => {
                self.stats.events_processed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    customer_id = event.customer_id.0,
                    order_id = %event.order_id,
                    outcome = ?outcome,
                    "Order event processed"
                );
            }
            Err(e) => {
                self.stats.events_failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    customer_id = event.customer_id.0,
                    order_id = %event.order_id,
                    error = %e,
                    "Order event failed"
                );
                if let Some(dead_letter) = &self.dead_letter {
                    let failed = FailedOrderEvent {
                        transient: e.is_transient(),
                        error: e.to_string(),
                        event,
                    };
                    if dead_letter.send(failed).await.is_err() {
                        warn!("Dead-letter channel closed; dropping failed order event");
                    }
                }
            }
        }
    }
}
