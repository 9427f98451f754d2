//! Broadcast publisher for routing events and operator alerts.
//!
//! ```rust
//! use basket_router::events::{RoutingEvent, RoutingEventPublisher};
//! use basket_router::models::{BasketId, CustomerId};
//! use chrono::Utc;
//!
//! # tokio_test::block_on(async {
//! let publisher = RoutingEventPublisher::new(16);
//! let mut receiver = publisher.subscribe();
//!
//! publisher.publish(RoutingEvent::EntryRefreshed {
//!     customer_id: CustomerId(7),
//!     basket: BasketId(39),
//!     at: Utc::now(),
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.name(), "basket.entry_refreshed");
//! # });
//! ```

use super::{AlertKind, OperatorAlert, RoutingEvent};
use crate::constants::DEFAULT_EVENT_CHANNEL_CAPACITY;
use crate::models::{BasketId, CustomerId};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error};

/// Fan-out publisher for routing events
#[derive(Debug, Clone)]
pub struct RoutingEventPublisher {
    sender: broadcast::Sender<RoutingEvent>,
}

impl RoutingEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: RoutingEvent) {
        let name = event.name();
        // Publishing with no subscribers is not an error
        if self.sender.send(event).is_err() {
            debug!(event = name, "No subscribers for routing event");
        }
    }

    /// Raise an operator alert, also logged at error level
    pub fn alert(
        &self,
        kind: AlertKind,
        customer_id: Option<CustomerId>,
        basket: Option<BasketId>,
        message: impl Into<String>,
        raised_at: DateTime<Utc>,
    ) {
        let message = message.into();
        error!(
            kind = ?kind,
            customer_id = customer_id.map(|c| c.0),
            basket = basket.map(|b| b.0),
            message = %message,
            "OPERATOR_ALERT"
        );
        self.publish(RoutingEvent::OperatorAlert(OperatorAlert {
            kind,
            customer_id,
            basket,
            message,
            raised_at,
        }));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoutingEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RoutingEventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = RoutingEventPublisher::default();
        assert_eq!(publisher.subscriber_count(), 0);
        publisher.publish(RoutingEvent::EntryRefreshed {
            customer_id: CustomerId(1),
            basket: BasketId(39),
            at: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_alert_reaches_subscriber() {
        let publisher = RoutingEventPublisher::new(8);
        let mut receiver = publisher.subscribe();

        publisher.alert(
            AlertKind::ClassificationAmbiguous,
            Some(CustomerId(5)),
            Some(BasketId(53)),
            "no overflow basket configured",
            Utc::now(),
        );

        match receiver.recv().await.unwrap() {
            RoutingEvent::OperatorAlert(alert) => {
                assert_eq!(alert.kind, AlertKind::ClassificationAmbiguous);
                assert_eq!(alert.customer_id, Some(CustomerId(5)));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
