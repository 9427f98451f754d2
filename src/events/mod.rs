//! # Routing Events
//!
//! Broadcast notifications about committed transitions, operator alerts and
//! completed batch runs, plus the listener that feeds order-status changes
//! into the real-time driver.

pub mod listener;
pub mod publisher;

pub use listener::{FailedOrderEvent, ListenerStats, OrderEventListener, OrderStatusChanged};
pub use publisher::RoutingEventPublisher;

use crate::constants::events;
use crate::models::{AgentId, BasketId, CustomerId, TriggerKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ClassificationAmbiguous,
    TransitionInvariantViolation,
    SweepAborted,
    ReclaimIncomplete,
}

/// Something an operator must look at; the affected customer was left in place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub kind: AlertKind,
    pub customer_id: Option<CustomerId>,
    pub basket: Option<BasketId>,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoutingEvent {
    TransitionCommitted {
        customer_id: CustomerId,
        from_basket: BasketId,
        to_basket: BasketId,
        trigger: TriggerKind,
        agent_before: Option<AgentId>,
        agent_after: Option<AgentId>,
        log_id: Option<i64>,
        at: DateTime<Utc>,
    },
    EntryRefreshed {
        customer_id: CustomerId,
        basket: BasketId,
        at: DateTime<Utc>,
    },
    OperatorAlert(OperatorAlert),
    SweepCompleted {
        run_id: Uuid,
        basket: BasketId,
        moved: usize,
        failed: usize,
        dry_run: bool,
    },
    ReclaimCompleted {
        operator: AgentId,
        agent: AgentId,
        reclaimed: usize,
        failed: usize,
    },
}

impl RoutingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TransitionCommitted { .. } => events::TRANSITION_COMMITTED,
            Self::EntryRefreshed { .. } => events::ENTRY_REFRESHED,
            Self::OperatorAlert(_) => events::OPERATOR_ALERT,
            Self::SweepCompleted { .. } => events::SWEEP_COMPLETED,
            Self::ReclaimCompleted { .. } => events::RECLAIM_COMPLETED,
        }
    }
}
