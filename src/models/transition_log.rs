use super::ids::{AgentId, BasketId, CustomerId, OrderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What caused a basket transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    OrderEvent,
    PeriodicAging,
    ManualReclaim,
    FixScript,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderEvent => "order_event",
            Self::PeriodicAging => "periodic_aging",
            Self::ManualReclaim => "manual_reclaim",
            Self::FixScript => "fix_script",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order_event" => Ok(Self::OrderEvent),
            "periodic_aging" => Ok(Self::PeriodicAging),
            "manual_reclaim" => Ok(Self::ManualReclaim),
            "fix_script" => Ok(Self::FixScript),
            _ => Err(format!("Invalid trigger kind: {s}")),
        }
    }
}

/// Append-only audit row. `id` is assigned by the store and increases
/// monotonically, giving the replay order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    pub id: i64,
    pub customer_id: CustomerId,
    pub from_basket: BasketId,
    pub to_basket: BasketId,
    pub trigger_kind: TriggerKind,
    pub triggering_agent: Option<AgentId>,
    pub agent_before: Option<AgentId>,
    pub agent_after: Option<AgentId>,
    pub order_id: Option<OrderId>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Log row as planned by the executor, before the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransitionLogEntry {
    pub customer_id: CustomerId,
    pub from_basket: BasketId,
    pub to_basket: BasketId,
    pub trigger_kind: TriggerKind,
    pub triggering_agent: Option<AgentId>,
    pub agent_before: Option<AgentId>,
    pub agent_after: Option<AgentId>,
    pub order_id: Option<OrderId>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewTransitionLogEntry {
    pub fn with_id(self, id: i64) -> TransitionLogEntry {
        TransitionLogEntry {
            id,
            customer_id: self.customer_id,
            from_basket: self.from_basket,
            to_basket: self.to_basket,
            trigger_kind: self.trigger_kind,
            triggering_agent: self.triggering_agent,
            agent_before: self.agent_before,
            agent_after: self.agent_after,
            order_id: self.order_id,
            note: self.note,
            created_at: self.created_at,
        }
    }
}
