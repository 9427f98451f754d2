//! # External Sources
//!
//! Read-only collaborators: order management and the agent role directory.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryOrderSource, InMemoryRoleDirectory};
pub use postgres::{PgOrderSource, PgRoleDirectory};

use crate::error::Result;
use crate::models::{AgentId, CustomerId, OrderId, OrderSnapshot, RoleTag};
use async_trait::async_trait;
use std::fmt::Debug;

#[async_trait]
pub trait OrderSource: Send + Sync + Debug {
    /// Most recent non-cancelled order for the customer
    async fn latest_order(&self, customer_id: CustomerId) -> Result<Option<OrderSnapshot>>;

    async fn order_exists(&self, order_id: &OrderId) -> Result<bool>;

    /// Resolve a sub-order id (`<parent>-<box>`) to its parent order id.
    /// Ids that already name an order, or whose candidate parent is unknown,
    /// are returned unchanged.
    async fn resolve_parent(&self, order_id: &OrderId) -> Result<OrderId> {
        if self.order_exists(order_id).await? {
            return Ok(order_id.clone());
        }
        match order_id.sub_order_parent() {
            Some(parent) if self.order_exists(&parent).await? => Ok(parent),
            _ => Ok(order_id.clone()),
        }
    }
}

#[async_trait]
pub trait RoleDirectory: Send + Sync + Debug {
    /// `None` when the agent is unknown to the directory
    async fn agent_role(&self, agent: AgentId) -> Result<Option<RoleTag>>;
}
