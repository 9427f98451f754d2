//! # Ownership Store
//!
//! Persistence seam for [`CustomerOwnership`] rows and the append-only
//! transition log.
//!
//! Every mutation goes through [`OwnershipStore::apply`]: the store locks the
//! customer's row, hands the current state to a planner closure, and commits
//! the planned row update together with its log entry in one unit. If the
//! planner fails, or any write fails, nothing is persisted.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryOwnershipStore;
pub use postgres::PgOwnershipStore;

use crate::error::Result;
use crate::models::{
    AgentId, BasketId, CustomerId, CustomerOwnership, NewTransitionLogEntry, TransitionLogEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// What the planner wants written for a locked row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedWrite {
    /// Leave the row untouched
    Unchanged,
    /// Replace the row; `log` is appended in the same unit when present
    Update {
        ownership: CustomerOwnership,
        log: Option<NewTransitionLogEntry>,
    },
}

/// Result of a committed [`OwnershipStore::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedWrite {
    pub before: CustomerOwnership,
    pub after: CustomerOwnership,
    pub log_entry: Option<TransitionLogEntry>,
}

impl AppliedWrite {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

pub type WritePlanner<'a> = dyn Fn(&CustomerOwnership) -> Result<PlannedWrite> + Send + Sync + 'a;

/// Keyset page over customers overdue in one basket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverdueQuery {
    pub basket: BasketId,
    /// Rows with `basket_entered_at <= entered_at_or_before` qualify
    pub entered_at_or_before: DateTime<Utc>,
    /// Resume after this customer id
    pub after_customer: Option<CustomerId>,
    pub limit: usize,
}

#[async_trait]
pub trait OwnershipStore: Send + Sync + Debug {
    /// Insert the ownership row for a newly registered customer
    async fn create(&self, ownership: CustomerOwnership) -> Result<CustomerOwnership>;

    async fn get(&self, customer_id: CustomerId) -> Result<Option<CustomerOwnership>>;

    /// Lock the row, plan against it, and commit the plan atomically.
    ///
    /// On `PlannedWrite::Update` the store stamps `version = before.version + 1`.
    /// A missing row is `RoutingError::CustomerNotFound`.
    async fn apply(
        &self,
        customer_id: CustomerId,
        planner: &WritePlanner<'_>,
    ) -> Result<AppliedWrite>;

    /// Customers in `query.basket` ordered by customer id
    async fn find_overdue(&self, query: &OverdueQuery) -> Result<Vec<CustomerOwnership>>;

    /// Customers held by `agent` in `basket`, oldest entry first
    async fn find_by_agent(
        &self,
        agent: AgentId,
        basket: BasketId,
        limit: Option<usize>,
    ) -> Result<Vec<CustomerOwnership>>;

    /// Full audit history for a customer in id order
    async fn transition_log(&self, customer_id: CustomerId) -> Result<Vec<TransitionLogEntry>>;
}
