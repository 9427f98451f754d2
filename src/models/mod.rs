//! # Domain Models
//!
//! Typed identifiers and records for baskets, customer ownership, orders and
//! the transition audit log.

pub mod basket;
pub mod ids;
pub mod order;
pub mod ownership;
pub mod transition_log;

pub use basket::{BasketDefinition, BasketRole, DayRange, TargetAudience};
pub use ids::{AgentId, BasketId, CustomerId, OrderId};
pub use order::{OrderSnapshot, OrderStatus, RoleTag};
pub use ownership::CustomerOwnership;
pub use transition_log::{NewTransitionLogEntry, TransitionLogEntry, TriggerKind};
