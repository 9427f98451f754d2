#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Basket Router
//!
//! Routes telesales customer leads between work queues ("baskets"). A
//! customer sits in exactly one basket at a time; the basket decides whether
//! an agent owns the customer or the customer waits in the shared pool.
//!
//! ## Architecture
//!
//! - A **catalog** of basket definitions, validated once at startup
//! - One pure **classifier** mapping (ownership, latest order, now) to a basket
//! - One **executor** that commits each move atomically with its audit row
//! - Three **drivers** that decide when to move: order events, periodic aging
//!   sweeps, and operator reclaim
//!
//! ## Module Organization
//!
//! - [`catalog`] - Basket definitions, ladders and role lookups
//! - [`classifier`] - Ordered rule table and the pure classifier
//! - [`executor`] - Atomic transitions and ownership invariants
//! - [`drivers`] - Aging, real-time and reclaim drivers
//! - [`store`] - Ownership persistence (Postgres and in-memory)
//! - [`sources`] - Order management and role directory lookups
//! - [`events`] - Routing event publisher and order event listener
//! - [`config`] - Layered TOML/environment configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use basket_router::config::ConfigManager;
//! use basket_router::router::BasketRouter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?.into_config();
//! let router = BasketRouter::connect(config).await?;
//!
//! let report = router.aging().sweep_all(false).await;
//! println!("moved {} customers", report.total_moved());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod constants;
pub mod drivers;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod operator;
pub mod router;
pub mod sources;
pub mod store;

pub use catalog::{BasketCatalog, CatalogError};
pub use classifier::{Classification, ClassificationInput, Classifier, RuleId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigManager, RouterConfig};
pub use drivers::{
    AgingDriver, BasketFilter, BasketSelector, CancellationHandle, RealtimeDriver,
    RealtimeOutcome, ReclaimDriver, ReclaimReport, SweepReport,
};
pub use error::{Result, RoutingError};
pub use events::{OrderStatusChanged, RoutingEvent, RoutingEventPublisher};
pub use executor::{TransitionExecutor, TransitionOutcome, TransitionRequest};
pub use models::{
    AgentId, BasketDefinition, BasketId, BasketRole, CustomerId, CustomerOwnership, OrderId,
    OrderSnapshot, OrderStatus, RoleTag, TargetAudience, TransitionLogEntry, TriggerKind,
};
pub use operator::OperatorTools;
pub use router::{BasketRouter, RouterComponents};
