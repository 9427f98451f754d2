//! Fixture catalog, configuration and an in-memory router harness shared by
//! the integration tests.

#![allow(dead_code)]

use basket_router::clock::{Clock, ManualClock};
use basket_router::config::{AgingConfig, EventsConfig, RouterConfig};
use basket_router::models::{
    AgentId, BasketDefinition, BasketId, BasketRole, CustomerId, CustomerOwnership, OrderId,
    OrderSnapshot, OrderStatus, RoleTag, TargetAudience, TransitionLogEntry,
};
use basket_router::router::{BasketRouter, RouterComponents};
use basket_router::sources::{InMemoryOrderSource, InMemoryRoleDirectory};
use basket_router::store::InMemoryOwnershipStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

/// Basket ids of the fixture catalog, matching `config/router.toml`
pub mod baskets {
    use basket_router::models::BasketId;

    pub const NEW_CUSTOMER: BasketId = BasketId(38);
    pub const PERSONAL_1_60: BasketId = BasketId(39);
    pub const PERSONAL_61_90: BasketId = BasketId(40);
    pub const PERSONAL_91_180: BasketId = BasketId(41);
    pub const AWAITING_REENGAGEMENT: BasketId = BasketId(46);
    pub const UPSELL: BasketId = BasketId(51);
    pub const OWNED_UNCLASSIFIED: BasketId = BasketId(90);

    pub const NEW_CUSTOMER_DIST: BasketId = BasketId(52);
    pub const UPSELL_DIST: BasketId = BasketId(53);
    pub const POOL_31_179: BasketId = BasketId(43);
    pub const MID_6_12M: BasketId = BasketId(44);
    pub const MID_1_3Y: BasketId = BasketId(45);
    pub const ANCIENT: BasketId = BasketId(50);
    pub const DISTRIBUTION_EXHAUSTED: BasketId = BasketId(54);
    pub const POOL_UNCLASSIFIED: BasketId = BasketId(91);
}

pub const AGENT: AgentId = AgentId(42);
pub const OTHER_AGENT: AgentId = AgentId(77);
pub const ADMIN: AgentId = AgentId(3);
pub const OPERATOR: AgentId = AgentId(1);

pub fn fixture_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

pub fn fixture_baskets() -> Vec<BasketDefinition> {
    use TargetAudience::{AgentOwned, UnownedPool};

    vec![
        BasketDefinition::new(38, "new_customer", AgentOwned, BasketRole::Static)
            .failing_after(60, "new_customer_dist")
            .with_hold_days(7)
            .linked_to("new_customer_dist"),
        BasketDefinition::new(39, "personal_1_60", AgentOwned, BasketRole::PersonalLadder)
            .with_days(0, Some(60))
            .failing_after(90, "personal_91_180")
            .linked_to("pool_31_179"),
        BasketDefinition::new(40, "personal_61_90", AgentOwned, BasketRole::PersonalLadder)
            .with_days(61, Some(90))
            .failing_after(30, "personal_91_180")
            .linked_to("pool_31_179"),
        BasketDefinition::new(41, "personal_91_180", AgentOwned, BasketRole::PersonalLadder)
            .with_days(91, Some(180))
            .reevaluating_after(90)
            .with_hold_days(14)
            .linked_to("pool_31_179"),
        BasketDefinition::new(
            46,
            "awaiting_reengagement",
            AgentOwned,
            BasketRole::AwaitingReengagement,
        )
        .with_days(0, Some(90))
        .failing_after(90, "personal_91_180")
        .linked_to("pool_31_179"),
        BasketDefinition::new(51, "upsell", AgentOwned, BasketRole::Upsell)
            .failing_after(7, "personal_1_60")
            .linked_to("upsell_dist"),
        BasketDefinition::new(90, "owned_unclassified", AgentOwned, BasketRole::CatchAll)
            .linked_to("pool_unclassified"),
        BasketDefinition::new(52, "new_customer_dist", UnownedPool, BasketRole::PoolLadder)
            .with_days(0, Some(30))
            .reevaluating_after(30)
            .with_distribution_cap(5, "distribution_exhausted"),
        BasketDefinition::new(53, "upsell_dist", UnownedPool, BasketRole::PendingDistribution),
        BasketDefinition::new(43, "pool_31_179", UnownedPool, BasketRole::PoolLadder)
            .with_days(31, Some(179))
            .reevaluating_after(30)
            .with_distribution_cap(5, "distribution_exhausted"),
        BasketDefinition::new(44, "mid_6_12m", UnownedPool, BasketRole::PoolLadder)
            .with_days(180, Some(365))
            .reevaluating_after(60),
        BasketDefinition::new(45, "mid_1_3y", UnownedPool, BasketRole::PoolLadder)
            .with_days(366, Some(1095))
            .reevaluating_after(60),
        BasketDefinition::new(50, "ancient", UnownedPool, BasketRole::PoolLadder)
            .with_days(1096, None),
        BasketDefinition::new(54, "distribution_exhausted", UnownedPool, BasketRole::Static),
        BasketDefinition::new(91, "pool_unclassified", UnownedPool, BasketRole::CatchAll),
    ]
}

/// Small batches and millisecond retries so paging and backoff paths run fast
pub fn fixture_config() -> RouterConfig {
    RouterConfig {
        aging: AgingConfig {
            enabled: false,
            batch_size: 2,
            max_batch_retries: 3,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
            ..AgingConfig::default()
        },
        events: EventsConfig {
            channel_capacity: 64,
            ..EventsConfig::default()
        },
        baskets: fixture_baskets(),
        ..RouterConfig::default()
    }
}

/// A router wired to in-memory stores and a manual clock
pub struct TestRouter {
    pub router: BasketRouter,
    pub store: Arc<InMemoryOwnershipStore>,
    pub orders: Arc<InMemoryOrderSource>,
    pub roles: Arc<InMemoryRoleDirectory>,
    pub clock: Arc<ManualClock>,
}

impl TestRouter {
    pub fn new() -> Self {
        Self::with_config(fixture_config())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        let store = Arc::new(InMemoryOwnershipStore::new());
        Self::with_store(config, Arc::clone(&store), store)
    }

    /// Route writes through `backing` while keeping direct access to the
    /// in-memory rows for seeding and assertions
    pub fn with_store(
        config: RouterConfig,
        store: Arc<InMemoryOwnershipStore>,
        backing: Arc<dyn basket_router::store::OwnershipStore>,
    ) -> Self {
        let orders = Arc::new(InMemoryOrderSource::new());
        let roles = Arc::new(InMemoryRoleDirectory::new());
        let clock = Arc::new(ManualClock::new(fixture_now()));
        let shared_clock: Arc<dyn Clock> = clock.clone();

        let components = RouterComponents::new(backing, orders.clone(), roles.clone())
            .with_clock(shared_clock);
        let router = BasketRouter::new(config, components).expect("fixture router is valid");

        Self {
            router,
            store,
            orders,
            roles,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Seed an owned customer who entered `basket` `entered_days_ago` days ago
    pub fn seed_owned(
        &self,
        customer: i64,
        agent: AgentId,
        basket: BasketId,
        entered_days_ago: i64,
    ) -> CustomerOwnership {
        let entered = self.now() - Duration::days(entered_days_ago);
        let row =
            CustomerOwnership::registered_with_agent(CustomerId(customer), agent, basket, entered);
        self.store.seed(row.clone());
        row
    }

    pub fn seed_unowned(
        &self,
        customer: i64,
        basket: BasketId,
        entered_days_ago: i64,
    ) -> CustomerOwnership {
        let entered = self.now() - Duration::days(entered_days_ago);
        let row = CustomerOwnership::registered(CustomerId(customer), basket, entered);
        self.store.seed(row.clone());
        row
    }

    pub fn seed_row(&self, row: CustomerOwnership) -> CustomerOwnership {
        self.store.seed(row.clone());
        row
    }

    pub fn place_order(&self, order: OrderBuilder) -> OrderSnapshot {
        let snapshot = order.build(self.now());
        self.orders.upsert(snapshot.clone());
        snapshot
    }

    pub fn row(&self, customer: i64) -> CustomerOwnership {
        self.store
            .rows()
            .into_iter()
            .find(|row| row.customer_id == CustomerId(customer))
            .unwrap_or_else(|| panic!("customer {customer} has no row"))
    }

    pub fn log_for(&self, customer: i64) -> Vec<TransitionLogEntry> {
        self.store
            .log_entries()
            .into_iter()
            .filter(|entry| entry.customer_id == CustomerId(customer))
            .collect()
    }
}

impl Default for TestRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for order snapshots dated relative to the harness clock
pub struct OrderBuilder {
    id: String,
    customer: i64,
    creator: AgentId,
    role: Option<RoleTag>,
    status: OrderStatus,
    days_ago: i64,
}

impl OrderBuilder {
    pub fn new(id: &str, customer: i64) -> Self {
        Self {
            id: id.to_string(),
            customer,
            creator: AGENT,
            role: Some(RoleTag::FieldSales),
            status: OrderStatus::Delivered,
            days_ago: 0,
        }
    }

    pub fn created_by(mut self, creator: AgentId, role: RoleTag) -> Self {
        self.creator = creator;
        self.role = Some(role);
        self
    }

    /// Creator role left for the role directory to resolve
    pub fn created_by_unknown_role(mut self, creator: AgentId) -> Self {
        self.creator = creator;
        self.role = None;
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn days_ago(mut self, days: i64) -> Self {
        self.days_ago = days;
        self
    }

    pub fn build(self, now: DateTime<Utc>) -> OrderSnapshot {
        OrderSnapshot {
            id: OrderId::new(self.id),
            customer_id: CustomerId(self.customer),
            status: self.status,
            creator_id: self.creator,
            creator_role: self.role,
            order_date: now - Duration::days(self.days_ago),
        }
    }
}
