//! # Basket Router
//!
//! Wires the catalog, classifier, executor and drivers around one set of
//! collaborators. Every driver shares the same classifier and executor.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = ConfigManager::load()?.into_config();
//! let router = BasketRouter::connect(config).await?;
//!
//! let (orders_tx, listener) = router.spawn_order_listener();
//! let aging = router.spawn_aging();
//!
//! orders_tx.send(OrderStatusChanged { .. }).await?;
//! router.shutdown();
//! ```

use crate::catalog::BasketCatalog;
use crate::classifier::{ClassificationInput, Classifier};
use crate::clock::{Clock, SystemClock};
use crate::config::RouterConfig;
use crate::drivers::{AgingDriver, CancellationHandle, RealtimeDriver, ReclaimDriver, RetryPolicy};
use crate::error::Result;
use crate::events::{OrderEventListener, OrderStatusChanged, RoutingEventPublisher};
use crate::executor::{check_ownership_invariants, TransitionExecutor};
use crate::models::{AgentId, CustomerId, CustomerOwnership, TargetAudience};
use crate::operator::OperatorTools;
use crate::sources::{OrderSource, PgOrderSource, PgRoleDirectory, RoleDirectory};
use crate::store::{OwnershipStore, PgOwnershipStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// External collaborators the router is built around
#[derive(Debug, Clone)]
pub struct RouterComponents {
    pub store: Arc<dyn OwnershipStore>,
    pub orders: Arc<dyn OrderSource>,
    pub roles: Arc<dyn RoleDirectory>,
    pub clock: Arc<dyn Clock>,
}

impl RouterComponents {
    pub fn new(
        store: Arc<dyn OwnershipStore>,
        orders: Arc<dyn OrderSource>,
        roles: Arc<dyn RoleDirectory>,
    ) -> Self {
        Self {
            store,
            orders,
            roles,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug)]
pub struct BasketRouter {
    config: RouterConfig,
    catalog: Arc<BasketCatalog>,
    classifier: Arc<Classifier>,
    executor: Arc<TransitionExecutor>,
    orders: Arc<dyn OrderSource>,
    roles: Arc<dyn RoleDirectory>,
    aging: Arc<AgingDriver>,
    realtime: Arc<RealtimeDriver>,
    reclaim: Arc<ReclaimDriver>,
    cancel: CancellationHandle,
}

impl BasketRouter {
    /// Validate `config`, build the catalog and wire every component
    pub fn new(config: RouterConfig, components: RouterComponents) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(config.catalog()?);
        let classifier = Arc::new(
            Classifier::new(Arc::clone(&catalog))
                .with_max_future_order_skew(config.routing.max_future_order_skew()),
        );
        let events = RoutingEventPublisher::new(config.events.channel_capacity);
        let executor = Arc::new(TransitionExecutor::new(
            Arc::clone(&catalog),
            Arc::clone(&components.store),
            Arc::clone(&components.clock),
            events,
        ));
        let cancel = CancellationHandle::new();

        let aging = Arc::new(
            AgingDriver::new(
                Arc::clone(&executor),
                Arc::clone(&classifier),
                Arc::clone(&components.orders),
                &config.aging,
            )
            .with_cancellation(cancel.clone()),
        );
        let realtime = Arc::new(RealtimeDriver::new(
            Arc::clone(&executor),
            Arc::clone(&classifier),
            Arc::clone(&components.orders),
            Arc::clone(&components.roles),
            config.events.max_reclassify_attempts,
        ));
        let reclaim = Arc::new(ReclaimDriver::new(
            Arc::clone(&executor),
            RetryPolicy::from(&config.aging),
            config.reclaim.concurrency,
        ));

        info!(
            baskets = catalog.len(),
            aging_baskets = catalog.aging_baskets().count(),
            "Basket router initialized"
        );

        Ok(Self {
            config,
            catalog,
            classifier,
            executor,
            orders: components.orders,
            roles: components.roles,
            aging,
            realtime,
            reclaim,
            cancel,
        })
    }

    /// Postgres-backed router. Runs the bundled migrations before returning.
    pub async fn connect(config: RouterConfig) -> Result<Self> {
        let store = PgOwnershipStore::connect(&config.database).await?;
        store.migrate().await?;
        let pool = store.pool().clone();

        let components = RouterComponents::new(
            Arc::new(store),
            Arc::new(PgOrderSource::new(pool.clone())),
            Arc::new(PgRoleDirectory::new(pool)),
        );
        Self::new(config, components)
    }

    /// Create the ownership row for a new customer in the basket the
    /// classifier picks. Registration is not a transition and is not logged.
    #[instrument(skip(self), fields(customer_id = customer_id.0))]
    pub async fn register_customer(
        &self,
        customer_id: CustomerId,
        agent: Option<AgentId>,
    ) -> Result<CustomerOwnership> {
        let now = self.executor.clock().now();
        let mut ownership = match agent {
            Some(agent) => CustomerOwnership::registered_with_agent(
                customer_id,
                agent,
                self.catalog.resolve_catch_all(TargetAudience::AgentOwned),
                now,
            ),
            None => CustomerOwnership::registered(
                customer_id,
                self.catalog.resolve_catch_all(TargetAudience::UnownedPool),
                now,
            ),
        };

        let mut latest = self.orders.latest_order(customer_id).await?;
        if let Some(order) = latest.as_mut() {
            if order.creator_role.is_none() {
                order.creator_role = self.roles.agent_role(order.creator_id).await?;
            }
        }

        let classification = self.classifier.classify(&ClassificationInput {
            ownership: &ownership,
            latest_order: latest.as_ref(),
            now,
        })?;
        ownership.current_basket = classification.basket;
        check_ownership_invariants(&self.catalog, &ownership)?;

        let created = self.executor.store().create(ownership).await?;
        info!(
            basket = created.current_basket.0,
            rule = %classification.rule,
            "Customer registered"
        );
        Ok(created)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<BasketCatalog> {
        &self.catalog
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn executor(&self) -> &Arc<TransitionExecutor> {
        &self.executor
    }

    pub fn events(&self) -> &RoutingEventPublisher {
        self.executor.events()
    }

    pub fn aging(&self) -> &Arc<AgingDriver> {
        &self.aging
    }

    pub fn realtime(&self) -> &Arc<RealtimeDriver> {
        &self.realtime
    }

    pub fn reclaim(&self) -> &Arc<ReclaimDriver> {
        &self.reclaim
    }

    pub fn operator(&self) -> OperatorTools {
        OperatorTools::new(
            Arc::clone(&self.aging),
            Arc::clone(&self.reclaim),
            Arc::clone(&self.realtime),
        )
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancel
    }

    /// Start the order-event listener; send notifications on the returned
    /// sender
    pub fn spawn_order_listener(&self) -> (mpsc::Sender<OrderStatusChanged>, JoinHandle<()>) {
        let (sender, listener) = OrderEventListener::channel(
            Arc::clone(&self.realtime),
            self.config.events.channel_capacity,
        );
        let listener = listener.with_cancellation(self.cancel.clone());
        (sender, tokio::spawn(listener.run()))
    }

    /// Start the periodic aging loop
    pub fn spawn_aging(&self) -> JoinHandle<()> {
        let aging = Arc::clone(&self.aging);
        tokio::spawn(async move { aging.run().await })
    }

    /// Stop the background loops at their next batch or event boundary
    pub fn shutdown(&self) {
        info!("Basket router shutting down");
        self.cancel.cancel();
    }
}
