//! # Event Classifier
//!
//! Pure function from (ownership state, latest qualifying order, now) to the
//! basket the customer belongs in right now. No I/O, no clock reads: identical
//! inputs always produce the identical basket, which is what makes re-running
//! classification after a lost race or a redelivered event safe.
//!
//! Rules are evaluated in the order of [`rules::RULES`]; when none matches the
//! catch-all of the customer's audience tier is returned.

pub mod rules;

pub use rules::{Rule, RuleId, RULES};

use crate::catalog::{BasketCatalog, Ladder};
use crate::constants::DEFAULT_MAX_FUTURE_ORDER_SKEW_HOURS;
use crate::error::{Result, RoutingError};
use crate::models::ownership::whole_days_between;
use crate::models::{BasketId, CustomerOwnership, OrderSnapshot, TargetAudience};
use chrono::{DateTime, Duration, Utc};
use rules::RuleContext;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct ClassificationInput<'a> {
    pub ownership: &'a CustomerOwnership,
    /// Most recent non-cancelled order, if any
    pub latest_order: Option<&'a OrderSnapshot>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub basket: BasketId,
    pub rule: RuleId,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    catalog: Arc<BasketCatalog>,
    max_future_order_skew: Duration,
}

impl Classifier {
    pub fn new(catalog: Arc<BasketCatalog>) -> Self {
        Self {
            catalog,
            max_future_order_skew: Duration::hours(DEFAULT_MAX_FUTURE_ORDER_SKEW_HOURS),
        }
    }

    /// How far past `now` an order date may be before the input is rejected
    pub fn with_max_future_order_skew(mut self, skew: Duration) -> Self {
        self.max_future_order_skew = skew;
        self
    }

    pub fn catalog(&self) -> &Arc<BasketCatalog> {
        &self.catalog
    }

    pub fn rules(&self) -> &'static [Rule] {
        &RULES
    }

    pub fn classify(&self, input: &ClassificationInput<'_>) -> Result<Classification> {
        self.validate_input(input)?;

        let ownership = input.ownership;
        let ctx = RuleContext {
            catalog: &self.catalog,
            agent: ownership.assigned_agent,
            order: input.latest_order,
            days_since_order: input
                .latest_order
                .map(|order| whole_days_between(order.order_date, input.now)),
            days_since_registration: ownership.days_since_registration(input.now),
        };

        let classification = RULES
            .iter()
            .find_map(|rule| {
                rule.evaluate(&ctx).map(|basket| Classification {
                    basket,
                    rule: rule.id,
                })
            })
            .unwrap_or_else(|| Classification {
                basket: self.catalog.resolve_catch_all(audience_for(ownership)),
                rule: RuleId::CatchAll,
            });

        let audience = self.catalog.audience_of(classification.basket)?;
        if audience != audience_for(ownership) {
            return Err(RoutingError::ambiguous(
                ownership.customer_id,
                format!(
                    "rule {} resolved basket {} ({audience}) for a customer in audience {}",
                    classification.rule,
                    classification.basket,
                    audience_for(ownership)
                ),
            ));
        }

        Ok(classification)
    }

    /// Unowned-pool ladder lookup keyed on days since the last order, used by
    /// aging re-evaluation. Falls back to the unowned catch-all.
    pub fn reevaluate_pool(&self, days_since_last_order: u32) -> BasketId {
        self.catalog
            .ladder_match(Ladder::Pool, days_since_last_order)
            .unwrap_or_else(|| self.catalog.resolve_catch_all(TargetAudience::UnownedPool))
    }

    fn validate_input(&self, input: &ClassificationInput<'_>) -> Result<()> {
        let Some(order) = input.latest_order else {
            return Ok(());
        };

        if order.customer_id != input.ownership.customer_id {
            return Err(RoutingError::stale(format!(
                "order {} belongs to customer {}, not {}",
                order.id, order.customer_id, input.ownership.customer_id
            )));
        }
        if order.status.is_cancelled() {
            return Err(RoutingError::stale(format!(
                "order {} is cancelled and cannot be the latest qualifying order",
                order.id
            )));
        }
        if order.order_date > input.now + self.max_future_order_skew {
            return Err(RoutingError::stale(format!(
                "order {} is dated {} which is after {}",
                order.id, order.order_date, input.now
            )));
        }
        Ok(())
    }
}

fn audience_for(ownership: &CustomerOwnership) -> TargetAudience {
    if ownership.assigned_agent.is_some() {
        TargetAudience::AgentOwned
    } else {
        TargetAudience::UnownedPool
    }
}
