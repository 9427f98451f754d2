//! # Transition Executor
//!
//! The only writer of [`CustomerOwnership`]. A transition is validated against
//! the catalog, planned against the locked row, and committed together with
//! exactly one transition log entry, or not at all.
//!
//! ## Rules applied to every move
//!
//! - `basket_entered_at` becomes `now`, never lower than the stored value.
//! - Entering an unowned-pool basket clears the agent, increments
//!   `distribution_count`, and starts the source basket's hold window.
//! - Entering an agent-owned basket requires an agent already assigned and
//!   clears any hold window. This executor never assigns an owner.
//! - When the stored basket is no longer `from`, nothing is written and the
//!   outcome is [`TransitionOutcome::Superseded`]; callers re-classify.
//! - A request carrying `expected_agent` only applies while that agent still
//!   owns the row; otherwise the outcome is [`TransitionOutcome::OwnerChanged`].
//! - `from == to` refreshes the entry timestamp and is only logged when the
//!   request carries materially new information.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let request =
//!     TransitionRequest::new(customer_id, BasketId(39), BasketId(53), TriggerKind::PeriodicAging)
//!         .with_note("aged out of personal_1_60");
//! match executor.transition(request).await? {
//!     TransitionOutcome::Moved { after, .. } => info!(basket = %after.current_basket, "moved"),
//!     TransitionOutcome::Refreshed { .. } => {}
//!     TransitionOutcome::Superseded { actual, .. } => reclassify(actual),
//!     TransitionOutcome::OwnerChanged { .. } => {}
//! }
//! ```

use crate::catalog::BasketCatalog;
use crate::clock::Clock;
use crate::error::{Result, RoutingError};
use crate::events::{AlertKind, RoutingEvent, RoutingEventPublisher};
use crate::logging::log_transition;
use crate::metrics;
use crate::models::{
    AgentId, BasketDefinition, BasketId, CustomerId, CustomerOwnership, NewTransitionLogEntry,
    OrderId, TargetAudience, TransitionLogEntry, TriggerKind,
};
use crate::store::{OwnershipStore, PlannedWrite};
use chrono::{DateTime, Duration, Utc};
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub customer_id: CustomerId,
    pub from: BasketId,
    pub to: BasketId,
    pub trigger: TriggerKind,
    pub triggering_agent: Option<AgentId>,
    pub order_id: Option<OrderId>,
    pub note: Option<String>,
    /// Apply only while this agent owns the row
    pub expected_agent: Option<AgentId>,
    /// Log a same-basket refresh
    pub materially_new: bool,
}

impl TransitionRequest {
    pub fn new(
        customer_id: CustomerId,
        from: BasketId,
        to: BasketId,
        trigger: TriggerKind,
    ) -> Self {
        Self {
            customer_id,
            from,
            to,
            trigger,
            triggering_agent: None,
            order_id: None,
            note: None,
            expected_agent: None,
            materially_new: false,
        }
    }

    pub fn with_triggering_agent(mut self, agent: AgentId) -> Self {
        self.triggering_agent = Some(agent);
        self
    }

    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_expected_agent(mut self, agent: AgentId) -> Self {
        self.expected_agent = Some(agent);
        self
    }

    pub fn materially_new(mut self) -> Self {
        self.materially_new = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Basket changed; exactly one log entry was written
    Moved {
        before: CustomerOwnership,
        after: CustomerOwnership,
        log_entry: TransitionLogEntry,
    },
    /// Same basket; entry timestamp refreshed, logged only if material
    Refreshed {
        ownership: CustomerOwnership,
        log_entry: Option<TransitionLogEntry>,
    },
    /// Stored basket moved on before this transition could apply
    Superseded { expected: BasketId, actual: BasketId },
    /// Row no longer belongs to the request's `expected_agent`
    OwnerChanged {
        expected: AgentId,
        actual: Option<AgentId>,
    },
}

impl TransitionOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, Self::Moved { .. })
    }
}

/// Check the ownership/audience pairing on a row
pub fn check_ownership_invariants(
    catalog: &BasketCatalog,
    ownership: &CustomerOwnership,
) -> Result<()> {
    let audience = catalog.audience_of(ownership.current_basket)?;
    match (audience, ownership.assigned_agent) {
        (TargetAudience::AgentOwned, None) => Err(RoutingError::invariant(
            ownership.customer_id,
            format!(
                "agent-owned basket {} without an assigned agent",
                ownership.current_basket
            ),
        )),
        (TargetAudience::UnownedPool, Some(agent)) => Err(RoutingError::invariant(
            ownership.customer_id,
            format!(
                "unowned-pool basket {} still assigned to agent {agent}",
                ownership.current_basket
            ),
        )),
        _ => Ok(()),
    }
}

/// Compute the write for `request` against the locked row.
///
/// Pure; shared by the executor and the aging preview.
pub fn plan_transition(
    catalog: &BasketCatalog,
    request: &TransitionRequest,
    current: &CustomerOwnership,
    now: DateTime<Utc>,
) -> Result<PlannedWrite> {
    if current.current_basket != request.from {
        return Err(RoutingError::Superseded {
            customer_id: request.customer_id,
            expected: request.from,
            actual: current.current_basket,
        });
    }
    if let Some(expected) = request.expected_agent {
        if current.assigned_agent != Some(expected) {
            return Err(RoutingError::OwnerChanged {
                customer_id: request.customer_id,
                expected,
                actual: current.assigned_agent,
            });
        }
    }

    let from_definition = catalog.get_definition(request.from)?;
    let to_definition = catalog.get_definition(request.to)?;
    let entered_at = now.max(current.basket_entered_at);

    let mut next = current.clone();
    next.basket_entered_at = entered_at;

    if request.from == request.to {
        if !request.materially_new {
            if next == *current {
                return Ok(PlannedWrite::Unchanged);
            }
            return Ok(PlannedWrite::Update {
                ownership: next,
                log: None,
            });
        }
    } else {
        next.current_basket = request.to;
        apply_audience_rules(from_definition, to_definition, &mut next, now)?;
    }

    check_ownership_invariants(catalog, &next)?;

    let log = NewTransitionLogEntry {
        customer_id: request.customer_id,
        from_basket: request.from,
        to_basket: request.to,
        trigger_kind: request.trigger,
        triggering_agent: request.triggering_agent,
        agent_before: current.assigned_agent,
        agent_after: next.assigned_agent,
        order_id: request.order_id.clone(),
        note: request.note.clone(),
        created_at: entered_at,
    };

    Ok(PlannedWrite::Update {
        ownership: next,
        log: Some(log),
    })
}

fn apply_audience_rules(
    from: &BasketDefinition,
    to: &BasketDefinition,
    next: &mut CustomerOwnership,
    now: DateTime<Utc>,
) -> Result<()> {
    match to.target_audience {
        TargetAudience::UnownedPool => {
            next.assigned_agent = None;
            next.distribution_count = next.distribution_count.checked_add(1).ok_or_else(|| {
                RoutingError::invariant(next.customer_id, "distribution_count overflow")
            })?;
            next.hold_until = (from.hold_days_before_redistribute > 0)
                .then(|| now + Duration::days(i64::from(from.hold_days_before_redistribute)));
        }
        TargetAudience::AgentOwned => {
            if next.assigned_agent.is_none() {
                return Err(RoutingError::invariant(
                    next.customer_id,
                    format!(
                        "target basket '{}' is agent-owned but no agent is assigned",
                        to.key
                    ),
                ));
            }
            next.hold_until = None;
        }
    }
    Ok(())
}

pub struct TransitionExecutor {
    catalog: Arc<BasketCatalog>,
    store: Arc<dyn OwnershipStore>,
    clock: Arc<dyn Clock>,
    events: RoutingEventPublisher,
}

impl std::fmt::Debug for TransitionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionExecutor")
            .field("baskets", &self.catalog.len())
            .field("subscribers", &self.events.subscriber_count())
            .finish()
    }
}

impl TransitionExecutor {
    pub fn new(
        catalog: Arc<BasketCatalog>,
        store: Arc<dyn OwnershipStore>,
        clock: Arc<dyn Clock>,
        events: RoutingEventPublisher,
    ) -> Self {
        Self {
            catalog,
            store,
            clock,
            events,
        }
    }

    pub fn catalog(&self) -> &Arc<BasketCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn OwnershipStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn events(&self) -> &RoutingEventPublisher {
        &self.events
    }

    #[instrument(skip(self, request), fields(
        customer_id = request.customer_id.0,
        from = request.from.0,
        to = request.to.0,
        trigger = %request.trigger
    ))]
    pub async fn transition(&self, request: TransitionRequest) -> Result<TransitionOutcome> {
        if let Err(e) = self.validate_request(&request) {
            return Err(self.reject(&request, e));
        }

        let now = self.clock.now();
        let catalog = Arc::clone(&self.catalog);
        let planner =
            |current: &CustomerOwnership| plan_transition(&catalog, &request, current, now);

        let applied = match self.store.apply(request.customer_id, &planner).await {
            Ok(applied) => applied,
            Err(RoutingError::Superseded {
                expected, actual, ..
            }) => {
                metrics::transitions_superseded_total()
                    .add(1, &[KeyValue::new("trigger", request.trigger.as_str())]);
                debug!(
                    expected = expected.0,
                    actual = actual.0,
                    "Transition superseded by concurrent write"
                );
                return Ok(TransitionOutcome::Superseded { expected, actual });
            }
            Err(RoutingError::OwnerChanged {
                expected, actual, ..
            }) => {
                metrics::transitions_superseded_total()
                    .add(1, &[KeyValue::new("trigger", request.trigger.as_str())]);
                debug!(
                    expected_agent = expected.0,
                    actual_agent = actual.map(|a| a.0),
                    "Transition skipped; row changed owner concurrently"
                );
                return Ok(TransitionOutcome::OwnerChanged { expected, actual });
            }
            Err(e) => return Err(self.reject(&request, e)),
        };

        if applied.before.current_basket == applied.after.current_basket {
            if applied.changed() {
                self.events.publish(RoutingEvent::EntryRefreshed {
                    customer_id: request.customer_id,
                    basket: applied.after.current_basket,
                    at: applied.after.basket_entered_at,
                });
            }
            if let Some(entry) = &applied.log_entry {
                self.record_committed(&request, &applied.before, &applied.after, entry);
            }
            return Ok(TransitionOutcome::Refreshed {
                ownership: applied.after,
                log_entry: applied.log_entry,
            });
        }

        let Some(log_entry) = applied.log_entry else {
            // The planner always logs a basket change; a store that drops it
            // has broken the one-log-per-mutation rule
            return Err(self.reject(
                &request,
                RoutingError::invariant(request.customer_id, "basket changed without a log entry"),
            ));
        };

        self.record_committed(&request, &applied.before, &applied.after, &log_entry);

        Ok(TransitionOutcome::Moved {
            before: applied.before,
            after: applied.after,
            log_entry,
        })
    }

    fn validate_request(&self, request: &TransitionRequest) -> Result<()> {
        let unknown = |basket: BasketId| {
            RoutingError::invariant(request.customer_id, format!("unknown basket {basket}"))
        };
        self.catalog
            .get_definition(request.from)
            .map_err(|_| unknown(request.from))?;
        let to = self
            .catalog
            .get_definition(request.to)
            .map_err(|_| unknown(request.to))?;

        if request.from != request.to && !to.is_active {
            return Err(RoutingError::invariant(
                request.customer_id,
                format!("target basket '{}' is inactive", to.key),
            ));
        }
        Ok(())
    }

    fn record_committed(
        &self,
        request: &TransitionRequest,
        before: &CustomerOwnership,
        after: &CustomerOwnership,
        entry: &TransitionLogEntry,
    ) {
        log_transition(
            request.customer_id,
            entry.from_basket,
            entry.to_basket,
            request.trigger,
            request.triggering_agent,
            before.assigned_agent,
            after.assigned_agent,
            Some(entry.id),
        );
        metrics::transitions_committed_total().add(
            1,
            &[
                KeyValue::new("trigger", request.trigger.as_str()),
                KeyValue::new("to_basket", i64::from(entry.to_basket.0)),
            ],
        );
        self.events.publish(RoutingEvent::TransitionCommitted {
            customer_id: request.customer_id,
            from_basket: entry.from_basket,
            to_basket: entry.to_basket,
            trigger: request.trigger,
            agent_before: before.assigned_agent,
            agent_after: after.assigned_agent,
            log_id: Some(entry.id),
            at: entry.created_at,
        });
    }

    fn reject(&self, request: &TransitionRequest, error: RoutingError) -> RoutingError {
        metrics::transitions_rejected_total().add(1, &[KeyValue::new("reason", error.kind())]);
        if let RoutingError::TransitionInvariantViolation { .. } = &error {
            self.events.alert(
                AlertKind::TransitionInvariantViolation,
                Some(request.customer_id),
                Some(request.to),
                error.to_string(),
                self.clock.now(),
            );
        } else {
            warn!(error = %error, "Transition rejected");
        }
        error
    }
}
