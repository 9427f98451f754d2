//! # Real-Time Event Driver
//!
//! Re-classifies a customer whenever one of their orders changes status. The
//! hook never trusts the event payload for classification: it re-reads the
//! stored ownership row and the latest qualifying order, so replays and
//! out-of-order deliveries converge on the same basket.

use crate::classifier::{ClassificationInput, Classifier, RuleId};
use crate::error::{Result, RoutingError};
use crate::events::AlertKind;
use crate::executor::{TransitionExecutor, TransitionOutcome, TransitionRequest};
use crate::metrics;
use crate::models::{AgentId, BasketId, CustomerId, OrderId, OrderStatus, TriggerKind};
use crate::sources::{OrderSource, RoleDirectory};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RealtimeOutcome {
    Moved {
        from: BasketId,
        to: BasketId,
        rule: RuleId,
    },
    /// Same basket, newer order: dwell clock restarted
    Refreshed { basket: BasketId },
    Unchanged { basket: BasketId },
    /// Classification was ambiguous; an operator alert was raised
    LeftInPlace { basket: BasketId, reason: String },
    /// Unknown customer or stale input; nothing to do
    Skipped { reason: String },
}

impl RealtimeOutcome {
    pub fn basket(&self) -> Option<BasketId> {
        match self {
            Self::Moved { to, .. } => Some(*to),
            Self::Refreshed { basket }
            | Self::Unchanged { basket }
            | Self::LeftInPlace { basket, .. } => Some(*basket),
            Self::Skipped { .. } => None,
        }
    }
}

/// Why a customer is being re-classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclassifyCause {
    pub trigger: TriggerKind,
    pub triggering_agent: Option<AgentId>,
    pub order_id: Option<OrderId>,
    pub note: Option<String>,
}

impl ReclassifyCause {
    pub fn order_event(order_id: OrderId, status: &OrderStatus) -> Self {
        Self {
            trigger: TriggerKind::OrderEvent,
            triggering_agent: None,
            note: Some(format!("order {order_id} is now {status}")),
            order_id: Some(order_id),
        }
    }

    /// Operator repair run
    pub fn fix_script(operator: AgentId, note: impl Into<String>) -> Self {
        Self {
            trigger: TriggerKind::FixScript,
            triggering_agent: Some(operator),
            order_id: None,
            note: Some(note.into()),
        }
    }
}

pub struct RealtimeDriver {
    executor: Arc<TransitionExecutor>,
    classifier: Arc<Classifier>,
    orders: Arc<dyn OrderSource>,
    roles: Arc<dyn RoleDirectory>,
    max_attempts: u32,
}

impl fmt::Debug for RealtimeDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeDriver")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RealtimeDriver {
    pub fn new(
        executor: Arc<TransitionExecutor>,
        classifier: Arc<Classifier>,
        orders: Arc<dyn OrderSource>,
        roles: Arc<dyn RoleDirectory>,
        max_attempts: u32,
    ) -> Self {
        Self {
            executor,
            classifier,
            orders,
            roles,
            max_attempts: max_attempts.max(1),
        }
    }

    #[instrument(skip(self), fields(customer_id = customer_id.0, order_id = %order_id))]
    pub async fn on_order_status_changed(
        &self,
        customer_id: CustomerId,
        order_id: &OrderId,
        new_status: &OrderStatus,
    ) -> Result<RealtimeOutcome> {
        let resolved = self.orders.resolve_parent(order_id).await?;
        if &resolved != order_id {
            debug!(parent = %resolved, "Resolved sub-order to parent order");
        }
        self.reclassify_customer(customer_id, ReclassifyCause::order_event(resolved, new_status))
            .await
    }

    /// Re-run classification against fresh state and apply the result.
    ///
    /// A lost race re-reads and re-classifies, up to the configured attempts;
    /// running out of attempts is a transient error for the caller to retry.
    pub async fn reclassify_customer(
        &self,
        customer_id: CustomerId,
        cause: ReclassifyCause,
    ) -> Result<RealtimeOutcome> {
        for attempt in 1..=self.max_attempts {
            match self.attempt(customer_id, &cause).await? {
                Some(outcome) => return Ok(outcome),
                None => debug!(
                    customer_id = customer_id.0,
                    attempt = attempt,
                    "Transition superseded; re-classifying against fresh state"
                ),
            }
        }

        Err(RoutingError::TransientStore(format!(
            "customer {customer_id} was still contended after {} classification attempts",
            self.max_attempts
        )))
    }

    /// `Ok(None)` means the transition was superseded
    async fn attempt(
        &self,
        customer_id: CustomerId,
        cause: &ReclassifyCause,
    ) -> Result<Option<RealtimeOutcome>> {
        let Some(ownership) = self.executor.store().get(customer_id).await? else {
            let reason = format!("customer {customer_id} has no ownership record");
            warn!(customer_id = customer_id.0, "Skipping event for unknown customer");
            return Ok(Some(RealtimeOutcome::Skipped { reason }));
        };

        let mut latest = self.orders.latest_order(customer_id).await?;
        if let Some(order) = latest.as_mut() {
            if order.creator_role.is_none() {
                order.creator_role = self.roles.agent_role(order.creator_id).await?;
            }
        }

        let now = self.executor.clock().now();
        let input = ClassificationInput {
            ownership: &ownership,
            latest_order: latest.as_ref(),
            now,
        };
        let classification = match self.classifier.classify(&input) {
            Ok(classification) => classification,
            Err(e @ RoutingError::ClassificationAmbiguous { .. }) => {
                metrics::classification_ambiguous_total()
                    .add(1, &[KeyValue::new("source", cause.trigger.as_str())]);
                self.executor.events().alert(
                    AlertKind::ClassificationAmbiguous,
                    Some(customer_id),
                    Some(ownership.current_basket),
                    e.to_string(),
                    now,
                );
                return Ok(Some(RealtimeOutcome::LeftInPlace {
                    basket: ownership.current_basket,
                    reason: e.to_string(),
                }));
            }
            Err(e) if e.is_row_skippable() => {
                warn!(
                    customer_id = customer_id.0,
                    error = %e,
                    "Skipping re-classification with stale input"
                );
                return Ok(Some(RealtimeOutcome::Skipped {
                    reason: e.to_string(),
                }));
            }
            Err(e) => return Err(e),
        };

        if classification.basket == ownership.current_basket {
            let newer_order = latest
                .as_ref()
                .is_some_and(|order| order.order_date > ownership.basket_entered_at);
            if !newer_order {
                return Ok(Some(RealtimeOutcome::Unchanged {
                    basket: ownership.current_basket,
                }));
            }
        }

        let mut request = TransitionRequest::new(
            customer_id,
            ownership.current_basket,
            classification.basket,
            cause.trigger,
        );
        // The creator of the order that fired the event is the triggering agent
        let triggering_agent = cause.triggering_agent.or_else(|| {
            latest
                .as_ref()
                .filter(|order| cause.order_id.as_ref() == Some(&order.id))
                .map(|order| order.creator_id)
        });
        if let Some(agent) = triggering_agent {
            request = request.with_triggering_agent(agent);
        }
        if let Some(order_id) = cause.order_id.clone() {
            request = request.with_order(order_id);
        }
        if let Some(note) = &cause.note {
            request = request.with_note(format!("{note} (rule {})", classification.rule));
        }

        match self.executor.transition(request).await {
            Ok(TransitionOutcome::Moved { before, after, .. }) => {
                Ok(Some(RealtimeOutcome::Moved {
                    from: before.current_basket,
                    to: after.current_basket,
                    rule: classification.rule,
                }))
            }
            Ok(TransitionOutcome::Refreshed { ownership, .. }) => {
                Ok(Some(RealtimeOutcome::Refreshed {
                    basket: ownership.current_basket,
                }))
            }
            // Real-time requests never pin an owner, so an owner change is
            // re-read like any other lost race
            Ok(TransitionOutcome::Superseded { .. } | TransitionOutcome::OwnerChanged { .. }) => {
                Ok(None)
            }
            Err(e) if e.is_row_skippable() => Ok(Some(RealtimeOutcome::Skipped {
                reason: e.to_string(),
            })),
            Err(e) => Err(e),
        }
    }
}
