//! # Manual Reclaim
//!
//! Operator-triggered release of an agent's customers back to the unowned
//! pool. Each customer moves from their agent-owned basket into that basket's
//! linked pool basket in its own transition, logged as `manual_reclaim` with
//! the operator as the triggering agent.

use super::{CustomerFailure, RetryPolicy};
use crate::error::{Result, RoutingError};
use crate::events::{AlertKind, RoutingEvent};
use crate::executor::{TransitionExecutor, TransitionOutcome, TransitionRequest};
use crate::logging::log_batch_summary;
use crate::models::{AgentId, BasketId, CustomerId, TriggerKind};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// One basket to reclaim from, optionally capped at `limit` customers
/// (oldest entries first)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketSelector {
    pub basket: BasketId,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl BasketSelector {
    pub fn all(basket: BasketId) -> Self {
        Self {
            basket,
            limit: None,
        }
    }

    pub fn limited(basket: BasketId, limit: usize) -> Self {
        Self {
            basket,
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasketFilter {
    /// Every agent-owned basket in the catalog
    AllAgentOwned,
    Baskets(Vec<BasketSelector>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimRequest {
    pub operator: AgentId,
    pub agent: AgentId,
    pub filter: BasketFilter,
    pub note: Option<String>,
}

impl ReclaimRequest {
    pub fn new(operator: AgentId, agent: AgentId, filter: BasketFilter) -> Self {
        Self {
            operator,
            agent,
            filter,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketReclaimCount {
    pub basket: BasketId,
    pub target: BasketId,
    pub reclaimed: usize,
    /// Set when the basket's customers could not be listed
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    pub run_id: Uuid,
    pub operator: AgentId,
    pub agent: AgentId,
    pub reclaimed: usize,
    /// Customers that left the basket or changed owner before their release
    /// committed
    pub superseded: usize,
    pub failures: Vec<CustomerFailure>,
    pub per_basket: Vec<BasketReclaimCount>,
    pub duration_ms: u64,
}

impl ReclaimReport {
    pub fn count(&self) -> usize {
        self.reclaimed
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn failed_baskets(&self) -> usize {
        self.per_basket.iter().filter(|b| b.error.is_some()).count()
    }
}

pub struct ReclaimDriver {
    executor: Arc<TransitionExecutor>,
    retry: RetryPolicy,
    concurrency: usize,
}

impl fmt::Debug for ReclaimDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReclaimDriver")
            .field("retry", &self.retry)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl ReclaimDriver {
    pub fn new(executor: Arc<TransitionExecutor>, retry: RetryPolicy, concurrency: usize) -> Self {
        Self {
            executor,
            retry,
            concurrency: concurrency.max(1),
        }
    }

    /// Release the matching customers of `request.agent` to the pool.
    ///
    /// An invalid filter is rejected before anything is written. A basket
    /// whose customers cannot be listed after retries is recorded in the
    /// report and the remaining baskets are still reclaimed.
    #[instrument(
        skip(self, request),
        fields(operator = request.operator.0, agent = request.agent.0)
    )]
    pub async fn reclaim(&self, request: &ReclaimRequest) -> Result<ReclaimReport> {
        let started = Instant::now();
        let selectors = self.resolve_filter(&request.filter)?;
        let catalog = self.executor.catalog();
        let mut targets = Vec::with_capacity(selectors.len());
        for selector in &selectors {
            targets.push((selector, catalog.linked_pool_basket(selector.basket)?));
        }
        let mut report = ReclaimReport {
            run_id: Uuid::new_v4(),
            operator: request.operator,
            agent: request.agent,
            reclaimed: 0,
            superseded: 0,
            failures: Vec::new(),
            per_basket: Vec::new(),
            duration_ms: 0,
        };

        for (selector, target) in targets {
            let count = match self.reclaim_basket(request, selector, target, &mut report).await {
                Ok(reclaimed) => BasketReclaimCount {
                    basket: selector.basket,
                    target,
                    reclaimed,
                    error: None,
                },
                Err(e) => {
                    self.executor.events().alert(
                        AlertKind::ReclaimIncomplete,
                        None,
                        Some(selector.basket),
                        format!(
                            "reclaim from agent {} skipped basket {}: {e}",
                            request.agent, selector.basket
                        ),
                        self.executor.clock().now(),
                    );
                    BasketReclaimCount {
                        basket: selector.basket,
                        target,
                        reclaimed: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.per_basket.push(count);
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        log_batch_summary(
            "manual_reclaim",
            &report.run_id.to_string(),
            None,
            report.reclaimed,
            report.failed(),
            report.duration_ms,
            false,
        );
        self.executor.events().publish(RoutingEvent::ReclaimCompleted {
            operator: request.operator,
            agent: request.agent,
            reclaimed: report.reclaimed,
            failed: report.failed(),
        });

        Ok(report)
    }

    fn resolve_filter(&self, filter: &BasketFilter) -> Result<Vec<BasketSelector>> {
        let catalog = self.executor.catalog();
        match filter {
            BasketFilter::AllAgentOwned => Ok(catalog
                .definitions()
                .filter(|d| d.is_agent_owned())
                .map(|d| BasketSelector::all(d.id))
                .collect()),
            BasketFilter::Baskets(selectors) => {
                if selectors.is_empty() {
                    return Err(RoutingError::InvalidRequest(
                        "reclaim filter names no baskets".to_string(),
                    ));
                }
                for selector in selectors {
                    let definition = catalog.get_definition(selector.basket).map_err(|_| {
                        RoutingError::InvalidRequest(format!("unknown basket {}", selector.basket))
                    })?;
                    if !definition.is_agent_owned() {
                        return Err(RoutingError::InvalidRequest(format!(
                            "basket '{}' is not agent-owned; nothing to reclaim",
                            definition.key
                        )));
                    }
                }
                Ok(selectors.clone())
            }
        }
    }

    async fn reclaim_basket(
        &self,
        request: &ReclaimRequest,
        selector: &BasketSelector,
        target: BasketId,
        report: &mut ReclaimReport,
    ) -> Result<usize> {
        let store = self.executor.store();
        let rows = self
            .retry
            .run("reclaim_find_by_agent", || {
                store.find_by_agent(request.agent, selector.basket, selector.limit)
            })
            .await?;

        debug!(
            basket = selector.basket.0,
            target = target.0,
            customers = rows.len(),
            "Reclaiming customers"
        );

        let executor: &TransitionExecutor = &self.executor;
        let retry = &self.retry;
        let results: Vec<(CustomerId, Result<TransitionOutcome>)> = stream::iter(rows)
            .map(|row| {
                let mut transition = TransitionRequest::new(
                    row.customer_id,
                    row.current_basket,
                    target,
                    TriggerKind::ManualReclaim,
                )
                .with_triggering_agent(request.operator)
                .with_expected_agent(request.agent);
                if let Some(note) = &request.note {
                    transition = transition.with_note(note.clone());
                }
                async move {
                    let outcome = retry
                        .run("reclaim_transition", || executor.transition(transition.clone()))
                        .await;
                    (row.customer_id, outcome)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut reclaimed = 0;
        for (customer_id, outcome) in results {
            match outcome {
                Ok(TransitionOutcome::Moved { .. }) => reclaimed += 1,
                Ok(
                    TransitionOutcome::Superseded { .. } | TransitionOutcome::OwnerChanged { .. },
                ) => report.superseded += 1,
                Ok(TransitionOutcome::Refreshed { .. }) => {}
                Err(e) => report.failures.push(CustomerFailure::new(customer_id, &e)),
            }
        }
        report.reclaimed += reclaimed;

        info!(
            basket = selector.basket.0,
            target = target.0,
            reclaimed = reclaimed,
            "Reclaimed customers from basket"
        );
        Ok(reclaimed)
    }
}
