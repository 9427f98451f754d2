//! # Periodic Aging Driver
//!
//! Moves customers out of baskets whose dwell timeout (`fail_after_days`) has
//! elapsed. Each basket is swept in bounded keyset-paged batches; every
//! customer's transition commits on its own, so cancelling between batches
//! never leaves a batch half-applied.
//!
//! ## Sweep Flow
//!
//! 1. Select customers with `basket_entered_at <= now - fail_after_days`
//! 2. Skip unowned-pool customers still inside their hold window
//! 3. Target the re-evaluated pool basket or the configured `on_fail_basket`
//! 4. Redirect to the overflow basket when the distribution cap is reached
//! 5. Hand the move to the executor, or record it when previewing
//!
//! A transient store error retries the current batch with exponential
//! backoff, resuming after the last customer already processed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let driver = AgingDriver::new(executor, classifier, orders, &config.aging);
//!
//! let planned = driver.preview(BasketId(39)).await?;
//! let report = driver.sweep_basket(BasketId(39), false).await?;
//!
//! tokio::spawn(async move { driver.run().await });
//! ```

use super::{CancellationHandle, CustomerFailure, RetryPolicy};
use crate::classifier::Classifier;
use crate::config::AgingConfig;
use crate::error::{Result, RoutingError};
use crate::events::{AlertKind, RoutingEvent};
use crate::executor::{TransitionExecutor, TransitionOutcome, TransitionRequest};
use crate::logging::log_batch_summary;
use crate::metrics;
use crate::models::ownership::whole_days_between;
use crate::models::{BasketDefinition, BasketId, CustomerId, CustomerOwnership, TriggerKind};
use crate::sources::OrderSource;
use crate::store::OverdueQuery;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveReason {
    /// Dwell timeout elapsed, configured `on_fail_basket`
    OnFail,
    /// Dwell timeout elapsed, pool ladder re-evaluated
    Reevaluated,
    /// Distribution cap reached, overflow basket
    Overflow,
}

impl fmt::Display for MoveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OnFail => "on_fail",
            Self::Reevaluated => "reevaluated",
            Self::Overflow => "overflow",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedMove {
    pub customer_id: CustomerId,
    pub from: BasketId,
    pub to: BasketId,
    pub reason: MoveReason,
}

/// Outcome counts for one basket in one sweep run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketSweepReport {
    pub run_id: Uuid,
    pub basket: BasketId,
    pub dry_run: bool,
    pub examined: usize,
    pub moved: usize,
    /// Re-evaluation landed on the same basket; dwell restarted
    pub refreshed: usize,
    pub held: usize,
    pub superseded: usize,
    /// Stale or vanished rows
    pub skipped: usize,
    pub ambiguous: usize,
    pub failures: Vec<CustomerFailure>,
    /// Moves that would be (dry run) or were attempted
    pub planned: Vec<PlannedMove>,
    pub batches: usize,
    pub cancelled: bool,
    /// Set when retries were exhausted or a batch hit a permanent store error
    pub aborted: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl BasketSweepReport {
    fn new(run_id: Uuid, basket: BasketId, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            basket,
            dry_run,
            examined: 0,
            moved: 0,
            refreshed: 0,
            held: 0,
            superseded: 0,
            skipped: 0,
            ambiguous: 0,
            failures: Vec::new(),
            planned: Vec::new(),
            batches: 0,
            cancelled: false,
            aborted: None,
            started_at,
            duration_ms: 0,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Customers whose sweep step completed
    pub fn succeeded(&self) -> usize {
        if self.dry_run {
            self.planned.len()
        } else {
            self.moved + self.refreshed
        }
    }
}

/// One sweep run across every aging basket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub baskets: Vec<BasketSweepReport>,
    pub cancelled: bool,
}

impl SweepReport {
    pub fn total_moved(&self) -> usize {
        self.baskets.iter().map(|b| b.moved).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.baskets.iter().map(BasketSweepReport::failed).sum()
    }

    pub fn total_examined(&self) -> usize {
        self.baskets.iter().map(|b| b.examined).sum()
    }
}

enum BatchStatus {
    More,
    Exhausted,
}

enum CustomerStep {
    Moved,
    Refreshed,
    Planned,
    Held,
    Superseded,
}

impl CustomerStep {
    fn outcome(&self) -> &'static str {
        match self {
            Self::Moved | Self::Planned => "moved",
            Self::Refreshed => "refreshed",
            Self::Held => "held",
            Self::Superseded => "superseded",
        }
    }
}

pub struct AgingDriver {
    executor: Arc<TransitionExecutor>,
    classifier: Arc<Classifier>,
    orders: Arc<dyn OrderSource>,
    enabled: bool,
    batch_size: usize,
    sweep_interval: Duration,
    retry: RetryPolicy,
    cancel: CancellationHandle,
}

impl fmt::Debug for AgingDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgingDriver")
            .field("enabled", &self.enabled)
            .field("batch_size", &self.batch_size)
            .field("sweep_interval", &self.sweep_interval)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl AgingDriver {
    pub fn new(
        executor: Arc<TransitionExecutor>,
        classifier: Arc<Classifier>,
        orders: Arc<dyn OrderSource>,
        config: &AgingConfig,
    ) -> Self {
        Self {
            executor,
            classifier,
            orders,
            enabled: config.enabled,
            batch_size: config.batch_size.max(1),
            sweep_interval: config.sweep_interval(),
            retry: RetryPolicy::from(config),
            cancel: CancellationHandle::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancel
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Moves the next sweep of `basket` would make, without writing anything
    pub async fn preview(&self, basket: BasketId) -> Result<Vec<PlannedMove>> {
        let report = self.sweep_basket(basket, true).await?;
        Ok(report.planned)
    }

    /// Sweep one basket. Fails only when `basket` is not an aging basket;
    /// per-customer and store failures are reported.
    pub async fn sweep_basket(&self, basket: BasketId, dry_run: bool) -> Result<BasketSweepReport> {
        let definition = self.aging_definition(basket)?;
        Ok(self.sweep_definition(definition, Uuid::new_v4(), dry_run).await)
    }

    /// Sweep every aging basket in id order until done or cancelled
    pub async fn sweep_all(&self, dry_run: bool) -> SweepReport {
        let run_id = Uuid::new_v4();
        let catalog = Arc::clone(self.executor.catalog());
        let mut baskets = Vec::new();

        for definition in catalog.aging_baskets() {
            if self.cancel.is_cancelled() {
                break;
            }
            baskets.push(self.sweep_definition(definition, run_id, dry_run).await);
        }

        let cancelled =
            self.cancel.is_cancelled() || baskets.iter().any(|report| report.cancelled);
        SweepReport {
            run_id,
            baskets,
            cancelled,
        }
    }

    /// Sweep on the configured interval until cancelled
    pub async fn run(&self) {
        if !self.enabled {
            info!("Aging driver disabled; not starting sweep loop");
            return;
        }

        info!(
            interval_seconds = self.sweep_interval.as_secs(),
            batch_size = self.batch_size,
            "Starting aging driver"
        );

        let mut ticker = interval(self.sweep_interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Aging driver cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.sweep_all(false).await;
                    if report.total_examined() > 0 {
                        info!(
                            run_id = %report.run_id,
                            baskets = report.baskets.len(),
                            moved = report.total_moved(),
                            failed = report.total_failed(),
                            "Aging sweep completed"
                        );
                    } else {
                        debug!(run_id = %report.run_id, "No overdue customers this cycle");
                    }
                }
            }
        }
    }

    fn aging_definition(&self, basket: BasketId) -> Result<&BasketDefinition> {
        let definition = self.executor.catalog().get_definition(basket)?;
        let ages = self
            .executor
            .catalog()
            .aging_baskets()
            .any(|d| d.id == definition.id);
        if !ages {
            return Err(RoutingError::InvalidRequest(format!(
                "basket '{}' ({basket}) is not an active basket with a dwell timeout",
                definition.key
            )));
        }
        Ok(definition)
    }

    #[instrument(skip(self, definition), fields(basket = definition.id.0, key = %definition.key))]
    async fn sweep_definition(
        &self,
        definition: &BasketDefinition,
        run_id: Uuid,
        dry_run: bool,
    ) -> BasketSweepReport {
        let started = Instant::now();
        let now = self.executor.clock().now();
        let mut report = BasketSweepReport::new(run_id, definition.id, dry_run, now);
        let fail_after = definition.fail_after_days.unwrap_or_default();
        let cutoff = now - ChronoDuration::days(i64::from(fail_after));

        let mut cursor: Option<CustomerId> = None;
        let mut retries = 0;

        loop {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self
                .process_batch(definition, cutoff, now, &mut cursor, &mut report)
                .await
            {
                Ok(status) => {
                    report.batches += 1;
                    retries = 0;
                    if let BatchStatus::Exhausted = status {
                        break;
                    }
                }
                Err(e) if e.is_transient() && retries < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retries);
                    warn!(
                        run_id = %run_id,
                        after_customer = cursor.map(|c| c.0),
                        retry = retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient store error during sweep batch, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(e) => {
                    report.aborted = Some(e.to_string());
                    self.executor.events().alert(
                        AlertKind::SweepAborted,
                        None,
                        Some(definition.id),
                        format!("aging sweep of '{}' aborted: {e}", definition.key),
                        self.executor.clock().now(),
                    );
                    break;
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.finish(&report);
        report
    }

    async fn process_batch(
        &self,
        definition: &BasketDefinition,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
        cursor: &mut Option<CustomerId>,
        report: &mut BasketSweepReport,
    ) -> Result<BatchStatus> {
        let query = OverdueQuery {
            basket: definition.id,
            entered_at_or_before: cutoff,
            after_customer: *cursor,
            limit: self.batch_size,
        };
        let rows = self.executor.store().find_overdue(&query).await?;
        let page_len = rows.len();

        for row in rows {
            match self.process_customer(definition, &row, now, report).await {
                Ok(step) => {
                    report.examined += 1;
                    record_customer(definition.id, step.outcome());
                    match step {
                        CustomerStep::Moved => report.moved += 1,
                        CustomerStep::Refreshed => report.refreshed += 1,
                        CustomerStep::Held => report.held += 1,
                        CustomerStep::Superseded => report.superseded += 1,
                        CustomerStep::Planned => {}
                    }
                }
                // Leave the cursor before this customer so the retry picks it up
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    report.examined += 1;
                    self.record_failure(definition, &row, e, report);
                }
            }
            *cursor = Some(row.customer_id);
        }

        Ok(if page_len < self.batch_size {
            BatchStatus::Exhausted
        } else {
            BatchStatus::More
        })
    }

    async fn process_customer(
        &self,
        definition: &BasketDefinition,
        row: &CustomerOwnership,
        now: DateTime<Utc>,
        report: &mut BasketSweepReport,
    ) -> Result<CustomerStep> {
        if row.assigned_agent.is_none() && row.is_held(now) {
            debug!(
                customer_id = row.customer_id.0,
                hold_until = ?row.hold_until,
                "Customer inside hold window; not redistributing"
            );
            return Ok(CustomerStep::Held);
        }

        let planned = self.plan_move(definition, row, now).await?;
        if report.dry_run {
            report.planned.push(planned);
            return Ok(CustomerStep::Planned);
        }

        let request = TransitionRequest::new(
            planned.customer_id,
            planned.from,
            planned.to,
            TriggerKind::PeriodicAging,
        )
        .with_note(format!(
            "{}: {} days in '{}'",
            planned.reason,
            row.days_in_basket(now),
            definition.key
        ));

        let result = self.executor.transition(request).await;
        // A transient failure is retried with the batch and recorded then
        if !matches!(&result, Err(e) if e.is_transient()) {
            report.planned.push(planned.clone());
        }

        Ok(match result? {
            TransitionOutcome::Moved { .. } => CustomerStep::Moved,
            TransitionOutcome::Refreshed { .. } => CustomerStep::Refreshed,
            TransitionOutcome::Superseded { actual, .. } => {
                debug!(
                    customer_id = planned.customer_id.0,
                    actual = actual.0,
                    "Customer moved concurrently; leaving for the next sweep"
                );
                CustomerStep::Superseded
            }
            TransitionOutcome::OwnerChanged { .. } => CustomerStep::Superseded,
        })
    }

    async fn plan_move(
        &self,
        definition: &BasketDefinition,
        row: &CustomerOwnership,
        now: DateTime<Utc>,
    ) -> Result<PlannedMove> {
        let catalog = self.executor.catalog();

        let (mut target, mut reason) = if definition.on_fail_reevaluate {
            let days = match self.orders.latest_order(row.customer_id).await? {
                Some(order) => whole_days_between(order.order_date, now),
                None => row.days_since_registration(now),
            };
            (self.classifier.reevaluate_pool(days), MoveReason::Reevaluated)
        } else {
            let target = catalog.on_fail_target(definition.id)?.ok_or_else(|| {
                RoutingError::ambiguous(
                    row.customer_id,
                    format!("basket '{}' has no on_fail_basket configured", definition.key),
                )
            })?;
            (target, MoveReason::OnFail)
        };

        if definition.has_distribution_cap()
            && row.distribution_count >= definition.max_distribution_count
        {
            target = catalog.overflow_target(definition.id)?.ok_or_else(|| {
                RoutingError::ambiguous(
                    row.customer_id,
                    format!(
                        "distribution cap {} reached in '{}' but no overflow basket is configured",
                        definition.max_distribution_count, definition.key
                    ),
                )
            })?;
            reason = MoveReason::Overflow;
        }

        Ok(PlannedMove {
            customer_id: row.customer_id,
            from: row.current_basket,
            to: target,
            reason,
        })
    }

    fn record_failure(
        &self,
        definition: &BasketDefinition,
        row: &CustomerOwnership,
        error: RoutingError,
        report: &mut BasketSweepReport,
    ) {
        match &error {
            RoutingError::ClassificationAmbiguous { .. } => {
                report.ambiguous += 1;
                record_customer(definition.id, "ambiguous");
                if !report.dry_run {
                    metrics::classification_ambiguous_total()
                        .add(1, &[KeyValue::new("source", "periodic_aging")]);
                    self.executor.events().alert(
                        AlertKind::ClassificationAmbiguous,
                        Some(row.customer_id),
                        Some(definition.id),
                        error.to_string(),
                        self.executor.clock().now(),
                    );
                }
                report.failures.push(CustomerFailure::new(row.customer_id, &error));
            }
            e if e.is_row_skippable() => {
                report.skipped += 1;
                record_customer(definition.id, "skipped");
                warn!(
                    customer_id = row.customer_id.0,
                    error = %e,
                    "Skipping customer with stale classification input"
                );
            }
            _ => {
                record_customer(definition.id, "failed");
                report.failures.push(CustomerFailure::new(row.customer_id, &error));
            }
        }
    }

    fn finish(&self, report: &BasketSweepReport) {
        metrics::sweep_duration().record(
            report.duration_ms as f64,
            &[
                KeyValue::new("basket", i64::from(report.basket.0)),
                KeyValue::new("dry_run", report.dry_run),
            ],
        );

        log_batch_summary(
            "aging_sweep",
            &report.run_id.to_string(),
            Some(report.basket),
            report.succeeded(),
            report.failed(),
            report.duration_ms,
            report.dry_run,
        );

        self.executor.events().publish(RoutingEvent::SweepCompleted {
            run_id: report.run_id,
            basket: report.basket,
            moved: report.moved,
            failed: report.failed(),
            dry_run: report.dry_run,
        });
    }
}

fn record_customer(basket: BasketId, outcome: &'static str) {
    metrics::sweep_customers_total().add(
        1,
        &[
            KeyValue::new("basket", i64::from(basket.0)),
            KeyValue::new("outcome", outcome),
        ],
    );
}
