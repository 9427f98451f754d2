//! In-process [`OwnershipStore`] with the same per-row atomicity as the
//! Postgres store. Used by tests and dry runs; failure injection lets callers
//! exercise rollback and retry paths.

use super::{AppliedWrite, OverdueQuery, OwnershipStore, PlannedWrite, WritePlanner};
use crate::error::{Result, RoutingError};
use crate::models::{AgentId, BasketId, CustomerId, CustomerOwnership, TransitionLogEntry};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<CustomerId, CustomerOwnership>,
    log: Vec<TransitionLogEntry>,
    next_log_id: i64,
}

#[derive(Debug, Default)]
pub struct InMemoryOwnershipStore {
    state: Mutex<State>,
    failing_log_writes: AtomicUsize,
    transient_applies: AtomicUsize,
    transient_finds: AtomicUsize,
}

impl InMemoryOwnershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row directly, bypassing the executor
    pub fn seed(&self, ownership: CustomerOwnership) {
        self.state
            .lock()
            .rows
            .insert(ownership.customer_id, ownership);
    }

    pub fn rows(&self) -> Vec<CustomerOwnership> {
        self.state.lock().rows.values().cloned().collect()
    }

    pub fn log_entries(&self) -> Vec<TransitionLogEntry> {
        self.state.lock().log.clone()
    }

    /// The next `count` writes that carry a log entry fail, leaving no trace
    pub fn fail_next_log_writes(&self, count: usize) {
        self.failing_log_writes.store(count, Ordering::SeqCst);
    }

    /// The next `count` calls to `apply` fail with a transient error
    pub fn fail_next_applies_transiently(&self, count: usize) {
        self.transient_applies.store(count, Ordering::SeqCst);
    }

    /// The next `count` calls to `find_overdue` fail with a transient error
    pub fn fail_next_finds_transiently(&self, count: usize) {
        self.transient_finds.store(count, Ordering::SeqCst);
    }

    fn take_injected(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl OwnershipStore for InMemoryOwnershipStore {
    async fn create(&self, ownership: CustomerOwnership) -> Result<CustomerOwnership> {
        let mut state = self.state.lock();
        if state.rows.contains_key(&ownership.customer_id) {
            return Err(RoutingError::Database(format!(
                "ownership for customer {} already exists",
                ownership.customer_id
            )));
        }
        state.rows.insert(ownership.customer_id, ownership.clone());
        Ok(ownership)
    }

    async fn get(&self, customer_id: CustomerId) -> Result<Option<CustomerOwnership>> {
        Ok(self.state.lock().rows.get(&customer_id).cloned())
    }

    async fn apply(
        &self,
        customer_id: CustomerId,
        planner: &WritePlanner<'_>,
    ) -> Result<AppliedWrite> {
        if Self::take_injected(&self.transient_applies) {
            return Err(RoutingError::TransientStore(
                "injected lock timeout".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let before = state
            .rows
            .get(&customer_id)
            .cloned()
            .ok_or(RoutingError::CustomerNotFound(customer_id))?;

        match planner(&before)? {
            PlannedWrite::Unchanged => Ok(AppliedWrite {
                after: before.clone(),
                before,
                log_entry: None,
            }),
            PlannedWrite::Update { ownership, log } => {
                if log.is_some() && Self::take_injected(&self.failing_log_writes) {
                    return Err(RoutingError::Database(
                        "injected transition log write failure".to_string(),
                    ));
                }

                let after = CustomerOwnership {
                    version: before.version + 1,
                    ..ownership
                };
                let log_entry = log.map(|entry| {
                    state.next_log_id += 1;
                    entry.with_id(state.next_log_id)
                });

                state.rows.insert(customer_id, after.clone());
                if let Some(entry) = &log_entry {
                    state.log.push(entry.clone());
                }

                Ok(AppliedWrite {
                    before,
                    after,
                    log_entry,
                })
            }
        }
    }

    async fn find_overdue(&self, query: &OverdueQuery) -> Result<Vec<CustomerOwnership>> {
        if Self::take_injected(&self.transient_finds) {
            return Err(RoutingError::TransientStore(
                "injected connection reset".to_string(),
            ));
        }

        let state = self.state.lock();
        Ok(state
            .rows
            .values()
            .filter(|row| row.current_basket == query.basket)
            .filter(|row| row.basket_entered_at <= query.entered_at_or_before)
            .filter(|row| query.after_customer.map_or(true, |after| row.customer_id > after))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn find_by_agent(
        &self,
        agent: AgentId,
        basket: BasketId,
        limit: Option<usize>,
    ) -> Result<Vec<CustomerOwnership>> {
        let state = self.state.lock();
        let mut rows: Vec<CustomerOwnership> = state
            .rows
            .values()
            .filter(|row| row.assigned_agent == Some(agent) && row.current_basket == basket)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.basket_entered_at, row.customer_id));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn transition_log(&self, customer_id: CustomerId) -> Result<Vec<TransitionLogEntry>> {
        Ok(self
            .state
            .lock()
            .log
            .iter()
            .filter(|entry| entry.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTransitionLogEntry, TriggerKind};
    use chrono::{TimeZone, Utc};

    fn row(id: i64, basket: i32) -> CustomerOwnership {
        CustomerOwnership::registered(
            CustomerId(id),
            BasketId(basket),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn moving_planner(
        to: i32,
    ) -> impl Fn(&CustomerOwnership) -> Result<PlannedWrite> + Send + Sync {
        move |current: &CustomerOwnership| {
            let mut next = current.clone();
            next.current_basket = BasketId(to);
            Ok(PlannedWrite::Update {
                log: Some(NewTransitionLogEntry {
                    customer_id: current.customer_id,
                    from_basket: current.current_basket,
                    to_basket: BasketId(to),
                    trigger_kind: TriggerKind::FixScript,
                    triggering_agent: None,
                    agent_before: current.assigned_agent,
                    agent_after: next.assigned_agent,
                    order_id: None,
                    note: None,
                    created_at: current.basket_entered_at,
                }),
                ownership: next,
            })
        }
    }

    #[tokio::test]
    async fn test_apply_bumps_version_and_logs() {
        let store = InMemoryOwnershipStore::new();
        store.seed(row(1, 38));

        let applied = store.apply(CustomerId(1), &moving_planner(53)).await.unwrap();
        assert_eq!(applied.after.version, 2);
        assert_eq!(applied.log_entry.as_ref().map(|e| e.id), Some(1));
        assert_eq!(store.log_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_log_write_leaves_row_untouched() {
        let store = InMemoryOwnershipStore::new();
        store.seed(row(1, 38));
        store.fail_next_log_writes(1);

        let result = store.apply(CustomerId(1), &moving_planner(53)).await;
        assert!(matches!(result, Err(RoutingError::Database(_))));
        assert_eq!(store.rows()[0].current_basket, BasketId(38));
        assert!(store.log_entries().is_empty());
    }

    #[tokio::test]
    async fn test_find_overdue_pages_by_customer_id() {
        let store = InMemoryOwnershipStore::new();
        for id in 1..=5 {
            store.seed(row(id, 38));
        }
        let query = OverdueQuery {
            basket: BasketId(38),
            entered_at_or_before: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            after_customer: Some(CustomerId(2)),
            limit: 2,
        };
        let page = store.find_overdue(&query).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|r| r.customer_id.0).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_apply_missing_customer() {
        let store = InMemoryOwnershipStore::new();
        let result = store.apply(CustomerId(9), &moving_planner(53)).await;
        assert!(matches!(result, Err(RoutingError::CustomerNotFound(CustomerId(9)))));
    }
}
