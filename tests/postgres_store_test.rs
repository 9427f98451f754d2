//! Postgres ownership store tests. Skipped unless `DATABASE_URL` points at a
//! reachable database.

use basket_router::error::{Result, RoutingError};
use basket_router::models::{
    AgentId, BasketId, CustomerId, CustomerOwnership, NewTransitionLogEntry, TriggerKind,
};
use basket_router::store::{OverdueQuery, OwnershipStore, PgOwnershipStore, PlannedWrite};
use chrono::{Duration, DurationRound, Utc};
use sqlx::PgPool;
use uuid::Uuid;

async fn store() -> Option<PgOwnershipStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = match PgPool::connect(&url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Skipping Postgres store test: {e}");
            return None;
        }
    };
    let store = PgOwnershipStore::new(pool);
    store.migrate().await.ok()?;
    Some(store)
}

fn unique_customer() -> CustomerId {
    CustomerId((Uuid::new_v4().as_u64_pair().0 >> 1) as i64)
}

/// Truncated so timestamps survive the microsecond round-trip
fn now() -> chrono::DateTime<Utc> {
    Utc::now().duration_trunc(Duration::seconds(1)).unwrap()
}

#[tokio::test]
async fn test_create_and_get_round_trip() {
    let Some(store) = store().await else { return };
    let customer = unique_customer();
    let row = CustomerOwnership::registered_with_agent(customer, AgentId(42), BasketId(39), now());

    let created = store.create(row.clone()).await.unwrap();
    assert_eq!(created, row);
    assert_eq!(store.get(customer).await.unwrap(), Some(row));
    assert_eq!(store.get(unique_customer()).await.unwrap(), None);
}

#[tokio::test]
async fn test_apply_commits_row_and_log_together() {
    let Some(store) = store().await else { return };
    let customer = unique_customer();
    let at = now();
    store
        .create(CustomerOwnership::registered_with_agent(customer, AgentId(42), BasketId(39), at))
        .await
        .unwrap();

    let planner = |current: &CustomerOwnership| -> Result<PlannedWrite> {
        let mut next = current.clone();
        next.current_basket = BasketId(40);
        Ok(PlannedWrite::Update {
            log: Some(NewTransitionLogEntry {
                customer_id: current.customer_id,
                from_basket: current.current_basket,
                to_basket: BasketId(40),
                trigger_kind: TriggerKind::PeriodicAging,
                triggering_agent: None,
                agent_before: current.assigned_agent,
                agent_after: next.assigned_agent,
                order_id: None,
                note: Some("dwell timeout".to_string()),
                created_at: at,
            }),
            ownership: next,
        })
    };
    let applied = store.apply(customer, &planner).await.unwrap();

    assert_eq!(applied.after.current_basket, BasketId(40));
    assert_eq!(applied.after.version, applied.before.version + 1);
    let log = store.transition_log(customer).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(Some(&log[0]), applied.log_entry.as_ref());
    assert_eq!(log[0].trigger_kind, TriggerKind::PeriodicAging);
}

#[tokio::test]
async fn test_planner_error_rolls_back() {
    let Some(store) = store().await else { return };
    let customer = unique_customer();
    let row = CustomerOwnership::registered(customer, BasketId(52), now());
    store.create(row.clone()).await.unwrap();

    let planner = |current: &CustomerOwnership| -> Result<PlannedWrite> {
        Err(RoutingError::invariant(current.customer_id, "refused"))
    };
    let result = store.apply(customer, &planner).await;

    assert!(matches!(
        result,
        Err(RoutingError::TransitionInvariantViolation { .. })
    ));
    assert_eq!(store.get(customer).await.unwrap(), Some(row));
    assert!(store.transition_log(customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_apply_to_unknown_customer_is_not_found() {
    let Some(store) = store().await else { return };
    let customer = unique_customer();
    let planner = |_: &CustomerOwnership| -> Result<PlannedWrite> { Ok(PlannedWrite::Unchanged) };

    let result = store.apply(customer, &planner).await;
    assert!(matches!(result, Err(RoutingError::CustomerNotFound(id)) if id == customer));
}

#[tokio::test]
async fn test_find_overdue_pages_by_customer_id() {
    let Some(store) = store().await else { return };
    // A basket id no other test writes to
    let basket = BasketId(-((Uuid::new_v4().as_u64_pair().0 % 1_000_000) as i32) - 1);
    let old = now() - Duration::days(100);

    let mut customers: Vec<CustomerId> = (0..5).map(|_| unique_customer()).collect();
    for customer in &customers {
        store
            .create(CustomerOwnership::registered(*customer, basket, old))
            .await
            .unwrap();
    }
    customers.sort();

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = store
            .find_overdue(&OverdueQuery {
                basket,
                entered_at_or_before: now() - Duration::days(30),
                after_customer: cursor,
                limit: 2,
            })
            .await
            .unwrap();
        if page.is_empty() {
            break;
        }
        cursor = page.last().map(|row| row.customer_id);
        seen.extend(page.into_iter().map(|row| row.customer_id));
    }

    assert_eq!(seen, customers);
}

#[tokio::test]
async fn test_find_by_agent_returns_oldest_first() {
    let Some(store) = store().await else { return };
    let agent = AgentId((Uuid::new_v4().as_u64_pair().1 >> 1) as i64);
    let (first, second) = (unique_customer(), unique_customer());
    store
        .create(CustomerOwnership::registered_with_agent(
            first,
            agent,
            BasketId(38),
            now() - Duration::days(20),
        ))
        .await
        .unwrap();
    store
        .create(CustomerOwnership::registered_with_agent(
            second,
            agent,
            BasketId(38),
            now() - Duration::days(5),
        ))
        .await
        .unwrap();

    let rows = store.find_by_agent(agent, BasketId(38), None).await.unwrap();
    let ids: Vec<CustomerId> = rows.iter().map(|row| row.customer_id).collect();
    assert_eq!(ids, vec![first, second]);

    let limited = store.find_by_agent(agent, BasketId(38), Some(1)).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].customer_id, first);
}
