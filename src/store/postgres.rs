//! Postgres-backed [`OwnershipStore`].
//!
//! Each `apply` runs in its own transaction: the customer row is locked with
//! `SELECT ... FOR UPDATE`, the update is guarded by the row version, and the
//! log row is inserted before commit. Dropping the transaction on any error
//! rolls the whole unit back.

use super::{AppliedWrite, OverdueQuery, OwnershipStore, PlannedWrite, WritePlanner};
use crate::config::DatabaseConfig;
use crate::error::{Result, RoutingError};
use crate::models::{
    AgentId, BasketId, CustomerId, CustomerOwnership, NewTransitionLogEntry, OrderId,
    TransitionLogEntry, TriggerKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, instrument};

const OWNERSHIP_COLUMNS: &str = "customer_id, assigned_agent, current_basket, basket_entered_at, \
     distribution_count, hold_until, registered_at, version";

const LOG_COLUMNS: &str = "id, customer_id, from_basket, to_basket, trigger_kind, \
     triggering_agent, agent_before, agent_after, order_id, note, created_at";

#[derive(Debug, sqlx::FromRow)]
struct OwnershipRow {
    customer_id: i64,
    assigned_agent: Option<i64>,
    current_basket: i32,
    basket_entered_at: DateTime<Utc>,
    distribution_count: i32,
    hold_until: Option<DateTime<Utc>>,
    registered_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<OwnershipRow> for CustomerOwnership {
    type Error = RoutingError;

    fn try_from(row: OwnershipRow) -> Result<Self> {
        let distribution_count = u32::try_from(row.distribution_count).map_err(|_| {
            RoutingError::Database(format!(
                "customer {} has negative distribution_count {}",
                row.customer_id, row.distribution_count
            ))
        })?;
        Ok(Self {
            customer_id: CustomerId(row.customer_id),
            assigned_agent: row.assigned_agent.map(AgentId),
            current_basket: BasketId(row.current_basket),
            basket_entered_at: row.basket_entered_at,
            distribution_count,
            hold_until: row.hold_until,
            registered_at: row.registered_at,
            version: row.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: i64,
    customer_id: i64,
    from_basket: i32,
    to_basket: i32,
    trigger_kind: String,
    triggering_agent: Option<i64>,
    agent_before: Option<i64>,
    agent_after: Option<i64>,
    order_id: Option<String>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for TransitionLogEntry {
    type Error = RoutingError;

    fn try_from(row: LogRow) -> Result<Self> {
        let trigger_kind = row
            .trigger_kind
            .parse::<TriggerKind>()
            .map_err(RoutingError::Database)?;
        Ok(Self {
            id: row.id,
            customer_id: CustomerId(row.customer_id),
            from_basket: BasketId(row.from_basket),
            to_basket: BasketId(row.to_basket),
            trigger_kind,
            triggering_agent: row.triggering_agent.map(AgentId),
            agent_before: row.agent_before.map(AgentId),
            agent_after: row.agent_after.map(AgentId),
            order_id: row.order_id.map(OrderId),
            note: row.note,
            created_at: row.created_at,
        })
    }
}

fn count_to_db(ownership: &CustomerOwnership) -> Result<i32> {
    i32::try_from(ownership.distribution_count).map_err(|_| {
        RoutingError::invariant(
            ownership.customer_id,
            format!(
                "distribution_count {} does not fit the store",
                ownership.distribution_count
            ),
        )
    })
}

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

fn limit_to_db(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct PgOwnershipStore {
    pool: PgPool,
}

impl PgOwnershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| RoutingError::Database(format!("migration failed: {e}")))
    }

    async fn update_row(
        tx: &mut Transaction<'_, Postgres>,
        before: &CustomerOwnership,
        ownership: &CustomerOwnership,
    ) -> Result<CustomerOwnership> {
        let sql = format!(
            "UPDATE customer_ownership
             SET assigned_agent = $2,
                 current_basket = $3,
                 basket_entered_at = $4,
                 distribution_count = $5,
                 hold_until = $6,
                 version = version + 1,
                 updated_at = NOW()
             WHERE customer_id = $1 AND version = $7
             RETURNING {OWNERSHIP_COLUMNS}"
        );

        let row = sqlx::query_as::<_, OwnershipRow>(&sql)
            .bind(before.customer_id.0)
            .bind(ownership.assigned_agent.map(|a| a.0))
            .bind(ownership.current_basket.0)
            .bind(ownership.basket_entered_at)
            .bind(count_to_db(ownership)?)
            .bind(ownership.hold_until)
            .bind(before.version)
            .fetch_optional(&mut **tx)
            .await?;

        row.ok_or_else(|| {
            RoutingError::TransientStore(format!(
                "customer {} changed version under lock",
                before.customer_id
            ))
        })?
        .try_into()
    }

    async fn insert_log(
        tx: &mut Transaction<'_, Postgres>,
        entry: &NewTransitionLogEntry,
    ) -> Result<TransitionLogEntry> {
        let sql = format!(
            "INSERT INTO basket_transition_log
                 (customer_id, from_basket, to_basket, trigger_kind, triggering_agent,
                  agent_before, agent_after, order_id, note, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {LOG_COLUMNS}"
        );

        sqlx::query_as::<_, LogRow>(&sql)
            .bind(entry.customer_id.0)
            .bind(entry.from_basket.0)
            .bind(entry.to_basket.0)
            .bind(entry.trigger_kind.as_str())
            .bind(entry.triggering_agent.map(|a| a.0))
            .bind(entry.agent_before.map(|a| a.0))
            .bind(entry.agent_after.map(|a| a.0))
            .bind(entry.order_id.as_ref().map(|o| o.0.clone()))
            .bind(entry.note.clone())
            .bind(entry.created_at)
            .fetch_one(&mut **tx)
            .await?
            .try_into()
    }
}

#[async_trait]
impl OwnershipStore for PgOwnershipStore {
    async fn create(&self, ownership: CustomerOwnership) -> Result<CustomerOwnership> {
        let sql = format!(
            "INSERT INTO customer_ownership ({OWNERSHIP_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {OWNERSHIP_COLUMNS}"
        );
        sqlx::query_as::<_, OwnershipRow>(&sql)
            .bind(ownership.customer_id.0)
            .bind(ownership.assigned_agent.map(|a| a.0))
            .bind(ownership.current_basket.0)
            .bind(ownership.basket_entered_at)
            .bind(count_to_db(&ownership)?)
            .bind(ownership.hold_until)
            .bind(ownership.registered_at)
            .bind(ownership.version)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn get(&self, customer_id: CustomerId) -> Result<Option<CustomerOwnership>> {
        let sql =
            format!("SELECT {OWNERSHIP_COLUMNS} FROM customer_ownership WHERE customer_id = $1");
        sqlx::query_as::<_, OwnershipRow>(&sql)
            .bind(customer_id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(CustomerOwnership::try_from)
            .transpose()
    }

    #[instrument(skip(self, planner))]
    async fn apply(
        &self,
        customer_id: CustomerId,
        planner: &WritePlanner<'_>,
    ) -> Result<AppliedWrite> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {OWNERSHIP_COLUMNS} FROM customer_ownership WHERE customer_id = $1 FOR UPDATE"
        );
        let before: CustomerOwnership = sqlx::query_as::<_, OwnershipRow>(&sql)
            .bind(customer_id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RoutingError::CustomerNotFound(customer_id))?
            .try_into()?;

        let applied = match planner(&before)? {
            PlannedWrite::Unchanged => AppliedWrite {
                after: before.clone(),
                before,
                log_entry: None,
            },
            PlannedWrite::Update { ownership, log } => {
                let after = Self::update_row(&mut tx, &before, &ownership).await?;
                let log_entry = match &log {
                    Some(entry) => Some(Self::insert_log(&mut tx, entry).await?),
                    None => None,
                };
                AppliedWrite {
                    before,
                    after,
                    log_entry,
                }
            }
        };

        tx.commit().await?;

        debug!(
            version = applied.after.version,
            logged = applied.log_entry.is_some(),
            "Ownership write committed"
        );
        Ok(applied)
    }

    async fn find_overdue(&self, query: &OverdueQuery) -> Result<Vec<CustomerOwnership>> {
        let sql = format!(
            "SELECT {OWNERSHIP_COLUMNS} FROM customer_ownership
             WHERE current_basket = $1
               AND basket_entered_at <= $2
               AND ($3::BIGINT IS NULL OR customer_id > $3)
             ORDER BY customer_id
             LIMIT $4"
        );
        sqlx::query_as::<_, OwnershipRow>(&sql)
            .bind(query.basket.0)
            .bind(query.entered_at_or_before)
            .bind(query.after_customer.map(|c| c.0))
            .bind(limit_to_db(query.limit))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(CustomerOwnership::try_from)
            .collect()
    }

    async fn find_by_agent(
        &self,
        agent: AgentId,
        basket: BasketId,
        limit: Option<usize>,
    ) -> Result<Vec<CustomerOwnership>> {
        let sql = format!(
            "SELECT {OWNERSHIP_COLUMNS} FROM customer_ownership
             WHERE assigned_agent = $1 AND current_basket = $2
             ORDER BY basket_entered_at, customer_id
             LIMIT $3"
        );
        sqlx::query_as::<_, OwnershipRow>(&sql)
            .bind(agent.0)
            .bind(basket.0)
            .bind(limit.map(limit_to_db))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(CustomerOwnership::try_from)
            .collect()
    }

    async fn transition_log(&self, customer_id: CustomerId) -> Result<Vec<TransitionLogEntry>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM basket_transition_log WHERE customer_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, LogRow>(&sql)
            .bind(customer_id.0)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(TransitionLogEntry::try_from)
            .collect()
    }
}
