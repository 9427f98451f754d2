//! Order management and role directory readers over the shared operational
//! database (`orders` and `users` tables).

use super::{OrderSource, RoleDirectory};
use crate::error::Result;
use crate::models::{AgentId, CustomerId, OrderId, OrderSnapshot, OrderStatus, RoleTag};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Debug, sqlx::FromRow)]
struct LatestOrderRow {
    id: String,
    customer_id: i64,
    order_status: String,
    creator_id: i64,
    creator_role_id: Option<i32>,
    order_date: DateTime<Utc>,
}

impl From<LatestOrderRow> for OrderSnapshot {
    fn from(row: LatestOrderRow) -> Self {
        Self {
            id: OrderId(row.id),
            customer_id: CustomerId(row.customer_id),
            status: OrderStatus::from(row.order_status.as_str()),
            creator_id: AgentId(row.creator_id),
            creator_role: row.creator_role_id.map(RoleTag::from_role_id),
            order_date: row.order_date,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgOrderSource {
    pool: PgPool,
}

impl PgOrderSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderSource for PgOrderSource {
    async fn latest_order(&self, customer_id: CustomerId) -> Result<Option<OrderSnapshot>> {
        let row = sqlx::query_as::<_, LatestOrderRow>(
            "SELECT o.id, o.customer_id, o.order_status, o.creator_id,
                    u.role_id AS creator_role_id, o.order_date
             FROM orders o
             LEFT JOIN users u ON u.id = o.creator_id
             WHERE o.customer_id = $1 AND o.order_status <> 'Cancelled'
             ORDER BY o.order_date DESC, o.id DESC
             LIMIT 1",
        )
        .bind(customer_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(OrderSnapshot::from))
    }

    async fn order_exists(&self, order_id: &OrderId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
            .bind(order_id.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[derive(Debug, Clone)]
pub struct PgRoleDirectory {
    pool: PgPool,
}

impl PgRoleDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleDirectory for PgRoleDirectory {
    async fn agent_role(&self, agent: AgentId) -> Result<Option<RoleTag>> {
        let role_id: Option<i32> = sqlx::query_scalar("SELECT role_id FROM users WHERE id = $1")
            .bind(agent.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role_id.map(RoleTag::from_role_id))
    }
}
