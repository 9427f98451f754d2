use super::{OrderSource, RoleDirectory};
use crate::error::Result;
use crate::models::{AgentId, CustomerId, OrderId, OrderSnapshot, OrderStatus, RoleTag};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct InMemoryOrderSource {
    orders: DashMap<OrderId, OrderSnapshot>,
}

impl InMemoryOrderSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an order by id
    pub fn upsert(&self, order: OrderSnapshot) {
        self.orders.insert(order.id.clone(), order);
    }

    /// Returns false when the order is unknown
    pub fn set_status(&self, order_id: &OrderId, status: OrderStatus) -> bool {
        match self.orders.get_mut(order_id) {
            Some(mut order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl OrderSource for InMemoryOrderSource {
    async fn latest_order(&self, customer_id: CustomerId) -> Result<Option<OrderSnapshot>> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| entry.customer_id == customer_id && !entry.status.is_cancelled())
            .max_by(|a, b| {
                a.order_date
                    .cmp(&b.order_date)
                    .then_with(|| a.id.0.cmp(&b.id.0))
            })
            .map(|entry| entry.value().clone()))
    }

    async fn order_exists(&self, order_id: &OrderId) -> Result<bool> {
        Ok(self.orders.contains_key(order_id))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRoleDirectory {
    roles: DashMap<AgentId, RoleTag>,
}

impl InMemoryRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_role(&self, agent: AgentId, role: RoleTag) {
        self.roles.insert(agent, role);
    }
}

#[async_trait]
impl RoleDirectory for InMemoryRoleDirectory {
    async fn agent_role(&self, agent: AgentId) -> Result<Option<RoleTag>> {
        Ok(self.roles.get(&agent).map(|role| *role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn order(id: &str, days_ago: i64, status: OrderStatus) -> OrderSnapshot {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        OrderSnapshot {
            id: OrderId::new(id),
            customer_id: CustomerId(1),
            status,
            creator_id: AgentId(42),
            creator_role: None,
            order_date: now - Duration::days(days_ago),
        }
    }

    #[tokio::test]
    async fn test_latest_order_skips_cancelled() {
        let source = InMemoryOrderSource::new();
        source.upsert(order("A", 10, OrderStatus::Delivered));
        source.upsert(order("B", 1, OrderStatus::Cancelled));

        let latest = source.latest_order(CustomerId(1)).await.unwrap().unwrap();
        assert_eq!(latest.id, OrderId::new("A"));
    }

    #[tokio::test]
    async fn test_resolve_parent_only_when_parent_exists() {
        let source = InMemoryOrderSource::new();
        source.upsert(order("JAT-261125-1535", 1, OrderStatus::Picking));

        let resolved = source
            .resolve_parent(&OrderId::new("JAT-261125-1535-2"))
            .await
            .unwrap();
        assert_eq!(resolved, OrderId::new("JAT-261125-1535"));

        // A parent id that happens to end in digits is left alone
        let resolved = source
            .resolve_parent(&OrderId::new("JAT-261125-1535"))
            .await
            .unwrap();
        assert_eq!(resolved, OrderId::new("JAT-261125-1535"));
    }
}
