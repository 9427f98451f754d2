use super::ids::{AgentId, BasketId, CustomerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted per-customer routing state.
///
/// Mutated only through the transition executor. `version` increases by one
/// on every committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerOwnership {
    pub customer_id: CustomerId,
    pub assigned_agent: Option<AgentId>,
    pub current_basket: BasketId,
    pub basket_entered_at: DateTime<Utc>,
    pub distribution_count: u32,
    pub hold_until: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    pub version: i64,
}

impl CustomerOwnership {
    /// Ownership for a newly registered customer: no agent, in `basket`
    pub fn registered(
        customer_id: CustomerId,
        basket: BasketId,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id,
            assigned_agent: None,
            current_basket: basket,
            basket_entered_at: registered_at,
            distribution_count: 0,
            hold_until: None,
            registered_at,
            version: 1,
        }
    }

    /// Registration that arrives with an agent already attached
    pub fn registered_with_agent(
        customer_id: CustomerId,
        agent: AgentId,
        basket: BasketId,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            assigned_agent: Some(agent),
            ..Self::registered(customer_id, basket, registered_at)
        }
    }

    pub fn is_held(&self, now: DateTime<Utc>) -> bool {
        self.hold_until.is_some_and(|until| until > now)
    }

    pub fn days_in_basket(&self, now: DateTime<Utc>) -> u32 {
        whole_days_between(self.basket_entered_at, now)
    }

    pub fn days_since_registration(&self, now: DateTime<Utc>) -> u32 {
        whole_days_between(self.registered_at, now)
    }
}

/// Whole days elapsed from `earlier` to `later`, floored, never negative
pub fn whole_days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u32 {
    let days = (later - earlier).num_days().max(0);
    u32::try_from(days).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_registration_defaults() {
        let ownership = CustomerOwnership::registered(CustomerId(1), BasketId(38), at(1));
        assert_eq!(ownership.assigned_agent, None);
        assert_eq!(ownership.distribution_count, 0);
        assert_eq!(ownership.basket_entered_at, ownership.registered_at);
        assert_eq!(ownership.version, 1);
    }

    #[test]
    fn test_whole_days_floor_and_clamp() {
        assert_eq!(whole_days_between(at(1), at(1) + Duration::hours(47)), 1);
        assert_eq!(whole_days_between(at(5), at(1)), 0);
    }

    #[test]
    fn test_hold_window() {
        let mut ownership = CustomerOwnership::registered(CustomerId(1), BasketId(38), at(1));
        ownership.hold_until = Some(at(10));
        assert!(ownership.is_held(at(9)));
        assert!(!ownership.is_held(at(10)));
    }
}
