use super::ids::BasketId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who may hold customers in a basket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAudience {
    /// Members belong to one specific agent
    AgentOwned,
    /// Members have no current agent and are eligible for distribution
    UnownedPool,
}

impl fmt::Display for TargetAudience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentOwned => write!(f, "agent_owned"),
            Self::UnownedPool => write!(f, "unowned_pool"),
        }
    }
}

impl std::str::FromStr for TargetAudience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent_owned" => Ok(Self::AgentOwned),
            "unowned_pool" => Ok(Self::UnownedPool),
            _ => Err(format!("Invalid target audience: {s}")),
        }
    }
}

/// The part a basket plays in classification.
///
/// Ladder baskets are matched by day range. The single-purpose roles are
/// looked up by role, so no classification rule refers to a bare basket number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasketRole {
    PersonalLadder,
    PoolLadder,
    Upsell,
    AwaitingReengagement,
    PendingDistribution,
    CatchAll,
    /// Reachable only as an explicit transition target
    Static,
}

impl BasketRole {
    /// Audience the role requires, if it constrains one
    pub fn required_audience(&self) -> Option<TargetAudience> {
        match self {
            Self::PersonalLadder | Self::Upsell | Self::AwaitingReengagement => {
                Some(TargetAudience::AgentOwned)
            }
            Self::PoolLadder | Self::PendingDistribution => Some(TargetAudience::UnownedPool),
            Self::CatchAll | Self::Static => None,
        }
    }

    pub fn is_ladder(&self) -> bool {
        matches!(self, Self::PersonalLadder | Self::PoolLadder)
    }

    /// Roles at most one active basket may carry
    pub fn is_singleton(&self) -> bool {
        matches!(
            self,
            Self::Upsell | Self::AwaitingReengagement | Self::PendingDistribution
        )
    }
}

impl fmt::Display for BasketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PersonalLadder => "personal_ladder",
            Self::PoolLadder => "pool_ladder",
            Self::Upsell => "upsell",
            Self::AwaitingReengagement => "awaiting_reengagement",
            Self::PendingDistribution => "pending_distribution",
            Self::CatchAll => "catch_all",
            Self::Static => "static",
        };
        f.write_str(name)
    }
}

/// Inclusive whole-day range; `max = None` is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub min: u32,
    pub max: Option<u32>,
}

impl DayRange {
    pub fn contains(&self, days: u32) -> bool {
        days >= self.min && self.max.map_or(true, |max| days <= max)
    }

    pub fn width(&self) -> u32 {
        self.max.map_or(u32::MAX, |max| max.saturating_sub(self.min))
    }

    pub fn overlaps(&self, other: &DayRange) -> bool {
        let self_max = self.max.unwrap_or(u32::MAX);
        let other_max = other.max.unwrap_or(u32::MAX);
        self.min <= other_max && other.min <= self_max
    }
}

impl fmt::Display for DayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}-{}", self.min, max),
            None => write!(f, "{}+", self.min),
        }
    }
}

fn default_active() -> bool {
    true
}

/// Basket configuration as loaded from the `[[baskets]]` tables.
///
/// Cross-basket references (`on_fail_basket`, `linked_basket`,
/// `on_max_distribution_basket`) are basket keys, resolved by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketDefinition {
    pub id: BasketId,
    pub key: String,
    pub display_name: String,
    pub target_audience: TargetAudience,
    pub role: BasketRole,
    #[serde(default)]
    pub min_days_since_last_order: Option<u32>,
    #[serde(default)]
    pub max_days_since_last_order: Option<u32>,
    #[serde(default)]
    pub fail_after_days: Option<u32>,
    #[serde(default)]
    pub on_fail_basket: Option<String>,
    #[serde(default)]
    pub on_fail_reevaluate: bool,
    /// 0 means unlimited
    #[serde(default)]
    pub max_distribution_count: u32,
    #[serde(default)]
    pub hold_days_before_redistribute: u32,
    #[serde(default)]
    pub linked_basket: Option<String>,
    #[serde(default)]
    pub on_max_distribution_basket: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl BasketDefinition {
    pub fn new(
        id: i32,
        key: impl Into<String>,
        target_audience: TargetAudience,
        role: BasketRole,
    ) -> Self {
        let key = key.into();
        Self {
            id: BasketId(id),
            display_name: key.clone(),
            key,
            target_audience,
            role,
            min_days_since_last_order: None,
            max_days_since_last_order: None,
            fail_after_days: None,
            on_fail_basket: None,
            on_fail_reevaluate: false,
            max_distribution_count: 0,
            hold_days_before_redistribute: 0,
            linked_basket: None,
            on_max_distribution_basket: None,
            is_active: true,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_days(mut self, min: u32, max: Option<u32>) -> Self {
        self.min_days_since_last_order = Some(min);
        self.max_days_since_last_order = max;
        self
    }

    pub fn failing_after(mut self, days: u32, on_fail: impl Into<String>) -> Self {
        self.fail_after_days = Some(days);
        self.on_fail_basket = Some(on_fail.into());
        self
    }

    pub fn reevaluating_after(mut self, days: u32) -> Self {
        self.fail_after_days = Some(days);
        self.on_fail_reevaluate = true;
        self
    }

    pub fn with_distribution_cap(mut self, max: u32, overflow: impl Into<String>) -> Self {
        self.max_distribution_count = max;
        self.on_max_distribution_basket = Some(overflow.into());
        self
    }

    pub fn with_hold_days(mut self, days: u32) -> Self {
        self.hold_days_before_redistribute = days;
        self
    }

    pub fn linked_to(mut self, key: impl Into<String>) -> Self {
        self.linked_basket = Some(key.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Day range, if either bound is configured
    pub fn day_range(&self) -> Option<DayRange> {
        match (self.min_days_since_last_order, self.max_days_since_last_order) {
            (None, None) => None,
            (min, max) => Some(DayRange {
                min: min.unwrap_or(0),
                max,
            }),
        }
    }

    pub fn is_agent_owned(&self) -> bool {
        self.target_audience == TargetAudience::AgentOwned
    }

    pub fn has_distribution_cap(&self) -> bool {
        self.max_distribution_count > 0
    }
}
