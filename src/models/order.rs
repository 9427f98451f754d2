use super::ids::{AgentId, CustomerId, OrderId};
use crate::constants::FIELD_SALES_ROLE_IDS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order fulfillment status as reported by order management
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Picking,
    Shipping,
    Delivered,
    Returned,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Picking => write!(f, "Picking"),
            Self::Shipping => write!(f, "Shipping"),
            Self::Delivered => write!(f, "Delivered"),
            Self::Returned => write!(f, "Returned"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Other(status) => f.write_str(status),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "picking" => Self::Picking,
            "shipping" => Self::Shipping,
            "delivered" => Self::Delivered,
            "returned" => Self::Returned,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Other(s.trim().to_string()),
        };
        Ok(status)
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

/// Role classification from the agent directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleTag {
    Privileged,
    FieldSales,
}

impl RoleTag {
    pub fn from_role_id(role_id: i32) -> Self {
        if FIELD_SALES_ROLE_IDS.contains(&role_id) {
            Self::FieldSales
        } else {
            Self::Privileged
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Privileged)
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Privileged => write!(f, "privileged"),
            Self::FieldSales => write!(f, "field_sales"),
        }
    }
}

/// Latest qualifying order for a customer.
///
/// `creator_role` may be absent when the order source does not carry it; the
/// real-time driver fills it from the role directory before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub creator_id: AgentId,
    pub creator_role: Option<RoleTag>,
    pub order_date: DateTime<Utc>,
}

impl OrderSnapshot {
    /// Role used by the classifier. An unknown role is treated as field sales
    /// so it can never open an upsell or pending-distribution route.
    pub fn effective_creator_role(&self) -> RoleTag {
        self.creator_role.unwrap_or(RoleTag::FieldSales)
    }

    pub fn created_by_privileged(&self) -> bool {
        self.effective_creator_role().is_privileged()
    }
}
