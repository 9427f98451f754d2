//! # Routing Errors
//!
//! Crate-wide error type. Variants follow the operational categories the
//! drivers act on: ambiguous classifications are alerted and left in place,
//! invariant violations abort before any write, transient store failures are
//! retried by batch jobs, and stale inputs are skipped with a warning.

use crate::catalog::CatalogError;
use crate::constants::TRANSIENT_SQLSTATES;
use crate::models::{AgentId, BasketId, CustomerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Classification ambiguous for customer {customer_id}: {reason}")]
    ClassificationAmbiguous {
        customer_id: CustomerId,
        reason: String,
    },

    #[error("Transition invariant violated for customer {customer_id}: {reason}")]
    TransitionInvariantViolation {
        customer_id: CustomerId,
        reason: String,
    },

    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Stale classification input: {0}")]
    StaleClassificationInput(String),

    #[error("Customer {0} not found")]
    CustomerNotFound(CustomerId),

    #[error(
        "Transition superseded for customer {customer_id}: expected basket {expected}, found {actual}"
    )]
    Superseded {
        customer_id: CustomerId,
        expected: BasketId,
        actual: BasketId,
    },

    #[error(
        "Owner changed for customer {customer_id}: expected agent {expected}, found {}",
        display_agent(.actual)
    )]
    OwnerChanged {
        customer_id: CustomerId,
        expected: AgentId,
        actual: Option<AgentId>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RoutingError>;

impl RoutingError {
    pub fn ambiguous(customer_id: CustomerId, reason: impl Into<String>) -> Self {
        Self::ClassificationAmbiguous {
            customer_id,
            reason: reason.into(),
        }
    }

    pub fn invariant(customer_id: CustomerId, reason: impl Into<String>) -> Self {
        Self::TransitionInvariantViolation {
            customer_id,
            reason: reason.into(),
        }
    }

    pub fn stale(reason: impl Into<String>) -> Self {
        Self::StaleClassificationInput(reason.into())
    }

    /// Whether retrying the same operation later can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// Whether a batch should skip the row and keep going
    pub fn is_row_skippable(&self) -> bool {
        matches!(
            self,
            Self::StaleClassificationInput(_) | Self::CustomerNotFound(_)
        )
    }

    /// Short stable label used in reports and metric attributes
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClassificationAmbiguous { .. } => "classification_ambiguous",
            Self::TransitionInvariantViolation { .. } => "transition_invariant_violation",
            Self::TransientStore(_) => "transient_store",
            Self::StaleClassificationInput(_) => "stale_classification_input",
            Self::CustomerNotFound(_) => "customer_not_found",
            Self::Superseded { .. } => "superseded",
            Self::OwnerChanged { .. } => "owner_changed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration",
            Self::Catalog(_) => "catalog",
            Self::Database(_) => "database",
            Self::Serialization(_) => "serialization",
        }
    }
}

fn display_agent(agent: &Option<AgentId>) -> String {
    agent.map_or_else(|| "no agent".to_string(), |agent| agent.to_string())
}

impl From<sqlx::Error> for RoutingError {
    fn from(err: sqlx::Error) -> Self {
        let transient = match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::WorkerCrashed => true,
            sqlx::Error::Database(db) => db
                .code()
                .as_deref()
                .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code)),
            _ => false,
        };

        if transient {
            Self::TransientStore(err.to_string())
        } else {
            Self::Database(err.to_string())
        }
    }
}

impl From<config::ConfigError> for RoutingError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        let err: RoutingError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_transient());
        assert_eq!(err.kind(), "transient_store");
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        let err: RoutingError = sqlx::Error::RowNotFound.into();
        assert!(!err.is_transient());
        assert!(matches!(err, RoutingError::Database(_)));
    }

    #[test]
    fn test_stale_input_is_skippable() {
        assert!(RoutingError::stale("order dated in the future").is_row_skippable());
        assert!(RoutingError::CustomerNotFound(CustomerId(9)).is_row_skippable());
        assert!(!RoutingError::ambiguous(CustomerId(9), "no catch-all").is_row_skippable());
    }

    #[test]
    fn test_superseded_message_names_both_baskets() {
        let err = RoutingError::Superseded {
            customer_id: CustomerId(7),
            expected: BasketId(38),
            actual: BasketId(51),
        };
        let message = err.to_string();
        assert!(message.contains("38"));
        assert!(message.contains("51"));
    }

    #[test]
    fn test_owner_changed_message_names_both_agents() {
        let err = RoutingError::OwnerChanged {
            customer_id: CustomerId(7),
            expected: AgentId(42),
            actual: None,
        };
        let message = err.to_string();
        assert!(message.contains("42"));
        assert!(message.contains("no agent"));
        assert_eq!(err.kind(), "owner_changed");
    }
}
