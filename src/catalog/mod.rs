//! # Basket Catalog
//!
//! Immutable, validated set of basket definitions loaded once per run.
//!
//! The catalog is the only place a [`BasketId`] acquires meaning: audience,
//! role, day range and failure routing are all resolved here. Construction
//! rejects configurations under which some customer could become
//! unclassifiable.
//!
//! ## Day-range precedence
//!
//! Ladder ranges within one audience should be disjoint. When they overlap the
//! narrowest range (lowest `max - min`) wins; ties go to the lower minimum and
//! then the lower basket id. Overlaps are logged as warnings at load time.
//!
//! ## Usage
//!
//! ```rust
//! use basket_router::catalog::{BasketCatalog, Ladder};
//! use basket_router::models::{BasketDefinition, BasketRole, TargetAudience};
//!
//! use TargetAudience::{AgentOwned, UnownedPool};
//!
//! let catalog = BasketCatalog::new(vec![
//!     BasketDefinition::new(1, "pool_other", UnownedPool, BasketRole::CatchAll),
//!     BasketDefinition::new(2, "agent_other", AgentOwned, BasketRole::CatchAll),
//!     BasketDefinition::new(3, "new_customer", UnownedPool, BasketRole::PoolLadder)
//!         .with_days(0, Some(30)),
//! ])
//! .unwrap();
//!
//! assert_eq!(catalog.ladder_match(Ladder::Pool, 12).map(|id| id.0), Some(3));
//! assert_eq!(catalog.resolve_catch_all(TargetAudience::UnownedPool).0, 1);
//! ```

use crate::models::{BasketDefinition, BasketId, BasketRole, DayRange, TargetAudience};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Basket catalog is empty")]
    Empty,

    #[error("Duplicate basket id {0}")]
    DuplicateId(BasketId),

    #[error("Duplicate basket key '{0}'")]
    DuplicateKey(String),

    #[error("No active catch-all basket for audience {0}")]
    MissingCatchAll(TargetAudience),

    #[error("Audience {audience} has more than one active catch-all: {first} and {second}")]
    MultipleCatchAll {
        audience: TargetAudience,
        first: BasketId,
        second: BasketId,
    },

    #[error("Role {role} is carried by more than one active basket: {first} and {second}")]
    DuplicateRole {
        role: BasketRole,
        first: BasketId,
        second: BasketId,
    },

    #[error("Basket '{basket}' field {field} references unknown basket '{reference}'")]
    UnknownReference {
        basket: String,
        field: &'static str,
        reference: String,
    },

    #[error("Basket '{basket}' field {field} references inactive basket '{reference}'")]
    InactiveReference {
        basket: String,
        field: &'static str,
        reference: String,
    },

    #[error("Basket '{basket}' links to '{linked}', which is not an unowned-pool basket")]
    LinkedBasketNotPool { basket: String, linked: String },

    #[error("Basket '{basket}' has role {role} which cannot target audience {audience}")]
    RoleAudienceMismatch {
        basket: String,
        role: BasketRole,
        audience: TargetAudience,
    },

    #[error("Basket '{basket}' has an invalid day range: {reason}")]
    InvalidDayRange { basket: String, reason: String },

    #[error("Unknown basket {0}")]
    UnknownBasket(BasketId),
}

/// Which day-range ladder to consult
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ladder {
    /// Agent-owned personal baskets
    Personal,
    /// Unowned-pool baskets
    Pool,
}

impl Ladder {
    pub fn for_audience(audience: TargetAudience) -> Self {
        match audience {
            TargetAudience::AgentOwned => Self::Personal,
            TargetAudience::UnownedPool => Self::Pool,
        }
    }

    fn role(&self) -> BasketRole {
        match self {
            Self::Personal => BasketRole::PersonalLadder,
            Self::Pool => BasketRole::PoolLadder,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LadderRung {
    pub basket: BasketId,
    pub range: DayRange,
}

#[derive(Debug, Clone)]
pub struct BasketCatalog {
    definitions: BTreeMap<BasketId, BasketDefinition>,
    by_key: HashMap<String, BasketId>,
    agent_owned_catch_all: BasketId,
    unowned_catch_all: BasketId,
    singletons: HashMap<BasketRole, BasketId>,
    personal_ladder: Vec<LadderRung>,
    pool_ladder: Vec<LadderRung>,
}

impl BasketCatalog {
    /// Validate and index a set of definitions
    pub fn new(definitions: Vec<BasketDefinition>) -> Result<Self, CatalogError> {
        if definitions.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut by_id = BTreeMap::new();
        let mut by_key = HashMap::new();
        for definition in definitions {
            if by_key.contains_key(&definition.key) {
                return Err(CatalogError::DuplicateKey(definition.key));
            }
            if by_id.contains_key(&definition.id) {
                return Err(CatalogError::DuplicateId(definition.id));
            }
            by_key.insert(definition.key.clone(), definition.id);
            by_id.insert(definition.id, definition);
        }

        for definition in by_id.values() {
            Self::validate_definition(definition)?;
            Self::validate_references(definition, &by_id, &by_key)?;
        }

        let mut catch_alls: HashMap<TargetAudience, BasketId> = HashMap::new();
        let mut singletons: HashMap<BasketRole, BasketId> = HashMap::new();
        for definition in by_id.values().filter(|d| d.is_active) {
            if definition.role == BasketRole::CatchAll {
                if let Some(first) = catch_alls.insert(definition.target_audience, definition.id) {
                    return Err(CatalogError::MultipleCatchAll {
                        audience: definition.target_audience,
                        first,
                        second: definition.id,
                    });
                }
            }
            if definition.role.is_singleton() {
                if let Some(first) = singletons.insert(definition.role, definition.id) {
                    return Err(CatalogError::DuplicateRole {
                        role: definition.role,
                        first,
                        second: definition.id,
                    });
                }
            }
        }

        let agent_owned_catch_all = *catch_alls
            .get(&TargetAudience::AgentOwned)
            .ok_or(CatalogError::MissingCatchAll(TargetAudience::AgentOwned))?;
        let unowned_catch_all = *catch_alls
            .get(&TargetAudience::UnownedPool)
            .ok_or(CatalogError::MissingCatchAll(TargetAudience::UnownedPool))?;

        let personal_ladder = Self::build_ladder(&by_id, Ladder::Personal);
        let pool_ladder = Self::build_ladder(&by_id, Ladder::Pool);

        debug!(
            baskets = by_id.len(),
            personal_rungs = personal_ladder.len(),
            pool_rungs = pool_ladder.len(),
            "Basket catalog loaded"
        );

        Ok(Self {
            definitions: by_id,
            by_key,
            agent_owned_catch_all,
            unowned_catch_all,
            singletons,
            personal_ladder,
            pool_ladder,
        })
    }

    fn validate_definition(definition: &BasketDefinition) -> Result<(), CatalogError> {
        if let Some(required) = definition.role.required_audience() {
            if required != definition.target_audience {
                return Err(CatalogError::RoleAudienceMismatch {
                    basket: definition.key.clone(),
                    role: definition.role,
                    audience: definition.target_audience,
                });
            }
        }

        match definition.day_range() {
            Some(DayRange { min, max: Some(max) }) if min > max => {
                Err(CatalogError::InvalidDayRange {
                    basket: definition.key.clone(),
                    reason: format!("minimum {min} exceeds maximum {max}"),
                })
            }
            None if definition.role.is_ladder() => Err(CatalogError::InvalidDayRange {
                basket: definition.key.clone(),
                reason: "ladder baskets require a day range".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn validate_references(
        definition: &BasketDefinition,
        by_id: &BTreeMap<BasketId, BasketDefinition>,
        by_key: &HashMap<String, BasketId>,
    ) -> Result<(), CatalogError> {
        let references = [
            ("on_fail_basket", &definition.on_fail_basket),
            ("linked_basket", &definition.linked_basket),
            ("on_max_distribution_basket", &definition.on_max_distribution_basket),
        ];

        for (field, reference) in references {
            let Some(reference) = reference else { continue };
            let Some(target) = by_key.get(reference).and_then(|id| by_id.get(id)) else {
                return Err(CatalogError::UnknownReference {
                    basket: definition.key.clone(),
                    field,
                    reference: reference.clone(),
                });
            };
            // Retired baskets may keep stale references; active ones must
            // route somewhere a transition can land
            if definition.is_active && !target.is_active {
                return Err(CatalogError::InactiveReference {
                    basket: definition.key.clone(),
                    field,
                    reference: reference.clone(),
                });
            }
            if field == "linked_basket" && target.target_audience != TargetAudience::UnownedPool {
                return Err(CatalogError::LinkedBasketNotPool {
                    basket: definition.key.clone(),
                    linked: target.key.clone(),
                });
            }
        }
        Ok(())
    }

    fn build_ladder(
        definitions: &BTreeMap<BasketId, BasketDefinition>,
        ladder: Ladder,
    ) -> Vec<LadderRung> {
        let mut rungs: Vec<LadderRung> = definitions
            .values()
            .filter(|d| d.is_active && d.role == ladder.role())
            .filter_map(|d| {
                d.day_range().map(|range| LadderRung {
                    basket: d.id,
                    range,
                })
            })
            .collect();

        rungs.sort_by_key(|rung| (rung.range.width(), rung.range.min, rung.basket));

        for (i, a) in rungs.iter().enumerate() {
            for b in rungs.iter().skip(i + 1) {
                if a.range.overlaps(&b.range) {
                    warn!(
                        ladder = ?ladder,
                        winner = %a.basket,
                        winner_range = %a.range,
                        shadowed = %b.basket,
                        shadowed_range = %b.range,
                        "Overlapping day ranges; narrowest range takes precedence"
                    );
                }
            }
        }

        rungs
    }

    pub fn get_definition(&self, id: BasketId) -> Result<&BasketDefinition, CatalogError> {
        self.definitions
            .get(&id)
            .ok_or(CatalogError::UnknownBasket(id))
    }

    pub fn contains(&self, id: BasketId) -> bool {
        self.definitions.contains_key(&id)
    }

    pub fn by_key(&self, key: &str) -> Option<&BasketDefinition> {
        self.by_key.get(key).and_then(|id| self.definitions.get(id))
    }

    pub fn resolve_catch_all(&self, audience: TargetAudience) -> BasketId {
        match audience {
            TargetAudience::AgentOwned => self.agent_owned_catch_all,
            TargetAudience::UnownedPool => self.unowned_catch_all,
        }
    }

    /// Active basket carrying a single-purpose role (upsell, awaiting
    /// re-engagement, pending distribution)
    pub fn role_basket(&self, role: BasketRole) -> Option<BasketId> {
        self.singletons.get(&role).copied()
    }

    pub fn ladder(&self, ladder: Ladder) -> &[LadderRung] {
        match ladder {
            Ladder::Personal => &self.personal_ladder,
            Ladder::Pool => &self.pool_ladder,
        }
    }

    /// First rung (in precedence order) whose range contains `days`
    pub fn ladder_match(&self, ladder: Ladder, days: u32) -> Option<BasketId> {
        self.ladder(ladder)
            .iter()
            .find(|rung| rung.range.contains(days))
            .map(|rung| rung.basket)
    }

    pub fn audience_of(&self, id: BasketId) -> Result<TargetAudience, CatalogError> {
        self.get_definition(id).map(|d| d.target_audience)
    }

    fn resolve_reference(&self, reference: Option<&String>) -> Option<BasketId> {
        reference.and_then(|key| self.by_key.get(key)).copied()
    }

    /// Unowned-pool basket that customers reclaimed out of `id` move into.
    /// Falls back to the unowned catch-all when no link is configured.
    pub fn linked_pool_basket(&self, id: BasketId) -> Result<BasketId, CatalogError> {
        let definition = self.get_definition(id)?;
        Ok(self
            .resolve_reference(definition.linked_basket.as_ref())
            .unwrap_or(self.unowned_catch_all))
    }

    pub fn on_fail_target(&self, id: BasketId) -> Result<Option<BasketId>, CatalogError> {
        let definition = self.get_definition(id)?;
        Ok(self.resolve_reference(definition.on_fail_basket.as_ref()))
    }

    pub fn overflow_target(&self, id: BasketId) -> Result<Option<BasketId>, CatalogError> {
        let definition = self.get_definition(id)?;
        Ok(self.resolve_reference(definition.on_max_distribution_basket.as_ref()))
    }

    /// Active baskets with a dwell timeout, excluding the pending-distribution
    /// marker
    pub fn aging_baskets(&self) -> impl Iterator<Item = &BasketDefinition> {
        self.definitions.values().filter(|d| {
            d.is_active && d.fail_after_days.is_some() && d.role != BasketRole::PendingDistribution
        })
    }

    pub fn definitions(&self) -> impl Iterator<Item = &BasketDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
