//! Ordered classification rule table. The first rule that yields a basket wins.

use crate::catalog::{BasketCatalog, Ladder};
use crate::models::{AgentId, BasketId, BasketRole, OrderSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    Upsell,
    PersonalLadder,
    AwaitingReengagement,
    PendingDistribution,
    PoolLadder,
    RegistrationLadder,
    /// Fallback when no rule matched
    CatchAll,
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upsell => "upsell",
            Self::PersonalLadder => "personal_ladder",
            Self::AwaitingReengagement => "awaiting_reengagement",
            Self::PendingDistribution => "pending_distribution",
            Self::PoolLadder => "pool_ladder",
            Self::RegistrationLadder => "registration_ladder",
            Self::CatchAll => "catch_all",
        };
        f.write_str(name)
    }
}

/// Facts a rule may look at. Built once per classification.
#[derive(Debug)]
pub(crate) struct RuleContext<'a> {
    pub catalog: &'a BasketCatalog,
    pub agent: Option<AgentId>,
    pub order: Option<&'a OrderSnapshot>,
    pub days_since_order: Option<u32>,
    pub days_since_registration: u32,
}

pub struct Rule {
    pub id: RuleId,
    pub description: &'static str,
    evaluate: fn(&RuleContext<'_>) -> Option<BasketId>,
}

impl Rule {
    pub(crate) fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<BasketId> {
        (self.evaluate)(ctx)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish()
    }
}

pub static RULES: [Rule; 6] = [
    Rule {
        id: RuleId::Upsell,
        description: "owned customer, pending order from a privileged creator other than the agent",
        evaluate: upsell,
    },
    Rule {
        id: RuleId::PersonalLadder,
        description: "owned customer whose latest order was created by the owning agent",
        evaluate: personal_ladder,
    },
    Rule {
        id: RuleId::AwaitingReengagement,
        description: "owned customer whose latest order came from a different field-sales agent",
        evaluate: awaiting_reengagement,
    },
    Rule {
        id: RuleId::PendingDistribution,
        description: "unowned customer with a pending order from a privileged creator",
        evaluate: pending_distribution,
    },
    Rule {
        id: RuleId::PoolLadder,
        description: "unowned customer placed on the pool ladder by order age",
        evaluate: pool_ladder,
    },
    Rule {
        id: RuleId::RegistrationLadder,
        description: "customer without orders placed on a ladder by registration age",
        evaluate: registration_ladder,
    },
];

fn upsell(ctx: &RuleContext<'_>) -> Option<BasketId> {
    let agent = ctx.agent?;
    let order = ctx.order?;
    if order.status.is_pending() && order.created_by_privileged() && order.creator_id != agent {
        ctx.catalog.role_basket(BasketRole::Upsell)
    } else {
        None
    }
}

fn personal_ladder(ctx: &RuleContext<'_>) -> Option<BasketId> {
    let agent = ctx.agent?;
    let order = ctx.order?;
    if order.creator_id != agent {
        return None;
    }
    ctx.catalog.ladder_match(Ladder::Personal, ctx.days_since_order?)
}

fn awaiting_reengagement(ctx: &RuleContext<'_>) -> Option<BasketId> {
    let agent = ctx.agent?;
    let order = ctx.order?;
    if order.creator_id == agent || order.created_by_privileged() {
        return None;
    }
    let basket = ctx.catalog.role_basket(BasketRole::AwaitingReengagement)?;
    let in_range = ctx
        .catalog
        .get_definition(basket)
        .ok()
        .and_then(|definition| definition.day_range())
        .map_or(true, |range| {
            ctx.days_since_order.is_some_and(|days| range.contains(days))
        });
    in_range.then_some(basket)
}

fn pending_distribution(ctx: &RuleContext<'_>) -> Option<BasketId> {
    if ctx.agent.is_some() {
        return None;
    }
    let order = ctx.order?;
    if order.status.is_pending() && order.created_by_privileged() {
        ctx.catalog.role_basket(BasketRole::PendingDistribution)
    } else {
        None
    }
}

fn pool_ladder(ctx: &RuleContext<'_>) -> Option<BasketId> {
    if ctx.agent.is_some() || ctx.order.is_none() {
        return None;
    }
    ctx.catalog.ladder_match(Ladder::Pool, ctx.days_since_order?)
}

fn registration_ladder(ctx: &RuleContext<'_>) -> Option<BasketId> {
    if ctx.order.is_some() {
        return None;
    }
    let ladder = if ctx.agent.is_some() {
        Ladder::Personal
    } else {
        Ladder::Pool
    };
    ctx.catalog.ladder_match(ladder, ctx.days_since_registration)
}
