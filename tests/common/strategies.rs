#![allow(dead_code)]

use basket_router::models::{AgentId, BasketId, OrderStatus, RoleTag};
use proptest::prelude::*;

use super::builders::{baskets, AGENT, OTHER_AGENT};

pub fn order_status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Pending),
        Just(OrderStatus::Picking),
        Just(OrderStatus::Shipping),
        Just(OrderStatus::Delivered),
        Just(OrderStatus::Returned),
    ]
}

pub fn role_strategy() -> impl Strategy<Value = RoleTag> {
    prop_oneof![Just(RoleTag::Privileged), Just(RoleTag::FieldSales)]
}

/// Order creator: the owning agent, another field agent, or an admin
pub fn creator_strategy() -> impl Strategy<Value = AgentId> {
    prop_oneof![Just(AGENT), Just(OTHER_AGENT), Just(AgentId(3))]
}

pub fn days_strategy() -> impl Strategy<Value = i64> {
    0i64..1500
}

/// Any fixture basket, owned or pool
pub fn basket_strategy() -> impl Strategy<Value = BasketId> {
    prop_oneof![
        Just(baskets::NEW_CUSTOMER),
        Just(baskets::PERSONAL_1_60),
        Just(baskets::PERSONAL_61_90),
        Just(baskets::PERSONAL_91_180),
        Just(baskets::AWAITING_REENGAGEMENT),
        Just(baskets::UPSELL),
        Just(baskets::OWNED_UNCLASSIFIED),
        Just(baskets::NEW_CUSTOMER_DIST),
        Just(baskets::UPSELL_DIST),
        Just(baskets::POOL_31_179),
        Just(baskets::MID_6_12M),
        Just(baskets::MID_1_3Y),
        Just(baskets::ANCIENT),
        Just(baskets::DISTRIBUTION_EXHAUSTED),
        Just(baskets::POOL_UNCLASSIFIED),
    ]
}

/// An optional latest order as (creator, role, status, days ago)
pub fn latest_order_strategy(
) -> impl Strategy<Value = Option<(AgentId, RoleTag, OrderStatus, i64)>> {
    prop::option::of((
        creator_strategy(),
        role_strategy(),
        order_status_strategy(),
        days_strategy(),
    ))
}

/// A sequence of (target basket, days to advance before the move)
pub fn transition_sequence_strategy() -> impl Strategy<Value = Vec<(BasketId, i64)>> {
    prop::collection::vec((basket_strategy(), 0i64..120), 1..20)
}
