use basket_router::catalog::BasketCatalog;
use basket_router::classifier::{ClassificationInput, Classifier};
use basket_router::models::{
    AgentId, BasketDefinition, BasketId, BasketRole, CustomerId, CustomerOwnership, OrderId,
    OrderSnapshot, OrderStatus, RoleTag, TargetAudience,
};
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use TargetAudience::{AgentOwned, UnownedPool};

fn catalog() -> Arc<BasketCatalog> {
    Arc::new(
        BasketCatalog::new(vec![
            BasketDefinition::new(90, "owned_unclassified", AgentOwned, BasketRole::CatchAll),
            BasketDefinition::new(91, "pool_unclassified", UnownedPool, BasketRole::CatchAll),
            BasketDefinition::new(39, "personal_1_60", AgentOwned, BasketRole::PersonalLadder)
                .with_days(0, Some(60)),
            BasketDefinition::new(40, "personal_61_90", AgentOwned, BasketRole::PersonalLadder)
                .with_days(61, Some(90)),
            BasketDefinition::new(41, "personal_91_180", AgentOwned, BasketRole::PersonalLadder)
                .with_days(91, Some(180)),
            BasketDefinition::new(51, "upsell", AgentOwned, BasketRole::Upsell),
            BasketDefinition::new(52, "new_customer_dist", UnownedPool, BasketRole::PoolLadder)
                .with_days(0, Some(30)),
            BasketDefinition::new(43, "pool_31_179", UnownedPool, BasketRole::PoolLadder)
                .with_days(31, Some(179)),
            BasketDefinition::new(53, "upsell_dist", UnownedPool, BasketRole::PendingDistribution),
        ])
        .expect("benchmark catalog is valid"),
    )
}

fn benchmark_classify_owned(c: &mut Criterion) {
    let classifier = Classifier::new(catalog());
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let ownership =
        CustomerOwnership::registered_with_agent(CustomerId(1), AgentId(42), BasketId(39), now);
    let order = OrderSnapshot {
        id: OrderId::new("ORD-1"),
        customer_id: CustomerId(1),
        status: OrderStatus::Delivered,
        creator_id: AgentId(42),
        creator_role: Some(RoleTag::FieldSales),
        order_date: now - Duration::days(75),
    };

    c.bench_function("classify_owned_personal_ladder", |b| {
        b.iter(|| {
            classifier.classify(black_box(&ClassificationInput {
                ownership: &ownership,
                latest_order: Some(&order),
                now,
            }))
        })
    });
}

fn benchmark_classify_unowned_without_orders(c: &mut Criterion) {
    let classifier = Classifier::new(catalog());
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let ownership =
        CustomerOwnership::registered(CustomerId(2), BasketId(52), now - Duration::days(45));

    c.bench_function("classify_unowned_registration_ladder", |b| {
        b.iter(|| {
            classifier.classify(black_box(&ClassificationInput {
                ownership: &ownership,
                latest_order: None,
                now,
            }))
        })
    });
}

criterion_group!(
    benches,
    benchmark_classify_owned,
    benchmark_classify_unowned_without_orders
);
criterion_main!(benches);
