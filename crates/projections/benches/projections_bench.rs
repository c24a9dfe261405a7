use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Aggregate, CreatePayment, LineRequest, Money, OrderService, PaymentMethod, PaymentService,
    PaymentStatus, PlaceOrder, SettingsService, StockKey, StockService, StoreSettings,
};
use event_store::InMemoryEventStore;
use projections::{PaymentsView, Projection, ProjectionProcessor, SalesFilter, SalesView, StockLevelsView};

/// Places `n` orders and pays every other one.
async fn populate_store(store: &InMemoryEventStore, n: usize) {
    let settings = Arc::new(SettingsService::fixed(StoreSettings::default()));
    let orders = OrderService::new(store.clone(), settings);
    let payments = PaymentService::new(store.clone());
    let stock = StockService::new(store.clone());

    let key = StockKey::product("BENCH");
    stock.register_product(key.clone(), u32::MAX / 2).await.unwrap();

    for i in 0..n {
        let sell = orders
            .place_order(PlaceOrder::new(vec![LineRequest::new(
                key.clone(),
                "Bench item",
                2,
                Money::from_cents(1_000),
            )]))
            .await
            .unwrap();
        if i % 2 == 0 {
            let sell_id = sell.id().unwrap();
            payments
                .create_payment(CreatePayment::received(
                    sell_id,
                    sell.total_payable_amount(),
                    PaymentMethod::Wave,
                ))
                .await
                .unwrap();
        }
    }
}

fn processor_with_views(store: InMemoryEventStore) -> (ProjectionProcessor<InMemoryEventStore>, SalesView) {
    let sales = SalesView::new();
    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(sales.clone()) as Box<dyn Projection>);
    processor.register(Box::new(PaymentsView::new()));
    processor.register(Box::new(StockLevelsView::new()));
    (processor, sales)
}

fn bench_catch_up_100_orders(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 100));

    c.bench_function("projections/catch_up_100_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (processor, _) = processor_with_views(store.clone());
                processor.run_catch_up().await.unwrap();
            });
        });
    });
}

fn bench_filter_unpaid(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let sales = rt.block_on(async {
        populate_store(&store, 200).await;
        let (processor, sales) = processor_with_views(store);
        processor.run_catch_up().await.unwrap();
        sales
    });

    c.bench_function("projections/filter_unpaid_of_200", |b| {
        b.iter(|| {
            rt.block_on(async {
                sales
                    .filter(SalesFilter {
                        payment_status: Some(PaymentStatus::Unpaid),
                        ..Default::default()
                    })
                    .await
            })
        });
    });
}

fn bench_rebuild_100_orders(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 100));
    let (processor, _) = processor_with_views(store);

    c.bench_function("projections/rebuild_100_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                processor.rebuild_all().await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_catch_up_100_orders,
    bench_filter_unpaid,
    bench_rebuild_100_orders,
);
criterion_main!(benches);
