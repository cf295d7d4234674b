//! Integration tests for order placement and the order lifecycle.
//!
//! These tests run every service against the in-memory store and check both
//! the returned values and the persisted state left behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use common::{OrderStatus, PaymentStatus, ProductId, Role, UserId};
use domain::{
    Actor, CodeGenerator, InMemoryCatalog, LineRequest, MarketConfig, MarketError, Marketplace,
    PaymentSignal, Product, UserProfile,
};
use store::{InMemoryStore, Inventory, Store};

type Market = Marketplace<InMemoryStore, InMemoryCatalog>;

struct Fixture {
    market: Market,
    store: InMemoryStore,
    seller: UserProfile,
    buyer: UserProfile,
    admin: UserProfile,
    product: Product,
}

fn user(first_name: &str, roles: &[Role]) -> UserProfile {
    UserProfile {
        id: UserId::new(),
        first_name: first_name.to_string(),
        roles: roles.iter().copied().collect(),
    }
}

fn product(name: &str, category: &str, unit_price: i64) -> Product {
    Product {
        id: ProductId::new(),
        name: name.to_string(),
        category: category.to_string(),
        unit_price,
    }
}

async fn fixture_with(store: InMemoryStore, codes: CodeGenerator) -> Fixture {
    let catalog = InMemoryCatalog::new();
    let seller = user("Selma", &[Role::Seller]);
    let buyer = user("Bruno", &[Role::Buyer]);
    let admin = user("Ada", &[Role::Admin]);
    let product = product("Headphones", "electronics", 1500);

    for u in [&seller, &buyer, &admin] {
        catalog.add_user(u.clone()).await;
    }
    catalog.add_product(product.clone()).await;

    let market = Marketplace::with_codes(store.clone(), catalog, MarketConfig::default(), codes);
    Fixture {
        market,
        store,
        seller,
        buyer,
        admin,
        product,
    }
}

async fn fixture() -> Fixture {
    fixture_with(InMemoryStore::new(), CodeGenerator::default()).await
}

impl Fixture {
    async fn stock(&self, quantity: i64) -> Inventory {
        self.market
            .inventory()
            .contribute_stock(self.seller.id, self.product.id, quantity, &self.seller.actor())
            .await
            .unwrap()
            .lot
    }

    /// A lot seeded straight into the store, without drawing a code.
    async fn seeded_lot(&self, quantity: i64) -> Inventory {
        let lot = Inventory::new("SEEDED", self.seller.id, self.product.id, quantity, self.seller.id);
        self.store.seed_inventory(lot.clone()).await;
        lot
    }

    /// A second marketplace over the same store and catalog, standing in for
    /// another process with its own code generator.
    fn peer(&self, codes: CodeGenerator) -> Market {
        Marketplace::with_codes(
            self.store.clone(),
            self.market.catalog().clone(),
            MarketConfig::default(),
            codes,
        )
    }

    async fn quantity(&self, lot: &Inventory) -> i64 {
        self.store.get_inventory(lot.id).await.unwrap().unwrap().quantity
    }

    async fn place(&self, lot: &Inventory, quantity: i64) -> Result<domain::OrderDetails, MarketError> {
        self.place_via(&self.market, lot, quantity).await
    }

    async fn place_via(
        &self,
        market: &Market,
        lot: &Inventory,
        quantity: i64,
    ) -> Result<domain::OrderDetails, MarketError> {
        market
            .orders()
            .place_order(
                self.buyer.id,
                &[LineRequest::new(lot.id, quantity)],
                &self.buyer.actor(),
            )
            .await
    }
}

mod placement {
    use super::*;

    #[tokio::test]
    async fn end_to_end_scenario() {
        let f = fixture().await;
        let lot = f.stock(10).await;

        let details = f.place(&lot, 3).await.unwrap();
        assert_eq!(details.order.status, OrderStatus::Pending);
        assert_eq!(details.order.payment_status, PaymentStatus::Pending);
        assert_eq!(details.order.buyer_id, f.buyer.id);
        assert_eq!(details.order.updated_by, f.buyer.id);
        assert!(details.order.code.starts_with("BrunES"));
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.items[0].quantity, 3);
        assert_eq!(details.items[0].seller_id, f.seller.id);
        assert_eq!(details.items[0].unit_price, 1500);
        assert_eq!(f.quantity(&lot).await, 7);

        let order_id = details.order.id;
        let paid = f.market.lifecycle().mark_payment_result(order_id, true).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        let processing = f
            .market
            .lifecycle()
            .transition_order_status(order_id, OrderStatus::Processing, &f.seller.actor())
            .await
            .unwrap();
        assert_eq!(processing.status, OrderStatus::Processing);

        let payout = f
            .market
            .payouts()
            .schedule_payout(order_id, f.seller.id, 4500)
            .await
            .unwrap();
        assert_eq!(payout.status, PaymentStatus::Pending);
        assert_eq!(payout.amount, 4500);

        let err = f
            .market
            .payouts()
            .schedule_payout(order_id, f.seller.id, 4500)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
        assert_eq!(f.store.payout_count().await, 1);
    }

    #[tokio::test]
    async fn code_is_built_from_buyer_and_category() {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 9, 30, 0).unwrap();
        let f = fixture_with(InMemoryStore::new(), CodeGenerator::new('X').with_clock(move || at)).await;
        let lot = f.stock(5).await;
        assert_eq!(lot.code, domain::compose_code("Selma", "electronics", at, 'X'));

        // the clock is stalled, so the order code takes the next millisecond
        let details = f.place(&lot, 1).await.unwrap();
        assert_eq!(
            details.order.code,
            domain::compose_code("Bruno", "electronics", at + TimeDelta::milliseconds(1), 'X')
        );
        assert!(details.order.code.starts_with("BrunES26"));
    }

    #[tokio::test]
    async fn insufficient_stock_changes_nothing_twice() {
        let f = fixture().await;
        let lot = f.stock(2).await;

        for _ in 0..2 {
            let err = f.place(&lot, 3).await.unwrap_err();
            assert!(matches!(
                err,
                MarketError::InsufficientStock { requested: 3, available: 2, .. }
            ));
            assert_eq!(f.quantity(&lot).await, 2);
            assert_eq!(f.store.order_count().await, 0);
            assert_eq!(f.store.order_item_count().await, 0);
        }
    }

    #[tokio::test]
    async fn one_failing_line_aborts_the_whole_order() {
        let f = fixture().await;
        let lot = f.stock(10).await;
        let other_lot = Inventory::new("OTHER", f.seller.id, ProductId::new(), 1, f.seller.id);
        f.store.seed_inventory(other_lot.clone()).await;

        let lines = [LineRequest::new(lot.id, 4), LineRequest::new(other_lot.id, 2)];
        let err = f
            .market
            .orders()
            .place_order(f.buyer.id, &lines, &f.buyer.actor())
            .await
            .unwrap_err();

        assert!(matches!(err, MarketError::InsufficientStock { .. }));
        assert_eq!(f.quantity(&lot).await, 10);
        assert_eq!(f.quantity(&other_lot).await, 1);
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_lot_and_buyer_are_not_found() {
        let f = fixture().await;
        let lot = f.stock(10).await;

        let missing = Inventory::new("GONE", f.seller.id, f.product.id, 1, f.seller.id);
        let err = f.place(&missing, 1).await.unwrap_err();
        assert!(matches!(err, MarketError::NotFound { entity: "Inventory", .. }));

        let err = f
            .market
            .orders()
            .place_order(UserId::new(), &[LineRequest::new(lot.id, 1)], &f.admin.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { entity: "User", .. }));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_lines_are_checked_cumulatively() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let actor = f.buyer.actor();

        let lines = [LineRequest::new(lot.id, 3), LineRequest::new(lot.id, 3)];
        let err = f
            .market
            .orders()
            .place_order(f.buyer.id, &lines, &actor)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MarketError::InsufficientStock { requested: 6, available: 5, .. }
        ));
        assert_eq!(f.quantity(&lot).await, 5);

        let lines = [LineRequest::new(lot.id, 2), LineRequest::new(lot.id, 2)];
        let details = f
            .market
            .orders()
            .place_order(f.buyer.id, &lines, &actor)
            .await
            .unwrap();
        assert_eq!(details.items.len(), 2);
        assert_eq!(f.quantity(&lot).await, 1);
    }

    #[tokio::test]
    async fn invalid_requests_and_roles() {
        let f = fixture().await;
        let lot = f.stock(5).await;

        let err = f
            .market
            .orders()
            .place_order(f.buyer.id, &[], &f.buyer.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidRequest(_)));

        let err = f.place(&lot, -1).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidRequest(_)));

        let err = f
            .market
            .orders()
            .place_order(f.buyer.id, &[LineRequest::new(lot.id, 1)], &f.seller.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { .. }));

        let other_buyer = Actor::new(UserId::new(), [Role::Buyer]);
        let err = f
            .market
            .orders()
            .place_order(f.buyer.id, &[LineRequest::new(lot.id, 1)], &other_buyer)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { .. }));

        // admins may order on a buyer's behalf
        let details = f
            .market
            .orders()
            .place_order(f.buyer.id, &[LineRequest::new(lot.id, 1)], &f.admin.actor())
            .await
            .unwrap();
        assert_eq!(details.order.updated_by, f.admin.id);
        assert_eq!(f.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn get_order_returns_items() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let placed = f.place(&lot, 2).await.unwrap();

        let loaded = f.market.orders().get_order(placed.order.id).await.unwrap();
        assert_eq!(loaded, placed);
        assert_eq!(loaded.total().unwrap(), 3000);

        let err = f
            .market
            .orders()
            .get_order(common::OrderId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { entity: "Order", .. }));
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn two_orders_race_for_one_lot() {
        let f = fixture().await;
        let lot = f.stock(5).await;

        let (first, second) = tokio::join!(f.place(&lot, 4), f.place(&lot, 4));

        let results = [first, second];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let shortfalls = results
            .iter()
            .filter(|r| matches!(r, Err(MarketError::InsufficientStock { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(shortfalls, 1);
        assert_eq!(f.quantity(&lot).await, 1);
        assert_eq!(f.store.order_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_orders_never_oversell() {
        let f = Arc::new(fixture().await);
        let lot = f.stock(10).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let f = Arc::clone(&f);
            let lot = lot.clone();
            handles.push(tokio::spawn(async move { f.place(&lot, 3).await }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(MarketError::InsufficientStock { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(f.quantity(&lot).await, 1);
        assert_eq!(f.store.order_count().await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_buyer_in_parallel_gets_distinct_codes() {
        let f = Arc::new(fixture().await);
        let lot = f.stock(200).await;

        for _ in 0..20 {
            let mut handles = Vec::new();
            for _ in 0..8 {
                let f = Arc::clone(&f);
                let lot = lot.clone();
                handles.push(tokio::spawn(async move { f.place(&lot, 1).await }));
            }
            for handle in handles {
                if let Err(e) = handle.await.unwrap() {
                    panic!("placement with ample stock failed: {e}");
                }
            }
        }

        assert_eq!(f.store.order_count().await, 160);
        assert_eq!(f.quantity(&lot).await, 40);
    }

    #[tokio::test]
    async fn overlapping_lots_in_opposite_order_both_commit() {
        let f = fixture().await;
        let first = f.stock(5).await;
        let lamp = product("Lamp", "lighting", 800);
        f.market.catalog().add_product(lamp.clone()).await;
        let second = f
            .market
            .inventory()
            .contribute_stock(f.seller.id, lamp.id, 5, &f.seller.actor())
            .await
            .unwrap()
            .lot;

        let forward = [LineRequest::new(first.id, 1), LineRequest::new(second.id, 1)];
        let backward = [LineRequest::new(second.id, 1), LineRequest::new(first.id, 1)];
        let actor = f.buyer.actor();
        let (a, b) = tokio::join!(
            f.market.orders().place_order(f.buyer.id, &forward, &actor),
            f.market.orders().place_order(f.buyer.id, &backward, &actor),
        );

        a.unwrap();
        b.unwrap();
        assert_eq!(f.quantity(&first).await, 3);
        assert_eq!(f.quantity(&second).await, 3);
    }

    #[tokio::test]
    async fn held_lock_surfaces_timeout() {
        let store = InMemoryStore::new().with_lock_timeout(Duration::from_millis(50));
        let f = fixture_with(store, CodeGenerator::default()).await;
        let lot = f.stock(5).await;

        let held = f.store.begin().await.unwrap();
        let err = f.place(&lot, 1).await.unwrap_err();
        assert!(matches!(err, MarketError::Timeout));

        drop(held);
        f.place(&lot, 1).await.unwrap();
        assert_eq!(f.quantity(&lot).await, 4);
    }

    #[tokio::test]
    async fn cancelled_placement_leaves_no_trace() {
        let f = fixture().await;
        let lot = f.stock(5).await;

        let held = f.store.begin().await.unwrap();
        let attempt = tokio::time::timeout(Duration::from_millis(20), f.place(&lot, 2)).await;
        assert!(attempt.is_err());
        drop(held);

        assert_eq!(f.quantity(&lot).await, 5);
        assert_eq!(f.store.order_count().await, 0);
        f.place(&lot, 2).await.unwrap();
    }
}

mod retries {
    use super::*;

    #[tokio::test]
    async fn one_commit_failure_is_retried() {
        let f = fixture().await;
        let lot = f.stock(5).await;

        f.store.fail_next_commits(1);
        let details = f.place(&lot, 2).await.unwrap();

        assert_eq!(details.items.len(), 1);
        assert_eq!(f.quantity(&lot).await, 3);
        assert_eq!(f.store.order_count().await, 1);
        assert_eq!(f.store.order_item_count().await, 1);
    }

    #[tokio::test]
    async fn persistent_commit_failure_surfaces_as_internal() {
        let f = fixture().await;
        let lot = f.stock(5).await;

        f.store.fail_next_commits(2);
        let err = f.place(&lot, 2).await.unwrap_err();

        assert!(matches!(err, MarketError::Internal(_)));
        assert_eq!(f.quantity(&lot).await, 5);
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(f.store.order_item_count().await, 0);
    }

    fn stalled_codes() -> CodeGenerator {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).unwrap();
        CodeGenerator::new('X').with_clock(move || at)
    }

    #[tokio::test]
    async fn foreign_code_collision_is_retried_with_a_fresh_code() {
        let f = fixture_with(InMemoryStore::new(), stalled_codes()).await;
        let lot = f.seeded_lot(10).await;
        let peer = f.peer(stalled_codes());

        let first = f.place(&lot, 1).await.unwrap();
        let second = f.place_via(&peer, &lot, 1).await.unwrap();

        assert_ne!(first.order.code, second.order.code);
        assert_eq!(f.quantity(&lot).await, 8);
        assert_eq!(f.store.order_count().await, 2);
    }

    #[tokio::test]
    async fn repeated_code_collision_is_a_conflict() {
        let f = fixture_with(InMemoryStore::new(), stalled_codes()).await;
        let lot = f.seeded_lot(10).await;
        let peer = f.peer(stalled_codes());
        let third = f.peer(stalled_codes());

        // the first two take the stalled millisecond and the one after it
        f.place(&lot, 1).await.unwrap();
        f.place_via(&peer, &lot, 1).await.unwrap();
        let err = f.place_via(&third, &lot, 1).await.unwrap_err();

        assert!(matches!(err, MarketError::Conflict(_)));
        assert_eq!(f.quantity(&lot).await, 8);
        assert_eq!(f.store.order_count().await, 2);
    }
}

mod lifecycle {
    use super::*;

    async fn paid_order(f: &Fixture, lot: &Inventory) -> common::OrderId {
        let order_id = f.place(lot, 1).await.unwrap().order.id;
        f.market
            .lifecycle()
            .mark_payment_result(order_id, true)
            .await
            .unwrap();
        order_id
    }

    #[tokio::test]
    async fn delivered_order_cannot_go_back_to_processing() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let order_id = paid_order(&f, &lot).await;
        let seller = f.seller.actor();

        for target in [
            OrderStatus::Processing,
            OrderStatus::Shipping,
            OrderStatus::Delivered,
        ] {
            f.market
                .lifecycle()
                .transition_order_status(order_id, target, &seller)
                .await
                .unwrap();
        }

        let err = f
            .market
            .lifecycle()
            .transition_order_status(order_id, OrderStatus::Processing, &seller)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));

        let stored = f.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn unpaid_order_cannot_start_processing() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let order_id = f.place(&lot, 1).await.unwrap().order.id;

        let err = f
            .market
            .lifecycle()
            .transition_order_status(order_id, OrderStatus::Processing, &f.seller.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));

        f.market
            .lifecycle()
            .mark_payment_result(order_id, false)
            .await
            .unwrap();
        let err = f
            .market
            .lifecycle()
            .transition_order_status(order_id, OrderStatus::Processing, &f.seller.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));

        let stored = f.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn cancelling_restocks_the_lot() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let order_id = f.place(&lot, 3).await.unwrap().order.id;
        assert_eq!(f.quantity(&lot).await, 2);

        let cancelled = f
            .market
            .lifecycle()
            .transition_order_status(order_id, OrderStatus::Cancelled, &f.buyer.actor())
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(f.quantity(&lot).await, 5);

        let err = f
            .market
            .lifecycle()
            .mark_payment_result(order_id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn outsiders_cannot_drive_orders() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let order_id = paid_order(&f, &lot).await;

        let err = f
            .market
            .lifecycle()
            .transition_order_status(order_id, OrderStatus::Processing, &f.buyer.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { .. }));

        let stranger = Actor::new(UserId::new(), [Role::Seller]);
        let err = f
            .market
            .lifecycle()
            .transition_order_status(order_id, OrderStatus::Processing, &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden { .. }));

        let err = f
            .market
            .lifecycle()
            .transition_order_status(common::OrderId::new(), OrderStatus::Cancelled, &f.admin.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { .. }));
    }

    #[tokio::test]
    async fn payment_results_are_final() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let order_id = paid_order(&f, &lot).await;

        let err = f
            .market
            .lifecycle()
            .mark_payment_result(order_id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));

        let err = f
            .market
            .lifecycle()
            .mark_payment_result(common::OrderId::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { .. }));
    }
}

mod payouts {
    use super::*;

    #[tokio::test]
    async fn payment_signal_schedules_one_payout_per_seller() {
        let f = fixture().await;
        let lot = f.stock(5).await;

        let second_seller = user("Theo", &[Role::Seller]);
        let lamp = product("Lamp", "lighting", 800);
        f.market.catalog().add_user(second_seller.clone()).await;
        f.market.catalog().add_product(lamp.clone()).await;
        let lamp_lot = f
            .market
            .inventory()
            .contribute_stock(second_seller.id, lamp.id, 4, &second_seller.actor())
            .await
            .unwrap()
            .lot;

        let lines = [
            LineRequest::new(lot.id, 2),
            LineRequest::new(lamp_lot.id, 3),
            LineRequest::new(lot.id, 1),
        ];
        let details = f
            .market
            .orders()
            .place_order(f.buyer.id, &lines, &f.buyer.actor())
            .await
            .unwrap();
        let order_id = details.order.id;

        let outcome = f
            .market
            .apply_payment_signal(PaymentSignal { order_id, paid: true })
            .await
            .unwrap();
        assert_eq!(outcome.order.payment_status, PaymentStatus::Paid);
        assert_eq!(outcome.payouts.len(), 2);

        let payouts = f.market.payouts().list_payouts(order_id).await.unwrap();
        let amount_for = |seller: UserId| {
            payouts
                .iter()
                .find(|p| p.seller_id == seller)
                .map(|p| p.amount)
        };
        assert_eq!(amount_for(f.seller.id), Some(4500));
        assert_eq!(amount_for(second_seller.id), Some(2400));

        let err = f
            .market
            .apply_payment_signal(PaymentSignal { order_id, paid: true })
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));
        assert_eq!(f.store.payout_count().await, 2);
    }

    #[tokio::test]
    async fn failed_payment_schedules_nothing() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let order_id = f.place(&lot, 1).await.unwrap().order.id;

        let outcome = f
            .market
            .apply_payment_signal(PaymentSignal { order_id, paid: false })
            .await
            .unwrap();
        assert_eq!(outcome.order.payment_status, PaymentStatus::Failed);
        assert!(outcome.payouts.is_empty());
        assert_eq!(f.store.payout_count().await, 0);
    }

    #[tokio::test]
    async fn schedule_payout_preconditions() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let order_id = f.place(&lot, 1).await.unwrap().order.id;
        let payouts = f.market.payouts();

        let err = payouts.schedule_payout(order_id, f.seller.id, 1500).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));

        f.market
            .lifecycle()
            .mark_payment_result(order_id, true)
            .await
            .unwrap();

        let err = payouts.schedule_payout(order_id, UserId::new(), 1500).await.unwrap_err();
        assert!(matches!(err, MarketError::NotFound { entity: "Seller", .. }));

        let err = payouts
            .schedule_payout(common::OrderId::new(), f.seller.id, 1500)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { entity: "Order", .. }));

        let err = payouts.schedule_payout(order_id, f.seller.id, -5).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidRequest(_)));

        assert_eq!(f.store.payout_count().await, 0);
    }

    #[tokio::test]
    async fn completing_a_payout_is_final() {
        let f = fixture().await;
        let lot = f.stock(5).await;
        let order_id = f.place(&lot, 2).await.unwrap().order.id;
        let outcome = f
            .market
            .apply_payment_signal(PaymentSignal { order_id, paid: true })
            .await
            .unwrap();
        let payout_id = outcome.payouts[0].id;

        let paid = f.market.payouts().complete_payout(payout_id, true).await.unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert!(paid.processed_at.is_some());

        let err = f
            .market
            .payouts()
            .complete_payout(payout_id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition(_)));

        let err = f
            .market
            .payouts()
            .complete_payout(common::PayoutId::new(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { entity: "Payout", .. }));
    }

    #[tokio::test]
    async fn large_order_pays_out_in_full() {
        let f = fixture().await;
        let quantity = 10_i64.pow(15);
        let lot = f.stock(quantity).await;
        let order_id = f.place(&lot, quantity).await.unwrap().order.id;

        let outcome = f
            .market
            .apply_payment_signal(PaymentSignal { order_id, paid: true })
            .await
            .unwrap();
        assert_eq!(outcome.payouts.len(), 1);
        assert_eq!(outcome.payouts[0].amount, 1500 * quantity);
    }
}

mod amounts {
    use super::*;

    #[tokio::test]
    async fn order_whose_amount_overflows_is_rejected() {
        let f = fixture().await;
        let quantity = 10_i64.pow(16);
        let lot = f.stock(quantity).await;

        let err = f.place(&lot, quantity).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidRequest(_)));
        assert_eq!(f.quantity(&lot).await, quantity);
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(f.store.order_item_count().await, 0);
    }

    #[tokio::test]
    async fn lines_whose_quantities_overflow_are_rejected() {
        let f = fixture().await;
        let lot = f.stock(5).await;

        let lines = [LineRequest::new(lot.id, i64::MAX), LineRequest::new(lot.id, 1)];
        let err = f
            .market
            .orders()
            .place_order(f.buyer.id, &lines, &f.buyer.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidRequest(_)));
        assert_eq!(f.quantity(&lot).await, 5);
    }

    #[tokio::test]
    async fn contribution_beyond_range_is_rejected() {
        let f = fixture().await;
        let lot = f.stock(i64::MAX - 1).await;

        let err = f
            .market
            .inventory()
            .contribute_stock(f.seller.id, f.product.id, 2, &f.seller.actor())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidRequest(_)));
        assert_eq!(f.quantity(&lot).await, i64::MAX - 1);
    }
}
