//! End-to-end checkout tests: validation order, atomicity, totals and
//! idempotent resubmission.

mod common;

use assert_matches::assert_matches;
use bazaar_core::entities::order::{OrderStatus, PaymentMethod};
use bazaar_core::entities::{Order, OrderItem};
use bazaar_core::errors::ServiceError;
use bazaar_core::services::checkout::{CheckoutRequest, CheckoutService};
use common::{line_for, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};

#[tokio::test]
async fn checkout_creates_order_with_matching_total() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;
    let second = app.seed_product(fixture.store.id, dec!(10.50), true).await;

    let order = app
        .state
        .checkout
        .checkout(fixture.request(vec![fixture.line(2), line_for(&second, 3)]))
        .await
        .expect("checkout succeeds");

    // 2 * 25.00 + 3 * 10.50
    assert_eq!(order.total, dec!(81.50));
    assert_eq!(order.status, OrderStatus::Placed);
    assert!(!order.is_paid);
    assert!(order.coupon.is_none());

    let (stored, items) = app
        .state
        .checkout
        .get_order_with_items(order.id)
        .await
        .expect("order is queryable");
    assert_eq!(stored.total, order.total);
    assert_eq!(items.len(), 2);

    let items_total: rust_decimal::Decimal = items
        .iter()
        .map(|item| item.unit_price * rust_decimal::Decimal::from(item.quantity))
        .sum();
    assert_eq!(stored.total, items_total);
}

#[tokio::test]
async fn checkout_rejects_empty_cart() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;

    let err = app
        .state
        .checkout
        .checkout(fixture.request(vec![]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn checkout_rejects_inactive_store() {
    let app = TestApp::new().await;
    let buyer = app.seed_user("buyer@example.com", false).await;
    let owner = app.seed_user("owner@example.com", false).await;
    let store = app.seed_store_with(owner.id, false).await;
    let address = app.seed_address(buyer.id).await;
    let product = app.seed_product(store.id, dec!(9.99), true).await;

    let request = CheckoutRequest {
        user_id: buyer.id,
        store_id: store.id,
        address_id: address.id,
        items: vec![line_for(&product, 1)],
        payment_method: PaymentMethod::Online,
        coupon_code: None,
        has_coupon_invitation: false,
        idempotency_key: None,
    };

    let err = app.state.checkout.checkout(request).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidTarget(_));
}

#[tokio::test]
async fn checkout_rejects_address_of_another_user() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;
    let stranger = app.seed_user("stranger@example.com", false).await;
    let foreign_address = app.seed_address(stranger.id).await;

    let mut request = fixture.request(vec![fixture.line(1)]);
    request.address_id = foreign_address.id;

    let err = app.state.checkout.checkout(request).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidTarget(_));
}

#[tokio::test]
async fn checkout_rejects_cart_spanning_two_stores() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;
    let other_owner = app.seed_user("other-owner@example.com", false).await;
    let other_store = app.seed_store(other_owner.id).await;
    let foreign_product = app.seed_product(other_store.id, dec!(5.00), true).await;

    let err = app
        .state
        .checkout
        .checkout(fixture.request(vec![fixture.line(1), line_for(&foreign_product, 1)]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTarget(_));

    // All-or-nothing: the valid line must not have produced an order.
    let orders = Order::find().count(&*app.state.db).await.unwrap();
    assert_eq!(orders, 0);
}

#[tokio::test]
async fn out_of_stock_item_aborts_the_whole_checkout() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;
    let unavailable = app.seed_product(fixture.store.id, dec!(12.00), false).await;

    let err = app
        .state
        .checkout
        .checkout(fixture.request(vec![fixture.line(1), line_for(&unavailable, 1)]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProductUnavailable(id) if id == unavailable.id);

    assert_eq!(Order::find().count(&*app.state.db).await.unwrap(), 0);
    assert_eq!(OrderItem::find().count(&*app.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn checkout_rejects_nonpositive_quantity() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;

    let err = app
        .state
        .checkout
        .checkout(fixture.request(vec![fixture.line(0)]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    assert_eq!(Order::find().count(&*app.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn idempotency_key_replays_the_original_order() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;

    let mut request = fixture.request(vec![fixture.line(1)]);
    request.idempotency_key = Some("retry-5417".into());

    let first = app
        .state
        .checkout
        .checkout(request.clone())
        .await
        .expect("first submission");
    let second = app
        .state
        .checkout
        .checkout(request)
        .await
        .expect("resubmission");

    assert_eq!(first.id, second.id);
    assert_eq!(Order::find().count(&*app.state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn idempotency_key_of_another_user_is_rejected() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;

    let mut request = fixture.request(vec![fixture.line(1)]);
    request.idempotency_key = Some("shared-key".into());
    app.state
        .checkout
        .checkout(request)
        .await
        .expect("first submission");

    let other = app.seed_user("second-buyer@example.com", false).await;
    let other_address = app.seed_address(other.id).await;
    let mut foreign = fixture.request(vec![fixture.line(1)]);
    foreign.user_id = other.id;
    foreign.address_id = other_address.id;
    foreign.idempotency_key = Some("shared-key".into());

    let err = app.state.checkout.checkout(foreign).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidTarget(_));
}

#[tokio::test]
async fn cod_orders_start_unpaid() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;

    let mut request = fixture.request(vec![fixture.line(1)]);
    request.payment_method = PaymentMethod::Cod;

    let order = app.state.checkout.checkout(request).await.unwrap();
    assert_eq!(order.payment_method, PaymentMethod::Cod);
    assert!(!order.is_paid);
}

#[tokio::test]
async fn order_items_freeze_the_submitted_unit_price() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(25.00)).await;

    let order = app
        .state
        .checkout
        .checkout(fixture.request(vec![fixture.line(1)]))
        .await
        .unwrap();

    // Reprice the product after purchase.
    app.state
        .catalog
        .update_pricing(fixture.owner.id, fixture.product.id, dec!(99.00), dec!(99.00))
        .await
        .unwrap();

    let (stored, items) = app
        .state
        .checkout
        .get_order_with_items(order.id)
        .await
        .unwrap();
    assert_eq!(items[0].unit_price, dec!(25.00));
    assert_eq!(stored.total, dec!(25.00));
}

#[tokio::test]
async fn coupon_snapshot_is_embedded_and_decodable() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(40.00)).await;
    app.seed_coupon(common::CouponSeed::percent("SAVE10", dec!(10)))
        .await;

    let mut request = fixture.request(vec![fixture.line(2)]);
    request.coupon_code = Some("SAVE10".into());

    let order = app.state.checkout.checkout(request).await.unwrap();
    assert_eq!(order.total, dec!(72.00));

    let snapshot = CheckoutService::coupon_snapshot(&order).expect("snapshot decodes");
    assert_eq!(snapshot.code, "SAVE10");
    assert_eq!(snapshot.discount_value, dec!(10));
}
