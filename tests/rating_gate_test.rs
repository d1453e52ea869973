//! Rating gate: delivery precondition, purchase check and compound
//! uniqueness.

mod common;

use assert_matches::assert_matches;
use bazaar_core::entities::order::{OrderStatus, PaymentMethod};
use bazaar_core::errors::ServiceError;
use common::TestApp;
use rust_decimal_macros::dec;
use uuid::Uuid;

struct DeliveredOrder {
    buyer_id: Uuid,
    product_id: Uuid,
    order_id: Uuid,
}

async fn deliver_an_order(app: &TestApp) -> DeliveredOrder {
    let fixture = app.seed_checkout_fixture(dec!(18.00)).await;
    let mut request = fixture.request(vec![fixture.line(1)]);
    request.payment_method = PaymentMethod::Online;
    let order = app.state.checkout.checkout(request).await.unwrap();

    for status in [
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        app.state
            .order_lifecycle
            .advance_status(order.id, status)
            .await
            .unwrap();
    }

    DeliveredOrder {
        buyer_id: fixture.buyer.id,
        product_id: fixture.product.id,
        order_id: order.id,
    }
}

#[tokio::test]
async fn delivered_purchases_can_be_rated_once() {
    let app = TestApp::new().await;
    let delivered = deliver_an_order(&app).await;

    let rating = app
        .state
        .ratings
        .submit_rating(
            delivered.buyer_id,
            delivered.product_id,
            delivered.order_id,
            4,
            Some("solid".into()),
        )
        .await
        .expect("first rating lands");
    assert_eq!(rating.score, 4);

    let err = app
        .state
        .ratings
        .submit_rating(
            delivered.buyer_id,
            delivered.product_id,
            delivered.order_id,
            5,
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DuplicateRating);

    let ratings = app
        .state
        .ratings
        .list_for_product(delivered.product_id)
        .await
        .unwrap();
    assert_eq!(ratings.len(), 1);
    assert_eq!(ratings[0].score, 4);
}

#[tokio::test]
async fn undelivered_orders_cannot_be_rated() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(18.00)).await;
    let order = app
        .state
        .checkout
        .checkout(fixture.request(vec![fixture.line(1)]))
        .await
        .unwrap();

    let err = app
        .state
        .ratings
        .submit_rating(fixture.buyer.id, fixture.product.id, order.id, 5, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OrderNotDelivered(id) if id == order.id);
}

#[tokio::test]
async fn products_outside_the_order_cannot_be_rated() {
    let app = TestApp::new().await;
    let delivered = deliver_an_order(&app).await;
    let other = app
        .state
        .catalog
        .get_product(delivered.product_id)
        .await
        .unwrap();
    let unrelated = app.seed_product(other.store_id, dec!(7.00), true).await;

    let err = app
        .state
        .ratings
        .submit_rating(
            delivered.buyer_id,
            unrelated.id,
            delivered.order_id,
            3,
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProductNotInOrder(id) if id == unrelated.id);
}

#[tokio::test]
async fn only_the_buyer_may_rate() {
    let app = TestApp::new().await;
    let delivered = deliver_an_order(&app).await;
    let stranger = app.seed_user("stranger@example.com", false).await;

    let err = app
        .state
        .ratings
        .submit_rating(
            stranger.id,
            delivered.product_id,
            delivered.order_id,
            5,
            None,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTarget(_));
}

#[tokio::test]
async fn scores_are_bounded() {
    let app = TestApp::new().await;
    let delivered = deliver_an_order(&app).await;

    for score in [0, 6, -1] {
        let err = app
            .state
            .ratings
            .submit_rating(
                delivered.buyer_id,
                delivered.product_id,
                delivered.order_id,
                score,
                None,
            )
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }
}

#[tokio::test]
async fn the_same_product_can_be_rated_once_per_order() {
    let app = TestApp::new().await;

    // Two delivered orders for the same buyer and product.
    let fixture = app.seed_checkout_fixture(dec!(18.00)).await;
    let mut order_ids = Vec::new();
    for _ in 0..2 {
        let order = app
            .state
            .checkout
            .checkout(fixture.request(vec![fixture.line(1)]))
            .await
            .unwrap();
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            app.state
                .order_lifecycle
                .advance_status(order.id, status)
                .await
                .unwrap();
        }
        order_ids.push(order.id);
    }

    // Uniqueness is per (user, product, order), not global per product.
    for (order_id, score) in order_ids.iter().zip([4, 2]) {
        app.state
            .ratings
            .submit_rating(fixture.buyer.id, fixture.product.id, *order_id, score, None)
            .await
            .expect("one rating per purchase");
    }
}
