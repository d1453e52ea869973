//! Wishlist membership and append/read messaging.

mod common;

use assert_matches::assert_matches;
use bazaar_core::errors::ServiceError;
use common::TestApp;
use rust_decimal_macros::dec;

#[tokio::test]
async fn wishlist_membership_is_idempotent() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(12.00)).await;

    let first = app
        .state
        .wishlist
        .add(fixture.buyer.id, fixture.product.id)
        .await
        .unwrap();
    let second = app
        .state
        .wishlist
        .add(fixture.buyer.id, fixture.product.id)
        .await
        .expect("re-adding is a no-op success");
    assert_eq!(first.added_at, second.added_at);

    let items = app.state.wishlist.list_for_user(fixture.buyer.id).await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn wishlist_remove_then_list() {
    let app = TestApp::new().await;
    let fixture = app.seed_checkout_fixture(dec!(12.00)).await;
    let other = app.seed_product(fixture.store.id, dec!(3.00), true).await;

    app.state
        .wishlist
        .add(fixture.buyer.id, fixture.product.id)
        .await
        .unwrap();
    app.state
        .wishlist
        .add(fixture.buyer.id, other.id)
        .await
        .unwrap();

    app.state
        .wishlist
        .remove(fixture.buyer.id, fixture.product.id)
        .await
        .unwrap();

    let items = app.state.wishlist.list_for_user(fixture.buyer.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, other.id);
}

#[tokio::test]
async fn wishlisting_an_unknown_product_fails() {
    let app = TestApp::new().await;
    let user = app.seed_user("wisher@example.com", false).await;

    let err = app
        .state
        .wishlist
        .add(user.id, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn conversation_reads_both_directions_in_order() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice@example.com", false).await;
    let bob = app.seed_user("bob@example.com", false).await;
    let carol = app.seed_user("carol@example.com", false).await;

    app.state
        .messages
        .send(alice.id, bob.id, "is the blue one in stock?")
        .await
        .unwrap();
    app.state
        .messages
        .send(bob.id, alice.id, "yes, two left")
        .await
        .unwrap();
    app.state
        .messages
        .send(alice.id, carol.id, "unrelated thread")
        .await
        .unwrap();

    let thread = app.state.messages.conversation(alice.id, bob.id).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].sender_id, alice.id);
    assert_eq!(thread[1].sender_id, bob.id);
}

#[tokio::test]
async fn empty_and_self_messages_are_rejected() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice@example.com", false).await;
    let bob = app.seed_user("bob@example.com", false).await;

    let err = app.state.messages.send(alice.id, bob.id, "   ").await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .state
        .messages
        .send(alice.id, alice.id, "note to self")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
