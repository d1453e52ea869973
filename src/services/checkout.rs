use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        address::Entity as AddressEntity,
        checkout_attempt::{self, Entity as CheckoutAttemptEntity},
        order::{self, Entity as OrderEntity, OrderStatus, PaymentMethod},
        order_item::{self, Entity as OrderItemEntity},
        store::Entity as StoreEntity,
    },
    errors::{is_unique_violation, ServiceError},
    events::{Event, EventSender},
    services::{
        coupons::{CouponService, CouponSnapshot},
        pricing::{self, PricedLine},
        stock,
    },
};

/// One line of a checkout cart. `unit_price` is the price captured when the
/// item was added; it is stored on the order item verbatim and never
/// recomputed from the current product price.
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Opaque payload produced and validated by the cart boundary.
    pub customizations: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub store_id: Uuid,
    pub address_id: Uuid,
    pub items: Vec<CheckoutLine>,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    /// Witness from the external invitation collaborator; only consulted
    /// for private coupons.
    pub has_coupon_invitation: bool,
    /// Caller-supplied token making retried submissions safe: a duplicate
    /// key returns the original order instead of creating a second one.
    pub idempotency_key: Option<String>,
}

/// Turns a validated cart into a persisted order.
///
/// All validation reads and all writes happen inside one transaction, so a
/// concurrent checkout cannot interleave between the stock check and the
/// commit, and a failure at any point leaves zero rows behind.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    coupons: Arc<CouponService>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        coupons: Arc<CouponService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            coupons,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id, store_id = %request.store_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<order::Model, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "checkout requires at least one item".into(),
            ));
        }

        // Fast path for retried submissions: a committed attempt under this
        // key already names the order.
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.find_committed_attempt(key, request.user_id).await? {
                return Ok(existing);
            }
        }

        let txn = self.db.begin().await?;

        let outcome = self.run_checkout(&txn, &request).await;
        let order = match outcome {
            Ok(order) => order,
            Err(err) => {
                // Rollback is best-effort; the error the caller sees is the
                // one that aborted the checkout.
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("checkout rollback failed: {}", rollback_err);
                }
                return self.resolve_abort(err, &request).await;
            }
        };

        txn.commit()
            .await
            .map_err(|e| ServiceError::CommitFailed(e.to_string()))?;

        self.event_sender
            .emit(Event::OrderPlaced {
                order_id: order.id,
                user_id: order.user_id,
                store_id: order.store_id,
            })
            .await;
        if let Some(code) = &request.coupon_code {
            self.event_sender
                .emit(Event::CouponRedeemed {
                    code: code.clone(),
                    user_id: order.user_id,
                    order_id: order.id,
                })
                .await;
        }

        info!(order_id = %order.id, total = %order.total, "checkout committed");
        Ok(order)
    }

    /// Steps 1-5 of the checkout state machine, executed on the transaction.
    async fn run_checkout(
        &self,
        txn: &DatabaseTransaction,
        request: &CheckoutRequest,
    ) -> Result<order::Model, ServiceError> {
        // Target validation: active store, buyer-owned address.
        let store = StoreEntity::find_by_id(request.store_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidTarget(format!("store {} not found", request.store_id))
            })?;
        if !store.is_active {
            return Err(ServiceError::InvalidTarget(format!(
                "store {} is not active",
                store.id
            )));
        }

        let address = AddressEntity::find_by_id(request.address_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidTarget(format!("address {} not found", request.address_id))
            })?;
        if address.user_id != request.user_id {
            return Err(ServiceError::InvalidTarget(format!(
                "address {} does not belong to the buyer",
                address.id
            )));
        }

        // Stock validation: every line must be sellable and must belong to
        // the one store this order is for. A cart spanning stores has to be
        // split by the caller into one checkout per store.
        for line in &request.items {
            let product = stock::ensure_sellable(txn, line.product_id).await?;
            if product.store_id != request.store_id {
                return Err(ServiceError::InvalidTarget(format!(
                    "product {} does not belong to store {}",
                    product.id, request.store_id
                )));
            }
        }

        let snapshot = match &request.coupon_code {
            Some(code) => Some(
                self.coupons
                    .validate(txn, code, request.user_id, request.has_coupon_invitation)
                    .await?,
            ),
            None => None,
        };

        let lines: Vec<PricedLine> = request
            .items
            .iter()
            .map(|item| PricedLine {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();
        let breakdown = pricing::price_order(&lines, snapshot.as_ref())?;

        // Persist order, items, redemption marker and idempotency record
        // atomically. Partial state is never observable outside this
        // transaction.
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let coupon_json = match &snapshot {
            Some(snap) => Some(
                serde_json::to_value(snap)
                    .map_err(|e| ServiceError::InternalError(e.to_string()))?,
            ),
            None => None,
        };

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(request.user_id),
            store_id: Set(request.store_id),
            address_id: Set(request.address_id),
            total: Set(breakdown.total),
            status: Set(OrderStatus::Placed),
            payment_method: Set(request.payment_method),
            is_paid: Set(false),
            coupon: Set(coupon_json),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };
        let order = order.insert(txn).await?;

        for item in &request.items {
            let order_item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                customizations: Set(item.customizations.clone()),
                created_at: Set(now),
            };
            order_item.insert(txn).await?;
        }

        if let Some(snap) = &snapshot {
            self.coupons
                .record_redemption(txn, request.user_id, &snap.code, order_id)
                .await?;
        }

        if let Some(key) = &request.idempotency_key {
            let attempt = checkout_attempt::ActiveModel {
                idempotency_key: Set(key.clone()),
                user_id: Set(request.user_id),
                order_id: Set(order_id),
                created_at: Set(now),
            };
            attempt.insert(txn).await.map_err(map_attempt_conflict)?;
        }

        Ok(order)
    }

    /// Post-abort resolution: a duplicate idempotency key means another
    /// submission already committed this order, so the retry gets the
    /// original result rather than an error.
    async fn resolve_abort(
        &self,
        err: ServiceError,
        request: &CheckoutRequest,
    ) -> Result<order::Model, ServiceError> {
        if matches!(err, ServiceError::ConcurrentModification(_)) {
            if let Some(key) = &request.idempotency_key {
                if let Some(existing) = self.find_committed_attempt(key, request.user_id).await? {
                    return Ok(existing);
                }
            }
        }
        Err(err)
    }

    async fn find_committed_attempt(
        &self,
        key: &str,
        user_id: Uuid,
    ) -> Result<Option<order::Model>, ServiceError> {
        let attempt = CheckoutAttemptEntity::find_by_id(key.to_string())
            .one(&*self.db)
            .await?;

        let Some(attempt) = attempt else {
            return Ok(None);
        };
        if attempt.user_id != user_id {
            return Err(ServiceError::InvalidTarget(
                "idempotency key belongs to a different user".into(),
            ));
        }

        let order = OrderEntity::find_by_id(attempt.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "checkout attempt {} references missing order {}",
                    attempt.idempotency_key, attempt.order_id
                ))
            })?;
        Ok(Some(order))
    }

    /// Loads an order together with its items.
    pub async fn get_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok((order, items))
    }

    /// The coupon terms an order was priced under, decoded from its
    /// embedded snapshot.
    pub fn coupon_snapshot(order: &order::Model) -> Option<CouponSnapshot> {
        order
            .coupon
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// A conflicting idempotency-key insert means a concurrent submission of
/// the same logical request won the race; surfaced as a transient conflict
/// so the orchestrator can resolve it to the committed order.
fn map_attempt_conflict(err: DbErr) -> ServiceError {
    if is_unique_violation(&err) {
        ServiceError::ConcurrentModification(Uuid::nil())
    } else {
        ServiceError::DatabaseError(err)
    }
}
