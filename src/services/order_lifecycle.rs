use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity, OrderStatus, PaymentMethod},
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::NotificationSender,
};

/// Governs post-creation order state: the forward-only fulfillment chain
/// and the once-only paid flag.
#[derive(Clone)]
pub struct OrderLifecycleService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    notifier: Arc<dyn NotificationSender>,
}

impl OrderLifecycleService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifier,
        }
    }

    /// Advances an order to `to`, which must be the immediate successor of
    /// its current status: placed -> processing -> shipped -> delivered.
    /// Skipping ahead, stepping back and re-entering the current status all
    /// fail with `IllegalTransition`.
    ///
    /// The UPDATE is conditioned on the status we read, so of two racing
    /// transitions exactly one wins; the loser gets
    /// `ConcurrentModification` and can re-read.
    #[instrument(skip(self), fields(order_id = %order_id, to = to.as_str()))]
    pub async fn advance_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let current = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let from = current.status;
        if from.successor() != Some(to) {
            return Err(ServiceError::IllegalTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        // Delivery settles cash-on-delivery orders.
        let settles_cod =
            to == OrderStatus::Delivered && current.payment_method == PaymentMethod::Cod;

        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(from));
        if settles_cod {
            update = update.col_expr(order::Column::IsPaid, Expr::value(true));
        }

        let result = update.exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        let updated = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        txn.commit().await?;

        self.event_sender
            .emit(Event::OrderStatusChanged {
                order_id,
                old_status: from,
                new_status: to,
            })
            .await;
        if settles_cod {
            self.event_sender
                .emit(Event::PaymentConfirmed { order_id })
                .await;
        }
        if let Err(err) = self.notifier.order_status_changed(order_id, to).await {
            warn!(%order_id, "status notification failed: {}", err);
        }

        info!(%order_id, from = from.as_str(), to = to.as_str(), "order status advanced");
        Ok(updated)
    }

    /// Marks an online order paid, on word from the payment collaborator.
    ///
    /// Payment webhooks redeliver, so confirming an already-paid order is a
    /// no-op success rather than an error.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn confirm_payment(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_method == PaymentMethod::Cod {
            return Err(ServiceError::ValidationError(
                "cash-on-delivery orders are settled on delivery confirmation".into(),
            ));
        }

        if order.is_paid {
            return Ok(order);
        }

        let result = OrderEntity::update_many()
            .col_expr(order::Column::IsPaid, Expr::value(true))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::IsPaid.eq(false))
            .exec(&*self.db)
            .await?;

        let updated = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        // rows_affected == 0 means a concurrent confirmation won; both
        // callers observe the same paid order.
        if result.rows_affected > 0 {
            self.event_sender
                .emit(Event::PaymentConfirmed { order_id })
                .await;
            info!(%order_id, "payment confirmed");
        }

        Ok(updated)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}
