use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        order::{Entity as OrderEntity, OrderStatus},
        order_item::{self, Entity as OrderItemEntity},
        rating::{self, Entity as RatingEntity},
    },
    errors::{is_unique_violation, ServiceError},
    events::{Event, EventSender},
};

const MIN_SCORE: i32 = 1;
const MAX_SCORE: i32 = 5;

/// Enforces the one-rating-per-(user, product, order) rule after delivery.
#[derive(Clone)]
pub struct RatingGate {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl RatingGate {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Accepts a rating once the order is delivered and the product was
    /// part of it. Uniqueness is settled by the composite primary key on
    /// insert, not by a prior existence check, so two racing submissions
    /// resolve to exactly one success and one `DuplicateRating`.
    #[instrument(skip(self, review), fields(user_id = %user_id, product_id = %product_id, order_id = %order_id))]
    pub async fn submit_rating(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        order_id: Uuid,
        score: i32,
        review: Option<String>,
    ) -> Result<rating::Model, ServiceError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(ServiceError::ValidationError(format!(
                "score must be between {} and {}",
                MIN_SCORE, MAX_SCORE
            )));
        }

        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.user_id != user_id {
            return Err(ServiceError::InvalidTarget(format!(
                "order {} does not belong to the rater",
                order_id
            )));
        }
        if order.status != OrderStatus::Delivered {
            return Err(ServiceError::OrderNotDelivered(order_id));
        }

        let purchased = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .filter(order_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;
        if purchased.is_none() {
            return Err(ServiceError::ProductNotInOrder(product_id));
        }

        let model = rating::ActiveModel {
            user_id: Set(user_id),
            product_id: Set(product_id),
            order_id: Set(order_id),
            score: Set(score),
            review: Set(review),
            created_at: Set(Utc::now()),
        };

        let created = model.insert(&*self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::DuplicateRating
            } else {
                ServiceError::DatabaseError(err)
            }
        })?;

        self.event_sender
            .emit(Event::RatingSubmitted {
                user_id,
                product_id,
                order_id,
                score,
            })
            .await;

        info!(%product_id, score, "rating submitted");
        Ok(created)
    }

    pub async fn list_for_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<rating::Model>, ServiceError> {
        let ratings = RatingEntity::find()
            .filter(rating::Column::ProductId.eq(product_id))
            .order_by_desc(rating::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(ratings)
    }
}
