use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        product::Entity as ProductEntity,
        wishlist_item::{self, Entity as WishlistItemEntity},
    },
    errors::{is_unique_violation, ServiceError},
};

/// Idempotent per-user wishlist membership.
#[derive(Clone)]
pub struct WishlistService {
    db: Arc<DatabaseConnection>,
}

impl WishlistService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Adds a product to the user's wishlist. Re-adding an existing entry
    /// returns the original row: the composite key makes the second insert
    /// collide, and that collision is the success path here.
    #[instrument(skip(self))]
    pub async fn add(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<wishlist_item::Model, ServiceError> {
        ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let model = wishlist_item::ActiveModel {
            user_id: Set(user_id),
            product_id: Set(product_id),
            added_at: Set(Utc::now()),
        };

        match model.insert(&*self.db).await {
            Ok(created) => Ok(created),
            Err(err) if is_unique_violation(&err) => WishlistItemEntity::find_by_id((user_id, product_id))
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::InternalError("wishlist entry vanished during insert".into())
                }),
            Err(err) => Err(ServiceError::DatabaseError(err)),
        }
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        WishlistItemEntity::delete_by_id((user_id, product_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<wishlist_item::Model>, ServiceError> {
        let items = WishlistItemEntity::find()
            .filter(wishlist_item::Column::UserId.eq(user_id))
            .order_by_desc(wishlist_item::Column::AddedAt)
            .all(&*self.db)
            .await?;
        Ok(items)
    }
}
