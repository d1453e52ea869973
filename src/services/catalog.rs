use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        product::{self, Entity as ProductEntity},
        store::{self, Entity as StoreEntity},
    },
    errors::{is_unique_violation, ServiceError},
};

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub store_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub mrp: Decimal,
    pub in_stock: bool,
}

/// Store-owner mutations of the catalog: stores and their products.
/// Products referenced by historical order items are never hard-deleted;
/// delisting is the stock flag's job.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_store(
        &self,
        owner_user_id: Uuid,
        name: &str,
    ) -> Result<store::Model, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "store name must not be empty".into(),
            ));
        }

        let now = Utc::now();
        let model = store::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_user_id: Set(owner_user_id),
            name: Set(name.trim().to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let created = model.insert(&*self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::ValidationError("user already owns a store".into())
            } else {
                ServiceError::DatabaseError(err)
            }
        })?;

        info!(store_id = %created.id, "store created");
        Ok(created)
    }

    /// Toggles whether new orders may reference the store. Existing orders
    /// are untouched.
    #[instrument(skip(self))]
    pub async fn set_store_active(
        &self,
        owner_user_id: Uuid,
        store_id: Uuid,
        is_active: bool,
    ) -> Result<store::Model, ServiceError> {
        let owned = self.owned_store(owner_user_id, store_id).await?;

        if owned.is_active == is_active {
            return Ok(owned);
        }

        let mut active: store::ActiveModel = owned.into();
        active.is_active = Set(is_active);
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        owner_user_id: Uuid,
        input: NewProduct,
    ) -> Result<product::Model, ServiceError> {
        self.owned_store(owner_user_id, input.store_id).await?;
        validate_pricing(input.price, input.mrp)?;
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "product name must not be empty".into(),
            ));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(input.store_id),
            name: Set(input.name.trim().to_string()),
            price: Set(input.price),
            mrp: Set(input.mrp),
            in_stock: Set(input.in_stock),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let created = model.insert(&*self.db).await?;
        info!(product_id = %created.id, "product created");
        Ok(created)
    }

    /// Reprices a product. Historical order items keep the unit price they
    /// were sold at.
    #[instrument(skip(self))]
    pub async fn update_pricing(
        &self,
        owner_user_id: Uuid,
        product_id: Uuid,
        price: Decimal,
        mrp: Decimal,
    ) -> Result<product::Model, ServiceError> {
        validate_pricing(price, mrp)?;

        let existing = ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        self.owned_store(owner_user_id, existing.store_id).await?;

        let mut active: product::ActiveModel = existing.into();
        active.price = Set(price);
        active.mrp = Set(mrp);
        Ok(active.update(&*self.db).await?)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    async fn owned_store(
        &self,
        owner_user_id: Uuid,
        store_id: Uuid,
    ) -> Result<store::Model, ServiceError> {
        let found = StoreEntity::find_by_id(store_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Store {} not found", store_id)))?;

        if found.owner_user_id != owner_user_id {
            return Err(ServiceError::InvalidTarget(format!(
                "store {} does not belong to this user",
                store_id
            )));
        }
        Ok(found)
    }
}

fn validate_pricing(price: Decimal, mrp: Decimal) -> Result<(), ServiceError> {
    if price <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "price must be positive".into(),
        ));
    }
    if mrp < price {
        return Err(ServiceError::ValidationError(
            "listed price must not exceed the MRP".into(),
        ));
    }
    Ok(())
}
