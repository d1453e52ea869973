use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Availability answer for a product. The model is binary: there is no
/// quantity column, so "can N units be sold" collapses to "is the flag up"
/// and enforcement happens at the admin-toggle level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub in_stock: bool,
}

/// Interface point for an external inventory collaborator that knows when a
/// product's physical stock has run dry. This core never counts units
/// itself.
#[async_trait]
pub trait DepletionProbe: Send + Sync {
    async fn is_depleted(&self, product_id: Uuid) -> anyhow::Result<bool>;
}

/// Default probe: nothing ever depletes. Deployments wire a real one in.
#[derive(Debug, Default, Clone)]
pub struct NeverDepleted;

#[async_trait]
impl DepletionProbe for NeverDepleted {
    async fn is_depleted(&self, _product_id: Uuid) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Tracks per-product availability and reflects sale outcomes durably.
#[derive(Clone)]
pub struct StockLedger {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    probe: Arc<dyn DepletionProbe>,
}

impl StockLedger {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            db,
            event_sender,
            probe: Arc::new(NeverDepleted),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn DepletionProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Answers "can this product be sold right now".
    #[instrument(skip(self))]
    pub async fn check_availability(&self, product_id: Uuid) -> Result<Availability, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        Ok(Availability {
            in_stock: product.in_stock,
        })
    }

    /// Admin-level availability toggle.
    #[instrument(skip(self))]
    pub async fn set_stock_flag(
        &self,
        product_id: Uuid,
        in_stock: bool,
    ) -> Result<product::Model, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if product.in_stock == in_stock {
            return Ok(product);
        }

        let mut active: product::ActiveModel = product.into();
        active.in_stock = Set(in_stock);
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .emit(Event::ProductStockChanged {
                product_id,
                in_stock,
            })
            .await;

        info!(%product_id, in_stock, "product stock flag updated");
        Ok(updated)
    }

    /// Asks the external inventory collaborator whether the product has run
    /// dry, and lowers the flag if so. Returns whether the flag was lowered.
    #[instrument(skip(self))]
    pub async fn mark_out_of_stock_if_depleted(
        &self,
        product_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let depleted = self
            .probe
            .is_depleted(product_id)
            .await
            .map_err(ServiceError::Other)?;

        if depleted {
            self.set_stock_flag(product_id, false).await?;
        }
        Ok(depleted)
    }
}

/// Transaction-scoped sellability check used inside checkout, so the stock
/// read and the order write observe one consistent snapshot.
///
/// Fails the whole checkout with `ProductUnavailable` when the flag is
/// down; no partial order is ever created around an unavailable item.
pub async fn ensure_sellable<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    let product = ProductEntity::find()
        .filter(product::Column::Id.eq(product_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

    if !product.in_stock {
        return Err(ServiceError::ProductUnavailable(product_id));
    }

    Ok(product)
}
