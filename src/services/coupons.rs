use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        coupon::{self, DiscountKind, Entity as CouponEntity},
        coupon_redemption::{self, Entity as RedemptionEntity},
        order::{self, Entity as OrderEntity},
        user::Entity as UserEntity,
    },
    errors::{is_unique_violation, ServiceError},
};

/// Immutable copy of a coupon's effect, embedded into the order at commit
/// time. Orders never hold a live reference to the coupon row: the coupon
/// may be edited or deleted afterwards without shifting historical pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponSnapshot {
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: Decimal,
}

impl From<&coupon::Model> for CouponSnapshot {
    fn from(model: &coupon::Model) -> Self {
        Self {
            code: model.code.clone(),
            discount_kind: model.discount_kind,
            discount_value: model.discount_value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: Decimal,
    pub for_new_user: bool,
    pub for_member: bool,
    pub is_public: bool,
    pub expires_at: chrono::DateTime<Utc>,
}

/// Decides coupon eligibility and produces the snapshot the checkout embeds.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validates a coupon for a user. Checks run in a fixed order and
    /// short-circuit on the first failure so the caller can report the
    /// exact rule that rejected the code.
    ///
    /// `has_invitation` is the witness from the external invitation
    /// collaborator; it only matters for private coupons.
    ///
    /// Runs against the caller's connection so checkout can evaluate it
    /// inside its transaction. The redemption lookup here is a pre-check;
    /// the composite key on coupon_redemptions remains the final arbiter at
    /// write time.
    #[instrument(skip(self, conn))]
    pub async fn validate<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        user_id: Uuid,
        has_invitation: bool,
    ) -> Result<CouponSnapshot, ServiceError> {
        let coupon = CouponEntity::find_by_id(code.to_string())
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::CouponNotFound(code.to_string()))?;

        if coupon.expires_at <= Utc::now() {
            return Err(ServiceError::CouponExpired(code.to_string()));
        }

        if !coupon.is_public && !has_invitation {
            return Err(ServiceError::CouponNotEligible {
                code: code.to_string(),
                rule: "coupon is private".into(),
            });
        }

        if coupon.for_new_user {
            let prior_orders = OrderEntity::find()
                .filter(order::Column::UserId.eq(user_id))
                .count(conn)
                .await?;
            if prior_orders > 0 {
                return Err(ServiceError::CouponNotEligible {
                    code: code.to_string(),
                    rule: "restricted to first-time buyers".into(),
                });
            }
        }

        if coupon.for_member {
            let buyer = UserEntity::find_by_id(user_id)
                .one(conn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;
            if !buyer.is_member {
                return Err(ServiceError::CouponNotEligible {
                    code: code.to_string(),
                    rule: "restricted to members".into(),
                });
            }
        }

        let already_redeemed = RedemptionEntity::find()
            .filter(coupon_redemption::Column::UserId.eq(user_id))
            .filter(coupon_redemption::Column::Code.eq(code))
            .count(conn)
            .await?;
        if already_redeemed > 0 {
            return Err(ServiceError::CouponAlreadyUsed(code.to_string()));
        }

        Ok(CouponSnapshot::from(&coupon))
    }

    /// Records a redemption inside the checkout transaction. The composite
    /// primary key (user_id, code) rejects the second of two racing
    /// checkouts; the violation is translated here so the raw storage error
    /// never escapes.
    pub async fn record_redemption<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        code: &str,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let redemption = coupon_redemption::ActiveModel {
            user_id: Set(user_id),
            code: Set(code.to_string()),
            order_id: Set(order_id),
            redeemed_at: Set(Utc::now()),
        };

        redemption.insert(conn).await.map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::CouponAlreadyUsed(code.to_string())
            } else {
                ServiceError::DatabaseError(err)
            }
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create_coupon(&self, input: NewCoupon) -> Result<coupon::Model, ServiceError> {
        if input.code.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "coupon code must not be empty".into(),
            ));
        }
        match input.discount_kind {
            DiscountKind::Percent => {
                if input.discount_value <= Decimal::ZERO
                    || input.discount_value > Decimal::from(100)
                {
                    return Err(ServiceError::ValidationError(
                        "percentage discount must be in (0, 100]".into(),
                    ));
                }
            }
            DiscountKind::Fixed => {
                if input.discount_value <= Decimal::ZERO {
                    return Err(ServiceError::ValidationError(
                        "fixed discount must be positive".into(),
                    ));
                }
            }
        }

        let now = Utc::now();
        let active = coupon::ActiveModel {
            code: Set(input.code.trim().to_string()),
            discount_kind: Set(input.discount_kind),
            discount_value: Set(input.discount_value),
            for_new_user: Set(input.for_new_user),
            for_member: Set(input.for_member),
            is_public: Set(input.is_public),
            expires_at: Set(input.expires_at),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let created = active.insert(&*self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::ValidationError(format!(
                    "coupon '{}' already exists",
                    input.code.trim()
                ))
            } else {
                ServiceError::DatabaseError(err)
            }
        })?;

        info!(code = %created.code, "coupon created");
        Ok(created)
    }

    pub async fn get_coupon(&self, code: &str) -> Result<coupon::Model, ServiceError> {
        CouponEntity::find_by_id(code.to_string())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::CouponNotFound(code.to_string()))
    }

    /// Deletes a coupon. Historical orders are unaffected: they carry the
    /// snapshot, and redemption rows hold no foreign key to this table.
    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, code: &str) -> Result<(), ServiceError> {
        let result = CouponEntity::delete_by_id(code.to_string())
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::CouponNotFound(code.to_string()));
        }
        info!(code, "coupon deleted");
        Ok(())
    }
}
