#![allow(dead_code)]

use std::sync::Arc;

use bazaar_core::config::{AppConfig, OtpConfig};
use bazaar_core::entities::{address, coupon, product, store, user};
use bazaar_core::entities::coupon::DiscountKind;
use bazaar_core::entities::order::PaymentMethod;
use bazaar_core::events::{self, Event};
use bazaar_core::migrator::Migrator;
use bazaar_core::notifications::TracingNotifier;
use bazaar_core::services::checkout::{CheckoutLine, CheckoutRequest};
use bazaar_core::AppState;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use sea_orm_migration::MigratorTrait;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

/// Service-level test harness over an in-memory SQLite database.
///
/// The pool is pinned to a single connection so the in-memory database is
/// shared and concurrent transactions serialize at the pool instead of
/// landing on separate blank databases.
pub struct TestApp {
    pub state: AppState,
    pub events: Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_otp_config(OtpConfig::default()).await
    }

    pub async fn with_otp_config(otp: OtpConfig) -> Self {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.expect("sqlite connection");

        Migrator::up(&db, None).await.expect("migrations");

        let (event_sender, events) = events::channel(256);
        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            environment: "test".into(),
            log_level: "debug".into(),
            log_json: false,
            db_max_connections: 1,
            db_min_connections: 1,
            otp,
        };

        let state = AppState::new(Arc::new(db), config, event_sender, Arc::new(TracingNotifier));
        Self { state, events }
    }

    pub async fn seed_user(&self, email: &str, is_member: bool) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(email.split('@').next().unwrap_or("user").to_string()),
            email: Set(email.to_string()),
            is_member: Set(is_member),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user")
    }

    pub async fn seed_store(&self, owner_user_id: Uuid) -> store::Model {
        self.seed_store_with(owner_user_id, true).await
    }

    pub async fn seed_store_with(&self, owner_user_id: Uuid, is_active: bool) -> store::Model {
        store::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_user_id: Set(owner_user_id),
            name: Set("Test Store".into()),
            is_active: Set(is_active),
            created_at: Set(Utc::now()),
            updated_at: Set(Some(Utc::now())),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed store")
    }

    pub async fn seed_address(&self, user_id: Uuid) -> address::Model {
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            recipient: Set("Test Recipient".into()),
            line1: Set("1 Market Street".into()),
            line2: Set(None),
            city: Set("Springfield".into()),
            region: Set("SP".into()),
            postal_code: Set("12345".into()),
            country: Set("US".into()),
            phone: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address")
    }

    pub async fn seed_product(
        &self,
        store_id: Uuid,
        price: Decimal,
        in_stock: bool,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(store_id),
            name: Set("Test Product".into()),
            price: Set(price),
            mrp: Set(price),
            in_stock: Set(in_stock),
            created_at: Set(Utc::now()),
            updated_at: Set(Some(Utc::now())),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_coupon(&self, seed: CouponSeed) -> coupon::Model {
        coupon::ActiveModel {
            code: Set(seed.code),
            discount_kind: Set(seed.discount_kind),
            discount_value: Set(seed.discount_value),
            for_new_user: Set(seed.for_new_user),
            for_member: Set(seed.for_member),
            is_public: Set(seed.is_public),
            expires_at: Set(seed.expires_at),
            created_at: Set(Utc::now()),
            updated_at: Set(Some(Utc::now())),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed coupon")
    }

    /// A buyer with a store, an address and one in-stock product: the
    /// minimal fixture most checkout tests start from.
    pub async fn seed_checkout_fixture(&self, price: Decimal) -> CheckoutFixture {
        let buyer = self.seed_user("buyer@example.com", false).await;
        let owner = self.seed_user("owner@example.com", false).await;
        let store = self.seed_store(owner.id).await;
        let address = self.seed_address(buyer.id).await;
        let product = self.seed_product(store.id, price, true).await;
        CheckoutFixture {
            buyer,
            owner,
            store,
            address,
            product,
        }
    }
}

pub struct CheckoutFixture {
    pub buyer: user::Model,
    pub owner: user::Model,
    pub store: store::Model,
    pub address: address::Model,
    pub product: product::Model,
}

impl CheckoutFixture {
    pub fn request(&self, items: Vec<CheckoutLine>) -> CheckoutRequest {
        CheckoutRequest {
            user_id: self.buyer.id,
            store_id: self.store.id,
            address_id: self.address.id,
            items,
            payment_method: PaymentMethod::Online,
            coupon_code: None,
            has_coupon_invitation: false,
            idempotency_key: None,
        }
    }

    pub fn line(&self, quantity: i32) -> CheckoutLine {
        line_for(&self.product, quantity)
    }
}

pub fn line_for(product: &product::Model, quantity: i32) -> CheckoutLine {
    CheckoutLine {
        product_id: product.id,
        quantity,
        unit_price: product.price,
        customizations: None,
    }
}

pub struct CouponSeed {
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: Decimal,
    pub for_new_user: bool,
    pub for_member: bool,
    pub is_public: bool,
    pub expires_at: DateTime<Utc>,
}

impl CouponSeed {
    pub fn percent(code: &str, value: Decimal) -> Self {
        Self {
            code: code.to_string(),
            discount_kind: DiscountKind::Percent,
            discount_value: value,
            for_new_user: false,
            for_member: false,
            is_public: true,
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    pub fn fixed(code: &str, value: Decimal) -> Self {
        Self {
            discount_kind: DiscountKind::Fixed,
            ..Self::percent(code, value)
        }
    }

    pub fn expired(mut self) -> Self {
        self.expires_at = Utc::now() - Duration::minutes(1);
        self
    }

    pub fn new_users_only(mut self) -> Self {
        self.for_new_user = true;
        self
    }

    pub fn members_only(mut self) -> Self {
        self.for_member = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }
}
