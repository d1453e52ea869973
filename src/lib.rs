//! Bazaar Core
//!
//! Order checkout and fulfillment engine for a multi-vendor commerce
//! platform: checkout orchestration, coupon redemption, stock consistency,
//! order lifecycle, OTP verification and the rating gate. HTTP transport,
//! sessions, payment webhooks and delivery channels are external
//! collaborators behind the seams in `notifications` and the service APIs.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod notifications;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::notifications::NotificationSender;
use crate::services::{
    catalog::CatalogService, checkout::CheckoutService, coupons::CouponService,
    messages::MessageService, order_lifecycle::OrderLifecycleService, otp::OtpService,
    ratings::RatingGate, stock::StockLedger, wishlist::WishlistService,
};

/// Fully wired service graph over one connection pool and one event
/// channel. Embedders construct this once at startup and hand the
/// individual services to their transport layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub event_sender: EventSender,
    pub stock: StockLedger,
    pub coupons: Arc<CouponService>,
    pub checkout: CheckoutService,
    pub order_lifecycle: OrderLifecycleService,
    pub otp: OtpService,
    pub ratings: RatingGate,
    pub wishlist: WishlistService,
    pub catalog: CatalogService,
    pub messages: MessageService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        event_sender: EventSender,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        let coupons = Arc::new(CouponService::new(db.clone()));

        Self {
            stock: StockLedger::new(db.clone(), event_sender.clone()),
            checkout: CheckoutService::new(db.clone(), event_sender.clone(), coupons.clone()),
            order_lifecycle: OrderLifecycleService::new(
                db.clone(),
                event_sender.clone(),
                notifier.clone(),
            ),
            otp: OtpService::new(
                db.clone(),
                config.otp.clone(),
                event_sender.clone(),
                notifier,
            ),
            ratings: RatingGate::new(db.clone(), event_sender.clone()),
            wishlist: WishlistService::new(db.clone()),
            catalog: CatalogService::new(db.clone()),
            messages: MessageService::new(db.clone(), event_sender.clone()),
            coupons,
            db,
            config,
            event_sender,
        }
    }
}
