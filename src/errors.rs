use sea_orm::error::{DbErr, SqlErr};
use serde::Serialize;
use uuid::Uuid;

/// Unified error type for all service operations.
///
/// Business-rule rejections carry enough context for the caller to render a
/// precise message (which coupon rule failed, how many OTP attempts remain)
/// without exposing storage internals.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The checkout target (store, address, or product/store pairing) does
    /// not belong to this request.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Product {0} is out of stock")]
    ProductUnavailable(Uuid),

    #[error("Coupon '{0}' not found")]
    CouponNotFound(String),

    #[error("Coupon '{0}' has expired")]
    CouponExpired(String),

    #[error("Coupon '{code}' is not eligible: {rule}")]
    CouponNotEligible { code: String, rule: String },

    #[error("Coupon '{0}' was already used by this user")]
    CouponAlreadyUsed(String),

    #[error("Illegal order status transition from '{from}' to '{to}'")]
    IllegalTransition { from: String, to: String },

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(Uuid),

    #[error("A rating for this order item already exists")]
    DuplicateRating,

    #[error("Order {0} has not been delivered")]
    OrderNotDelivered(Uuid),

    #[error("Product {0} is not part of this order")]
    ProductNotInOrder(Uuid),

    #[error("No active verification code for this email and purpose")]
    OtpNotFound,

    #[error("Verification code has expired")]
    OtpExpired,

    #[error("Verification attempts exhausted")]
    OtpExhausted,

    #[error("Incorrect verification code ({remaining} attempts remaining)")]
    OtpIncorrect { remaining: i32 },

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

/// Coarse classification used by callers to decide retry and reporting
/// behavior. Only `Transient` errors are safe to retry with identical input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    /// Bad input shape or unknown ids; rejected before any write.
    Validation,
    /// A domain rule rejected the operation; retrying reproduces the result.
    BusinessRule,
    /// Infrastructure hiccup; the operation left no partial writes behind.
    Transient,
    Internal,
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) | Self::ValidationError(_) | Self::InvalidTarget(_) => {
                ErrorCategory::Validation
            }
            Self::ProductUnavailable(_)
            | Self::CouponNotFound(_)
            | Self::CouponExpired(_)
            | Self::CouponNotEligible { .. }
            | Self::CouponAlreadyUsed(_)
            | Self::IllegalTransition { .. }
            | Self::DuplicateRating
            | Self::OrderNotDelivered(_)
            | Self::ProductNotInOrder(_)
            | Self::OtpNotFound
            | Self::OtpExpired
            | Self::OtpExhausted
            | Self::OtpIncorrect { .. } => ErrorCategory::BusinessRule,
            Self::CommitFailed(_) | Self::ConcurrentModification(_) => ErrorCategory::Transient,
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Message suitable for end users. Internal errors are flattened to a
    /// generic string so storage details never leak.
    pub fn response_message(&self) -> String {
        match self.category() {
            ErrorCategory::Internal => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// True when the underlying driver reported a uniqueness-constraint
/// violation. Services translate these into the specific domain error
/// (`DuplicateRating`, `CouponAlreadyUsed`, ...) instead of surfacing the
/// raw storage failure.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
