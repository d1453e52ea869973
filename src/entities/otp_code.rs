use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A one-time verification code. Only the SHA-256 hash of the code is
/// stored; the plaintext leaves the service through the notification seam
/// and nowhere else.
///
/// `status` covers the explicitly written states (active, used,
/// superseded); expiry and exhaustion are derived from `expires_at` and
/// `attempts` and are equally terminal.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "otp_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub email: String,
    pub purpose: OtpPurpose,
    pub code_hash: String,
    pub status: OtpStatus,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    /// Weak back-reference: a signup code precedes account creation, and
    /// deleting the eventual user must not require deleting its codes.
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    #[sea_orm(string_value = "signup")]
    Signup,
    #[sea_orm(string_value = "login")]
    Login,
    #[sea_orm(string_value = "reset_password")]
    ResetPassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(12))")]
#[serde(rename_all = "snake_case")]
pub enum OtpStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "used")]
    Used,
    /// Replaced by a newer code for the same (email, purpose).
    #[sea_orm(string_value = "superseded")]
    Superseded,
}
