use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::OtpConfig,
    entities::otp_code::{self, Entity as OtpCodeEntity, OtpPurpose, OtpStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::NotificationSender,
};

/// A freshly issued code. The plaintext exists only in this value and in
/// the notification dispatch; storage holds the hash.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub model: otp_code::Model,
    pub code: String,
}

/// Issues and verifies short-lived one-time codes per (email, purpose).
///
/// Per-code state machine: Active -> Used | Superseded, with expiry and
/// exhaustion derived from `expires_at` and `attempts`. All four non-active
/// outcomes are terminal; recovering from any of them requires issuing a
/// fresh code.
#[derive(Clone)]
pub struct OtpService {
    db: Arc<DatabaseConnection>,
    config: OtpConfig,
    event_sender: EventSender,
    notifier: Arc<dyn NotificationSender>,
}

impl OtpService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: OtpConfig,
        event_sender: EventSender,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            db,
            config,
            event_sender,
            notifier,
        }
    }

    /// Issues a new code, superseding (not deleting) any prior active code
    /// for the same (email, purpose) in the same transaction, so at most
    /// one active code exists per pair at any time.
    ///
    /// `user_id` is optional: a signup code precedes the account it will
    /// create.
    #[instrument(skip(self), fields(email = %email, purpose = ?purpose))]
    pub async fn issue(
        &self,
        email: &str,
        purpose: OtpPurpose,
        user_id: Option<Uuid>,
    ) -> Result<IssuedOtp, ServiceError> {
        let email = normalize_email(email)?;
        let code = generate_code(self.config.code_length as usize);
        let now = Utc::now();
        let expires_at = now
            + Duration::seconds(self.config.ttl_secs.min(i64::MAX as u64) as i64);

        let txn = self.db.begin().await?;

        OtpCodeEntity::update_many()
            .col_expr(
                otp_code::Column::Status,
                Expr::value(OtpStatus::Superseded),
            )
            .filter(otp_code::Column::Email.eq(email.clone()))
            .filter(otp_code::Column::Purpose.eq(purpose))
            .filter(otp_code::Column::Status.eq(OtpStatus::Active))
            .exec(&txn)
            .await?;

        let model = otp_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.clone()),
            purpose: Set(purpose),
            code_hash: Set(hash_code(&code)),
            status: Set(OtpStatus::Active),
            attempts: Set(0),
            expires_at: Set(expires_at),
            user_id: Set(user_id),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        self.event_sender
            .emit(Event::OtpIssued {
                email: email.clone(),
                purpose,
                expires_at,
            })
            .await;
        // Dispatch is fire-and-forget: delivery trouble never unwinds the
        // committed issue.
        if let Err(err) = self.notifier.send_otp(&email, purpose, &code).await {
            warn!(%email, "verification code dispatch failed: {}", err);
        }

        info!(%email, ?purpose, "verification code issued");
        Ok(IssuedOtp { model, code })
    }

    /// Verifies a submitted code against the active code for the pair.
    ///
    /// Failure order: no active code, expired, exhausted (checked before
    /// the value, so an exhausted code leaks nothing about correctness),
    /// then mismatch. Both the attempt increment and the consuming
    /// transition are single conditional UPDATEs whose row count decides
    /// the outcome, so two racing verifiers can neither under-count
    /// attempts nor both succeed.
    #[instrument(skip(self, submitted), fields(email = %email, purpose = ?purpose))]
    pub async fn verify(
        &self,
        email: &str,
        purpose: OtpPurpose,
        submitted: &str,
    ) -> Result<otp_code::Model, ServiceError> {
        let email = normalize_email(email)?;
        let max_attempts = self.config.max_attempts;

        let code = OtpCodeEntity::find()
            .filter(otp_code::Column::Email.eq(email.clone()))
            .filter(otp_code::Column::Purpose.eq(purpose))
            .filter(otp_code::Column::Status.eq(OtpStatus::Active))
            .order_by_desc(otp_code::Column::CreatedAt)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::OtpNotFound)?;

        if Utc::now() > code.expires_at {
            return Err(ServiceError::OtpExpired);
        }
        if code.attempts >= max_attempts {
            return Err(ServiceError::OtpExhausted);
        }

        if hash_code(submitted) != code.code_hash {
            let result = OtpCodeEntity::update_many()
                .col_expr(
                    otp_code::Column::Attempts,
                    Expr::col(otp_code::Column::Attempts).add(1),
                )
                .filter(otp_code::Column::Id.eq(code.id))
                .filter(otp_code::Column::Status.eq(OtpStatus::Active))
                .filter(otp_code::Column::Attempts.lt(max_attempts))
                .exec(&*self.db)
                .await?;

            if result.rows_affected == 0 {
                // A concurrent verifier consumed or exhausted the code
                // between our read and this update.
                return self.refused_outcome(code.id, max_attempts).await;
            }

            let refreshed = self.reload(code.id).await?;
            if refreshed.attempts >= max_attempts {
                return Err(ServiceError::OtpExhausted);
            }
            return Err(ServiceError::OtpIncorrect {
                remaining: max_attempts - refreshed.attempts,
            });
        }

        let result = OtpCodeEntity::update_many()
            .col_expr(otp_code::Column::Status, Expr::value(OtpStatus::Used))
            .filter(otp_code::Column::Id.eq(code.id))
            .filter(otp_code::Column::Status.eq(OtpStatus::Active))
            .filter(otp_code::Column::Attempts.lt(max_attempts))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // At-most-once consumption: someone else used, superseded or
            // exhausted this code first.
            return self.refused_outcome(code.id, max_attempts).await;
        }

        self.event_sender
            .emit(Event::OtpVerified {
                email: email.clone(),
                purpose,
            })
            .await;

        info!(%email, ?purpose, "verification code accepted");
        self.reload(code.id).await
    }

    /// Names the terminal condition that caused a conditional update to
    /// match zero rows.
    async fn refused_outcome(
        &self,
        id: Uuid,
        max_attempts: i32,
    ) -> Result<otp_code::Model, ServiceError> {
        let current = self.reload(id).await?;
        if current.status != OtpStatus::Active {
            return Err(ServiceError::OtpNotFound);
        }
        if current.attempts >= max_attempts {
            return Err(ServiceError::OtpExhausted);
        }
        Err(ServiceError::ConcurrentModification(id))
    }

    async fn reload(&self, id: Uuid) -> Result<otp_code::Model, ServiceError> {
        OtpCodeEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::OtpNotFound)
    }
}

fn normalize_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ServiceError::ValidationError(
            "a valid email address is required".into(),
        ));
    }
    Ok(email)
}

/// Fixed-length numeric code with leading zeros preserved.
fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_have_the_requested_length() {
        for _ in 0..32 {
            let code = generate_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn hashing_is_stable_and_plaintext_free() {
        let hash = hash_code("482917");
        assert_eq!(hash, hash_code("482917"));
        assert_ne!(hash, hash_code("482918"));
        assert!(!hash.contains("482917"));
    }

    #[test]
    fn email_normalization_trims_and_lowercases() {
        assert_eq!(normalize_email("  A@X.COM ").unwrap(), "a@x.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("   ").is_err());
    }
}
