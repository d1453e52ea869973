use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::entities::otp_code::OtpPurpose;

/// Outbound notification seam. Implementations deliver through whatever
/// channel the deployment wires up (email, SMS, push); this crate only
/// dispatches. Calls are fire-and-forget from the services' point of view:
/// failures are logged by the caller and never abort the originating
/// operation.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver a freshly issued one-time code. This is the only place the
    /// plaintext code crosses the crate boundary.
    async fn send_otp(&self, email: &str, purpose: OtpPurpose, code: &str) -> anyhow::Result<()>;

    async fn order_status_changed(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> anyhow::Result<()>;
}

/// Default sender: logs the dispatch and does nothing else. The OTP value
/// itself is never written to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSender for TracingNotifier {
    async fn send_otp(&self, email: &str, purpose: OtpPurpose, _code: &str) -> anyhow::Result<()> {
        info!(email, ?purpose, "dispatching verification code");
        Ok(())
    }

    async fn order_status_changed(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> anyhow::Result<()> {
        info!(%order_id, ?new_status, "dispatching order status notification");
        Ok(())
    }
}
