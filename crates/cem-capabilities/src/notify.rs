//! Notification seam (§6). Synchronous by design: both variants are
//! fire-and-forget best-effort sends from the worker's completion path,
//! not part of the job's success/failure decision.

use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DebtUpdateNotice {
    pub message_id: Uuid,
    pub client_name: String,
    pub creditor_name: String,
    pub new_amount: Decimal,
}

pub trait NotificationSink: Send + Sync {
    fn notify_permanent_failure(&self, message_id: Uuid);
    fn notify_debt_update(&self, update: &DebtUpdateNotice);
}
