use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Write-once-create, patch-once-on-delete. Not a source of truth for
/// reconciliation — a missing billing record on delete is logged, not
/// treated as a failure (§4.5 Step 1, B3).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BillingRecord {
    pub resource_id: String,
    pub subscription_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub deletion_time: Option<DateTime<Utc>>,
}
