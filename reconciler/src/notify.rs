//! Step 5 of the per-kind poller recipe (`SPEC_FULL.md` §4.5): the
//! exactly-once-ish ARM callback. At-least-once in the general case — see
//! "Notification exactly-once" in §9 — the URI-clear patch is what makes it
//! effectively once on the happy path.

use reconciler_types::{OperationDocument, ProvisioningState};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct OperationStatusPayload<'a> {
    id: &'a str,
    status: String,
    error: Option<&'a reconciler_types::OperationError>,
}

/// Fires the notification for `op` if and only if it is terminal and still
/// carries a `notification_uri`. Returns `Ok(true)` if a POST was sent and
/// succeeded (caller must still clear the URI in the store — this function
/// has no store access by design, keeping it a pure HTTP boundary).
pub async fn notify_if_terminal(
    client: &reqwest::Client,
    op: &OperationDocument,
) -> Result<bool, crate::error::Error> {
    if !op.status.is_terminal() {
        return Ok(false);
    }
    let Some(uri) = op.notification_uri.as_deref() else {
        return Ok(false);
    };

    let payload = OperationStatusPayload {
        id: &op.external_resource_id,
        status: op.status.to_string(),
        error: op.error.as_ref(),
    };

    let resp = client
        .post(uri)
        .header("Content-Type", "application/json")
        .json(&payload)
        .send()
        .await?;

    if resp.status().as_u16() >= 400 {
        tracing::warn!(
            operation_id = %op.operation_id,
            subscription_id = %op.subscription_id,
            status = resp.status().as_u16(),
            "terminal notification POST rejected; will retry next pass"
        );
        return Ok(false);
    }

    debug_assert!(matches!(
        op.status,
        ProvisioningState::Succeeded | ProvisioningState::Failed | ProvisioningState::Canceled
    ));
    Ok(true)
}
