//! Component E: per-kind pollers. Each follows the same five-step recipe
//! (`SPEC_FULL.md` §4.5); this module holds the dispatch table and the
//! shared steps 3-5 (patch operation, patch resource, notify). Steps 1-2
//! (fetch + map) live in the per-kind submodules, since that's where the
//! mapping tables differ.

pub mod cluster;
pub mod credential;
pub mod inflight;
pub mod nodepool;

use crate::downstream::DownstreamClient;
use crate::error::Error;
use crate::store::StateStore;
use crate::util::colors::{FG1, FG2};
use chrono::Utc;
use owo_colors::OwoColorize;
use reconciler_types::{
    OperationDocument, OperationError, ProvisioningState, RequestKind, ResourceDocument, ResourceKind,
};
use std::sync::Arc;

/// `(kind(internalID), requestKind) -> poller` (§4.4 step 3, §9 "Dynamic
/// dispatch on resource kind").
pub async fn dispatch(
    store: &dyn StateStore,
    downstream: &dyn DownstreamClient,
    http: &reqwest::Client,
    resource: &ResourceDocument,
    op: &OperationDocument,
) -> Result<(), Error> {
    match (resource.kind, op.request_kind) {
        (ResourceKind::Cluster, _) => cluster::poll(store, downstream, http, resource, op).await,
        (ResourceKind::NodePool, _) => nodepool::poll(store, downstream, http, resource, op).await,
        (ResourceKind::Credential, RequestKind::RevokeCredentials) => {
            credential::poll_revoke(store, downstream, http, resource, op).await
        }
        (ResourceKind::Credential, _) => {
            credential::poll_issue(store, downstream, http, resource, op).await
        }
    }
}

/// Steps 3-5, shared by every per-kind poller: conditionally patch the
/// operation, conditionally patch the resource, then fire the terminal
/// notification.
pub(crate) async fn finish_poll(
    store: &dyn StateStore,
    http: &reqwest::Client,
    resource_id: &str,
    op: &OperationDocument,
    new_status: ProvisioningState,
    error: Option<OperationError>,
) -> Result<(), Error> {
    let now = Utc::now();

    let patched = match store
        .patch_operation_status(op.operation_id, op.status, new_status, error, now)
        .await
    {
        Ok(doc) => doc,
        // Policy 2 (§7): a concurrent terminal write already landed. Benign.
        Err(e) if e.is_benign_precondition_failure() => {
            tracing::debug!(operation_id = %op.operation_id, "operation patch precondition failed; treating as benign no-op");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    tracing::info!(
        "{}{}{}",
        resource_id.color(FG2),
        " -> ".color(FG1),
        format!("{:?}", new_status).color(FG2),
    );

    // Step 4: conditional on activeOperationID == thisOperationID. A
    // mismatch here (another operation took over, or the document is gone)
    // is surfaced as an error for the caller's retry policy, unlike step 3.
    store
        .patch_resource_state(
            resource_id,
            op.operation_id,
            new_status,
            new_status.is_terminal(),
            now,
        )
        .await?;

    if patched.status.is_terminal() {
        notify_and_clear(store, http, &patched).await?;
    }

    Ok(())
}

/// Step 5: POST the terminal status, then clear `notificationURI` on 2xx
/// so re-notification becomes impossible (I3).
pub(crate) async fn notify_and_clear(
    store: &dyn StateStore,
    http: &reqwest::Client,
    op: &OperationDocument,
) -> Result<(), Error> {
    let Some(uri) = op.notification_uri.clone() else {
        return Ok(());
    };
    if crate::notify::notify_if_terminal(http, op).await? {
        match store.clear_notification_uri(op.operation_id, &uri).await {
            Ok(()) => {}
            Err(e) if e.is_benign_precondition_failure() => {
                // Someone already cleared it (a duplicate sync on the same
                // terminal state) — benign.
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Step 1's Delete/404 special case, shared by cluster and node-pool
/// pollers: a 404 while deleting is the success signal. Marks the resource
/// deleted, best-effort stamps the billing record, then drives the
/// operation to Succeeded.
pub(crate) async fn handle_delete_not_found(
    store: &dyn StateStore,
    http: &reqwest::Client,
    resource: &ResourceDocument,
    op: &OperationDocument,
) -> Result<(), Error> {
    let now = Utc::now();
    store.mark_resource_deleted(&resource.resource_id, now).await?;
    // Best-effort: a missing billing record is not a failure (B3).
    store
        .patch_billing_deletion_time(&resource.resource_id, now)
        .await?;
    finish_poll(
        store,
        http,
        &resource.resource_id,
        op,
        ProvisioningState::Succeeded,
        None,
    )
    .await
}

pub(crate) fn internal_error_for(message: impl Into<String>) -> OperationError {
    OperationError::internal(message)
}

pub(crate) type ArcStore = Arc<dyn StateStore>;
pub(crate) type ArcDownstream = Arc<dyn DownstreamClient>;

/// Test-only ARM callback double. No mocking crate is in the dependency
/// tree, and `notify::notify_if_terminal` drives a real `reqwest::Client`
/// rather than a trait, so the scenario tests need an actual listening
/// socket rather than something swappable in-process.
#[cfg(test)]
pub(crate) mod test_support {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Binds an ephemeral port, accepts exactly one connection, replies
    /// `200 OK`, and hands back the hit count (0 or 1) once the connection
    /// closes. The listener is dropped after that single accept, so a
    /// second POST attempt would fail to connect rather than silently queue.
    pub async fn spawn_single_shot_callback_server() -> (String, tokio::task::JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let url = format!("http://{addr}/callback");

        let handle = tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return 0;
            };
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
            1
        });

        (url, handle)
    }
}
