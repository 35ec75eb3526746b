//! Node-pool poller. Mapping is analogous to the cluster poller, but the
//! downstream service offers no provision-error code, so every error state
//! maps to a generic internal-server-error body (§4.5).

use super::{finish_poll, handle_delete_not_found};
use crate::downstream::{DownstreamClient, DownstreamError, NodePoolStatus};
use crate::error::Error;
use crate::store::StateStore;
use reconciler_types::{
    NodePoolState, OperationDocument, OperationError, ProvisioningState, RequestKind, ResourceDocument,
};

pub fn map_node_pool_state(
    downstream_state: NodePoolState,
    current: ProvisioningState,
    request: RequestKind,
) -> Result<(ProvisioningState, Option<OperationError>), Error> {
    use NodePoolState::*;
    match downstream_state {
        Error => Ok((
            ProvisioningState::Failed,
            Some(OperationError::internal("node pool provisioning failed")),
        )),
        Installing => Ok((ProvisioningState::Provisioning, None)),
        Ready => {
            if request == RequestKind::Delete {
                Ok((current, None))
            } else {
                Ok((ProvisioningState::Succeeded, None))
            }
        }
        Uninstalling => Ok((ProvisioningState::Deleting, None)),
        Pending | Validating => {
            if current == ProvisioningState::Accepted {
                Ok((current, None))
            } else {
                Err(Error::UnmappedState {
                    resource_id: String::new(),
                    downstream_state: format!("{downstream_state:?}"),
                    current_state: current,
                    request_kind: request,
                })
            }
        }
    }
}

pub async fn poll(
    store: &dyn StateStore,
    downstream: &dyn DownstreamClient,
    http: &reqwest::Client,
    resource: &ResourceDocument,
    op: &OperationDocument,
) -> Result<(), Error> {
    let Some(internal_id) = resource.internal_id.as_deref() else {
        return Ok(());
    };

    let status: NodePoolStatus = match downstream.get_node_pool_status(internal_id).await {
        Ok(status) => status,
        Err(DownstreamError::NotFound) => {
            if op.request_kind == RequestKind::Delete {
                return handle_delete_not_found(store, http, resource, op).await;
            }
            tracing::warn!(
                operation_id = %op.operation_id,
                subscription_id = %op.subscription_id,
                "cluster service returned 404 for a non-delete node-pool operation; leaving operation active"
            );
            return Ok(());
        }
        Err(DownstreamError::Transport(e)) => return Err(Error::Downstream(e)),
    };

    let (new_status, error) = map_node_pool_state(status.state, op.status, op.request_kind)?;

    if new_status == op.status && error.is_none() {
        return Ok(());
    }

    finish_poll(store, http, &resource.resource_id, op, new_status, error).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_maps_to_failed_with_generic_body() {
        let (status, error) =
            map_node_pool_state(NodePoolState::Error, ProvisioningState::Provisioning, RequestKind::Create).unwrap();
        assert_eq!(status, ProvisioningState::Failed);
        assert_eq!(error.unwrap().code, "InternalServerError");
    }

    #[test]
    fn ready_during_update_succeeds() {
        let (status, error) =
            map_node_pool_state(NodePoolState::Ready, ProvisioningState::Updating, RequestKind::Update).unwrap();
        assert_eq!(status, ProvisioningState::Succeeded);
        assert!(error.is_none());
    }
}
