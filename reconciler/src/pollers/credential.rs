//! Break-glass credential pollers: single-object issue, multi-object revoke
//! (§4.5, §9 "Credential + RevokeCredentials → revoke poller (multi-object)").

use super::finish_poll;
use crate::downstream::{BreakGlassCredential, DownstreamClient, DownstreamError};
use crate::error::Error;
use crate::store::StateStore;
use reconciler_types::{CredentialState, OperationDocument, OperationError, ProvisioningState, RequestKind, ResourceDocument};

pub fn map_issue_state(
    downstream_state: CredentialState,
    current: ProvisioningState,
    request: RequestKind,
) -> Result<(ProvisioningState, Option<OperationError>), Error> {
    match downstream_state {
        CredentialState::Created => Ok((ProvisioningState::Provisioning, None)),
        CredentialState::Issued => Ok((ProvisioningState::Succeeded, None)),
        CredentialState::Failed => Ok((
            ProvisioningState::Failed,
            Some(OperationError::internal("Failed to issue cluster credential")),
        )),
        other => Err(Error::UnmappedState {
            resource_id: String::new(),
            downstream_state: format!("{other:?}"),
            current_state: current,
            request_kind: request,
        }),
    }
}

/// The first non-terminal or failed credential decides the outcome,
/// independent of enumeration order: `Failed` dominates, then any credential
/// still awaiting revocation keeps the operation in `Deleting`, and only
/// once every credential reports revoked (or expired — treated as revoked
/// regardless of reported state) does the operation succeed.
pub fn map_revoke_outcome(credentials: &[CredentialState]) -> (ProvisioningState, Option<OperationError>) {
    if credentials.iter().any(|c| *c == CredentialState::Failed) {
        return (
            ProvisioningState::Failed,
            Some(OperationError::internal("Failed to revoke cluster credential")),
        );
    }
    if credentials.iter().all(|c| c.is_revoked()) {
        return (ProvisioningState::Succeeded, None);
    }
    (ProvisioningState::Deleting, None)
}

pub async fn poll_issue(
    store: &dyn StateStore,
    downstream: &dyn DownstreamClient,
    http: &reqwest::Client,
    resource: &ResourceDocument,
    op: &OperationDocument,
) -> Result<(), Error> {
    let Some(internal_id) = resource.internal_id.as_deref() else {
        return Ok(());
    };

    let credential: BreakGlassCredential = match downstream.get_break_glass_credential(internal_id).await {
        Ok(credential) => credential,
        Err(DownstreamError::NotFound) => {
            tracing::warn!(
                operation_id = %op.operation_id,
                subscription_id = %op.subscription_id,
                "cluster service returned 404 for a credential issue operation; leaving operation active"
            );
            return Ok(());
        }
        Err(DownstreamError::Transport(e)) => return Err(Error::Downstream(e)),
    };

    let (new_status, error) = map_issue_state(credential.state, op.status, op.request_kind)?;

    if new_status == op.status && error.is_none() {
        return Ok(());
    }

    finish_poll(store, http, &resource.resource_id, op, new_status, error).await
}

pub async fn poll_revoke(
    store: &dyn StateStore,
    downstream: &dyn DownstreamClient,
    http: &reqwest::Client,
    resource: &ResourceDocument,
    op: &OperationDocument,
) -> Result<(), Error> {
    let Some(internal_id) = resource.internal_id.as_deref() else {
        return Ok(());
    };

    let credentials: Vec<BreakGlassCredential> = match downstream.list_break_glass_credentials(internal_id).await {
        Ok(credentials) => credentials,
        Err(DownstreamError::NotFound) => {
            tracing::warn!(
                operation_id = %op.operation_id,
                subscription_id = %op.subscription_id,
                "cluster service returned 404 for a credential revoke operation; leaving operation active"
            );
            return Ok(());
        }
        Err(DownstreamError::Transport(e)) => return Err(Error::Downstream(e)),
    };

    let states: Vec<CredentialState> = credentials.iter().map(|c| c.state).collect();
    let (new_status, error) = map_revoke_outcome(&states);

    if new_status == op.status && error.is_none() {
        return Ok(());
    }

    finish_poll(store, http, &resource.resource_id, op, new_status, error).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_dominates_regardless_of_order() {
        let orderings = [
            vec![CredentialState::AwaitingRevocation, CredentialState::Revoked, CredentialState::Failed],
            vec![CredentialState::Failed, CredentialState::Revoked, CredentialState::AwaitingRevocation],
            vec![CredentialState::Revoked, CredentialState::Failed, CredentialState::AwaitingRevocation],
        ];
        for states in orderings {
            let (status, error) = map_revoke_outcome(&states);
            assert_eq!(status, ProvisioningState::Failed);
            assert_eq!(error.unwrap().message, "Failed to revoke cluster credential");
        }
    }

    #[test]
    fn all_revoked_or_expired_succeeds() {
        let states = vec![CredentialState::Revoked, CredentialState::Expired];
        let (status, error) = map_revoke_outcome(&states);
        assert_eq!(status, ProvisioningState::Succeeded);
        assert!(error.is_none());
    }

    #[test]
    fn any_awaiting_keeps_deleting() {
        let states = vec![CredentialState::Revoked, CredentialState::AwaitingRevocation];
        let (status, _) = map_revoke_outcome(&states);
        assert_eq!(status, ProvisioningState::Deleting);
    }

    #[test]
    fn issue_created_maps_to_provisioning() {
        let (status, error) =
            map_issue_state(CredentialState::Created, ProvisioningState::Accepted, RequestKind::RequestCredential)
                .unwrap();
        assert_eq!(status, ProvisioningState::Provisioning);
        assert!(error.is_none());
    }
}

/// End-to-end scenario test against `InMemoryStore`, driving `poll_revoke`
/// itself rather than just `map_revoke_outcome`.
#[cfg(test)]
mod scenario_tests {
    use super::*;
    use crate::downstream::fake::FakeDownstreamClient;
    use crate::pollers::test_support::spawn_single_shot_callback_server;
    use crate::store::memory::InMemoryStore;
    use chrono::Utc;
    use reconciler_types::ResourceKind;
    use uuid::Uuid;

    /// §8 scenario 6: one credential still awaiting revocation, one already
    /// revoked, one failed. `Failed` dominates regardless of the others, so
    /// the operation and resource both land on Failed and notify once.
    #[tokio::test]
    async fn scenario_6_mixed_revoke_fates_picks_failed() {
        let store = InMemoryStore::new();
        let downstream = FakeDownstreamClient::new();
        let http = reqwest::Client::new();
        let (url, server) = spawn_single_shot_callback_server().await;

        let op_id = Uuid::new_v4();
        let sub_id = Uuid::new_v4();
        let op = OperationDocument {
            operation_id: op_id,
            subscription_id: sub_id,
            request_kind: RequestKind::RevokeCredentials,
            external_resource_id: format!(
                "/subscriptions/{sub_id}/resourceGroups/rg/providers/Microsoft.RedHatOpenShift/hostedClusters/cluster-6/breakGlassCredentials"
            ),
            internal_id: Some("internal-6".to_string()),
            status: ProvisioningState::Deleting,
            last_transition_time: Utc::now(),
            error: None,
            notification_uri: Some(url),
            client_request_id: None,
            correlation_request_id: None,
        };
        store.seed_operation(op.clone());

        let resource = ResourceDocument {
            resource_id: "cluster-6".to_string(),
            subscription_id: sub_id,
            resource_group: "rg".to_string(),
            name: "cluster-6".to_string(),
            kind: ResourceKind::Credential,
            internal_id: Some("internal-6".to_string()),
            provisioning_state: ProvisioningState::Deleting,
            active_operation_id: Some(op_id),
            created_at: Some(Utc::now()),
            last_updated: None,
        };
        store.seed_resource(resource.clone());

        downstream.push_credentials(vec![
            BreakGlassCredential {
                credential_id: "cred-a".to_string(),
                state: CredentialState::AwaitingRevocation,
                expires_at: None,
            },
            BreakGlassCredential {
                credential_id: "cred-b".to_string(),
                state: CredentialState::Revoked,
                expires_at: None,
            },
            BreakGlassCredential {
                credential_id: "cred-c".to_string(),
                state: CredentialState::Failed,
                expires_at: None,
            },
        ]);

        poll_revoke(&store, &downstream, &http, &resource, &op).await.unwrap();

        let op_final = store.operation(op_id);
        assert_eq!(op_final.status, ProvisioningState::Failed);
        assert_eq!(op_final.error.unwrap().message, "Failed to revoke cluster credential");

        let resource_final = store.resource("cluster-6");
        assert_eq!(resource_final.provisioning_state, ProvisioningState::Failed);
        assert_eq!(resource_final.active_operation_id, None);

        let hits = tokio::time::timeout(std::time::Duration::from_secs(1), server)
            .await
            .expect("callback server never received a request")
            .expect("server task panicked");
        assert_eq!(hits, 1);
    }
}
