//! Cluster poller: Create/Update/Delete against a hosted cluster.

use super::{finish_poll, handle_delete_not_found};
use crate::downstream::{ClusterStatus, DownstreamClient, DownstreamError};
use crate::error::Error;
use crate::pollers::inflight;
use crate::store::StateStore;
use reconciler_types::{ClusterState, OperationDocument, OperationError, ProvisioningState, RequestKind, ResourceDocument};

/// The pure result of mapping `(downstreamState, currentState, requestKind)`
/// to a new provisioning state (§4.5, L2). `OCM4001` needs an extra
/// downstream call (the inflight-checks list) so it is represented here as
/// a distinct variant rather than resolved inline.
#[derive(Debug, PartialEq)]
pub enum ClusterMapOutcome {
    NewState(ProvisioningState, Option<OperationError>),
    NeedsInflightExpansion,
}

/// Pure state-mapping table for the cluster poller (§4.5). No I/O; testable
/// by table (L2).
pub fn map_cluster_state(
    downstream_state: ClusterState,
    current: ProvisioningState,
    request: RequestKind,
    provision_error_code: Option<&str>,
    provision_error_message: Option<&str>,
) -> Result<ClusterMapOutcome, Error> {
    use ClusterState::*;
    match downstream_state {
        Error => {
            if provision_error_code.as_deref() == Some("OCM4001") {
                return Ok(ClusterMapOutcome::NeedsInflightExpansion);
            }
            let error = OperationError {
                code: provision_error_code.unwrap_or("InternalServerError").to_string(),
                message: provision_error_message.unwrap_or("cluster provisioning failed").to_string(),
                details: Vec::new(),
            };
            Ok(ClusterMapOutcome::NewState(ProvisioningState::Failed, Some(error)))
        }
        Installing => Ok(ClusterMapOutcome::NewState(ProvisioningState::Provisioning, None)),
        Ready => {
            if request == RequestKind::Delete {
                // Deletion confirms only on 404 (§4.5 step 1); a `Ready`
                // cluster body for a delete request means the delete hasn't
                // actually been observed downstream yet — leave state as is.
                Ok(ClusterMapOutcome::NewState(current, None))
            } else {
                Ok(ClusterMapOutcome::NewState(ProvisioningState::Succeeded, None))
            }
        }
        Uninstalling => Ok(ClusterMapOutcome::NewState(ProvisioningState::Deleting, None)),
        Pending | Validating => {
            if current == ProvisioningState::Accepted {
                Ok(ClusterMapOutcome::NewState(current, None))
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
        // No internal ID yet: the create call hasn't round-tripped
        // downstream. Nothing to poll this pass.
        return Ok(());
    };

    let status: ClusterStatus = match downstream.get_cluster_status(internal_id).await {
        Ok(status) => status,
        Err(DownstreamError::NotFound) => {
            if op.request_kind == RequestKind::Delete {
                return handle_delete_not_found(store, http, resource, op).await;
            }
            tracing::warn!(
                operation_id = %op.operation_id,
                subscription_id = %op.subscription_id,
                "cluster service returned 404 for a non-delete operation; leaving operation active"
            );
            return Ok(());
        }
        Err(DownstreamError::Transport(e)) => return Err(Error::Downstream(e)),
    };

    let outcome = map_cluster_state(
        status.state,
        op.status,
        op.request_kind,
        status.provision_error_code.as_deref(),
        status.provision_error_message.as_deref(),
    )?;

    let (new_status, error) = match outcome {
        ClusterMapOutcome::NewState(new_status, error) => (new_status, error),
        ClusterMapOutcome::NeedsInflightExpansion => {
            // A missing inflight-checks list is treated the same as an
            // empty one: §4.6 already defines the zero-failures case as a
            // generic error with a logged anomaly (B2).
            let checks = match downstream.get_cluster_inflight_checks(internal_id).await {
                Ok(checks) => checks,
                Err(DownstreamError::NotFound) => Vec::new(),
                Err(DownstreamError::Transport(e)) => return Err(Error::Downstream(e)),
            };
            (ProvisioningState::Failed, Some(inflight::expand(&checks)))
        }
    };

    if new_status == op.status && error.is_none() {
        return Ok(());
    }

    finish_poll(store, http, &resource.resource_id, op, new_status, error).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installing_maps_to_provisioning() {
        let outcome =
            map_cluster_state(ClusterState::Installing, ProvisioningState::Accepted, RequestKind::Create, None, None)
                .unwrap();
        assert_eq!(outcome, ClusterMapOutcome::NewState(ProvisioningState::Provisioning, None));
    }

    #[test]
    fn ready_maps_to_succeeded_for_create() {
        let outcome =
            map_cluster_state(ClusterState::Ready, ProvisioningState::Provisioning, RequestKind::Create, None, None)
                .unwrap();
        assert_eq!(outcome, ClusterMapOutcome::NewState(ProvisioningState::Succeeded, None));
    }

    #[test]
    fn ready_during_delete_holds_current_state() {
        let outcome =
            map_cluster_state(ClusterState::Ready, ProvisioningState::Deleting, RequestKind::Delete, None, None)
                .unwrap();
        assert_eq!(outcome, ClusterMapOutcome::NewState(ProvisioningState::Deleting, None));
    }

    #[test]
    fn error_with_ocm4001_requests_expansion() {
        let outcome = map_cluster_state(
            ClusterState::Error,
            ProvisioningState::Provisioning,
            RequestKind::Create,
            Some("OCM4001"),
            None,
        )
        .unwrap();
        assert_eq!(outcome, ClusterMapOutcome::NeedsInflightExpansion);
    }

    #[test]
    fn error_without_code_maps_to_failed_with_generic_body() {
        let outcome = map_cluster_state(
            ClusterState::Error,
            ProvisioningState::Provisioning,
            RequestKind::Create,
            None,
            Some("boom"),
        )
        .unwrap();
        match outcome {
            ClusterMapOutcome::NewState(ProvisioningState::Failed, Some(err)) => {
                assert_eq!(err.message, "boom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn pending_from_accepted_is_unchanged() {
        let outcome =
            map_cluster_state(ClusterState::Pending, ProvisioningState::Accepted, RequestKind::Create, None, None)
                .unwrap();
        assert_eq!(outcome, ClusterMapOutcome::NewState(ProvisioningState::Accepted, None));
    }

    #[test]
    fn pending_from_non_accepted_is_a_conversion_error() {
        let result =
            map_cluster_state(ClusterState::Pending, ProvisioningState::Provisioning, RequestKind::Create, None, None);
        assert!(matches!(result, Err(Error::UnmappedState { .. })));
    }
}

/// End-to-end scenario tests against `InMemoryStore`, driving `poll` itself
/// rather than just the pure mapping tables above.
#[cfg(test)]
mod scenario_tests {
    use super::*;
    use crate::downstream::fake::FakeDownstreamClient;
    use crate::downstream::InflightCheck;
    use crate::pollers::test_support::spawn_single_shot_callback_server;
    use crate::store::memory::InMemoryStore;
    use chrono::Utc;
    use reconciler_types::{BillingRecord, InflightCheckState, ResourceKind};
    use uuid::Uuid;

    fn seed_cluster(
        store: &InMemoryStore,
        op_id: Uuid,
        sub_id: Uuid,
        resource_id: &str,
        request_kind: RequestKind,
        status: ProvisioningState,
        notification_uri: String,
    ) -> (OperationDocument, ResourceDocument) {
        let op = OperationDocument {
            operation_id: op_id,
            subscription_id: sub_id,
            request_kind,
            external_resource_id: format!(
                "/subscriptions/{sub_id}/resourceGroups/rg/providers/Microsoft.RedHatOpenShift/hostedClusters/{resource_id}"
            ),
            internal_id: Some("internal-id".to_string()),
            status,
            last_transition_time: Utc::now(),
            error: None,
            notification_uri: Some(notification_uri),
            client_request_id: None,
            correlation_request_id: None,
        };
        store.seed_operation(op.clone());

        let resource = ResourceDocument {
            resource_id: resource_id.to_string(),
            subscription_id: sub_id,
            resource_group: "rg".to_string(),
            name: resource_id.to_string(),
            kind: ResourceKind::Cluster,
            internal_id: Some("internal-id".to_string()),
            provisioning_state: status,
            active_operation_id: Some(op_id),
            created_at: Some(Utc::now()),
            last_updated: None,
        };
        store.seed_resource(resource.clone());

        (op, resource)
    }

    /// §8 scenario 1: Create, two polls (Installing then Ready), operation
    /// and resource both land on Succeeded, exactly one notification fires.
    #[tokio::test]
    async fn scenario_1_create_reaches_succeeded_and_notifies_once() {
        let store = InMemoryStore::new();
        let downstream = FakeDownstreamClient::new();
        let http = reqwest::Client::new();
        let (url, server) = spawn_single_shot_callback_server().await;

        let op_id = Uuid::new_v4();
        let sub_id = Uuid::new_v4();
        let (op, resource) = seed_cluster(
            &store,
            op_id,
            sub_id,
            "cluster-1",
            RequestKind::Create,
            ProvisioningState::Accepted,
            url,
        );

        downstream.push_cluster_status(ClusterStatus {
            state: ClusterState::Installing,
            provision_error_code: None,
            provision_error_message: None,
        });
        poll(&store, &downstream, &http, &resource, &op).await.unwrap();

        let op_mid = store.operation(op_id);
        let resource_mid = store.resource("cluster-1");
        assert_eq!(op_mid.status, ProvisioningState::Provisioning);
        assert_eq!(resource_mid.provisioning_state, ProvisioningState::Provisioning);
        assert_eq!(resource_mid.active_operation_id, Some(op_id));

        downstream.push_cluster_status(ClusterStatus {
            state: ClusterState::Ready,
            provision_error_code: None,
            provision_error_message: None,
        });
        poll(&store, &downstream, &http, &resource_mid, &op_mid).await.unwrap();

        let op_final = store.operation(op_id);
        let resource_final = store.resource("cluster-1");
        assert_eq!(op_final.status, ProvisioningState::Succeeded);
        assert!(op_final.notification_uri.is_none());
        assert_eq!(resource_final.provisioning_state, ProvisioningState::Succeeded);
        assert_eq!(resource_final.active_operation_id, None);

        let hits = tokio::time::timeout(std::time::Duration::from_secs(1), server)
            .await
            .expect("callback server never received a request")
            .expect("server task panicked");
        assert_eq!(hits, 1);
    }

    /// §8 scenario 2: Delete confirmed by a downstream 404 drives the
    /// operation and resource to Succeeded, stamps the billing deletion
    /// time, and notifies exactly once. Regression coverage for the bug
    /// where `mark_resource_deleted` nulled `active_operation_id` before
    /// `finish_poll`'s own conditional patch could, making that patch's
    /// precondition permanently unsatisfiable.
    #[tokio::test]
    async fn scenario_2_delete_not_found_marks_succeeded_and_notifies() {
        let store = InMemoryStore::new();
        let downstream = FakeDownstreamClient::new();
        let http = reqwest::Client::new();
        let (url, server) = spawn_single_shot_callback_server().await;

        let op_id = Uuid::new_v4();
        let sub_id = Uuid::new_v4();
        let (op, resource) = seed_cluster(
            &store,
            op_id,
            sub_id,
            "cluster-2",
            RequestKind::Delete,
            ProvisioningState::Deleting,
            url,
        );
        store.seed_billing(BillingRecord {
            resource_id: "cluster-2".to_string(),
            subscription_id: sub_id,
            created_at: Utc::now(),
            deletion_time: None,
        });

        downstream.push_cluster_not_found();
        poll(&store, &downstream, &http, &resource, &op).await.unwrap();

        let op_final = store.operation(op_id);
        let resource_final = store.resource("cluster-2");
        assert_eq!(op_final.status, ProvisioningState::Succeeded);
        assert!(op_final.notification_uri.is_none());
        assert_eq!(resource_final.provisioning_state, ProvisioningState::Succeeded);
        assert_eq!(resource_final.active_operation_id, None);

        let billing = store.billing("cluster-2").expect("billing record must survive delete");
        assert!(billing.deletion_time.is_some());

        let hits = tokio::time::timeout(std::time::Duration::from_secs(1), server)
            .await
            .expect("callback server never received a request")
            .expect("server task panicked");
        assert_eq!(hits, 1);
    }

    /// §8 scenario 3: OCM4001 with two failed inflight checks produces a
    /// `MultipleErrorsOccurred` body with one detail per failure.
    #[tokio::test]
    async fn scenario_3_ocm4001_two_failures_yields_multiple_errors() {
        let store = InMemoryStore::new();
        let downstream = FakeDownstreamClient::new();
        let http = reqwest::Client::new();
        let (url, server) = spawn_single_shot_callback_server().await;

        let op_id = Uuid::new_v4();
        let sub_id = Uuid::new_v4();
        let (op, resource) = seed_cluster(
            &store,
            op_id,
            sub_id,
            "cluster-3",
            RequestKind::Create,
            ProvisioningState::Provisioning,
            url,
        );

        downstream.push_cluster_status(ClusterStatus {
            state: ClusterState::Error,
            provision_error_code: Some("OCM4001".to_string()),
            provision_error_message: None,
        });
        downstream.push_inflight_checks(vec![
            InflightCheck {
                name: "subnet".to_string(),
                state: InflightCheckState::Failed,
                error: Some("subnet missing".to_string()),
            },
            InflightCheck {
                name: "nsg".to_string(),
                state: InflightCheckState::Failed,
                error: Some("nsg missing".to_string()),
            },
        ]);

        poll(&store, &downstream, &http, &resource, &op).await.unwrap();

        let op_final = store.operation(op_id);
        assert_eq!(op_final.status, ProvisioningState::Failed);
        let error = op_final.error.expect("failed operation must carry an error body");
        assert_eq!(error.code, "MultipleErrorsOccurred");
        assert_eq!(error.details.len(), 2);

        let resource_final = store.resource("cluster-3");
        assert_eq!(resource_final.provisioning_state, ProvisioningState::Failed);
        assert_eq!(resource_final.active_operation_id, None);

        let hits = tokio::time::timeout(std::time::Duration::from_secs(1), server)
            .await
            .expect("callback server never received a request")
            .expect("server task panicked");
        assert_eq!(hits, 1);
    }
}
