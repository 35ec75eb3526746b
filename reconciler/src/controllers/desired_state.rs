//! Customer-desired-state sync (§4.8): walks every cluster, converts the
//! downstream representation to the caller-visible "customer desired state"
//! shape, and writes it back only if semantically different. No side
//! effects on the downstream service — this is read-and-project, not
//! reconcile-toward.

use super::periodic::Synchronizer;
use crate::downstream::{DownstreamClient, DownstreamError};
use crate::error::Error;
use crate::store::StateStore;
use chrono::Utc;
use reconciler_types::{Condition, ConditionStatus, ResourceKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const CONTROLLER_NAME: &str = "customer-desired-state";

/// The caller-visible projection of a cluster's state, converted from the
/// downstream service's own status representation (`SPEC_FULL.md` §4.8).
/// Deliberately small and independent of the internal `ResourceDocument`
/// layout so a schema change to the stored document doesn't spuriously flip
/// this condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CustomerDesiredState {
    provisioning_state: String,
    downstream_state: Option<String>,
    downstream_error: Option<String>,
}

pub struct DesiredStateSynchronizer {
    store: Arc<dyn StateStore>,
    downstream: Arc<dyn DownstreamClient>,
}

impl DesiredStateSynchronizer {
    pub fn new(store: Arc<dyn StateStore>, downstream: Arc<dyn DownstreamClient>) -> Self {
        DesiredStateSynchronizer { store, downstream }
    }
}

#[async_trait::async_trait]
impl Synchronizer<String> for DesiredStateSynchronizer {
    fn name(&self) -> &str {
        CONTROLLER_NAME
    }

    async fn synchronize(&self, resource_id: &String) -> Result<(), Error> {
        let Some(resource) = self.store.get_resource(resource_id).await? else {
            return Ok(());
        };

        // No side effects on the downstream service: this reconciler only
        // reads. If the cluster isn't reachable downstream yet, there is
        // nothing to convert, and the projection stays downstream-empty.
        let (downstream_state, downstream_error) = match resource.internal_id.as_deref() {
            Some(internal_id) => match self.downstream.get_cluster_status(internal_id).await {
                Ok(status) => (Some(format!("{:?}", status.state)), status.provision_error_message),
                Err(DownstreamError::NotFound) => (None, None),
                Err(DownstreamError::Transport(e)) => return Err(Error::Downstream(e)),
            },
            None => (None, None),
        };

        let desired = CustomerDesiredState {
            provisioning_state: resource.provisioning_state.to_string(),
            downstream_state,
            downstream_error,
        };
        let serialized = serde_json::to_string(&desired)?;

        let existing_message = self
            .store
            .get_controller_record(resource_id, CONTROLLER_NAME)
            .await?
            .and_then(|record| {
                record
                    .conditions
                    .into_iter()
                    .find(|c| c.type_ == "CustomerDesiredState")
                    .map(|c| c.message)
            });

        if existing_message.as_deref() == Some(serialized.as_str()) {
            // Semantically identical projection: no write (§4.8).
            return Ok(());
        }

        self.store
            .upsert_controller_condition(
                resource_id,
                CONTROLLER_NAME,
                Condition {
                    type_: "CustomerDesiredState".to_string(),
                    status: ConditionStatus::True,
                    reason: "Synced".to_string(),
                    message: serialized,
                    last_transition_time: Utc::now(),
                },
            )
            .await
    }

    async fn relist(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .store
            .list_resources(ResourceKind::Cluster)
            .await?
            .into_iter()
            .map(|r| r.resource_id)
            .collect())
    }
}
