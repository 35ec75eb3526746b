//! The validations plug-in set (§4.9). Each validation is independent — no
//! validation may depend on another's result — and all of them run against
//! a single resource snapshot, collecting every failure rather than
//! stopping at the first. Failures become `Degraded` conditions on the
//! resource's controller record; they never mutate provisioning state
//! directly (that would conflate observability with a state transition).

use crate::controllers::periodic::Synchronizer;
use crate::error::Error;
use crate::store::StateStore;
use async_trait::async_trait;
use chrono::Utc;
use reconciler_types::{Condition, ConditionStatus, ResourceDocument, ResourceKind};
use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error)]
#[error("validation {name} failed: {message}")]
pub struct ValidationError {
    pub name: String,
    pub message: String,
}

#[async_trait]
pub trait ClusterValidation: Send + Sync {
    fn name(&self) -> &str;
    async fn validate(&self, resource: &ResourceDocument) -> Result<(), ValidationError>;
}

const VALIDATIONS_CONTROLLER_NAME: &str = "validations";

/// Runs every registered validation against `resource`, collecting all
/// failures, and writes a single `Degraded` condition (or clears it) on the
/// resource's controller record. Order is fixed and flat — no validation
/// may inspect another's outcome.
pub async fn run_validations(
    store: &dyn StateStore,
    validations: &[Box<dyn ClusterValidation>],
    resource: &ResourceDocument,
) -> Result<Vec<ValidationError>, Error> {
    let mut failures = Vec::new();
    for validation in validations {
        if let Err(e) = validation.validate(resource).await {
            failures.push(e);
        }
    }

    let condition = if failures.is_empty() {
        Condition {
            type_: "Degraded".to_string(),
            status: ConditionStatus::False,
            reason: "AllValidationsPassed".to_string(),
            message: String::new(),
            last_transition_time: Utc::now(),
        }
    } else {
        Condition {
            type_: "Degraded".to_string(),
            status: ConditionStatus::True,
            reason: "ValidationFailed".to_string(),
            message: failures
                .iter()
                .map(|f| format!("{}: {}", f.name, f.message))
                .collect::<Vec<_>>()
                .join("; "),
            last_transition_time: Utc::now(),
        }
    };

    store
        .upsert_controller_condition(&resource.resource_id, VALIDATIONS_CONTROLLER_NAME, condition)
        .await?;

    Ok(failures)
}

const VALIDATION_SYNCHRONIZER_NAME: &str = "cluster-validations";

/// Runs `run_validations` as a periodic reconciler (§4.8 "same skeleton") so
/// it shares relist/backoff/concurrency with the other reconcilers instead
/// of having its own bespoke loop.
pub struct ValidationSynchronizer {
    store: Arc<dyn StateStore>,
    validations: Vec<Box<dyn ClusterValidation>>,
}

impl ValidationSynchronizer {
    pub fn new(store: Arc<dyn StateStore>, validations: Vec<Box<dyn ClusterValidation>>) -> Self {
        ValidationSynchronizer { store, validations }
    }
}

#[async_trait]
impl Synchronizer<String> for ValidationSynchronizer {
    fn name(&self) -> &str {
        VALIDATION_SYNCHRONIZER_NAME
    }

    async fn synchronize(&self, resource_id: &String) -> Result<(), Error> {
        let Some(resource) = self.store.get_resource(resource_id).await? else {
            return Ok(());
        };
        run_validations(self.store.as_ref(), &self.validations, &resource).await?;
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use reconciler_types::{ProvisioningState, ResourceKind};
    use uuid::Uuid;

    struct AlwaysFails;
    #[async_trait]
    impl ClusterValidation for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }
        async fn validate(&self, _resource: &ResourceDocument) -> Result<(), ValidationError> {
            Err(ValidationError { name: self.name().to_string(), message: "nope".to_string() })
        }
    }

    struct AlwaysPasses;
    #[async_trait]
    impl ClusterValidation for AlwaysPasses {
        fn name(&self) -> &str {
            "always-passes"
        }
        async fn validate(&self, _resource: &ResourceDocument) -> Result<(), ValidationError> {
            Ok(())
        }
    }

    fn sample_resource() -> ResourceDocument {
        ResourceDocument {
            resource_id: "/res/1".to_string(),
            subscription_id: Uuid::nil(),
            resource_group: "rg".to_string(),
            name: "cluster".to_string(),
            kind: ResourceKind::Cluster,
            internal_id: None,
            provisioning_state: ProvisioningState::Succeeded,
            active_operation_id: None,
            created_at: None,
            last_updated: None,
        }
    }

    #[tokio::test]
    async fn collects_every_failure_and_writes_degraded() {
        let store = InMemoryStore::new();
        let resource = sample_resource();
        let validations: Vec<Box<dyn ClusterValidation>> = vec![Box::new(AlwaysFails), Box::new(AlwaysPasses)];

        let failures = run_validations(&store, &validations, &resource).await.unwrap();
        assert_eq!(failures.len(), 1);

        let record = store
            .get_controller_record(&resource.resource_id, VALIDATIONS_CONTROLLER_NAME)
            .await
            .unwrap()
            .unwrap();
        let degraded = record.conditions.iter().find(|c| c.type_ == "Degraded").unwrap();
        assert_eq!(degraded.status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn no_failures_clears_degraded() {
        let store = InMemoryStore::new();
        let resource = sample_resource();
        let validations: Vec<Box<dyn ClusterValidation>> = vec![Box::new(AlwaysPasses)];

        let failures = run_validations(&store, &validations, &resource).await.unwrap();
        assert!(failures.is_empty());

        let record = store
            .get_controller_record(&resource.resource_id, VALIDATIONS_CONTROLLER_NAME)
            .await
            .unwrap()
            .unwrap();
        let degraded = record.conditions.iter().find(|c| c.type_ == "Degraded").unwrap();
        assert_eq!(degraded.status, ConditionStatus::False);
    }
}
