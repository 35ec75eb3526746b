//! `Mutex<HashMap<...>>`-backed fake, in the style of
//! `reconciler_common`'s sibling in-process registries. Backs the
//! integration-style scenario tests (§8) without a real database.

use super::StateStore;
use crate::error::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reconciler_types::{
    BillingRecord, Condition, ControllerRecord, OperationDocument, OperationError,
    ProvisioningState, ResourceDocument, ResourceKind, Subscription,
};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    subscriptions: Mutex<HashMap<Uuid, Subscription>>,
    operations: Mutex<HashMap<Uuid, OperationDocument>>,
    resources: Mutex<HashMap<String, ResourceDocument>>,
    billing: Mutex<HashMap<String, BillingRecord>>,
    controllers: Mutex<HashMap<(String, String), ControllerRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_subscription(&self, sub: Subscription) {
        self.subscriptions.lock().unwrap().insert(sub.subscription_id, sub);
    }

    pub fn seed_operation(&self, op: OperationDocument) {
        self.operations.lock().unwrap().insert(op.operation_id, op);
    }

    pub fn seed_resource(&self, res: ResourceDocument) {
        self.resources.lock().unwrap().insert(res.resource_id.clone(), res);
    }

    pub fn seed_billing(&self, billing: BillingRecord) {
        self.billing.lock().unwrap().insert(billing.resource_id.clone(), billing);
    }

    pub fn operation(&self, id: Uuid) -> OperationDocument {
        self.operations.lock().unwrap().get(&id).cloned().expect("operation must exist")
    }

    pub fn resource(&self, resource_id: &str) -> ResourceDocument {
        self.resources
            .lock()
            .unwrap()
            .get(resource_id)
            .cloned()
            .expect("resource must exist")
    }

    pub fn billing(&self, resource_id: &str) -> Option<BillingRecord> {
        self.billing.lock().unwrap().get(resource_id).cloned()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, Error> {
        Ok(self.subscriptions.lock().unwrap().values().cloned().collect())
    }

    async fn list_active_operations(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<OperationDocument>, Error> {
        Ok(self
            .operations
            .lock()
            .unwrap()
            .values()
            .filter(|op| op.subscription_id == subscription_id && op.is_active())
            .cloned()
            .collect())
    }

    async fn get_operation(&self, operation_id: Uuid) -> Result<Option<OperationDocument>, Error> {
        Ok(self.operations.lock().unwrap().get(&operation_id).cloned())
    }

    async fn get_resource(&self, resource_id: &str) -> Result<Option<ResourceDocument>, Error> {
        Ok(self.resources.lock().unwrap().get(resource_id).cloned())
    }

    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<ResourceDocument>, Error> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }

    async fn patch_operation_status(
        &self,
        operation_id: Uuid,
        expected_status: ProvisioningState,
        new_status: ProvisioningState,
        error: Option<OperationError>,
        now: DateTime<Utc>,
    ) -> Result<OperationDocument, Error> {
        let mut ops = self.operations.lock().unwrap();
        let op = ops
            .get_mut(&operation_id)
            .ok_or_else(|| Error::PreconditionFailed {
                document: format!("operation/{operation_id}"),
                expected: "document to exist".to_string(),
            })?;
        if op.status != expected_status {
            return Err(Error::PreconditionFailed {
                document: format!("operation/{operation_id}"),
                expected: expected_status.to_string(),
            });
        }
        op.apply_transition(new_status, error, now)?;
        Ok(op.clone())
    }

    async fn clear_notification_uri(
        &self,
        operation_id: Uuid,
        expected_uri: &str,
    ) -> Result<(), Error> {
        let mut ops = self.operations.lock().unwrap();
        let op = ops
            .get_mut(&operation_id)
            .ok_or_else(|| Error::PreconditionFailed {
                document: format!("operation/{operation_id}"),
                expected: "document to exist".to_string(),
            })?;
        if op.notification_uri.as_deref() != Some(expected_uri) {
            return Err(Error::PreconditionFailed {
                document: format!("operation/{operation_id}"),
                expected: "matching notificationURI".to_string(),
            });
        }
        op.notification_uri = None;
        Ok(())
    }

    async fn patch_resource_state(
        &self,
        resource_id: &str,
        operation_id: Uuid,
        new_state: ProvisioningState,
        clear_active: bool,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut resources = self.resources.lock().unwrap();
        let resource = resources
            .get_mut(resource_id)
            .ok_or_else(|| Error::PreconditionFailed {
                document: format!("resource/{resource_id}"),
                expected: "document to exist".to_string(),
            })?;
        if !resource.has_active_operation(operation_id) {
            return Err(Error::PreconditionFailed {
                document: format!("resource/{resource_id}"),
                expected: format!("activeOperationID={operation_id}"),
            });
        }
        resource.provisioning_state = new_state;
        if clear_active {
            resource.active_operation_id = None;
        }
        resource.last_updated = Some(now);
        Ok(())
    }

    async fn mark_resource_deleted(&self, resource_id: &str, now: DateTime<Utc>) -> Result<(), Error> {
        // `active_operation_id` is left alone here; see the postgres impl's
        // comment — step 4's own conditional patch clears it.
        let mut resources = self.resources.lock().unwrap();
        if let Some(resource) = resources.get_mut(resource_id) {
            resource.last_updated = Some(now);
        }
        Ok(())
    }

    async fn get_billing(&self, resource_id: &str) -> Result<Option<BillingRecord>, Error> {
        Ok(self.billing.lock().unwrap().get(resource_id).cloned())
    }

    async fn create_billing(&self, record: BillingRecord) -> Result<(), Error> {
        self.billing.lock().unwrap().insert(record.resource_id.clone(), record);
        Ok(())
    }

    async fn patch_billing_deletion_time(
        &self,
        resource_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        if let Some(record) = self.billing.lock().unwrap().get_mut(resource_id) {
            record.deletion_time = Some(now);
        }
        // Missing billing record: not an error (B3).
        Ok(())
    }

    async fn get_controller_record(
        &self,
        resource_id: &str,
        controller_name: &str,
    ) -> Result<Option<ControllerRecord>, Error> {
        Ok(self
            .controllers
            .lock()
            .unwrap()
            .get(&(resource_id.to_string(), controller_name.to_string()))
            .cloned())
    }

    async fn upsert_controller_condition(
        &self,
        resource_id: &str,
        controller_name: &str,
        condition: Condition,
    ) -> Result<(), Error> {
        let mut controllers = self.controllers.lock().unwrap();
        let record = controllers
            .entry((resource_id.to_string(), controller_name.to_string()))
            .or_insert_with(|| ControllerRecord::new(resource_id, controller_name));
        record.set_condition(condition);
        Ok(())
    }
}
