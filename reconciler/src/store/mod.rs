//! The document-database state store the core reads and conditionally
//! patches (`SPEC_FULL.md` §6 "State store"). `StateStore` is the seam: a
//! real deployment wires up `postgres::PostgresStore`; tests wire up
//! `memory::InMemoryStore` and never touch a database (§10.5).

pub mod memory;
pub mod postgres;

use crate::error::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reconciler_types::{
    BillingRecord, Condition, ControllerRecord, OperationDocument, OperationError,
    ProvisioningState, ResourceDocument, ResourceKind, Subscription,
};
use uuid::Uuid;

/// All document-store access the reconciler core needs, expressed as one
/// async trait so pollers and scanners never depend on a concrete backend.
/// Every patch method takes its precondition explicitly and returns
/// `Error::PreconditionFailed` (never panics, never silently no-ops) so
/// callers can fold that into the benign-no-op path themselves (§7 policy 2).
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, Error>;

    /// Active operations in one subscription partition — status not in the
    /// terminal set (§4.4 step 2).
    async fn list_active_operations(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<OperationDocument>, Error>;

    async fn get_operation(&self, operation_id: Uuid) -> Result<Option<OperationDocument>, Error>;

    async fn get_resource(&self, resource_id: &str) -> Result<Option<ResourceDocument>, Error>;

    /// Every resource of the given kind, regardless of subscription — the
    /// authoritative source the periodic reconcilers' relisters walk
    /// (§4.8 "Walks every cluster").
    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<ResourceDocument>, Error>;

    /// Conditional on `status == expected_status` (§4.5 step 3). On a
    /// precondition match, returns the patched document — the new source of
    /// truth for the rest of this sync pass, no re-read needed.
    async fn patch_operation_status(
        &self,
        operation_id: Uuid,
        expected_status: ProvisioningState,
        new_status: ProvisioningState,
        error: Option<OperationError>,
        now: DateTime<Utc>,
    ) -> Result<OperationDocument, Error>;

    /// Conditional on `notification_uri.is_some()` (re-checked against the
    /// value passed in, so a concurrent clear is detected). Clears the URI
    /// making re-notification impossible (I3).
    async fn clear_notification_uri(
        &self,
        operation_id: Uuid,
        expected_uri: &str,
    ) -> Result<(), Error>;

    /// Conditional on `active_operation_id == Some(operation_id)` (§4.5 step
    /// 4). `clear_active` is set when `new_state` is terminal.
    async fn patch_resource_state(
        &self,
        resource_id: &str,
        operation_id: Uuid,
        new_state: ProvisioningState,
        clear_active: bool,
        now: DateTime<Utc>,
    ) -> Result<(), Error>;

    async fn mark_resource_deleted(&self, resource_id: &str, now: DateTime<Utc>) -> Result<(), Error>;

    async fn get_billing(&self, resource_id: &str) -> Result<Option<BillingRecord>, Error>;

    async fn create_billing(&self, record: BillingRecord) -> Result<(), Error>;

    /// Best-effort: a missing billing record is not an error (B3).
    async fn patch_billing_deletion_time(
        &self,
        resource_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error>;

    async fn get_controller_record(
        &self,
        resource_id: &str,
        controller_name: &str,
    ) -> Result<Option<ControllerRecord>, Error>;

    async fn upsert_controller_condition(
        &self,
        resource_id: &str,
        controller_name: &str,
        condition: Condition,
    ) -> Result<(), Error>;
}
