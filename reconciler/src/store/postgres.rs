//! Postgres-backed `StateStore`. Conditional patches are expressed as
//! `UPDATE ... WHERE <precondition>` with a `RETURNING` clause, the SQL
//! equivalent of the document-database "patch with a textual precondition
//! over the JSON structure" contract in `SPEC_FULL.md` §6 — there is no
//! `json_patch::diff`/`Patch::Json` here because there is no CRD to diff
//! against, only a row.

use super::StateStore;
use crate::error::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use reconciler_types::{
    BillingRecord, Condition, ControllerRecord, OperationDocument, OperationError,
    ProvisioningState, RequestKind, ResourceDocument, ResourceKind, Subscription, SubscriptionState,
};
use std::str::FromStr;
use tokio_postgres::Row;
use uuid::Uuid;

pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub fn new(pool: Pool) -> Self {
        PostgresStore { pool }
    }
}

fn subscription_state_str(state: SubscriptionState) -> &'static str {
    match state {
        SubscriptionState::Registered => "Registered",
        SubscriptionState::Unregistered => "Unregistered",
        SubscriptionState::Warned => "Warned",
        SubscriptionState::Suspended => "Suspended",
        SubscriptionState::Deleted => "Deleted",
    }
}

fn parse_subscription_state(s: &str) -> SubscriptionState {
    match s {
        "Unregistered" => SubscriptionState::Unregistered,
        "Warned" => SubscriptionState::Warned,
        "Suspended" => SubscriptionState::Suspended,
        "Deleted" => SubscriptionState::Deleted,
        _ => SubscriptionState::Registered,
    }
}

fn request_kind_str(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Create => "Create",
        RequestKind::Update => "Update",
        RequestKind::Delete => "Delete",
        RequestKind::RequestCredential => "RequestCredential",
        RequestKind::RevokeCredentials => "RevokeCredentials",
    }
}

fn parse_request_kind(s: &str) -> RequestKind {
    match s {
        "Update" => RequestKind::Update,
        "Delete" => RequestKind::Delete,
        "RequestCredential" => RequestKind::RequestCredential,
        "RevokeCredentials" => RequestKind::RevokeCredentials,
        _ => RequestKind::Create,
    }
}

fn resource_kind_str(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Cluster => "Cluster",
        ResourceKind::NodePool => "NodePool",
        ResourceKind::Credential => "Credential",
    }
}

fn parse_resource_kind(s: &str) -> ResourceKind {
    match s {
        "NodePool" => ResourceKind::NodePool,
        "Credential" => ResourceKind::Credential,
        _ => ResourceKind::Cluster,
    }
}

fn operation_from_row(row: &Row) -> Result<OperationDocument, Error> {
    let status: String = row.get("status");
    let request_kind: String = row.get("request_kind");
    let error: Option<serde_json::Value> = row.get("error");
    Ok(OperationDocument {
        operation_id: row.get("operation_id"),
        subscription_id: row.get("subscription_id"),
        request_kind: parse_request_kind(&request_kind),
        external_resource_id: row.get("external_resource_id"),
        internal_id: row.get("internal_id"),
        status: ProvisioningState::from_str(&status).unwrap_or_default(),
        last_transition_time: row.get("last_transition_time"),
        error: error.map(serde_json::from_value).transpose()?,
        notification_uri: row.get("notification_uri"),
        client_request_id: row.get("client_request_id"),
        correlation_request_id: row.get("correlation_request_id"),
    })
}

fn resource_from_row(row: &Row) -> Result<ResourceDocument, Error> {
    let kind: String = row.get("kind");
    let provisioning_state: String = row.get("provisioning_state");
    Ok(ResourceDocument {
        resource_id: row.get("resource_id"),
        subscription_id: row.get("subscription_id"),
        resource_group: row.get("resource_group"),
        name: row.get("name"),
        kind: parse_resource_kind(&kind),
        internal_id: row.get("internal_id"),
        provisioning_state: ProvisioningState::from_str(&provisioning_state).unwrap_or_default(),
        active_operation_id: row.get("active_operation_id"),
        created_at: row.get("created_at"),
        last_updated: row.get("last_updated"),
    })
}

#[async_trait]
impl StateStore for PostgresStore {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, Error> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query("SELECT subscription_id, state FROM subscriptions", &[])
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let state: String = row.get("state");
                Subscription {
                    subscription_id: row.get("subscription_id"),
                    state: parse_subscription_state(&state),
                }
            })
            .collect())
    }

    async fn list_active_operations(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<OperationDocument>, Error> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT * FROM operations WHERE subscription_id = $1 \
                 AND status NOT IN ('Succeeded', 'Failed', 'Canceled')",
                &[&subscription_id],
            )
            .await?;
        rows.iter().map(operation_from_row).collect()
    }

    async fn get_operation(&self, operation_id: Uuid) -> Result<Option<OperationDocument>, Error> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM operations WHERE operation_id = $1",
                &[&operation_id],
            )
            .await?;
        row.as_ref().map(operation_from_row).transpose()
    }

    async fn get_resource(&self, resource_id: &str) -> Result<Option<ResourceDocument>, Error> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM resources WHERE resource_id = $1",
                &[&resource_id],
            )
            .await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn list_resources(&self, kind: ResourceKind) -> Result<Vec<ResourceDocument>, Error> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query("SELECT * FROM resources WHERE kind = $1", &[&resource_kind_str(kind)])
            .await?;
        rows.iter().map(resource_from_row).collect()
    }

    async fn patch_operation_status(
        &self,
        operation_id: Uuid,
        expected_status: ProvisioningState,
        new_status: ProvisioningState,
        error: Option<OperationError>,
        now: DateTime<Utc>,
    ) -> Result<OperationDocument, Error> {
        let conn = self.pool.get().await?;
        let error_json = error.map(|e| serde_json::to_value(e)).transpose()?;
        let row = conn
            .query_opt(
                "UPDATE operations SET status = $1, error = $2, last_transition_time = $3 \
                 WHERE operation_id = $4 AND status = $5 RETURNING *",
                &[
                    &new_status.to_string(),
                    &error_json,
                    &now,
                    &operation_id,
                    &expected_status.to_string(),
                ],
            )
            .await?;
        match row {
            Some(row) => operation_from_row(&row),
            None => Err(Error::PreconditionFailed {
                document: format!("operation/{operation_id}"),
                expected: expected_status.to_string(),
            }),
        }
    }

    async fn clear_notification_uri(
        &self,
        operation_id: Uuid,
        expected_uri: &str,
    ) -> Result<(), Error> {
        let conn = self.pool.get().await?;
        let rows = conn
            .execute(
                "UPDATE operations SET notification_uri = NULL \
                 WHERE operation_id = $1 AND notification_uri = $2",
                &[&operation_id, &expected_uri],
            )
            .await?;
        if rows == 0 {
            return Err(Error::PreconditionFailed {
                document: format!("operation/{operation_id}"),
                expected: "matching notificationURI".to_string(),
            });
        }
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
        let conn = self.pool.get().await?;
        let rows = if clear_active {
            conn.execute(
                "UPDATE resources SET provisioning_state = $1, active_operation_id = NULL, \
                 last_updated = $2 WHERE resource_id = $3 AND active_operation_id = $4",
                &[&new_state.to_string(), &now, &resource_id, &operation_id],
            )
            .await?
        } else {
            conn.execute(
                "UPDATE resources SET provisioning_state = $1, last_updated = $2 \
                 WHERE resource_id = $3 AND active_operation_id = $4",
                &[&new_state.to_string(), &now, &resource_id, &operation_id],
            )
            .await?
        };
        if rows == 0 {
            return Err(Error::PreconditionFailed {
                document: format!("resource/{resource_id}"),
                expected: format!("activeOperationID={operation_id}"),
            });
        }
        Ok(())
    }

    async fn mark_resource_deleted(&self, resource_id: &str, now: DateTime<Utc>) -> Result<(), Error> {
        // Deliberately leaves `active_operation_id` untouched: step 4's own
        // conditional patch (`patch_resource_state`) clears it once the
        // Delete operation is driven to its terminal state. Clearing it here
        // first would make that precondition unmatchable and silently drop
        // the terminal notification.
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE resources SET last_updated = $1 WHERE resource_id = $2",
            &[&now, &resource_id],
        )
        .await?;
        Ok(())
    }

    async fn get_billing(&self, resource_id: &str) -> Result<Option<BillingRecord>, Error> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt("SELECT * FROM billing WHERE resource_id = $1", &[&resource_id])
            .await?;
        Ok(row.map(|row| BillingRecord {
            resource_id: row.get("resource_id"),
            subscription_id: row.get("subscription_id"),
            created_at: row.get("created_at"),
            deletion_time: row.get("deletion_time"),
        }))
    }

    async fn create_billing(&self, record: BillingRecord) -> Result<(), Error> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO billing (resource_id, subscription_id, created_at, deletion_time) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (resource_id) DO NOTHING",
            &[
                &record.resource_id,
                &record.subscription_id,
                &record.created_at,
                &record.deletion_time,
            ],
        )
        .await?;
        Ok(())
    }

    async fn patch_billing_deletion_time(
        &self,
        resource_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let conn = self.pool.get().await?;
        // Best-effort: a missing billing record is not an error (B3).
        conn.execute(
            "UPDATE billing SET deletion_time = $1 WHERE resource_id = $2",
            &[&now, &resource_id],
        )
        .await?;
        Ok(())
    }

    async fn get_controller_record(
        &self,
        resource_id: &str,
        controller_name: &str,
    ) -> Result<Option<ControllerRecord>, Error> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM controllers WHERE resource_id = $1 AND controller_name = $2",
                &[&resource_id, &controller_name],
            )
            .await?;
        row.map(|row| {
            let conditions: serde_json::Value = row.get("conditions");
            Ok(ControllerRecord {
                resource_id: row.get("resource_id"),
                controller_name: row.get("controller_name"),
                conditions: serde_json::from_value(conditions)?,
            })
        })
        .transpose()
    }

    async fn upsert_controller_condition(
        &self,
        resource_id: &str,
        controller_name: &str,
        condition: Condition,
    ) -> Result<(), Error> {
        let mut record = self
            .get_controller_record(resource_id, controller_name)
            .await?
            .unwrap_or_else(|| ControllerRecord::new(resource_id, controller_name));
        record.set_condition(condition);
        let conditions_json = serde_json::to_value(&record.conditions)?;
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO controllers (resource_id, controller_name, conditions) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (resource_id, controller_name) DO UPDATE SET conditions = $3",
            &[&resource_id, &controller_name, &conditions_json],
        )
        .await?;
        Ok(())
    }
}
