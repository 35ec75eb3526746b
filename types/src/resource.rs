use crate::ProvisioningState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The tag carried by a resource's internal ID, used to dispatch to the
/// matching poller (`reconciler::pollers::dispatch`). See `SPEC_FULL.md` §9.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Cluster,
    NodePool,
    Credential,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Cluster => "Cluster",
            ResourceKind::NodePool => "NodePool",
            ResourceKind::Credential => "Credential",
        };
        write!(f, "{s}")
    }
}

/// One managed resource: a hosted cluster, a node pool, or a break-glass
/// credential. `internal_id` is the opaque handle the downstream cluster
/// service understands; it is absent until the create operation has been
/// accepted downstream.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ResourceDocument {
    pub resource_id: String,
    pub subscription_id: Uuid,
    pub resource_group: String,
    pub name: String,
    pub kind: ResourceKind,
    pub internal_id: Option<String>,
    pub provisioning_state: ProvisioningState,
    /// Empty when no operation is in flight. Invariant (i)/(ii) in §3: this
    /// must equal the in-flight operation's ID, and is cleared atomically
    /// with the operation reaching a terminal state.
    pub active_operation_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ResourceDocument {
    pub fn has_active_operation(&self, operation_id: Uuid) -> bool {
        self.active_operation_id == Some(operation_id)
    }
}
