//! Domain types shared between the reconciler core and its state-store backends.
//!
//! Nothing in this crate talks to a database or an HTTP client; it only describes
//! the shape of the documents the reconciler reads and patches, and the pure
//! state-mapping vocabulary (`ProvisioningState`, `ClusterState`, ...) used by the
//! pollers in `reconciler::pollers`.

pub mod billing;
pub mod controller;
pub mod downstream;
pub mod operation;
pub mod resource;
pub mod subscription;

pub use billing::BillingRecord;
pub use controller::{Condition, ConditionStatus, ControllerRecord};
pub use downstream::{ClusterState, CredentialState, InflightCheckState, NodePoolState};
pub use operation::{OperationDocument, OperationError, OperationErrorDetail, RequestKind};
pub use resource::{ResourceDocument, ResourceKind};
pub use subscription::{Subscription, SubscriptionState};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-facing lifecycle state of a resource or operation.
///
/// Terminal ≡ {Succeeded, Failed, Canceled}; once an operation reaches a
/// terminal state it must never be observed to leave it again (see
/// `OperationDocument::apply_transition`).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ProvisioningState {
    #[default]
    Accepted,
    Provisioning,
    Updating,
    Deleting,
    Succeeded,
    Failed,
    Canceled,
}

impl ProvisioningState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProvisioningState::Succeeded | ProvisioningState::Failed | ProvisioningState::Canceled
        )
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisioningState::Accepted => "Accepted",
            ProvisioningState::Provisioning => "Provisioning",
            ProvisioningState::Updating => "Updating",
            ProvisioningState::Deleting => "Deleting",
            ProvisioningState::Succeeded => "Succeeded",
            ProvisioningState::Failed => "Failed",
            ProvisioningState::Canceled => "Canceled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ProvisioningState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Accepted" => ProvisioningState::Accepted,
            "Provisioning" => ProvisioningState::Provisioning,
            "Updating" => ProvisioningState::Updating,
            "Deleting" => ProvisioningState::Deleting,
            "Succeeded" => ProvisioningState::Succeeded,
            "Failed" => ProvisioningState::Failed,
            "Canceled" => ProvisioningState::Canceled,
            _ => return Err(()),
        })
    }
}
