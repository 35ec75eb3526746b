use serde::{Deserialize, Serialize};

/// Raw lifecycle state as reported by the downstream cluster service for a
/// hosted cluster. Distinct from `ProvisioningState`, which is the
/// caller-facing projection the cluster poller computes from this (§4.5).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterState {
    Pending,
    Validating,
    Installing,
    Ready,
    Uninstalling,
    Error,
}

/// Same shape as `ClusterState`; kept as a separate type because the
/// node-pool poller's mapping table is analogous but not identical (no
/// provisioning error code is offered downstream — §4.5).
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodePoolState {
    Pending,
    Validating,
    Installing,
    Ready,
    Uninstalling,
    Error,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialState {
    Created,
    Issued,
    AwaitingRevocation,
    Revoked,
    Expired,
    Failed,
}

impl CredentialState {
    /// Expired credentials are treated as revoked regardless of reported
    /// state (§4.5 credential-revoke mapping).
    pub fn is_revoked(self) -> bool {
        matches!(self, CredentialState::Revoked | CredentialState::Expired)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InflightCheckState {
    Pending,
    Passed,
    Failed,
}
