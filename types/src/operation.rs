use crate::ProvisioningState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Create,
    Update,
    Delete,
    RequestCredential,
    RevokeCredentials,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestKind::Create => "Create",
            RequestKind::Update => "Update",
            RequestKind::Delete => "Delete",
            RequestKind::RequestCredential => "RequestCredential",
            RequestKind::RevokeCredentials => "RevokeCredentials",
        };
        write!(f, "{s}")
    }
}

/// Per-check detail under a `MultipleErrorsOccurred` body (§4.6).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct OperationErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct OperationError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<OperationErrorDetail>,
}

impl OperationError {
    pub fn internal(message: impl Into<String>) -> Self {
        OperationError {
            code: "InternalServerError".to_string(),
            message: message.into(),
            details: Vec::new(),
        }
    }
}

/// One long-running request against a resource. `notification_uri` is
/// cleared exactly once, after the terminal ARM callback succeeds (§4.5
/// Step 5) — that clear is what makes re-notification impossible (I3).
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct OperationDocument {
    pub operation_id: Uuid,
    pub subscription_id: Uuid,
    pub request_kind: RequestKind,
    pub external_resource_id: String,
    pub internal_id: Option<String>,
    pub status: ProvisioningState,
    pub last_transition_time: DateTime<Utc>,
    pub error: Option<OperationError>,
    pub notification_uri: Option<String>,
    pub client_request_id: Option<String>,
    pub correlation_request_id: Option<String>,
}

/// Thrown when a caller attempts to move a terminal operation to a
/// non-terminal (or different terminal) status. Invariant I2 / error
/// taxonomy policy 2 in `SPEC_FULL.md` §7: callers should treat this as a
/// benign no-op, not propagate it as a failure.
#[derive(Debug, thiserror::Error)]
#[error("operation {0} is already terminal; transition rejected")]
pub struct TerminalTransitionRejected(pub Uuid);

impl OperationDocument {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Applies a new status, honoring the monotonicity invariant (I2).
    /// Returns `Err` without mutating `self` if the operation is already
    /// terminal and `new_status` differs from the current one — callers
    /// should fold that into the "precondition failed" benign-no-op path
    /// (§7 policy 2), not retry.
    pub fn apply_transition(
        &mut self,
        new_status: ProvisioningState,
        error: Option<OperationError>,
        now: DateTime<Utc>,
    ) -> Result<(), TerminalTransitionRejected> {
        if self.status.is_terminal() && self.status != new_status {
            return Err(TerminalTransitionRejected(self.operation_id));
        }
        self.status = new_status;
        self.error = error;
        self.last_transition_time = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> OperationDocument {
        OperationDocument {
            operation_id: Uuid::nil(),
            subscription_id: Uuid::nil(),
            request_kind: RequestKind::Create,
            external_resource_id: "/resource".to_string(),
            internal_id: None,
            status: ProvisioningState::Accepted,
            last_transition_time: Utc.timestamp_opt(0, 0).unwrap(),
            error: None,
            notification_uri: Some("http://cb".to_string()),
            client_request_id: None,
            correlation_request_id: None,
        }
    }

    #[test]
    fn transitions_through_non_terminal_states_freely() {
        let mut op = sample();
        let now = Utc.timestamp_opt(100, 0).unwrap();
        op.apply_transition(ProvisioningState::Provisioning, None, now)
            .unwrap();
        assert_eq!(op.status, ProvisioningState::Provisioning);
        assert_eq!(op.last_transition_time, now);
    }

    #[test]
    fn rejects_leaving_a_terminal_state() {
        let mut op = sample();
        let now = Utc.timestamp_opt(100, 0).unwrap();
        op.apply_transition(ProvisioningState::Succeeded, None, now)
            .unwrap();
        let err = op
            .apply_transition(ProvisioningState::Provisioning, None, now)
            .unwrap_err();
        assert_eq!(err.0, op.operation_id);
        // state must be unchanged by the rejected transition
        assert_eq!(op.status, ProvisioningState::Succeeded);
    }

    #[test]
    fn reapplying_the_same_terminal_state_is_allowed() {
        let mut op = sample();
        let now = Utc.timestamp_opt(100, 0).unwrap();
        op.apply_transition(ProvisioningState::Failed, None, now)
            .unwrap();
        op.apply_transition(ProvisioningState::Failed, None, now)
            .unwrap();
        assert_eq!(op.status, ProvisioningState::Failed);
    }
}
