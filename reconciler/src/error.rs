use reconciler_types::{OperationError, TerminalTransitionRejected};
use uuid::Uuid;

/// Crate-root error hierarchy. Distinguishes infra failures (policy 1, §7)
/// from domain failures (policies 2-6) from configuration failures, so call
/// sites can `match` on policy instead of string content.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("state store error: {0}")]
    Store(#[from] tokio_postgres::Error),

    #[error("state store pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    #[error("downstream HTTP error: {0}")]
    Downstream(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Policy 2: optimistic-concurrency precondition failure. Benign —
    /// someone else advanced the state first.
    #[error("precondition failed for {document}: expected {expected}")]
    PreconditionFailed { document: String, expected: String },

    /// Policy 5: unmapped downstream state.
    #[error("no conversion from downstream state {downstream_state} (current={current_state:?}, request={request_kind}) for resource {resource_id}")]
    UnmappedState {
        resource_id: String,
        downstream_state: String,
        current_state: reconciler_types::ProvisioningState,
        request_kind: reconciler_types::RequestKind,
    },

    #[error("operation already terminal: {0}")]
    TerminalTransitionRejected(#[from] TerminalTransitionRejected),

    #[error("subscription lock unavailable for {0}")]
    LockUnavailable(Uuid),

    /// The lease acquire/renew round-trip didn't finish inside the
    /// configured renew deadline (§4.1) — treated as a failed renewal.
    #[error("lease renew deadline exceeded")]
    LeaseRenewTimedOut,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("domain error: {0:?}")]
    Domain(OperationError),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for errors that represent a benign no-op rather than a failure
    /// that should be logged/metric'd as an error (§7 policy 2).
    pub fn is_benign_precondition_failure(&self) -> bool {
        matches!(self, Error::PreconditionFailed { .. })
    }
}
