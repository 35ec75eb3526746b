use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mirrors the subscription lifecycle owned by the external subscription API.
/// The reconciler only ever reads this; see `SPEC_FULL.md` §3.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Registered,
    Unregistered,
    Warned,
    Suspended,
    Deleted,
}

impl SubscriptionState {
    /// An `Unregistered` subscription contributes no work to the operation
    /// scanner (invariant I5). Every other state is eligible.
    pub fn is_active(self) -> bool {
        !matches!(self, SubscriptionState::Unregistered)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub state: SubscriptionState,
}
