//! Component B: the subscription registry (`SPEC_FULL.md` §4.2). A periodic
//! pass over the subscription container publishing the current set of
//! active (non-`Unregistered`) subscription IDs.

use crate::store::StateStore;
use metrics::gauge;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Default)]
pub struct SubscriptionRegistry {
    active: RwLock<Vec<Uuid>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn active_subscriptions(&self) -> Vec<Uuid> {
        self.active.read().unwrap().clone()
    }

    /// Runs the collect tick until `ctx` is canceled. On a transient store
    /// failure, the previous list is retained — no cache invalidation on
    /// error (§4.2).
    pub async fn run(
        self: Arc<Self>,
        store: Arc<dyn StateStore>,
        interval: Duration,
        ctx: CancellationToken,
    ) {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    tracing::info!("subscription registry stopping");
                    return;
                }
                _ = tick.tick() => {}
            }

            match store.list_subscriptions().await {
                Ok(subs) => {
                    let mut counts: HashMap<&'static str, u64> = HashMap::new();
                    let active: Vec<Uuid> = subs
                        .iter()
                        .filter(|s| s.state.is_active())
                        .map(|s| s.subscription_id)
                        .collect();
                    for sub in &subs {
                        let key = match sub.state {
                            reconciler_types::SubscriptionState::Registered => "Registered",
                            reconciler_types::SubscriptionState::Unregistered => "Unregistered",
                            reconciler_types::SubscriptionState::Warned => "Warned",
                            reconciler_types::SubscriptionState::Suspended => "Suspended",
                            reconciler_types::SubscriptionState::Deleted => "Deleted",
                        };
                        *counts.entry(key).or_default() += 1;
                    }
                    for (state, count) in &counts {
                        gauge!("subscriptions_by_state", "state" => *state).set(*count as f64);
                    }
                    tracing::debug!(active = active.len(), total = subs.len(), "refreshed subscription registry");
                    *self.active.write().unwrap() = active;
                }
                Err(e) => {
                    metrics::counter!("subscription_registry_errors_total").increment(1);
                    tracing::warn!(error = %e, "failed to refresh subscription registry; keeping previous list");
                }
            }
        }
    }
}
