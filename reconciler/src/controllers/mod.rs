//! Controllers-as-plugins (§9): a controller is a value satisfying
//! `{name(), run(ctx, concurrency)}`. The supervisor starts every registered
//! controller on leader acquisition; each wraps the shared workqueue
//! skeleton (`periodic::run`) around its own `Synchronizer`.

pub mod desired_state;
pub mod periodic;

use crate::workqueue::WorkQueue;
use async_trait::async_trait;
use periodic::Synchronizer;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Controller: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, concurrency: usize, ctx: CancellationToken);
}

/// Adapts any `Synchronizer<K>` into a `Controller` by pairing it with a
/// dedicated workqueue and relist interval.
pub struct PeriodicController<K: Eq + Hash + Clone + Send + Sync + 'static, S: Synchronizer<K> + 'static> {
    synchronizer: Arc<S>,
    queue: Arc<WorkQueue<K>>,
    relist_interval: Duration,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static, S: Synchronizer<K> + 'static> PeriodicController<K, S> {
    pub fn new(synchronizer: S, relist_interval: Duration) -> Self {
        PeriodicController {
            synchronizer: Arc::new(synchronizer),
            queue: WorkQueue::new(),
            relist_interval,
        }
    }
}

#[async_trait]
impl<K: Eq + Hash + Clone + Send + Sync + 'static, S: Synchronizer<K> + 'static> Controller for PeriodicController<K, S> {
    fn name(&self) -> &str {
        self.synchronizer.name()
    }

    async fn run(&self, concurrency: usize, ctx: CancellationToken) {
        periodic::run(
            self.synchronizer.clone(),
            self.queue.clone(),
            concurrency,
            self.relist_interval,
            ctx,
        )
        .await;
    }
}
