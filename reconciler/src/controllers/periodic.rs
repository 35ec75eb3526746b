//! The shared skeleton every periodic reconciler (§4.8) is built on:
//! `get` from the workqueue, `synchronize`, then `forget+done` on success or
//! `add_rate_limited+done` on failure. A relister feeds the queue from an
//! authoritative source on a jittered interval (≈1 min ±10%, §4.7).

use crate::error::Error;
use crate::workqueue::WorkQueue;
use async_trait::async_trait;
use rand::Rng;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Each periodic reconciler (customer-desired-state sync, data-dump,
/// matching, validation, ...) implements this for its own key type and its
/// own `synchronize` — everything else (dedup, backoff, concurrency) is
/// shared (§4.8 "Same skeleton; each carries its own `synchronize`").
#[async_trait]
pub trait Synchronizer<K>: Send + Sync {
    /// Name used as the controller-record key on the parent resource.
    fn name(&self) -> &str;

    async fn synchronize(&self, key: &K) -> Result<(), Error>;

    /// Authoritative source driving the relister tick.
    async fn relist(&self) -> Result<Vec<K>, Error>;
}

fn jittered(interval: Duration) -> Duration {
    let factor = rand::rng().random_range(0.9..=1.1);
    interval.mul_f64(factor)
}

/// Runs one periodic reconciler until `ctx` is canceled: a relister task
/// plus `concurrency` worker tasks draining the shared workqueue.
pub async fn run<K, S>(
    synchronizer: Arc<S>,
    queue: Arc<WorkQueue<K>>,
    concurrency: usize,
    relist_interval: Duration,
    ctx: CancellationToken,
) where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    S: Synchronizer<K> + 'static,
{
    let relister = {
        let synchronizer = synchronizer.clone();
        let queue = queue.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            loop {
                let wait = jittered(relist_interval);
                tokio::select! {
                    _ = ctx.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
                match synchronizer.relist().await {
                    Ok(keys) => {
                        for key in keys {
                            queue.add(key).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(controller = synchronizer.name(), error = %e, "relist failed");
                    }
                }
            }
        })
    };

    let mut workers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let synchronizer = synchronizer.clone();
        let queue = queue.clone();
        workers.push(tokio::spawn(async move {
            while let Some(key) = queue.get().await {
                match synchronizer.synchronize(&key).await {
                    Ok(()) => queue.forget(&key).await,
                    Err(e) => {
                        tracing::warn!(controller = synchronizer.name(), error = %e, "synchronize failed; retrying with backoff");
                        queue.add_rate_limited(key.clone()).await;
                    }
                }
                queue.done(&key).await;
            }
        }));
    }

    ctx.cancelled().await;
    queue.shutdown().await;
    relister.abort();
    for worker in workers {
        let _ = worker.await;
    }
}
