//! Component D: the operation scanner (`SPEC_FULL.md` §4.4). Owns a bounded
//! channel of subscription IDs and a pool of worker tasks; a *collect*
//! ticker refreshes the registry (owned by `registry::SubscriptionRegistry`
//! itself), a *process* ticker feeds ready subscription IDs to the workers.

use crate::downstream::DownstreamClient;
use crate::lock::SubscriptionLockManager;
use crate::pollers;
use crate::registry::SubscriptionRegistry;
use crate::store::StateStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct OperationScanner {
    registry: Arc<SubscriptionRegistry>,
    lock_manager: Arc<SubscriptionLockManager>,
    store: Arc<dyn StateStore>,
    downstream: Arc<dyn DownstreamClient>,
    http: reqwest::Client,
}

impl OperationScanner {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        lock_manager: Arc<SubscriptionLockManager>,
        store: Arc<dyn StateStore>,
        downstream: Arc<dyn DownstreamClient>,
        http: reqwest::Client,
    ) -> Arc<Self> {
        Arc::new(OperationScanner {
            registry,
            lock_manager,
            store,
            downstream,
            http,
        })
    }

    pub async fn run(self: Arc<Self>, workers: usize, process_interval: Duration, ctx: CancellationToken) {
        let (tx, rx) = mpsc::channel::<Uuid>(workers.max(1) * 4);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut worker_handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let this = self.clone();
            let rx = rx.clone();
            let worker_ctx = ctx.clone();
            worker_handles.push(tokio::spawn(async move {
                this.worker_loop(id, rx, worker_ctx).await;
            }));
        }

        let mut tick = tokio::time::interval(process_interval);
        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tick.tick() => {
                    for subscription_id in self.registry.active_subscriptions() {
                        match tx.try_send(subscription_id) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(id)) => {
                                let start = Instant::now();
                                if tx.send(id).await.is_err() {
                                    break;
                                }
                                let blocked = start.elapsed();
                                metrics::histogram!("operation_scanner_backpressure_seconds")
                                    .record(blocked.as_secs_f64());
                                tracing::warn!(blocked_ms = blocked.as_millis() as u64, "operation scanner channel full");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
        }

        drop(tx);
        for handle in worker_handles {
            let _ = handle.await;
        }
        tracing::info!("operation scanner stopped");
    }

    async fn worker_loop(
        self: Arc<Self>,
        worker_id: usize,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Uuid>>>,
        ctx: CancellationToken,
    ) {
        loop {
            let subscription_id = tokio::select! {
                _ = ctx.cancelled() => return,
                next = async { rx.lock().await.recv().await } => match next {
                    Some(id) => id,
                    None => return,
                },
            };

            let this = self.clone();
            let result = self
                .lock_manager
                .with_subscription_lock(&ctx, subscription_id, move |scoped_ctx| async move {
                    this.scan_subscription(subscription_id, scoped_ctx).await
                })
                .await
                .and_then(|inner| inner);

            match result {
                Ok(()) => {}
                Err(e) if matches!(e, crate::error::Error::LockUnavailable(_)) => {
                    // Policy 8 (§7): skip this subscription for this tick,
                    // log, no metric penalty.
                    tracing::debug!(worker_id, %subscription_id, "subscription lock unavailable this tick");
                }
                Err(e) => {
                    tracing::warn!(worker_id, %subscription_id, error = %e, "subscription scan failed");
                }
            }
        }
    }

    async fn scan_subscription(
        &self,
        subscription_id: Uuid,
        ctx: CancellationToken,
    ) -> Result<(), crate::error::Error> {
        let operations = self.store.list_active_operations(subscription_id).await?;
        for op in operations {
            if ctx.is_cancelled() {
                // Lease/lock lost mid-sync: stop touching this
                // subscription's operations immediately, leaving documents
                // as they are (§8 scenario 5).
                return Ok(());
            }

            let resource = match self.store.get_resource(&op.external_resource_id).await {
                Ok(Some(resource)) => resource,
                Ok(None) => {
                    tracing::warn!(operation_id = %op.operation_id, "operation references a missing resource document");
                    continue;
                }
                Err(e) => {
                    metrics::counter!("operations_failed_total", "type" => "store_read").increment(1);
                    tracing::warn!(operation_id = %op.operation_id, error = %e, "failed to read resource for operation");
                    continue;
                }
            };

            if let Err(e) =
                pollers::dispatch(self.store.as_ref(), self.downstream.as_ref(), &self.http, &resource, &op).await
            {
                let poller_label = resource.kind.to_string();
                metrics::counter!("operations_failed_total", "type" => poller_label).increment(1);
                tracing::warn!(
                    operation_id = %op.operation_id,
                    subscription_id = %subscription_id,
                    error = %e,
                    "poller failed"
                );
            }
        }
        Ok(())
    }
}
