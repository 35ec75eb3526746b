//! Wires components B-F together under the leader context. Started by
//! `leader::run` on `OnStartedLeading`; every task here receives the same
//! `ctx` and is expected to drain promptly when it is canceled
//! (`OnStoppedLeading`, §4.1).

use crate::config::Config;
use crate::controllers::desired_state::DesiredStateSynchronizer;
use crate::controllers::{Controller, PeriodicController};
use crate::downstream::DownstreamClient;
use crate::lock::SubscriptionLockManager;
use crate::registry::SubscriptionRegistry;
use crate::scanner::OperationScanner;
use crate::store::StateStore;
use crate::validations::ValidationSynchronizer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn run(
    ctx: CancellationToken,
    config: Config,
    store: Arc<dyn StateStore>,
    downstream: Arc<dyn DownstreamClient>,
    lock_redis: deadpool_redis::Pool,
    http: reqwest::Client,
) {
    tracing::info!("supervisor starting reconciler components");

    let registry = SubscriptionRegistry::new();
    let lock_manager = Arc::new(SubscriptionLockManager::new(
        lock_redis,
        config.subscription_lock_ttl,
        config.node_id.clone(),
    ));
    let scanner = OperationScanner::new(
        registry.clone(),
        lock_manager.clone(),
        store.clone(),
        downstream.clone(),
        http.clone(),
    );

    let registry_handle = tokio::spawn(registry.clone().run(
        store.clone(),
        config.subscription_collect_interval,
        ctx.clone(),
    ));

    let scanner_handle = tokio::spawn(scanner.run(
        config.operation_scanner_workers,
        config.operation_process_interval,
        ctx.clone(),
    ));

    let controllers: Vec<Arc<dyn Controller>> = vec![
        Arc::new(PeriodicController::new(
            DesiredStateSynchronizer::new(store.clone(), downstream.clone()),
            config.relister_interval,
        )),
        // No concrete cluster validations are registered here: outbound
        // Azure-control-plane checks (resource-group existence, RP
        // registration) are out of scope and only modeled through the
        // `ClusterValidation` interface itself.
        Arc::new(PeriodicController::new(
            ValidationSynchronizer::new(store.clone(), Vec::new()),
            config.relister_interval,
        )),
    ];

    let controller_handles: Vec<_> = controllers
        .into_iter()
        .map(|controller| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tracing::info!(controller = controller.name(), "starting controller");
                controller.run(2, ctx).await;
            })
        })
        .collect();

    ctx.cancelled().await;
    tracing::info!("supervisor received cancellation; draining supervised components");

    let _ = registry_handle.await;
    let _ = scanner_handle.await;
    for handle in controller_handles {
        let _ = handle.await;
    }

    tracing::info!("supervisor drained cleanly");
}
