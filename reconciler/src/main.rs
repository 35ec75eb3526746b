//! Process entrypoint: bootstrap ambient stack (logging, metrics/health
//! server), build the state store and downstream client, then hand off to
//! the leader gate for the lifetime of the process.

mod config;
mod controllers;
mod downstream;
mod error;
mod leader;
mod lock;
mod notify;
mod pollers;
mod registry;
mod scanner;
mod store;
mod supervisor;
mod util;
mod validations;
mod workqueue;

use config::Config;
use downstream::ReqwestDownstreamClient;
use reconciler_common::metrics::{ReadinessFlag, maybe_spawn_metrics_server};
use std::sync::Arc;
use store::postgres::PostgresStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    reconciler_common::init();

    let config = Config::from_env();
    tracing::info!(node_id = %config.node_id, "starting reconciler");

    let pg_pool = reconciler_common::postgres::create_pool(config.postgres.clone()).await?;
    let store: Arc<dyn store::StateStore> = Arc::new(PostgresStore::new(pg_pool));

    let mut redis_cfg = deadpool_redis::Config::from_url(config.redis.url.clone());
    redis_cfg.pool = Some(deadpool_redis::PoolConfig::new(16));
    let lease_redis = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    let lock_redis = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;

    let downstream: Arc<dyn downstream::DownstreamClient> = Arc::new(ReqwestDownstreamClient::new(
        config.downstream.base_url.clone(),
        config.downstream.request_timeout,
    )?);

    let http = reqwest::Client::builder()
        .timeout(config.downstream.request_timeout)
        .build()?;

    let readiness = ReadinessFlag::new();
    maybe_spawn_metrics_server(config.node_id.clone(), readiness.clone());

    let shutdown = tokio_util::sync::CancellationToken::new();

    let mut leader_handle = tokio::spawn(leader::run(
        config.clone(),
        store,
        downstream,
        lease_redis,
        lock_redis,
        http,
        readiness,
        shutdown.clone(),
    ));

    reconciler_common::shutdown::shutdown_signal().await;
    shutdown.cancel();

    tokio::select! {
        res = &mut leader_handle => {
            if let Err(e) = res {
                tracing::error!(error = %e, "leader task ended unexpectedly");
            }
        }
        _ = reconciler_common::shutdown::force_shutdown_signal() => {
            tracing::error!("forced shutdown; aborting in-flight drain");
            leader_handle.abort();
        }
    }

    Ok(())
}
