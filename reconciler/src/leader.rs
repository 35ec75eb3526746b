//! Component A: the leader gate (`SPEC_FULL.md` §4.1). A single
//! process-wide cooperative elector bound to a lease row in the state
//! store's lock/lease table — not a Kubernetes `Lease`, since this process
//! neither runs inside nor depends on a Kubernetes API server. The
//! acquire/renew/release shape mirrors the sibling `storage-operator`'s
//! `kube_leader_election::LeaseLock` contract; the backing primitive is
//! Redis's `SET key val PX ttl NX`, the same one `lock::SubscriptionLockManager`
//! uses for its per-subscription locks.

use crate::config::Config;
use crate::downstream::DownstreamClient;
use crate::error::Error;
use crate::store::StateStore;
use crate::supervisor;
use deadpool_redis::redis::cmd;
use deadpool_redis::Pool;
use reconciler_common::metrics::ReadinessFlag;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const LEASE_KEY: &str = "reconciler:leader-lease";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LeaseLockResult {
    Acquired,
    NotAcquired,
}

pub struct LeaseLock {
    redis: Pool,
    key: String,
    holder_id: String,
    lease_duration: Duration,
    renew_deadline: Duration,
}

impl LeaseLock {
    pub fn new(
        redis: Pool,
        key: impl Into<String>,
        holder_id: String,
        lease_duration: Duration,
        renew_deadline: Duration,
    ) -> Self {
        LeaseLock {
            redis,
            key: key.into(),
            holder_id,
            lease_duration,
            renew_deadline,
        }
    }

    /// Bounded by `renew_deadline`: a Redis round-trip that hangs longer
    /// than this is indistinguishable from one that failed outright, since
    /// either way the lease may expire before we find out (§4.1).
    pub async fn try_acquire_or_renew(&self) -> Result<LeaseLockResult, Error> {
        match tokio::time::timeout(self.renew_deadline, self.try_acquire_or_renew_inner()).await {
            Ok(result) => result,
            Err(_) => Err(Error::LeaseRenewTimedOut),
        }
    }

    async fn try_acquire_or_renew_inner(&self) -> Result<LeaseLockResult, Error> {
        let mut conn = self.redis.get().await?;
        let ttl_ms = self.lease_duration.as_millis() as u64;

        let set: Option<String> = cmd("SET")
            .arg(&self.key)
            .arg(&self.holder_id)
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if set.is_some() {
            return Ok(LeaseLockResult::Acquired);
        }

        let current: Option<String> = cmd("GET").arg(&self.key).query_async(&mut conn).await?;
        if current.as_deref() == Some(self.holder_id.as_str()) {
            let _: () = cmd("PEXPIRE")
                .arg(&self.key)
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await?;
            return Ok(LeaseLockResult::Acquired);
        }

        Ok(LeaseLockResult::NotAcquired)
    }

    /// Best-effort; failure is logged, not propagated — the lease's own TTL
    /// will collect an abandoned lock anyway.
    pub async fn release(&self) {
        let Ok(mut conn) = self.redis.get().await else {
            return;
        };
        let current: Result<Option<String>, _> = cmd("GET").arg(&self.key).query_async(&mut conn).await;
        if matches!(current, Ok(Some(ref v)) if v == &self.holder_id) {
            let _: Result<(), _> = cmd("DEL").arg(&self.key).query_async(&mut conn).await;
        }
    }
}

/// Runs the leader loop until `shutdown` fires: `OnStartedLeading` spawns
/// `supervisor::run` as a child of a derived context; `OnStoppedLeading`
/// (lease lost, or a renew/acquire error) cancels that context and waits
/// for supervised components to drain before resuming standby polling.
pub async fn run(
    config: Config,
    store: Arc<dyn StateStore>,
    downstream: Arc<dyn DownstreamClient>,
    lease_redis: Pool,
    lock_redis: Pool,
    http: reqwest::Client,
    readiness: ReadinessFlag,
    shutdown: CancellationToken,
) {
    let lease = LeaseLock::new(
        lease_redis,
        LEASE_KEY,
        config.node_id.clone(),
        config.lease_duration,
        config.lease_renew_deadline,
    );

    let mut supervised: Option<(CancellationToken, tokio::task::JoinHandle<()>)> = None;
    let mut tick = tokio::time::interval(config.lease_retry_period);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::warn!("shutdown requested; releasing leadership");
                if let Some((ctx, handle)) = supervised.take() {
                    ctx.cancel();
                    let _ = tokio::time::timeout(config.shutdown_timeout, handle).await;
                }
                lease.release().await;
                readiness.set(false);
                return;
            }
            _ = tick.tick() => {}
        }

        match lease.try_acquire_or_renew().await {
            Ok(LeaseLockResult::Acquired) => {
                readiness.set(true);
                if supervised.is_none() {
                    tracing::info!(holder = %config.node_id, "acquired leadership");
                    let leader_ctx = shutdown.child_token();
                    let handle = tokio::spawn(supervisor::run(
                        leader_ctx.clone(),
                        config.clone(),
                        store.clone(),
                        downstream.clone(),
                        lock_redis.clone(),
                        http.clone(),
                    ));
                    supervised = Some((leader_ctx, handle));
                }
            }
            Ok(LeaseLockResult::NotAcquired) => {
                readiness.set(false);
                if let Some((ctx, handle)) = supervised.take() {
                    tracing::warn!("lost leadership; stopping supervised components");
                    ctx.cancel();
                    let _ = handle.await;
                }
            }
            Err(e) => {
                // Policy 9 (§7): can't reach the coordination store, assume
                // not safe to lead.
                readiness.set(false);
                tracing::error!(error = %e, "lease renew/acquire failed");
                if let Some((ctx, handle)) = supervised.take() {
                    ctx.cancel();
                    let _ = handle.await;
                }
            }
        }
    }
}
