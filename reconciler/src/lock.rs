//! Component C: the subscription lock manager (`SPEC_FULL.md` §4.3). A
//! coarse named lock keyed by subscription ID, backed by the same
//! `SET key val EX ttl NX` pattern `reconciler_common`'s sibling services use
//! for ephemeral coordination (see the wait-registry dispatch guard this is
//! modeled on) — separate from the durable Postgres document store.

use crate::error::Error;
use deadpool_redis::Pool;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct SubscriptionLockManager {
    redis: Pool,
    ttl: Duration,
    holder_id: String,
}

fn lock_key(subscription_id: Uuid) -> String {
    format!("subscription-lock:{subscription_id}")
}

impl SubscriptionLockManager {
    pub fn new(redis: Pool, ttl: Duration, holder_id: String) -> Self {
        SubscriptionLockManager { redis, ttl, holder_id }
    }

    async fn acquire(&self, subscription_id: Uuid) -> Result<bool, Error> {
        let mut conn = self.redis.get().await?;
        let set: Option<String> = deadpool_redis::redis::cmd("SET")
            .arg(lock_key(subscription_id))
            .arg(&self.holder_id)
            .arg("EX")
            .arg(self.ttl.as_secs())
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }

    async fn renew(&self, subscription_id: Uuid) -> Result<bool, Error> {
        // Renew only if we still hold it: compare-then-extend, mirroring the
        // acquire/renew contract of the lease lock (leader.rs) at a smaller
        // TTL and keyed per subscription rather than process-wide.
        let mut conn = self.redis.get().await?;
        let current: Option<String> = deadpool_redis::redis::cmd("GET")
            .arg(lock_key(subscription_id))
            .query_async(&mut conn)
            .await?;
        if current.as_deref() != Some(self.holder_id.as_str()) {
            return Ok(false);
        }
        let _: () = deadpool_redis::redis::cmd("EXPIRE")
            .arg(lock_key(subscription_id))
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(true)
    }

    async fn release(&self, subscription_id: Uuid) {
        let Ok(mut conn) = self.redis.get().await else {
            return;
        };
        let current: Result<Option<String>, _> = deadpool_redis::redis::cmd("GET")
            .arg(lock_key(subscription_id))
            .query_async(&mut conn)
            .await;
        if matches!(current, Ok(Some(ref v)) if v == &self.holder_id) {
            let _: Result<(), _> = deadpool_redis::redis::cmd("DEL")
                .arg(lock_key(subscription_id))
                .query_async(&mut conn)
                .await;
        }
        // A release failure is non-fatal: the TTL will eventually collect
        // the key anyway (§3 "Subscription lock" invariant).
    }

    /// Acquires the lock, installs a renewal holder task, invokes `f` with a
    /// derived context that is canceled if renewal ever fails, then
    /// best-effort releases. Returns `Error::LockUnavailable` without
    /// calling `f` if the initial acquire fails.
    pub async fn with_subscription_lock<F, Fut, T>(
        &self,
        parent: &CancellationToken,
        subscription_id: Uuid,
        f: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.acquire(subscription_id).await? {
            return Err(Error::LockUnavailable(subscription_id));
        }

        let derived = parent.child_token();
        let renew_every = self.ttl / 3;
        let holder_derived = derived.clone();
        let holder = SubscriptionLockManager {
            redis: self.redis.clone(),
            ttl: self.ttl,
            holder_id: self.holder_id.clone(),
        };
        let renew_handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(renew_every);
            tick.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = holder_derived.cancelled() => break,
                    _ = tick.tick() => {
                        match holder.renew(subscription_id).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tracing::warn!(%subscription_id, "subscription lock lost on renewal; cancelling scope");
                                holder_derived.cancel();
                                break;
                            }
                            Err(e) => {
                                tracing::warn!(%subscription_id, error = %e, "subscription lock renewal failed; cancelling scope");
                                holder_derived.cancel();
                                break;
                            }
                        }
                    }
                }
            }
        });

        let result = f(derived.clone()).await;

        renew_handle.abort();
        self.release(subscription_id).await;
        Ok(result)
    }
}
