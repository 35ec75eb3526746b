use reconciler_common::postgres::PostgresSettings;
use std::time::Duration;

fn env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Connection settings for the downstream cluster service, grouped the way
/// `PostgresSettings` groups the state-store connection (§10.2) but read
/// straight from the environment rather than through `clap::Parser`.
#[derive(Clone, Debug)]
pub struct DownstreamSettings {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl DownstreamSettings {
    pub fn from_env() -> Self {
        DownstreamSettings {
            base_url: env_string("CLUSTER_SERVICE_URL", "http://localhost:8001"),
            request_timeout: env_duration_secs("CLUSTER_SERVICE_TIMEOUT", Duration::from_secs(10)),
        }
    }
}

/// Redis connection settings backing the leader lease and subscription
/// locks — ephemeral coordination state, kept separate from the durable
/// Postgres document store (§3 "Subscription lock").
#[derive(Clone, Debug)]
pub struct RedisSettings {
    pub url: String,
}

impl RedisSettings {
    pub fn from_env() -> Self {
        RedisSettings {
            url: env_string("REDIS_URL", "redis://localhost:6379"),
        }
    }
}

/// Process-wide configuration, read once at startup. No config-file
/// parsing, no CLI flag parsing — both are explicitly out of scope
/// (`SPEC_FULL.md` §1, §10.2).
#[derive(Clone, Debug)]
pub struct Config {
    pub postgres: PostgresSettings,
    pub redis: RedisSettings,
    pub downstream: DownstreamSettings,

    pub subscription_collect_interval: Duration,
    pub operation_process_interval: Duration,
    pub operation_scanner_workers: usize,
    pub subscription_lock_ttl: Duration,

    pub lease_duration: Duration,
    pub lease_renew_deadline: Duration,
    pub lease_retry_period: Duration,

    pub relister_interval: Duration,
    pub shutdown_timeout: Duration,

    pub node_id: String,
}

impl Config {
    pub fn from_env() -> Self {
        let node_id = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("reconciler-{}", uuid::Uuid::new_v4()));

        Config {
            postgres: PostgresSettings::from_env(),
            redis: RedisSettings::from_env(),
            downstream: DownstreamSettings::from_env(),

            subscription_collect_interval: env_duration_secs(
                "SUBSCRIPTION_COLLECT_INTERVAL",
                Duration::from_secs(600),
            ),
            operation_process_interval: env_duration_secs(
                "OPERATION_PROCESS_INTERVAL",
                Duration::from_secs(10),
            ),
            operation_scanner_workers: env_usize("OPERATION_SCANNER_WORKERS", 10),
            subscription_lock_ttl: env_duration_secs("SUBSCRIPTION_LOCK_TTL", Duration::from_secs(45)),

            lease_duration: env_duration_secs("LEASE_DURATION", Duration::from_secs(15)),
            lease_renew_deadline: env_duration_secs("LEASE_RENEW_DEADLINE", Duration::from_secs(10)),
            lease_retry_period: env_duration_secs("LEASE_RETRY_PERIOD", Duration::from_secs(2)),

            relister_interval: env_duration_secs("RELISTER_INTERVAL", Duration::from_secs(60)),
            shutdown_timeout: env_duration_secs("SHUTDOWN_TIMEOUT", Duration::from_secs(31)),

            node_id,
        }
    }
}
