//! Typed client for the downstream cluster service (`SPEC_FULL.md` §6). A
//! 404 is a first-class domain signal, not an error — callers match on
//! `DownstreamError::NotFound` rather than treating every non-2xx the same.

use chrono::{DateTime, Utc};
use reconciler_types::{ClusterState, CredentialState, InflightCheckState, NodePoolState};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    #[error("downstream resource not found")]
    NotFound,

    #[error("downstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClusterStatus {
    pub state: ClusterState,
    pub provision_error_code: Option<String>,
    pub provision_error_message: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NodePoolStatus {
    pub state: NodePoolState,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct InflightCheck {
    pub name: String,
    pub state: InflightCheckState,
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BreakGlassCredential {
    pub credential_id: String,
    pub state: CredentialState,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Abstracts the cluster service so pollers are testable without an HTTP
/// server in the loop; `ReqwestDownstreamClient` is the production impl.
#[async_trait::async_trait]
pub trait DownstreamClient: Send + Sync {
    async fn get_cluster_status(&self, internal_id: &str) -> Result<ClusterStatus, DownstreamError>;

    async fn get_cluster_inflight_checks(
        &self,
        internal_id: &str,
    ) -> Result<Vec<InflightCheck>, DownstreamError>;

    async fn get_node_pool_status(&self, internal_id: &str) -> Result<NodePoolStatus, DownstreamError>;

    async fn get_break_glass_credential(
        &self,
        internal_id: &str,
    ) -> Result<BreakGlassCredential, DownstreamError>;

    async fn list_break_glass_credentials(
        &self,
        internal_id: &str,
    ) -> Result<Vec<BreakGlassCredential>, DownstreamError>;
}

pub struct ReqwestDownstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestDownstreamClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(ReqwestDownstreamClient { client, base_url })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, DownstreamError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DownstreamError::NotFound);
        }
        let resp = resp.error_for_status()?;
        Ok(resp.json::<T>().await?)
    }
}

/// `Mutex<VecDeque<...>>`-backed fake, in the style of `store::memory`'s
/// `InMemoryStore` — each method pops one queued response per call so a test
/// can script successive polls (e.g. "Installing" then "Ready").
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeDownstreamClient {
        cluster_status: Mutex<VecDeque<Result<ClusterStatus, DownstreamError>>>,
        inflight_checks: Mutex<VecDeque<Vec<InflightCheck>>>,
        node_pool_status: Mutex<VecDeque<NodePoolStatus>>,
        credential: Mutex<VecDeque<BreakGlassCredential>>,
        credentials: Mutex<VecDeque<Vec<BreakGlassCredential>>>,
    }

    impl FakeDownstreamClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_cluster_status(&self, status: ClusterStatus) {
            self.cluster_status.lock().unwrap().push_back(Ok(status));
        }

        pub fn push_cluster_not_found(&self) {
            self.cluster_status.lock().unwrap().push_back(Err(DownstreamError::NotFound));
        }

        pub fn push_inflight_checks(&self, checks: Vec<InflightCheck>) {
            self.inflight_checks.lock().unwrap().push_back(checks);
        }

        pub fn push_credentials(&self, creds: Vec<BreakGlassCredential>) {
            self.credentials.lock().unwrap().push_back(creds);
        }
    }

    #[async_trait::async_trait]
    impl DownstreamClient for FakeDownstreamClient {
        async fn get_cluster_status(&self, _internal_id: &str) -> Result<ClusterStatus, DownstreamError> {
            self.cluster_status
                .lock()
                .unwrap()
                .pop_front()
                .expect("no queued cluster status")
        }

        async fn get_cluster_inflight_checks(
            &self,
            _internal_id: &str,
        ) -> Result<Vec<InflightCheck>, DownstreamError> {
            Ok(self.inflight_checks.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn get_node_pool_status(&self, _internal_id: &str) -> Result<NodePoolStatus, DownstreamError> {
            Ok(self
                .node_pool_status
                .lock()
                .unwrap()
                .pop_front()
                .expect("no queued node pool status"))
        }

        async fn get_break_glass_credential(
            &self,
            _internal_id: &str,
        ) -> Result<BreakGlassCredential, DownstreamError> {
            Ok(self.credential.lock().unwrap().pop_front().expect("no queued credential"))
        }

        async fn list_break_glass_credentials(
            &self,
            _internal_id: &str,
        ) -> Result<Vec<BreakGlassCredential>, DownstreamError> {
            Ok(self
                .credentials
                .lock()
                .unwrap()
                .pop_front()
                .expect("no queued credential list"))
        }
    }
}

#[async_trait::async_trait]
impl DownstreamClient for ReqwestDownstreamClient {
    async fn get_cluster_status(&self, internal_id: &str) -> Result<ClusterStatus, DownstreamError> {
        self.get_json(&format!("/clusters/{internal_id}/status")).await
    }

    async fn get_cluster_inflight_checks(
        &self,
        internal_id: &str,
    ) -> Result<Vec<InflightCheck>, DownstreamError> {
        self.get_json(&format!("/clusters/{internal_id}/inflight-checks")).await
    }

    async fn get_node_pool_status(&self, internal_id: &str) -> Result<NodePoolStatus, DownstreamError> {
        self.get_json(&format!("/node-pools/{internal_id}/status")).await
    }

    async fn get_break_glass_credential(
        &self,
        internal_id: &str,
    ) -> Result<BreakGlassCredential, DownstreamError> {
        self.get_json(&format!("/break-glass-credentials/{internal_id}")).await
    }

    async fn list_break_glass_credentials(
        &self,
        internal_id: &str,
    ) -> Result<Vec<BreakGlassCredential>, DownstreamError> {
        self.get_json(&format!("/clusters/{internal_id}/break-glass-credentials")).await
    }
}
