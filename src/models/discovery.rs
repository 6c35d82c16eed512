//! Upstream pool-manager discovery payload
//!
//! The proxy list is served by a local pool-manager process; the registry
//! is built once from this payload and never changes for the process
//! lifetime.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PoolError, Result};

/// Response of the pool manager's `/v1/proxy_list` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyListResponse {
    pub status: String,
    #[serde(default)]
    pub app_version: String,
    /// Port of the manager's own load-balancing HTTP proxy
    pub lb_port: u16,
    pub open_result_list: Vec<OpenEntry>,
}

impl ProxyListResponse {
    /// Whether the upstream is in a state the registry can be built from
    pub fn is_running(&self) -> bool {
        self.status != "stopped" && !self.open_result_list.is_empty()
    }
}

/// One open proxy endpoint as reported by the pool manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenEntry {
    pub name: String,
    pub proto_model: String,
    pub socks_port: u16,
    pub http_port: u16,
}

impl OpenEntry {
    /// HTTP connection string for this entry on the given host
    pub fn http_endpoint(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.http_port)
    }

    /// SOCKS5 connection string for this entry on the given host
    pub fn socks_endpoint(&self, host: &str) -> String {
        format!("socks5://{}:{}", host, self.socks_port)
    }
}

/// Fetch the proxy list from the upstream pool manager
pub async fn fetch_proxy_list(upstream_url: &str) -> Result<ProxyListResponse> {
    let endpoint = format!("{}/v1/proxy_list", upstream_url.trim_end_matches('/'));
    debug!("Fetching proxy list from {}", endpoint);

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()?;
    let result: ProxyListResponse = client.get(&endpoint).send().await?.json().await?;

    if result.status == "stopped" {
        return Err(PoolError::UpstreamNotRunning {
            status: result.status,
        });
    }
    if result.open_result_list.is_empty() {
        return Err(PoolError::EmptyRegistry);
    }

    Ok(result)
}
