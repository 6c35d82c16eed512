//! HTTP-only page fetcher

use async_trait::async_trait;
use tracing::debug;

use super::{FetchOutcome, PageFetcher};
use crate::error::Result;
use crate::models::PageSpec;

/// Fetches pages with a plain HTTP GET through the node's HTTP endpoint
///
/// Builds a fresh client per request: proxies differ per node and keeping
/// idle connections alive through a proxy that is about to be rotated away
/// wastes sockets on the upstream side.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    /// Extra headers applied to every request, e.g. a user agent
    base_headers: Vec<(String, String)>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, proxy_endpoint: &str, page: &PageSpec) -> Result<FetchOutcome> {
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(proxy_endpoint)?)
            .timeout(page.timeout())
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(0)
            .build()?;

        let mut request = client.get(&page.url);
        for (name, value) in &self.base_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        for (name, value) in &page.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(
            "Fetched {} via {}: status {}, {} bytes",
            page.url,
            proxy_endpoint,
            status,
            body.len()
        );

        Ok(FetchOutcome::new(Some(status), body))
    }
}
