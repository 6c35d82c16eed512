//! Page-fetch collaborator boundary
//!
//! The pool verifies proxies by driving them through target pages, but it
//! does not own browser lifecycle or tab management. Fetching is consumed
//! behind [`PageFetcher`]; the crate ships an HTTP-only implementation and
//! the embedding application injects a browser-backed one when rendered
//! pages are required.

mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::PageSpec;

/// What one fetch attempt produced
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Observed status code; `None` means no response event was seen at
    /// all (the page may still have rendered partially). Most often a
    /// transport artifact, so classification treats it as retryable
    /// rather than as proof of a bad proxy.
    pub status: Option<u16>,
    /// Rendered or raw body text
    pub body: String,
}

impl FetchOutcome {
    pub fn new(status: Option<u16>, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Fetches one page through one proxy endpoint
///
/// An `Err` return means transport failure with no usable response; a
/// timeout that still yielded a usable page must be returned as `Ok`.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, proxy_endpoint: &str, page: &PageSpec) -> Result<FetchOutcome>;
}
