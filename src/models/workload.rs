use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the verification engine should drive each page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Render the page through the embedding application's browser fetcher
    BrowserPage,
    /// Plain HTTP GET through the node's HTTP endpoint
    #[default]
    HttpOnly,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::BrowserPage => "browser_page",
            FetchMode::HttpOnly => "http_only",
        }
    }
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One fetch-and-validate step of a verification workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpec {
    /// What this page is meant to prove
    pub name: String,
    pub url: String,
    /// Per-page load timeout in seconds
    pub timeout_secs: u64,
    /// Header overrides sent with the fetch
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Body must contain at least one of these; empty disables the check
    #[serde(default)]
    pub success_words: Vec<String>,
    /// Element locators that must exist; only meaningful for browser fetches
    #[serde(default)]
    pub exist_xpaths: Vec<String>,
}

impl PageSpec {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_success_words(&self) -> bool {
        !self.success_words.is_empty()
    }
}

/// A named, ordered sequence of pages used as the acceptance test during a
/// verification sweep. A proxy passes only if every page succeeds in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterWorkload {
    /// Identifies the verification target; doubles as the cache key
    pub key: String,
    pub pages: Vec<PageSpec>,
}

impl FilterWorkload {
    pub fn new(key: impl Into<String>, pages: Vec<PageSpec>) -> Self {
        Self {
            key: key.into(),
            pages,
        }
    }
}
