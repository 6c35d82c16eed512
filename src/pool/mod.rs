//! The proxy pool core
//!
//! Owns the registry, the rotation scheduler, the verification engine and
//! the filter result store, and exposes the surface the embedding
//! application works against. All state is owned here and constructed
//! explicitly; there are no process-wide singletons.

pub mod check;
pub mod content;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod verify;

pub use check::{classify, default_filter_rules, PageCheck, RuleOp, StatusRule};
pub use content::{contains_any, contains_any_regex, WordChecks};
pub use registry::ProxyRegistry;
pub use scheduler::Scheduler;
pub use store::{FilterResult, FilterResultStore};
pub use verify::VerificationEngine;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::error::{PoolError, Result};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::models::discovery;
use crate::models::{FetchMode, FilterWorkload, ProxyNode};

pub struct ProxyPool {
    registry: Arc<ProxyRegistry>,
    scheduler: Arc<Scheduler>,
    store: Arc<FilterResultStore>,
    engine: VerificationEngine,
    /// The upstream manager's own load-balancing proxy, when discovered
    lb_http_url: Option<String>,
}

impl ProxyPool {
    /// Assemble a pool around an already-built registry
    ///
    /// Reloads any persisted filter results from the configured cache
    /// directory; a corrupt cache file fails construction.
    pub fn new(registry: ProxyRegistry, config: &Config) -> Result<Self> {
        let registry = Arc::new(registry);
        let store = Arc::new(FilterResultStore::new(config.cache_dir.clone()));
        store.load_all()?;

        let scheduler = Arc::new(Scheduler::new(
            registry.clone(),
            store.clone(),
            config.timing.clone(),
        ));
        let engine = VerificationEngine::new(
            registry.clone(),
            scheduler.clone(),
            store.clone(),
            config.timing.clone(),
            Arc::new(HttpFetcher::new()),
        );

        Ok(Self {
            registry,
            scheduler,
            store,
            engine,
            lb_http_url: None,
        })
    }

    /// Discover the proxy list from the upstream manager and build a pool
    pub async fn from_upstream(config: &Config) -> Result<Self> {
        let result = discovery::fetch_proxy_list(&config.upstream_url).await?;
        let host = upstream_host(&config.upstream_url)?;

        let registry = ProxyRegistry::from_discovery(&result, &host)?;
        info!(
            "Discovered {} proxy node(s) from {}",
            registry.len(),
            config.upstream_url
        );

        let mut pool = Self::new(registry, config)?;
        pool.lb_http_url = Some(format!("http://{}:{}", host, result.lb_port));
        Ok(pool)
    }

    /// Swap the HTTP fetcher driven by `FetchMode::HttpOnly`
    pub fn with_http_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.engine = self.engine.with_http_fetcher(fetcher);
        self
    }

    /// Install a browser-backed fetcher for `FetchMode::BrowserPage`
    pub fn with_browser_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.engine = self.engine.with_browser_fetcher(fetcher);
        self
    }

    /// Replace the status-code rules verification sweeps run with
    pub fn with_filter_rules(mut self, rules: Vec<StatusRule>) -> Self {
        self.engine = self.engine.with_rules(rules);
        self
    }

    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    /// Copy of the node at `index`
    pub fn node(&self, index: usize) -> Result<ProxyNode> {
        self.registry.snapshot(index)
    }

    /// The upstream manager's load-balancing HTTP proxy URL, when known
    pub fn lb_http_url(&self) -> Option<&str> {
        self.lb_http_url.as_deref()
    }

    /// Find a usable node, honoring cooldowns and the reuse interval
    pub async fn select_with_backoff(&self) -> Result<ProxyNode> {
        self.scheduler.select_with_backoff().await
    }

    /// Advance rotation without pacing; see [`Scheduler::select_next`]
    pub fn select_next(&self) -> Result<ProxyNode> {
        self.scheduler.select_next()
    }

    /// Put a node on cooldown for `penalty_secs` from now
    pub fn apply_penalty(&self, index: usize, penalty_secs: i64) -> Result<()> {
        self.scheduler.apply_penalty(index, penalty_secs)
    }

    /// Verify every node against the workload and cache the passing subset
    pub async fn filter(
        &self,
        workload: &FilterWorkload,
        concurrency: usize,
        mode: FetchMode,
    ) -> Result<()> {
        self.engine
            .filter(workload, concurrency, mode, watch::channel(false).1)
            .await
    }

    /// Like [`filter`](Self::filter) with an external cancellation signal
    pub async fn filter_with_cancel(
        &self,
        workload: &FilterWorkload,
        concurrency: usize,
        mode: FetchMode,
        cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        self.engine.filter(workload, concurrency, mode, cancel).await
    }

    /// Passing registry indices for a verified key; `None` means the key
    /// was never verified
    pub fn passing_indices(&self, key: &str) -> Option<Vec<usize>> {
        self.store.get(key)
    }

    /// Round-robin the next passing index for a verified key
    pub fn rotate_next(&self, key: &str) -> Result<usize> {
        self.store.rotate_next(key)
    }

    /// Restrict rotation to a verified key's passing subset
    pub fn restrict_to(&self, key: &str) -> Result<()> {
        self.scheduler.restrict_to(key)
    }

    /// Return to rotating over the full registry
    pub fn clear_restriction(&self) {
        self.scheduler.clear_restriction()
    }

    /// Apply the configured success-word check to a fetched body
    ///
    /// A miss penalizes the node: the page came back, but not as the page
    /// the workload expects, which usually means the egress is blocked.
    pub fn check_success_words(&self, index: usize, body: &str, checks: &WordChecks) -> Result<bool> {
        if !checks.is_enabled() {
            return Ok(true);
        }
        if checks.find_match(body)?.is_none() {
            self.scheduler.apply_default_penalty(index)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Apply the configured fail-word check to a fetched body
    ///
    /// Returns the matched word or pattern; a hit penalizes the node.
    pub fn check_fail_words(
        &self,
        index: usize,
        body: &str,
        checks: &WordChecks,
    ) -> Result<Option<String>> {
        if !checks.is_enabled() {
            return Ok(None);
        }
        match checks.find_match(body)? {
            Some(word) => {
                self.scheduler.apply_default_penalty(index)?;
                Ok(Some(word))
            }
            None => Ok(None),
        }
    }
}

fn upstream_host(upstream_url: &str) -> Result<String> {
    let url = Url::parse(upstream_url)
        .map_err(|e| PoolError::InvalidConfig(format!("invalid upstream URL: {}", e)))?;
    url.host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| PoolError::InvalidConfig("upstream URL has no host".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::fetch::FetchOutcome;
    use crate::models::PageSpec;
    use crate::pool::registry::test_descriptors;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    /// Accepts every node whose index is even, 403s the rest
    struct ParityFetcher;

    #[async_trait]
    impl PageFetcher for ParityFetcher {
        async fn fetch(&self, proxy_endpoint: &str, _page: &PageSpec) -> Result<FetchOutcome> {
            let port: u16 = proxy_endpoint.rsplit(':').next().unwrap().parse().unwrap();
            if (port - 10000) % 2 == 0 {
                Ok(FetchOutcome::new(Some(200), "welcome"))
            } else {
                Ok(FetchOutcome::new(Some(403), "denied"))
            }
        }
    }

    fn test_config(cache_dir: &Path) -> Config {
        Config {
            upstream_url: "http://127.0.0.1:19038".to_string(),
            cache_dir: cache_dir.to_path_buf(),
            filter_workers: 2,
            timing: TimingConfig::default(),
            success_words: WordChecks::default(),
            fail_words: WordChecks::default(),
        }
    }

    fn probe_workload(key: &str) -> FilterWorkload {
        FilterWorkload::new(
            key,
            vec![PageSpec {
                name: "probe".to_string(),
                url: "https://target/".to_string(),
                timeout_secs: 15,
                headers: HashMap::new(),
                success_words: Vec::new(),
                exist_xpaths: Vec::new(),
            }],
        )
    }

    fn pool_with_parity_fetcher(cache_dir: &Path, nodes: usize) -> ProxyPool {
        let registry = ProxyRegistry::new(test_descriptors(nodes)).unwrap();
        ProxyPool::new(registry, &test_config(cache_dir))
            .unwrap()
            .with_http_fetcher(Arc::new(ParityFetcher))
    }

    #[tokio::test]
    async fn test_filter_then_restricted_selection() {
        let tmp = TempDir::new().unwrap();
        let pool = pool_with_parity_fetcher(tmp.path(), 4);

        assert!(pool.passing_indices("k").is_none());
        assert!(matches!(
            pool.restrict_to("k"),
            Err(PoolError::KeyNotFound { .. })
        ));

        pool.filter(&probe_workload("k"), 2, FetchMode::HttpOnly)
            .await
            .unwrap();

        let mut passing = pool.passing_indices("k").unwrap();
        passing.sort_unstable();
        assert_eq!(passing, vec![0, 2]);

        pool.restrict_to("k").unwrap();
        let first = pool.select_with_backoff().await.unwrap();
        let second = pool.select_with_backoff().await.unwrap();
        assert!(passing.contains(&first.index));
        assert!(passing.contains(&second.index));
        assert_ne!(first.index, second.index);
    }

    #[tokio::test]
    async fn test_persisted_results_survive_restart() {
        let tmp = TempDir::new().unwrap();
        {
            let pool = pool_with_parity_fetcher(tmp.path(), 4);
            pool.filter(&probe_workload("k"), 2, FetchMode::HttpOnly)
                .await
                .unwrap();
        }

        // A new pool over the same cache directory sees the result
        // without any sweep.
        let pool = pool_with_parity_fetcher(tmp.path(), 4);
        let mut passing = pool.passing_indices("k").unwrap();
        passing.sort_unstable();
        assert_eq!(passing, vec![0, 2]);
        pool.restrict_to("k").unwrap();
    }

    #[tokio::test]
    async fn test_rotate_next_within_key() {
        let tmp = TempDir::new().unwrap();
        let pool = pool_with_parity_fetcher(tmp.path(), 4);
        pool.filter(&probe_workload("k"), 2, FetchMode::HttpOnly)
            .await
            .unwrap();

        let a = pool.rotate_next("k").unwrap();
        let b = pool.rotate_next("k").unwrap();
        let c = pool.rotate_next("k").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[tokio::test]
    async fn test_word_check_helpers_penalize() {
        let tmp = TempDir::new().unwrap();
        let pool = pool_with_parity_fetcher(tmp.path(), 2);

        let success = WordChecks::new(vec!["member area".to_string()], vec![]);
        assert!(pool.check_success_words(0, "the member AREA", &success).unwrap());
        assert_eq!(pool.node(0).unwrap().cooldown_until, 0);

        assert!(!pool.check_success_words(0, "unrelated", &success).unwrap());
        assert!(pool.node(0).unwrap().cooldown_until > Utc::now().timestamp());

        let fail = WordChecks::new(vec!["captcha".to_string()], vec![]);
        assert_eq!(pool.check_fail_words(1, "all fine", &fail).unwrap(), None);
        assert_eq!(pool.node(1).unwrap().cooldown_until, 0);

        assert_eq!(
            pool.check_fail_words(1, "solve this CAPTCHA", &fail).unwrap(),
            Some("captcha".to_string())
        );
        assert!(pool.node(1).unwrap().cooldown_until > Utc::now().timestamp());
    }

    #[test]
    fn test_upstream_host_extraction() {
        assert_eq!(
            upstream_host("http://192.168.50.233:19038").unwrap(),
            "192.168.50.233"
        );
        assert!(upstream_host("not a url").is_err());
    }
}
