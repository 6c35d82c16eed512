//! Workload verification sweep
//!
//! Drives every registered proxy through a named workload under a bounded
//! worker pool and records which nodes satisfy it. Results are cached per
//! key with a staleness TTL so repeated calls stay cheap.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::check::{classify, PageCheck, StatusRule};
use super::content::contains_any;
use super::registry::ProxyRegistry;
use super::scheduler::Scheduler;
use super::store::FilterResultStore;
use crate::config::TimingConfig;
use crate::error::{PoolError, Result};
use crate::fetch::PageFetcher;
use crate::models::{FetchMode, FilterWorkload, PageSpec, ProxyNode};

pub struct VerificationEngine {
    registry: Arc<ProxyRegistry>,
    scheduler: Arc<Scheduler>,
    store: Arc<FilterResultStore>,
    timing: TimingConfig,
    rules: Vec<StatusRule>,
    http_fetcher: Arc<dyn PageFetcher>,
    browser_fetcher: Option<Arc<dyn PageFetcher>>,
}

impl VerificationEngine {
    pub fn new(
        registry: Arc<ProxyRegistry>,
        scheduler: Arc<Scheduler>,
        store: Arc<FilterResultStore>,
        timing: TimingConfig,
        http_fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            registry,
            scheduler,
            store,
            timing,
            rules: super::check::default_filter_rules(),
            http_fetcher,
            browser_fetcher: None,
        }
    }

    /// Swap the fetcher driven by `FetchMode::HttpOnly`
    pub fn with_http_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.http_fetcher = fetcher;
        self
    }

    /// Install a browser-backed fetcher for `FetchMode::BrowserPage`
    pub fn with_browser_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.browser_fetcher = Some(fetcher);
        self
    }

    /// Replace the status-code rule set used during sweeps
    pub fn with_rules(mut self, rules: Vec<StatusRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Verify every node against the workload and cache the passing subset
    ///
    /// Skips the network entirely when a fresh, non-empty result is
    /// already cached for the key. Cancellation stops further nodes from
    /// being picked up, lets in-flight ones finish, and leaves the key
    /// uncommitted.
    #[instrument(skip_all, fields(key = %workload.key))]
    pub async fn filter(
        &self,
        workload: &FilterWorkload,
        concurrency: usize,
        mode: FetchMode,
        cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        if concurrency == 0 {
            return Err(PoolError::InvalidConfig(
                "filter concurrency must be at least 1".to_string(),
            ));
        }
        let fetcher = self.fetcher_for(mode)?;

        let now = Utc::now().timestamp();
        if self
            .store
            .is_fresh(&workload.key, self.timing.filter_ttl_secs(), now)
        {
            info!("Cached result still fresh, skipping re-verification");
            return Ok(());
        }

        info!(
            "Sweep start: {} nodes, {} workers, mode {}",
            self.registry.len(),
            concurrency,
            mode
        );
        self.store.begin_sweep(&workload.key);

        futures::stream::iter(0..self.registry.len())
            .map(|index| {
                let fetcher = fetcher.clone();
                let cancel = cancel.clone();
                async move {
                    // A cancelled sweep stops picking up nodes; tasks that
                    // already started keep running to completion.
                    if *cancel.borrow() {
                        debug!("Node {} not started, sweep cancelled", index);
                        return;
                    }
                    self.verify_node(index, workload, fetcher).await;
                }
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<()>>()
            .await;

        if *cancel.borrow() {
            warn!("Sweep cancelled, result not committed");
            return Err(PoolError::Cancelled {
                key: workload.key.clone(),
            });
        }

        let passed = self.store.commit(&workload.key)?;
        info!("Sweep end: {}/{} nodes passed", passed, self.registry.len());

        if passed == 0 {
            return Err(PoolError::EmptyFilterResult {
                key: workload.key.clone(),
            });
        }
        Ok(())
    }

    fn fetcher_for(&self, mode: FetchMode) -> Result<Arc<dyn PageFetcher>> {
        match mode {
            FetchMode::HttpOnly => Ok(self.http_fetcher.clone()),
            FetchMode::BrowserPage => self.browser_fetcher.clone().ok_or_else(|| {
                PoolError::InvalidConfig("no browser fetcher installed".to_string())
            }),
        }
    }

    /// Walk one node through every page of the workload in order
    async fn verify_node(
        &self,
        index: usize,
        workload: &FilterWorkload,
        fetcher: Arc<dyn PageFetcher>,
    ) {
        let node = match self.registry.snapshot(index) {
            Ok(node) => node,
            Err(e) => {
                warn!("Node {} vanished from registry: {}", index, e);
                return;
            }
        };

        debug!("Node {} ({}) start", index, node.name);
        for page in &workload.pages {
            if !self.verify_page(&node, page, fetcher.as_ref()).await {
                debug!("Node {} ({}) failed on '{}'", index, node.name, page.name);
                return;
            }
        }

        self.store.record_pass(&workload.key, index);
        info!("Node {} ({}) passed", index, node.name);
    }

    /// One fetch-and-validate step; false fails the node's evaluation
    async fn verify_page(&self, node: &ProxyNode, page: &PageSpec, fetcher: &dyn PageFetcher) -> bool {
        let outcome = match fetcher.fetch(&node.http_endpoint, page).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Transport failure with no usable response: retryable,
                // not proof of a bad proxy, so no cooldown.
                warn!("Node {} fetch of '{}' failed: {}", node.index, page.url, e);
                return false;
            }
        };

        let (verdict, penalize) = classify(outcome.status, &self.rules);
        if verdict != PageCheck::Success {
            warn!(
                "Node {} on '{}': status {:?} classified {}",
                node.index, page.url, outcome.status, verdict
            );
            if penalize {
                self.penalize(node.index);
            }
            return false;
        }

        if page.has_success_words() && contains_any(&outcome.body, &page.success_words).is_none() {
            warn!(
                "Node {} on '{}': success words missing",
                node.index, page.url
            );
            self.penalize(node.index);
            return false;
        }

        true
    }

    fn penalize(&self, index: usize) {
        if let Err(e) = self.scheduler.apply_default_penalty(index) {
            warn!("Failed to penalize node {}: {}", index, e);
        }
    }
}
