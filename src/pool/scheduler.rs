//! Proxy selection and backoff
//!
//! Round-robin rotation over the registry (or over one workload's passing
//! subset), minimum/maximum reuse-interval pacing, cooldown skipping and
//! penalty application.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::registry::{ProxyRegistry, RegistryState};
use super::store::FilterResultStore;
use crate::config::TimingConfig;
use crate::error::{PoolError, Result};
use crate::models::ProxyNode;

/// Pause between retries while every candidate node is cooling down
const SKIP_RETRY_PAUSE: Duration = Duration::from_micros(100);

pub struct Scheduler {
    registry: Arc<ProxyRegistry>,
    store: Arc<FilterResultStore>,
    timing: TimingConfig,
    /// Workload key whose passing subset currently bounds rotation
    restricted: Mutex<Option<String>>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<ProxyRegistry>,
        store: Arc<FilterResultStore>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            registry,
            store,
            timing,
            restricted: Mutex::new(None),
        }
    }

    /// Restrict rotation to the passing subset of a verified workload key
    pub fn restrict_to(&self, key: &str) -> Result<()> {
        if self.store.get(key).is_none() {
            return Err(PoolError::KeyNotFound {
                key: key.to_string(),
            });
        }
        info!("Rotation restricted to filter key '{}'", key);
        *self.restricted.lock() = Some(key.to_string());
        Ok(())
    }

    /// Return to rotating over the full registry
    pub fn clear_restriction(&self) {
        *self.restricted.lock() = None;
    }

    /// Advance the rotation and return the node at the cursor
    ///
    /// Does not pace: a node still cooling down comes back as
    /// `SkipAccessTime` and the cursor has already moved past it, so the
    /// caller retries and lands on the next candidate.
    ///
    /// The returned snapshot carries the node's *previous* access time;
    /// the registry itself is stamped with now. The reuse-interval check
    /// in [`select_with_backoff`](Self::select_with_backoff) depends on
    /// reading the pre-selection value.
    pub fn select_next(&self) -> Result<ProxyNode> {
        let restricted = self.restricted.lock().clone();
        match restricted {
            Some(key) => {
                let index = self.store.rotate_next(&key)?;
                let mut state = self.registry.lock_state();
                self.finish_selection(&mut state, index)
            }
            None => {
                let mut state = self.registry.lock_state();
                let index = state.cursor;
                state.cursor = (state.cursor + 1) % self.registry.len();
                self.finish_selection(&mut state, index)
            }
        }
    }

    fn finish_selection(&self, state: &mut RegistryState, index: usize) -> Result<ProxyNode> {
        let now = Utc::now().timestamp();
        let cooldown_until = state.health[index].cooldown_until;
        if now < cooldown_until {
            return Err(PoolError::SkipAccessTime {
                index,
                until: cooldown_until,
            });
        }

        let node = self.registry.snapshot_locked(state, index);
        state.health[index].last_access_at = now;
        Ok(node)
    }

    /// Find a usable node, blocking until the pool's pacing allows one
    ///
    /// Loops over `select_next`, briefly pausing past nodes in cooldown.
    /// A node on its first ever selection is returned immediately; rate
    /// constraints only apply once a node has history. Otherwise, when
    /// the node was last used within the reuse window, this sleeps a
    /// uniformly-random duration that lands the reuse inside
    /// `[min, max)` seconds since the previous access.
    ///
    /// There is no retry bound: cancel by dropping the future or wrapping
    /// it in `tokio::time::timeout`.
    pub async fn select_with_backoff(&self) -> Result<ProxyNode> {
        loop {
            let node = match self.select_next() {
                Ok(node) => node,
                Err(PoolError::SkipAccessTime { index, until }) => {
                    debug!("Node {} cooling until {}, trying the next one", index, until);
                    sleep(SKIP_RETRY_PAUSE).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if node.first_access {
                // A node must be tried once before rate constraints apply.
                // The flag clears exactly once and is never reset.
                let mut state = self.registry.lock_state();
                state.health[node.index].first_access = false;
                return Ok(node);
            }

            let elapsed = Utc::now().timestamp() - node.last_access_at;
            let min = i64::from(self.timing.reuse_min_secs);
            if elapsed > 0 && elapsed <= min {
                let pause = self.reuse_pause(elapsed);
                info!(
                    "Node {} reused after {}s, sleeping {:.1}s",
                    node.index,
                    elapsed,
                    pause.as_secs_f64()
                );
                sleep(pause).await;
            } else if elapsed < 0 {
                // Clock skew or a concurrent selection raced us; harmless.
                warn!(
                    "Node {} last access is {}s ahead of now, ignoring",
                    node.index, -elapsed
                );
            }

            return Ok(node);
        }
    }

    /// Put a node on cooldown for `penalty_secs` from now
    pub fn apply_penalty(&self, index: usize, penalty_secs: i64) -> Result<()> {
        self.registry
            .apply_cooldown(index, Utc::now().timestamp() + penalty_secs)
    }

    /// Put a node on cooldown for the configured penalty duration
    pub fn apply_default_penalty(&self, index: usize) -> Result<()> {
        self.apply_penalty(index, self.timing.penalty_secs)
    }

    /// Uniformly-random pause placing the reuse inside the configured
    /// window, given how much of it has already elapsed
    fn reuse_pause(&self, elapsed: i64) -> Duration {
        let min_ms = (i64::from(self.timing.reuse_min_secs) - elapsed).max(0) * 1000;
        let max_ms = (i64::from(self.timing.reuse_max_secs) - elapsed).max(0) * 1000;
        if max_ms <= min_ms {
            return Duration::from_millis(min_ms as u64);
        }
        let ms = rand::thread_rng().gen_range(min_ms..max_ms);
        Duration::from_millis(ms as u64)
    }
}
