//! Roundabout - Rotating Outbound Proxy Pool
//!
//! A concurrency-safe pool manager for scraping clients deciding, per
//! outgoing request, which proxy to use, whether a proxy is currently
//! healthy enough to use, and whether a fetched page should be accepted,
//! retried, or discarded.
//!
//! ## Features
//!
//! - Round-robin rotation with per-node reuse-interval pacing
//! - Cooldown penalties for nodes that trip blocks or bot detection
//! - Rule-based status-code classification (skip / repeat / success)
//! - Success-word and fail-word body checks
//! - Bounded-concurrency verification sweeps against named workloads
//! - Per-workload result caching with JSON persistence and a staleness TTL

pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod pool;

pub use config::Config;
pub use error::{PoolError, Result};
pub use pool::ProxyPool;
