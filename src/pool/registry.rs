//! Proxy registry
//!
//! A flat, append-only arena of proxy nodes keyed by stable integer index.
//! Descriptors are immutable for the process lifetime; health fields and
//! the rotation cursor live behind one mutex so that cooldown reads and
//! cursor movement are always consistent with each other.

use parking_lot::{Mutex, MutexGuard};
use tracing::info;

use crate::error::{PoolError, Result};
use crate::models::discovery::ProxyListResponse;
use crate::models::node::{NodeDescriptor, NodeHealth, ProxyNode};

pub struct ProxyRegistry {
    descriptors: Vec<NodeDescriptor>,
    state: Mutex<RegistryState>,
}

/// Mutable registry state; all fields share the registry lock
pub(crate) struct RegistryState {
    /// Global rotation cursor, always within `[0, len)`
    pub cursor: usize,
    /// One health record per node, parallel to the descriptor arena
    pub health: Vec<NodeHealth>,
}

impl ProxyRegistry {
    /// Build a registry from discovered descriptors
    ///
    /// Nothing downstream can function without nodes, so an empty list is
    /// rejected at construction.
    pub fn new(descriptors: Vec<NodeDescriptor>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(PoolError::EmptyRegistry);
        }
        let health = vec![NodeHealth::default(); descriptors.len()];
        Ok(Self {
            descriptors,
            state: Mutex::new(RegistryState { cursor: 0, health }),
        })
    }

    /// Build a registry from an upstream pool-manager payload
    pub fn from_discovery(result: &ProxyListResponse, host: &str) -> Result<Self> {
        let descriptors = result
            .open_result_list
            .iter()
            .map(|entry| NodeDescriptor {
                name: entry.name.clone(),
                proto_model: entry.proto_model.clone(),
                http_endpoint: entry.http_endpoint(host),
                socks_endpoint: entry.socks_endpoint(host),
            })
            .collect();
        Self::new(descriptors)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Copy of the node at `index` (descriptor + current health)
    pub fn snapshot(&self, index: usize) -> Result<ProxyNode> {
        self.check_index(index)?;
        let state = self.state.lock();
        Ok(self.snapshot_locked(&state, index))
    }

    /// Set the node's cooldown deadline
    ///
    /// The node becomes ineligible for selection until `until_unix`.
    pub fn apply_cooldown(&self, index: usize, until_unix: i64) -> Result<()> {
        self.check_index(index)?;
        let mut state = self.state.lock();
        info!("Node {} put on cooldown until {}", index, until_unix);
        state.health[index].cooldown_until = until_unix;
        Ok(())
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.descriptors.len() {
            return Err(PoolError::IndexOutOfRange {
                index,
                size: self.descriptors.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock()
    }

    /// Snapshot assembled from state the caller already holds the lock on
    pub(crate) fn snapshot_locked(&self, state: &RegistryState, index: usize) -> ProxyNode {
        let desc = &self.descriptors[index];
        let health = &state.health[index];
        ProxyNode {
            index,
            name: desc.name.clone(),
            proto_model: desc.proto_model.clone(),
            http_endpoint: desc.http_endpoint.clone(),
            socks_endpoint: desc.socks_endpoint.clone(),
            first_access: health.first_access,
            cooldown_until: health.cooldown_until,
            last_access_at: health.last_access_at,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_descriptors(count: usize) -> Vec<NodeDescriptor> {
    (0..count)
        .map(|i| NodeDescriptor {
            name: format!("node-{}", i),
            proto_model: "vmess".to_string(),
            http_endpoint: format!("http://127.0.0.1:{}", 10000 + i),
            socks_endpoint: format!("socks5://127.0.0.1:{}", 11000 + i),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_rejected() {
        let result = ProxyRegistry::new(Vec::new());
        assert!(matches!(result, Err(PoolError::EmptyRegistry)));
    }

    #[test]
    fn test_snapshot_starts_fresh() {
        let registry = ProxyRegistry::new(test_descriptors(2)).unwrap();
        assert_eq!(registry.len(), 2);

        let node = registry.snapshot(1).unwrap();
        assert_eq!(node.index, 1);
        assert_eq!(node.name, "node-1");
        assert_eq!(node.http_endpoint, "http://127.0.0.1:10001");
        assert!(node.first_access);
        assert_eq!(node.cooldown_until, 0);
        assert_eq!(node.last_access_at, 0);
    }

    #[test]
    fn test_snapshot_index_out_of_range() {
        let registry = ProxyRegistry::new(test_descriptors(2)).unwrap();
        let err = registry.snapshot(2).unwrap_err();
        assert!(matches!(
            err,
            PoolError::IndexOutOfRange { index: 2, size: 2 }
        ));
    }

    #[test]
    fn test_apply_cooldown() {
        let registry = ProxyRegistry::new(test_descriptors(3)).unwrap();
        registry.apply_cooldown(1, 4_000_000_000).unwrap();

        assert_eq!(registry.snapshot(1).unwrap().cooldown_until, 4_000_000_000);
        assert_eq!(registry.snapshot(0).unwrap().cooldown_until, 0);

        let err = registry.apply_cooldown(7, 1).unwrap_err();
        assert!(matches!(err, PoolError::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_from_discovery_builds_endpoints() {
        let resp: ProxyListResponse = serde_json::from_str(
            r#"{
                "status": "running",
                "lb_port": 19039,
                "open_result_list": [
                    {"name": "hk-01", "proto_model": "vmess", "socks_port": 11000, "http_port": 10000}
                ]
            }"#,
        )
        .unwrap();

        let registry = ProxyRegistry::from_discovery(&resp, "192.168.50.233").unwrap();
        let node = registry.snapshot(0).unwrap();
        assert_eq!(node.http_endpoint, "http://192.168.50.233:10000");
        assert_eq!(node.socks_endpoint, "socks5://192.168.50.233:11000");
    }
}
