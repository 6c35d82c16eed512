use serde::{Deserialize, Serialize};

/// Snapshot of one proxy node as seen by callers
///
/// The registry owns the authoritative state; every selection hands out a
/// copy taken under the registry lock. `index` is the node's position at
/// registry construction time and is the only stable cross-reference:
/// filter caches store indices, never node handles, and names are not
/// assumed unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyNode {
    pub index: usize,
    pub name: String,
    pub proto_model: String,
    pub http_endpoint: String,
    pub socks_endpoint: String,
    /// True until the node's first successful selection
    pub first_access: bool,
    /// Unix time until which the node is ineligible for selection
    pub cooldown_until: i64,
    /// Unix time of the most recent selection
    pub last_access_at: i64,
}

impl ProxyNode {
    /// Whether the node is still cooling down at `now`
    pub fn is_cooling(&self, now: i64) -> bool {
        now < self.cooldown_until
    }
}

/// Immutable descriptor part of a node, fixed at registry construction
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub name: String,
    pub proto_model: String,
    pub http_endpoint: String,
    pub socks_endpoint: String,
}

/// Mutable health part of a node, guarded by the registry lock
#[derive(Debug, Clone)]
pub struct NodeHealth {
    pub first_access: bool,
    pub cooldown_until: i64,
    pub last_access_at: i64,
}

impl Default for NodeHealth {
    fn default() -> Self {
        Self {
            first_access: true,
            cooldown_until: 0,
            last_access_at: 0,
        }
    }
}
