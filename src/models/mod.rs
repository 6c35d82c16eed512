//! Data models shared across the pool

pub mod discovery;
pub mod node;
pub mod workload;

pub use discovery::{OpenEntry, ProxyListResponse};
pub use node::ProxyNode;
pub use workload::{FetchMode, FilterWorkload, PageSpec};
