use thiserror::Error;

/// Unified error type for the roundabout pool
#[derive(Error, Debug)]
pub enum PoolError {
    // Registry errors
    #[error("proxy registry is empty")]
    EmptyRegistry,

    #[error("proxy index {index} is out of range (registry size {size})")]
    IndexOutOfRange { index: usize, size: usize },

    /// The node at the cursor is still cooling down. Expected and
    /// transient: `select_with_backoff` absorbs it, callers of
    /// `select_next` retry.
    #[error("node {index} is skipped until {until}")]
    SkipAccessTime { index: usize, until: i64 },

    // Verification errors
    #[error("no proxy passed the workload for key '{key}'")]
    EmptyFilterResult { key: String },

    #[error("no verified result for key '{key}'")]
    KeyNotFound { key: String },

    #[error("verification sweep for key '{key}' was cancelled")]
    Cancelled { key: String },

    // Discovery errors
    #[error("upstream pool manager reported '{status}'")]
    UpstreamNotRunning { status: String },

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Persistence errors
    #[error("corrupt filter cache file {path}: {source}")]
    CorruptCache {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Fetch errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid word pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Whether a selection caller should retry rather than surface this
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::SkipAccessTime { .. })
    }
}
