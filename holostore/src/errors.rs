use thiserror::Error;

/// Failures reported by a [`crate::fetch::ChainRegistryClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("RPC endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("RPC call timed out")]
    Timeout,

    #[error("malformed RPC response: {0}")]
    Malformed(String),
}

impl RpcError {
    /// Transient failures are downgraded to a skipped address instead of a failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Unavailable(_) | RpcError::Timeout)
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite operation failed: {0}")]
    SQLite(#[from] rusqlite::Error),

    #[error("storage connection poisoned by a panicked writer")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Chain RPC failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("Reconciliation halted: {0}")]
    Halted(String),
}

impl CacheError {
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            CacheError::SQLite(_) | CacheError::Poisoned | CacheError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
