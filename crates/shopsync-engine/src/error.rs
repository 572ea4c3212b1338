//! # Engine Error Types
//!
//! Error taxonomy for batch runs, with the CLI exit-code mapping.
//!
//! ## Propagation Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Within a batch:                                                        │
//! │    per-SKU / per-adapter failures  → absorbed, logged, batch continues │
//! │  Aborts the batch:                                                      │
//! │    configuration errors            → exit code 1                       │
//! │    store errors                    → exit code 2                       │
//! │    unrecoverable communication     → exit code 3                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use shopsync_db::DbError;
use shopsync_markets::MarketError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Batch-fatal errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration (missing sections/keys, unknown systems).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failed to read or parse the configuration file.
    #[error("Failed to load config: {0}")]
    ConfigLoad(String),

    /// Store-level failure; the batch aborts.
    #[error(transparent)]
    Store(#[from] DbError),

    /// A marketplace failure that escaped the per-SKU tolerance, e.g. the
    /// cleanup source going dark or an OAuth2 exchange failing.
    #[error(transparent)]
    Market(#[from] MarketError),

    /// Every enabled adapter failed to refresh; nothing to reconcile.
    #[error("All enabled marketplaces failed to refresh")]
    AllSystemsFailed,
}

impl EngineError {
    /// Process exit code for the CLI.
    ///
    /// `0` success / `1` configuration / `2` store / `3` communication.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Config(_) | EngineError::ConfigLoad(_) => 1,
            EngineError::Store(_) => 2,
            EngineError::Market(_) | EngineError::AllSystemsFailed => 3,
        }
    }
}

impl From<shopsync_core::CoreError> for EngineError {
    fn from(err: shopsync_core::CoreError) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoad(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoad(err.to_string())
    }
}
