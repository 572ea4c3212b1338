//! # Core Error Types
//!
//! Domain-level errors shared across the workspace. Storage and adapter
//! failures have their own taxonomies (`shopsync_db::DbError`,
//! `shopsync_markets::MarketError`); this module only covers errors that
//! exist independent of any I/O.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An unknown marketplace code was supplied.
    ///
    /// This is a programming or configuration error, never a runtime
    /// condition to recover from: a batch must not start against a
    /// system the engine has no adapter variant for.
    #[error("System is not handled: {0}")]
    UnhandledSystem(String),

    /// A seller SKU was empty where one is required.
    #[error("Empty product model")]
    EmptyModel,
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::UnhandledSystem("EBAY".to_string());
        assert_eq!(err.to_string(), "System is not handled: EBAY");
    }
}
