//! # Marketplace Error Types
//!
//! The failure taxonomy every adapter reports through. The engine absorbs
//! all of these per `(SKU, marketplace)` pair; none of them poison a
//! batch.

use thiserror::Error;

/// Marketplace adapter errors.
#[derive(Debug, Error)]
pub enum MarketError {
    /// The SKU is absent at this marketplace.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The SKU matches more than one listing at this marketplace.
    /// Writing against an ambiguous SKU is unsafe; callers must skip it.
    #[error("Multiple results: {0}")]
    MultipleResults(String),

    /// Network failure or malformed response.
    #[error("Error communicating: {0}")]
    Communication(String),

    /// The marketplace accepted a write but a read-after-write showed it
    /// did not take effect.
    #[error("Platform did not apply the write: {0}")]
    PlatformNotBehaving(String),

    /// The operation is not available on this platform.
    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for MarketError {
    fn from(err: reqwest::Error) -> Self {
        MarketError::Communication(err.to_string())
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Communication(format!("bad response payload: {err}"))
    }
}

/// Result type for marketplace operations.
pub type MarketResult<T> = Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_become_communication() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MarketError = parse_err.into();
        assert!(matches!(err, MarketError::Communication(_)));
    }
}
