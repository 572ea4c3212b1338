//! # Domain Types
//!
//! Core domain types used throughout shopsync.
//!
//! ## Identity Model
//! Cross-marketplace correlation is ALWAYS by `model` (the seller SKU a
//! human typed into every marketplace listing). Marketplaces also expose
//! opaque identifiers (`item_id`, `sku_id`); those are round-tripped
//! unchanged on updates and never used to join products across systems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// System
// =============================================================================

/// Tag for an external marketplace.
///
/// The canonical uppercase code (`as_str`) is what gets persisted in the
/// `system` columns and what configuration refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum System {
    /// Local Opencart storefront (the usual canonical catalogue).
    #[serde(rename = "OPENCART")]
    Opencart,
    /// Lazada Open Platform.
    #[serde(rename = "LAZADA")]
    Lazada,
    /// Shopee Open Platform.
    #[serde(rename = "SHOPEE")]
    Shopee,
    /// TikTok Shop.
    #[serde(rename = "TIKTOK")]
    Tiktok,
    /// WooCommerce REST API.
    #[serde(rename = "WOOCOMMERCE")]
    WooCommerce,
}

impl System {
    /// All known systems, in a stable order.
    pub const ALL: [System; 5] = [
        System::Opencart,
        System::Lazada,
        System::Shopee,
        System::Tiktok,
        System::WooCommerce,
    ];

    /// Returns the canonical code stored in the database.
    pub const fn as_str(&self) -> &'static str {
        match self {
            System::Opencart => "OPENCART",
            System::Lazada => "LAZADA",
            System::Shopee => "SHOPEE",
            System::Tiktok => "TIKTOK",
            System::WooCommerce => "WOOCOMMERCE",
        }
    }

    /// Returns true if this marketplace authenticates through stored
    /// OAuth2 tokens (short-lived access token + refresh token).
    pub const fn uses_oauth2(&self) -> bool {
        matches!(self, System::Lazada | System::Tiktok)
    }
}

impl std::fmt::Display for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for System {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPENCART" => Ok(System::Opencart),
            "LAZADA" => Ok(System::Lazada),
            "SHOPEE" => Ok(System::Shopee),
            "TIKTOK" => Ok(System::Tiktok),
            "WOOCOMMERCE" => Ok(System::WooCommerce),
            other => Err(CoreError::UnhandledSystem(other.to_string())),
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product as seen through a marketplace adapter.
///
/// `stocks` is the sellable (available) count; adapters that track a
/// reserved quantity subtract it before producing this view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Seller SKU - the sole cross-marketplace join key.
    pub model: String,

    /// Sellable stock count.
    pub stocks: i64,

    /// Opaque platform item/product id, round-tripped on updates.
    pub item_id: Option<String>,

    /// Opaque platform SKU/variation id, round-tripped on updates.
    pub sku_id: Option<String>,
}

impl Product {
    /// Creates a product with just the correlation key and a stock count.
    pub fn new(model: impl Into<String>, stocks: i64) -> Self {
        Product {
            model: model.into(),
            stocks,
            item_id: None,
            sku_id: None,
        }
    }
}

// =============================================================================
// Inventory Items
// =============================================================================

/// The authoritative per-SKU stock row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    pub model: String,
    pub stocks: i64,
    pub last_sync_batch_id: i64,
}

/// Last-known stock witnessed at one marketplace for one SKU.
///
/// `not_behaving` latches when the marketplace accepted a write but a
/// read-after-write showed it did not take effect; while latched, the
/// pair contributes no delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    pub model: String,
    pub system: System,
    pub stocks: i64,
    pub last_sync_batch_id: i64,
    pub not_behaving: bool,
}

/// One append-only audit row for a non-zero observed delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDelta {
    pub model: String,
    pub system: System,
    pub cached_stocks: i64,
    pub current_stocks: i64,
    pub stocks_delta: i64,
    pub last_sync_batch_id: i64,
}

/// One append-only audit row per attempted marketplace write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLogEntry {
    pub sync_batch_id: i64,
    pub model: String,
    pub system: System,
    pub previous_stocks: i64,
    pub computed_stocks: i64,
    pub upload_error_code: String,
    pub upload_error_description: String,
}

// =============================================================================
// OAuth2 Tokens
// =============================================================================

/// Persisted OAuth2 token pair for one marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oauth2Tokens {
    pub system: System,
    pub access_token: String,
    pub refresh_token: String,
    pub created_on: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
}

// =============================================================================
// Write Outcome
// =============================================================================

/// The result a marketplace reports for a stock write.
///
/// Error codes are opaque strings; `"0"` is the single success sentinel.
/// Adapters normalise whatever the platform sends (numeric codes, string
/// slugs, HTTP statuses) into this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub error_code: String,
    pub error_description: String,
}

/// The success sentinel for [`WriteOutcome::error_code`].
pub const ERROR_SUCCESS: &str = "0";

impl WriteOutcome {
    /// A successful outcome.
    pub fn success() -> Self {
        WriteOutcome {
            error_code: ERROR_SUCCESS.to_string(),
            error_description: "SUCCESS".to_string(),
        }
    }

    /// A failed outcome with a platform error code and description.
    pub fn failure(code: impl Into<String>, description: impl Into<String>) -> Self {
        WriteOutcome {
            error_code: code.into(),
            error_description: description.into(),
        }
    }

    /// Returns true if the platform accepted the write.
    pub fn is_success(&self) -> bool {
        self.error_code == ERROR_SUCCESS
    }
}

// =============================================================================
// Stock Arithmetic
// =============================================================================

/// Clamps a computed stock value to the non-negative range.
///
/// The engine never stores nor uploads a negative stock count.
#[inline]
pub fn clamp_stocks(stocks: i64) -> i64 {
    stocks.max(0)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_system_roundtrip() {
        for system in System::ALL {
            assert_eq!(System::from_str(system.as_str()).unwrap(), system);
        }
    }

    #[test]
    fn test_system_from_str_is_case_insensitive() {
        assert_eq!(System::from_str("lazada").unwrap(), System::Lazada);
        assert_eq!(System::from_str("WooCommerce").unwrap(), System::WooCommerce);
    }

    #[test]
    fn test_system_from_str_rejects_unknown() {
        let err = System::from_str("EBAY").unwrap_err();
        assert!(err.to_string().contains("EBAY"));
    }

    #[test]
    fn test_oauth2_systems() {
        assert!(System::Lazada.uses_oauth2());
        assert!(System::Tiktok.uses_oauth2());
        assert!(!System::Opencart.uses_oauth2());
        assert!(!System::Shopee.uses_oauth2());
    }

    #[test]
    fn test_write_outcome_success_sentinel() {
        assert!(WriteOutcome::success().is_success());
        assert!(!WriteOutcome::failure("500", "boom").is_success());
        // Platforms sometimes send numeric zero as a string already.
        assert!(WriteOutcome::failure("0", "ok-ish").is_success());
    }

    #[test]
    fn test_clamp_stocks() {
        assert_eq!(clamp_stocks(5), 5);
        assert_eq!(clamp_stocks(0), 0);
        assert_eq!(clamp_stocks(-9), 0);
    }
}
