//! # The Marketplace Contract
//!
//! The uniform capability set the reconciliation engine consumes. Each
//! concrete adapter hides signing, pagination, pagination-retry and
//! variant explosion behind these six methods.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Marketplace trait                                   │
//! │                                                                         │
//! │  refresh()                 repopulate the in-memory snapshot,          │
//! │                            paging until exhaustion                     │
//! │  list_products()           copy of the snapshot                        │
//! │  get_product(model)        snapshot lookup                             │
//! │  update_product_stocks()   remote write; outcome carries the           │
//! │                            platform's opaque error code                │
//! │  get_product_direct()      bypass the snapshot, re-query the remote    │
//! │                                                                         │
//! │  Variant flattening is invisible here: each variation is its own       │
//! │  Product with its own model; the adapter remembers the parent          │
//! │  linkage so updates hit the variation endpoint.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Adapters are owned by one batch at a time; all calls are serial from
//! the engine's viewpoint.

use async_trait::async_trait;

use crate::error::{MarketError, MarketResult};
use shopsync_core::{Product, System, WriteOutcome};

/// Uniform read/write surface over one external marketplace.
#[async_trait]
pub trait Marketplace: Send + Sync + std::fmt::Debug {
    /// The system this adapter speaks for.
    fn system(&self) -> System;

    /// Repopulates the adapter's in-memory product list from the remote
    /// marketplace, paging until exhaustion.
    async fn refresh(&mut self) -> MarketResult<()>;

    /// Returns a copy of the in-memory snapshot.
    fn list_products(&self) -> Vec<Product>;

    /// Cached lookup of a single product by seller SKU.
    fn get_product(&self, model: &str) -> MarketResult<Product>;

    /// Updates a single product's stock at the remote marketplace.
    ///
    /// Remote-rejected writes come back as a `WriteOutcome` carrying the
    /// platform's error code; transport failures are
    /// [`MarketError::Communication`]; a confirmed-ineffective write is
    /// [`MarketError::PlatformNotBehaving`].
    async fn update_product_stocks(&self, model: &str, stocks: i64) -> MarketResult<WriteOutcome>;

    /// Bypasses the snapshot and re-queries the marketplace for a single
    /// product.
    async fn get_product_direct(&self, model: &str) -> MarketResult<Product>;
}

/// An OAuth2 token grant returned by a marketplace auth endpoint.
///
/// `expires_in` is always relative seconds from now; adapters normalise
/// platforms that report absolute epoch expiries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oauth2Grant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Snapshot lookup shared by every adapter.
///
/// Zero matches is `NotFound`; more than one match is `MultipleResults`
/// (the SKU is ambiguous on that marketplace and must not be written).
pub(crate) fn lookup_snapshot<'a, T>(
    system: System,
    records: &'a [T],
    model: &str,
    key: impl for<'r> Fn(&'r T) -> &'r str,
) -> MarketResult<&'a T> {
    let mut matches = records.iter().filter(|r| key(r) == model);

    let first = matches
        .next()
        .ok_or_else(|| MarketError::NotFound(format!("{model} in {system}")))?;

    if matches.next().is_some() {
        return Err(MarketError::MultipleResults(format!("{model} in {system}")));
    }

    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_snapshot() {
        let records = vec![
            ("A".to_string(), 1),
            ("B".to_string(), 2),
            ("B".to_string(), 3),
        ];
        fn key(r: &(String, i64)) -> &str {
            r.0.as_str()
        }

        let found = lookup_snapshot(System::Shopee, &records, "A", key).unwrap();
        assert_eq!(found.1, 1);

        assert!(matches!(
            lookup_snapshot(System::Shopee, &records, "Z", key),
            Err(MarketError::NotFound(_))
        ));
        assert!(matches!(
            lookup_snapshot(System::Shopee, &records, "B", key),
            Err(MarketError::MultipleResults(_))
        ));
    }
}
