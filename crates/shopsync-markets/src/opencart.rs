//! # Opencart Adapter
//!
//! Talks to a legacy Opencart admin extension. Authentication is a form
//! POST against the admin login with a `redirect` parameter smuggling the
//! real endpoint; the response body of the redirect target is the result.
//!
//! Opencart is usually the configured default marketplace: the canonical
//! catalogue and the sole origin for SKUs the store has never seen.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use crate::adapter::{lookup_snapshot, Marketplace};
use crate::error::{MarketError, MarketResult};
use crate::util::{coerce_i64, coerce_string};
use shopsync_core::{Product, System, WriteOutcome};

const LIST_PRODUCTS_ENDPOINT: &str = "module/store_sync/listlocalproducts";
const UPDATE_PRODUCT_QUANTITY_ENDPOINT: &str = "module/store_sync/setlocalquantity";

// =============================================================================
// Configuration
// =============================================================================

/// Credentials for one Opencart admin.
#[derive(Debug, Clone)]
pub struct OpencartConfig {
    /// Admin route base, e.g. `https://shop.example.com/admin/index.php?route=`.
    pub domain: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
struct OpencartRecord {
    model: String,
    quantity: i64,
}

impl OpencartRecord {
    fn to_product(&self) -> Product {
        Product::new(self.model.clone(), self.quantity)
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Marketplace adapter for Opencart.
#[derive(Debug)]
pub struct OpencartMarketplace {
    config: OpencartConfig,
    http: Client,
    products: Vec<OpencartRecord>,
}

impl OpencartMarketplace {
    pub fn new(config: OpencartConfig) -> MarketResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(OpencartMarketplace {
            config,
            http,
            products: Vec::new(),
        })
    }

    /// Logs in and lands on `endpoint`, returning the response body.
    async fn request(&self, endpoint: &str, payload: Option<String>) -> MarketResult<String> {
        let redirect = match payload {
            Some(payload) => format!("{}{endpoint}&{payload}", self.config.domain),
            None => format!("{}{endpoint}", self.config.domain),
        };

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
            ("redirect", redirect.as_str()),
        ];

        let response = self
            .http
            .post(format!("{}common/login", self.config.domain))
            .form(&params)
            .send()
            .await?;

        Ok(response.text().await?)
    }

    /// Fetches the product list fresh from the admin endpoint.
    async fn fetch_products(&self) -> MarketResult<Vec<OpencartRecord>> {
        let body = self.request(LIST_PRODUCTS_ENDPOINT, None).await?;

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| MarketError::Communication(format!("bad product list: {e}")))?;
        let items = parse_products(&parsed);

        if items.is_empty() {
            // An empty catalogue here means the login bounced, not that the
            // shop sells nothing.
            return Err(MarketError::Communication(
                "Somehow, zero items retrieved from Opencart!".to_string(),
            ));
        }

        Ok(items)
    }

    fn record(&self, model: &str) -> MarketResult<&OpencartRecord> {
        lookup_snapshot(System::Opencart, &self.products, model, |r| {
            r.model.as_str()
        })
    }
}

#[async_trait]
impl Marketplace for OpencartMarketplace {
    fn system(&self) -> System {
        System::Opencart
    }

    async fn refresh(&mut self) -> MarketResult<()> {
        let items = self.fetch_products().await?;
        info!(total = items.len(), "Loaded Opencart items");
        self.products = items;

        Ok(())
    }

    fn list_products(&self) -> Vec<Product> {
        self.products
            .iter()
            .map(OpencartRecord::to_product)
            .collect()
    }

    fn get_product(&self, model: &str) -> MarketResult<Product> {
        self.record(model).map(OpencartRecord::to_product)
    }

    async fn update_product_stocks(&self, model: &str, stocks: i64) -> MarketResult<WriteOutcome> {
        // Presence check against the snapshot before hitting the admin.
        let record = self.record(model)?;

        let payload = format!("model={}&quantity={}", record.model, stocks);
        self.request(UPDATE_PRODUCT_QUANTITY_ENDPOINT, Some(payload))
            .await?;

        // The legacy extension reports nothing useful on success.
        Ok(WriteOutcome::success())
    }

    async fn get_product_direct(&self, model: &str) -> MarketResult<Product> {
        let items = self.fetch_products().await?;
        lookup_snapshot(System::Opencart, &items, model, |r| r.model.as_str())
            .map(OpencartRecord::to_product)
    }
}

// =============================================================================
// Payload Parsing
// =============================================================================

fn parse_products(parsed: &Value) -> Vec<OpencartRecord> {
    parsed
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|row| {
            let model = row.get("model").and_then(coerce_string)?;
            let quantity = row.get("quantity").and_then(coerce_i64)?;
            Some(OpencartRecord { model, quantity })
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_products_accepts_string_quantities() {
        let parsed = json!([
            {"model": "WHC0011RF", "quantity": "12"},
            {"model": "DFR0431", "quantity": 3},
            {"quantity": 9},
        ]);

        let records = parse_products(&parsed);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].model, "WHC0011RF");
        assert_eq!(records[0].quantity, 12);
        assert_eq!(records[1].quantity, 3);
    }

    #[test]
    fn test_parse_products_non_array_is_empty() {
        assert!(parse_products(&json!({"error": "login failed"})).is_empty());
    }
}
