//! # WooCommerce Adapter
//!
//! Talks to the WooCommerce `wc/v3` REST API with consumer-key/secret
//! authentication. Pagination is driven by the `X-WP-TotalPages` response
//! header. Listings without a SKU or without managed stock are skipped at
//! refresh time; they cannot participate in reconciliation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::adapter::{lookup_snapshot, Marketplace};
use crate::error::{MarketError, MarketResult};
use crate::util::coerce_string;
use shopsync_core::{Product, System, WriteOutcome};

const PER_PAGE: i64 = 100;

// =============================================================================
// Configuration
// =============================================================================

/// Credentials for one WooCommerce store.
#[derive(Debug, Clone)]
pub struct WooCommerceConfig {
    /// Store base URL, e.g. `https://shop.example.com`.
    pub domain: String,
    pub consumer_key: String,
    pub consumer_secret: String,
}

// =============================================================================
// Snapshot Records
// =============================================================================

/// One product row from `GET /products`.
#[derive(Debug, Clone, Deserialize)]
struct WooProductRow {
    id: i64,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    stock_quantity: Option<i64>,
}

#[derive(Debug, Clone)]
struct WooRecord {
    id: i64,
    model: String,
    quantity: i64,
}

impl WooRecord {
    fn to_product(&self) -> Product {
        Product {
            model: self.model.clone(),
            stocks: self.quantity,
            item_id: Some(self.id.to_string()),
            sku_id: None,
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Marketplace adapter for WooCommerce.
#[derive(Debug)]
pub struct WooCommerceMarketplace {
    config: WooCommerceConfig,
    http: Client,
    products: Vec<WooRecord>,
}

impl WooCommerceMarketplace {
    pub fn new(config: WooCommerceConfig) -> MarketResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(WooCommerceMarketplace {
            config,
            http,
            products: Vec::new(),
        })
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{}/wp-json/wc/v3/{resource}", self.config.domain)
    }

    fn auth_query(&self) -> [(&'static str, &str); 2] {
        [
            ("consumer_key", self.config.consumer_key.as_str()),
            ("consumer_secret", self.config.consumer_secret.as_str()),
        ]
    }

    /// Fetches one listing page; returns the rows plus the page total
    /// reported by `X-WP-TotalPages`.
    async fn fetch_page(&self, page: i64) -> MarketResult<(Vec<WooProductRow>, i64)> {
        let response = self
            .http
            .get(self.resource_url("products"))
            .query(&self.auth_query())
            .query(&[("per_page", PER_PAGE), ("page", page)])
            .send()
            .await?;

        let total_pages = response
            .headers()
            .get("X-WP-TotalPages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(1);

        let status = response.status();
        if status.as_u16() >= 300 {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(MarketError::Communication(format!(
                "WooCommerce error {status}: {}",
                body.get("message")
                    .and_then(coerce_string)
                    .unwrap_or_else(|| "generic error".to_string())
            )));
        }

        let rows: Vec<WooProductRow> = response.json().await?;
        Ok((rows, total_pages))
    }

    fn record(&self, model: &str) -> MarketResult<&WooRecord> {
        lookup_snapshot(System::WooCommerce, &self.products, model, |r| {
            r.model.as_str()
        })
    }
}

#[async_trait]
impl Marketplace for WooCommerceMarketplace {
    fn system(&self) -> System {
        System::WooCommerce
    }

    async fn refresh(&mut self) -> MarketResult<()> {
        let mut page: i64 = 1;
        let mut items: Vec<WooRecord> = Vec::new();

        loop {
            let (rows, total_pages) = self.fetch_page(page).await?;

            for row in rows {
                match (row.sku.filter(|s| !s.is_empty()), row.stock_quantity) {
                    (Some(model), Some(quantity)) => items.push(WooRecord {
                        id: row.id,
                        model,
                        quantity,
                    }),
                    _ => {
                        info!(id = row.id, "Skipping WooCommerce item without sku/stock");
                    }
                }
            }

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        info!(total = items.len(), "Loaded WooCommerce items");
        self.products = items;

        Ok(())
    }

    fn list_products(&self) -> Vec<Product> {
        self.products.iter().map(WooRecord::to_product).collect()
    }

    fn get_product(&self, model: &str) -> MarketResult<Product> {
        self.record(model).map(WooRecord::to_product)
    }

    async fn update_product_stocks(&self, model: &str, stocks: i64) -> MarketResult<WriteOutcome> {
        let record = self.record(model)?;

        let response = self
            .http
            .put(self.resource_url(&format!("products/{}", record.id)))
            .query(&self.auth_query())
            .json(&json!({ "stock_quantity": stocks }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 300 {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            // Woo reports string error codes like
            // "woocommerce_rest_product_invalid_id".
            return Ok(WriteOutcome::failure(
                body.get("code")
                    .and_then(coerce_string)
                    .unwrap_or_else(|| "unknown_error_code".to_string()),
                body.get("message")
                    .and_then(coerce_string)
                    .unwrap_or_else(|| "generic error".to_string()),
            ));
        }

        Ok(WriteOutcome::success())
    }

    async fn get_product_direct(&self, model: &str) -> MarketResult<Product> {
        let response = self
            .http
            .get(self.resource_url("products"))
            .query(&self.auth_query())
            .query(&[("sku", model)])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MarketError::Communication(e.to_string()))?;

        let rows: Vec<WooProductRow> = response.json().await?;
        let mut matches = rows.into_iter().filter_map(|row| {
            let model = row.sku.filter(|s| !s.is_empty())?;
            Some(WooRecord {
                id: row.id,
                model,
                quantity: row.stock_quantity.unwrap_or(0),
            })
        });

        let first = matches
            .next()
            .ok_or_else(|| MarketError::NotFound(format!("{model} in WOOCOMMERCE")))?;
        if matches.next().is_some() {
            return Err(MarketError::MultipleResults(format!(
                "{model} in WOOCOMMERCE"
            )));
        }

        Ok(first.to_product())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_without_sku_or_stock_are_skippable() {
        let rows: Vec<WooProductRow> = serde_json::from_value(json!([
            {"id": 1, "sku": "A", "stock_quantity": 5},
            {"id": 2, "sku": "", "stock_quantity": 5},
            {"id": 3, "sku": "C", "stock_quantity": null},
            {"id": 4}
        ]))
        .unwrap();

        let kept: Vec<_> = rows
            .into_iter()
            .filter(|r| {
                r.sku.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
                    && r.stock_quantity.is_some()
            })
            .collect();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }

    #[test]
    fn test_resource_url() {
        let market = WooCommerceMarketplace::new(WooCommerceConfig {
            domain: "https://shop.example.com".to_string(),
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
        })
        .unwrap();

        assert_eq!(
            market.resource_url("products/7"),
            "https://shop.example.com/wp-json/wc/v3/products/7"
        );
    }
}
