//! # Shopee Adapter
//!
//! Talks to the Shopee Open Platform: JSON POST bodies authenticated with
//! an HMAC-SHA256 `Authorization` header over `url|payload`.
//!
//! ## Variant Flattening
//! Shopee hangs variation SKUs off a parent item. The adapter flattens
//! them: each variation becomes its own [`Product`] with its own model,
//! and a `variation_id -> parent item_id` map is kept so that stock
//! updates target the variation endpoint instead of the parent. The
//! engine never sees the difference.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::adapter::{lookup_snapshot, Marketplace};
use crate::error::{MarketError, MarketResult};
use crate::signing::shopee_signature;
use crate::util::{coerce_i64, coerce_string};
use shopsync_core::{Product, System, WriteOutcome};

const BASE_URL: &str = "https://partner.shopeemobile.com";
const AUTH_RESOURCE: &str = "/api/v1/shop/auth_partner";
const ENTRIES_PER_PAGE: i64 = 100;

// =============================================================================
// Configuration
// =============================================================================

/// Credentials for one Shopee shop.
#[derive(Debug, Clone)]
pub struct ShopeeConfig {
    pub shop_id: i64,
    pub partner_id: i64,
    pub partner_key: String,
}

// =============================================================================
// Snapshot Records
// =============================================================================

/// One Shopee listing (item or flattened variation).
#[derive(Debug, Clone)]
struct ShopeeRecord {
    /// Item id, or variation id for flattened variations.
    item_id: i64,
    model: String,
    quantity: i64,
}

impl ShopeeRecord {
    fn to_product(&self) -> Product {
        Product {
            model: self.model.clone(),
            stocks: self.quantity,
            item_id: Some(self.item_id.to_string()),
            sku_id: None,
        }
    }
}

#[derive(Debug)]
struct ShopeeReply {
    error_code: String,
    error_description: String,
    result: Value,
}

impl ShopeeReply {
    fn is_success(&self) -> bool {
        self.error_code.is_empty()
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Marketplace adapter for Shopee.
#[derive(Debug)]
pub struct ShopeeMarketplace {
    config: ShopeeConfig,
    http: Client,
    products: Vec<ShopeeRecord>,
    /// variation_id -> parent item_id for flattened variations.
    variation_parent: HashMap<i64, i64>,
}

impl ShopeeMarketplace {
    pub fn new(config: ShopeeConfig) -> MarketResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(ShopeeMarketplace {
            config,
            http,
            products: Vec::new(),
            variation_parent: HashMap::new(),
        })
    }

    /// The one-time shop authorization URL a human opens to grant the
    /// partner access to the shop.
    pub fn shop_authorization_url(&self) -> String {
        let redirect_url = format!("https://shopee.ph/shop/{}", self.config.shop_id);
        let token = hex::encode(Sha256::digest(
            format!("{}{redirect_url}", self.config.partner_key).as_bytes(),
        ));
        format!(
            "{BASE_URL}{AUTH_RESOURCE}?id={}&token={token}&redirect={redirect_url}",
            self.config.partner_id
        )
    }

    /// Wraps a request body with the shop/partner identity and timestamp.
    fn construct_payload(&self, extra: Value) -> String {
        let mut body = extra.as_object().cloned().unwrap_or_default();
        body.insert("partner_id".to_string(), json!(self.config.partner_id));
        body.insert("shopid".to_string(), json!(self.config.shop_id));
        body.insert("timestamp".to_string(), json!(Utc::now().timestamp()));
        Value::Object(body).to_string()
    }

    async fn request(&self, endpoint: &str, payload: String) -> MarketResult<ShopeeReply> {
        let url = format!("{BASE_URL}{endpoint}");
        let signature = shopee_signature(&self.config.partner_key, &url, &payload);

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", signature)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let parsed: Value = response.json().await?;

        let platform_error = parsed
            .get("error")
            .and_then(coerce_string)
            .filter(|e| !e.is_empty());

        if status.as_u16() >= 300 || platform_error.is_some() {
            let error_description = parsed
                .get("msg")
                .and_then(coerce_string)
                .or(platform_error)
                .unwrap_or_else(|| "request error".to_string());

            return Ok(ShopeeReply {
                error_code: status.as_u16().to_string(),
                error_description,
                result: Value::Null,
            });
        }

        Ok(ShopeeReply {
            error_code: String::new(),
            error_description: String::new(),
            result: parsed,
        })
    }

    /// Fetches one item detail, retrying transient failures.
    ///
    /// Shopee's per-item endpoint flakes under pagination load; a bounded
    /// exponential retry rides over it.
    async fn fetch_item(&self, item_id: i64) -> MarketResult<Value> {
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_secs(20)))
            .build();

        let reply = backoff::future::retry(policy, || async {
            let payload = self.construct_payload(json!({ "item_id": item_id }));
            self.request("/api/v1/item/get", payload)
                .await
                .map_err(backoff::Error::transient)
        })
        .await?;

        if !reply.is_success() {
            return Err(MarketError::Communication(format!(
                "Error loading item {item_id}: {}",
                reply.error_description
            )));
        }

        reply
            .result
            .get("item")
            .cloned()
            .ok_or_else(|| MarketError::Communication(format!("item {item_id}: empty detail")))
    }

    fn record(&self, model: &str) -> MarketResult<&ShopeeRecord> {
        lookup_snapshot(System::Shopee, &self.products, model, |r| r.model.as_str())
    }
}

#[async_trait]
impl Marketplace for ShopeeMarketplace {
    fn system(&self) -> System {
        System::Shopee
    }

    async fn refresh(&mut self) -> MarketResult<()> {
        // Page the item index first; details come one item at a time.
        let mut offset: i64 = 0;
        let mut meta_items: Vec<Value> = Vec::new();

        loop {
            let payload = self.construct_payload(json!({
                "pagination_entries_per_page": ENTRIES_PER_PAGE,
                "pagination_offset": offset,
            }));
            let reply = self.request("/api/v1/items/get", payload).await?;
            if !reply.is_success() {
                return Err(MarketError::Communication(format!(
                    "Error communicating: {}",
                    reply.error_description
                )));
            }

            if let Some(items) = reply.result.get("items").and_then(Value::as_array) {
                meta_items.extend(items.iter().cloned());
            }

            if reply.result.get("more").and_then(Value::as_bool) == Some(true) {
                offset += ENTRIES_PER_PAGE;
            } else {
                break;
            }
        }

        info!(count = meta_items.len(), "Listing Shopee items");

        let mut products: Vec<ShopeeRecord> = Vec::new();
        let mut variation_parent: HashMap<i64, i64> = HashMap::new();

        for meta_item in &meta_items {
            let Some(item_id) = meta_item.get("item_id").and_then(coerce_i64) else {
                continue;
            };

            let raw_item = match self.fetch_item(item_id).await {
                Ok(item) => item,
                Err(e) => {
                    warn!(item_id, error = %e, "Skipping Shopee item");
                    continue;
                }
            };

            let (mut records, links) = flatten_item(&raw_item);
            products.append(&mut records);
            variation_parent.extend(links);

            info!(
                loaded = products.len(),
                total = meta_items.len(),
                "Loaded Shopee items"
            );
        }

        self.products = products;
        self.variation_parent = variation_parent;

        Ok(())
    }

    fn list_products(&self) -> Vec<Product> {
        self.products.iter().map(ShopeeRecord::to_product).collect()
    }

    fn get_product(&self, model: &str) -> MarketResult<Product> {
        self.record(model).map(ShopeeRecord::to_product)
    }

    async fn update_product_stocks(&self, model: &str, stocks: i64) -> MarketResult<WriteOutcome> {
        let record = self.record(model)?;

        // Variations must be written through the parent item.
        let (endpoint, body) = match self.variation_parent.get(&record.item_id) {
            Some(parent_item_id) => (
                "/api/v1/items/update_variation_stock",
                json!({
                    "item_id": parent_item_id,
                    "variation_id": record.item_id,
                    "stock": stocks,
                }),
            ),
            None => (
                "/api/v1/items/update_stock",
                json!({ "item_id": record.item_id, "stock": stocks }),
            ),
        };

        let reply = self.request(endpoint, self.construct_payload(body)).await?;

        if reply.is_success() {
            Ok(WriteOutcome::success())
        } else {
            Ok(WriteOutcome::failure(
                reply.error_code,
                reply.error_description,
            ))
        }
    }

    async fn get_product_direct(&self, model: &str) -> MarketResult<Product> {
        // The detail endpoint is keyed by item id, so the snapshot supplies
        // the id and the fresh fetch supplies the numbers.
        let record = self.record(model)?;
        let fetch_id = self
            .variation_parent
            .get(&record.item_id)
            .copied()
            .unwrap_or(record.item_id);

        let raw_item = self.fetch_item(fetch_id).await?;
        let (records, _) = flatten_item(&raw_item);

        records
            .into_iter()
            .find(|r| r.model == model)
            .map(|r| r.to_product())
            .ok_or_else(|| MarketError::NotFound(format!("{model} in SHOPEE")))
    }
}

// =============================================================================
// Payload Parsing
// =============================================================================

/// Flattens one raw item detail into records plus variation->parent links.
///
/// Items with more than one variation are tracked per-variation; the
/// parent row itself is not listed.
fn flatten_item(raw_item: &Value) -> (Vec<ShopeeRecord>, Vec<(i64, i64)>) {
    let mut records = Vec::new();
    let mut links = Vec::new();

    let Some(item_id) = raw_item.get("item_id").and_then(coerce_i64) else {
        return (records, links);
    };

    let variations = raw_item
        .get("variations")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if variations.len() > 1 {
        for variation in &variations {
            let (Some(variation_id), Some(model)) = (
                variation.get("variation_id").and_then(coerce_i64),
                variation.get("variation_sku").and_then(coerce_string),
            ) else {
                continue;
            };
            let quantity = variation.get("stock").and_then(coerce_i64).unwrap_or(0);

            records.push(ShopeeRecord {
                item_id: variation_id,
                model,
                quantity,
            });
            links.push((variation_id, item_id));
        }
        info!(
            variations = variations.len(),
            item_id, "Found variations for item"
        );
    } else {
        let model = raw_item
            .get("item_sku")
            .and_then(coerce_string)
            .unwrap_or_default();
        let quantity = raw_item.get("stock").and_then(coerce_i64).unwrap_or(0);

        records.push(ShopeeRecord {
            item_id,
            model,
            quantity,
        });
    }

    (records, links)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_plain_item() {
        let raw = json!({
            "item_id": 500,
            "item_sku": "DFR0431",
            "stock": 12,
            "variations": []
        });

        let (records, links) = flatten_item(&raw);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].item_id, 500);
        assert_eq!(records[0].model, "DFR0431");
        assert_eq!(records[0].quantity, 12);
        assert!(links.is_empty());
    }

    #[test]
    fn test_flatten_explodes_variations_and_links_parents() {
        let raw = json!({
            "item_id": 500,
            "item_sku": "PARENT",
            "stock": 99,
            "variations": [
                {"variation_id": 501, "variation_sku": "KID-S", "stock": 3},
                {"variation_id": 502, "variation_sku": "KID-M", "stock": 4},
            ]
        });

        let (records, links) = flatten_item(&raw);
        assert_eq!(records.len(), 2);
        // The parent row is not listed; each variation is its own model.
        assert!(records.iter().all(|r| r.model != "PARENT"));
        assert_eq!(records[0].model, "KID-S");
        assert_eq!(records[0].quantity, 3);
        assert_eq!(links, vec![(501, 500), (502, 500)]);
    }

    #[test]
    fn test_flatten_single_variation_stays_on_parent() {
        let raw = json!({
            "item_id": 500,
            "item_sku": "SOLO",
            "stock": 7,
            "variations": [
                {"variation_id": 501, "variation_sku": "SOLO-X", "stock": 7},
            ]
        });

        let (records, links) = flatten_item(&raw);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model, "SOLO");
        assert!(links.is_empty());
    }

    #[test]
    fn test_construct_payload_adds_identity_and_timestamp() {
        let market = ShopeeMarketplace::new(ShopeeConfig {
            shop_id: 77,
            partner_id: 42,
            partner_key: "key".to_string(),
        })
        .unwrap();

        let payload = market.construct_payload(json!({"item_id": 500}));
        let parsed: Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(parsed["item_id"], 500);
        assert_eq!(parsed["partner_id"], 42);
        assert_eq!(parsed["shopid"], 77);
        assert!(parsed["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_shop_authorization_url_shape() {
        let market = ShopeeMarketplace::new(ShopeeConfig {
            shop_id: 77,
            partner_id: 42,
            partner_key: "key".to_string(),
        })
        .unwrap();

        let url = market.shop_authorization_url();
        assert!(url.starts_with("https://partner.shopeemobile.com/api/v1/shop/auth_partner?id=42&token="));
        assert!(url.ends_with("&redirect=https://shopee.ph/shop/77"));
    }
}
