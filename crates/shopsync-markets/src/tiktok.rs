//! # TikTok Shop Adapter
//!
//! Talks to the TikTok Shop open API: signed query strings with JSON
//! bodies, stock tracked per warehouse.
//!
//! ## Warehouses
//! Stock lives in warehouses. When no warehouse id is configured, the
//! first sales warehouse (`warehouse_type == 1`) is discovered during
//! `refresh` and used for every update. A SKU's sellable stock is the sum
//! of `available_stock` across its stock infos.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::adapter::{lookup_snapshot, Marketplace, Oauth2Grant};
use crate::error::{MarketError, MarketResult};
use crate::signing::tiktok_signature;
use crate::util::{coerce_i64, coerce_string};
use shopsync_core::{Product, System, WriteOutcome, ERROR_SUCCESS};

/// Auth domain for the OAuth2 token endpoints.
pub const TIKTOK_AUTH_DOMAIN: &str = "https://auth.tiktok-shops.com";

const PAGE_SIZE: i64 = 100;

// =============================================================================
// Configuration
// =============================================================================

/// Credentials for one TikTok shop.
#[derive(Debug, Clone)]
pub struct TiktokConfig {
    /// API domain, e.g. `https://open-api.tiktokglobalshop.com`.
    pub domain: String,
    pub app_key: String,
    pub app_secret: String,
    /// OAuth2 access token; empty for token-exchange-only clients.
    pub access_token: String,
    pub shop_id: String,
    /// Warehouse to stock from/to; discovered on refresh when empty.
    pub warehouse_id: String,
}

// =============================================================================
// Snapshot Records
// =============================================================================

/// One TikTok SKU as cached from `/api/products/search`.
#[derive(Debug, Clone)]
struct TiktokRecord {
    model: String,
    quantity: i64,
    product_id: String,
    sku_id: String,
}

impl TiktokRecord {
    fn to_product(&self) -> Product {
        Product {
            model: self.model.clone(),
            stocks: self.quantity,
            item_id: Some(self.product_id.clone()),
            sku_id: Some(self.sku_id.clone()),
        }
    }
}

enum Method {
    Get,
    Post,
    Put,
}

// =============================================================================
// Adapter
// =============================================================================

/// Marketplace adapter for TikTok Shop.
#[derive(Debug)]
pub struct TiktokMarketplace {
    config: TiktokConfig,
    http: Client,
    products: Vec<TiktokRecord>,
}

impl TiktokMarketplace {
    pub fn new(config: TiktokConfig) -> MarketResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(TiktokMarketplace {
            config,
            http,
            products: Vec::new(),
        })
    }

    /// Creates and sends one signed request.
    ///
    /// The signature covers the query params present before the access
    /// token and the signature itself are appended; the JSON body is not
    /// part of the base.
    async fn request(
        &self,
        endpoint: &str,
        payload: Option<Value>,
        method: Method,
    ) -> MarketResult<Value> {
        let mut query: BTreeMap<String, String> = BTreeMap::new();
        query.insert(
            "timestamp".to_string(),
            Utc::now().timestamp().to_string(),
        );
        query.insert("app_key".to_string(), self.config.app_key.clone());
        if !self.config.shop_id.is_empty() {
            query.insert("shop_id".to_string(), self.config.shop_id.clone());
        }

        let signature = tiktok_signature(&self.config.app_secret, endpoint, &query);

        // Only attach access token and sign after generating the signature.
        if !self.config.access_token.is_empty() {
            query.insert("access_token".to_string(), self.config.access_token.clone());
        }
        query.insert("sign".to_string(), signature);

        let url = format!("{}{endpoint}", self.config.domain);
        debug!(endpoint, "TikTok request");

        let request = match (&method, payload) {
            (Method::Put, Some(body)) => self.http.put(&url).query(&query).json(&body),
            (_, Some(body)) => self.http.post(&url).query(&query).json(&body),
            (_, None) => self.http.get(&url).query(&query),
        };

        let body: Value = request.send().await?.json().await?;

        let code = body.get("code").and_then(coerce_i64).unwrap_or(0);
        if code != 0 {
            let message = body
                .get("message")
                .and_then(coerce_string)
                .unwrap_or_else(|| "request error".to_string());
            return Err(MarketError::Communication(format!(
                "TikTok error {code}: {message}"
            )));
        }

        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Discovers the first sales warehouse when none is configured.
    async fn ensure_warehouse(&mut self) -> MarketResult<()> {
        if !self.config.warehouse_id.is_empty() {
            return Ok(());
        }

        let data = self
            .request("/api/logistics/get_warehouse_list", None, Method::Get)
            .await?;

        let warehouse_id = data
            .get("warehouse_list")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|w| w.get("warehouse_type").and_then(coerce_i64) == Some(1))
            .and_then(|w| w.get("warehouse_id").and_then(coerce_string))
            .ok_or_else(|| MarketError::NotFound("no warehouses found".to_string()))?;

        info!(warehouse_id = %warehouse_id, "TikTok warehouse discovered");
        self.config.warehouse_id = warehouse_id;

        Ok(())
    }

    fn record(&self, model: &str) -> MarketResult<&TiktokRecord> {
        lookup_snapshot(System::Tiktok, &self.products, model, |r| r.model.as_str())
    }

    async fn oauth2_token_call(&self, endpoint: &str, payload: Value) -> MarketResult<Oauth2Grant> {
        let url = format!("{TIKTOK_AUTH_DOMAIN}{endpoint}");

        let body: Value = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        let code = body.get("code").and_then(coerce_i64).unwrap_or(0);
        if code != 0 {
            let message = body
                .get("message")
                .and_then(coerce_string)
                .unwrap_or_else(|| "request error".to_string());
            return Err(MarketError::Communication(format!(
                "TikTok auth error {code}: {message}"
            )));
        }

        parse_grant(body.get("data").unwrap_or(&Value::Null), Utc::now().timestamp())
    }

    /// Exchanges an authorization code for a fresh OAuth2 token pair.
    pub async fn exchange_auth_code(&self, auth_code: &str) -> MarketResult<Oauth2Grant> {
        self.oauth2_token_call(
            "/api/token/getAccessToken",
            json!({
                "app_key": self.config.app_key,
                "app_secret": self.config.app_secret,
                "auth_code": auth_code,
                "grant_type": "authorized_code",
            }),
        )
        .await
    }

    /// Refreshes the OAuth2 token pair from a stored refresh token.
    pub async fn refresh_oauth2_tokens(&self, refresh_token: &str) -> MarketResult<Oauth2Grant> {
        self.oauth2_token_call(
            "/api/token/refreshToken",
            json!({
                "app_key": self.config.app_key,
                "app_secret": self.config.app_secret,
                "refresh_token": refresh_token,
                "grant_type": "refresh_token",
            }),
        )
        .await
    }
}

#[async_trait]
impl Marketplace for TiktokMarketplace {
    fn system(&self) -> System {
        System::Tiktok
    }

    async fn refresh(&mut self) -> MarketResult<()> {
        self.ensure_warehouse().await?;
        info!(warehouse_id = %self.config.warehouse_id, "TikTok warehouse in use");

        let mut page_number: i64 = 1;
        let mut items: Vec<TiktokRecord> = Vec::new();

        loop {
            let data = self
                .request(
                    "/api/products/search",
                    Some(json!({ "page_number": page_number, "page_size": PAGE_SIZE })),
                    Method::Post,
                )
                .await?;

            let total = data.get("total").and_then(coerce_i64).unwrap_or(0);
            items.extend(parse_products(&data));

            info!(loaded = items.len(), total, "Loaded TikTok items");

            if page_number * PAGE_SIZE > total {
                break;
            }
            page_number += 1;
        }

        self.products = items;

        Ok(())
    }

    fn list_products(&self) -> Vec<Product> {
        self.products.iter().map(TiktokRecord::to_product).collect()
    }

    fn get_product(&self, model: &str) -> MarketResult<Product> {
        self.record(model).map(TiktokRecord::to_product)
    }

    async fn update_product_stocks(&self, model: &str, stocks: i64) -> MarketResult<WriteOutcome> {
        let record = self.record(model)?;

        let body = json!({
            "product_id": record.product_id,
            "skus": [
                {
                    "id": record.sku_id,
                    "stock_infos": [
                        {
                            "warehouse_id": self.config.warehouse_id,
                            "available_stock": stocks,
                        },
                    ],
                },
            ],
        });

        match self
            .request("/api/products/stocks", Some(body), Method::Put)
            .await
        {
            Ok(_) => Ok(WriteOutcome::success()),
            // The platform rejected the write but the transport was fine:
            // surface it as an outcome so the sync log records the code.
            Err(MarketError::Communication(description)) => Ok(WriteOutcome::failure(
                "TIKTOK_ERROR",
                description,
            )),
            Err(other) => Err(other),
        }
    }

    async fn get_product_direct(&self, _model: &str) -> MarketResult<Product> {
        Err(MarketError::Unsupported(
            "TikTok has no direct product lookup".to_string(),
        ))
    }
}

// =============================================================================
// Payload Parsing
// =============================================================================

/// Parses one `/api/products/search` page; each SKU becomes a record and
/// its sellable stock is summed across stock infos.
fn parse_products(data: &Value) -> Vec<TiktokRecord> {
    let mut records = Vec::new();

    let products = data
        .get("products")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for product in &products {
        let product_id = product
            .get("id")
            .and_then(coerce_string)
            .unwrap_or_default();
        let skus = product
            .get("skus")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for sku in &skus {
            let Some(model) = sku.get("seller_sku").and_then(coerce_string) else {
                continue;
            };
            let quantity = sku
                .get("stock_infos")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|info| info.get("available_stock").and_then(coerce_i64))
                .sum();
            let sku_id = sku.get("id").and_then(coerce_string).unwrap_or_default();

            records.push(TiktokRecord {
                model,
                quantity,
                product_id: product_id.clone(),
                sku_id,
            });
        }
    }

    records
}

/// Normalises a token grant. TikTok reports the access token expiry as an
/// absolute epoch timestamp; it is converted to relative seconds here.
fn parse_grant(data: &Value, now_epoch: i64) -> MarketResult<Oauth2Grant> {
    let access_token = data
        .get("access_token")
        .and_then(coerce_string)
        .ok_or_else(|| MarketError::Communication("grant missing access_token".to_string()))?;
    let refresh_token = data
        .get("refresh_token")
        .and_then(coerce_string)
        .ok_or_else(|| MarketError::Communication("grant missing refresh_token".to_string()))?;

    let expire = data
        .get("access_token_expire_in")
        .or_else(|| data.get("expires_in"))
        .and_then(coerce_i64)
        .unwrap_or(0);
    // Heuristic: anything beyond a year of seconds is an epoch timestamp.
    let expires_in = if expire > 31_536_000 {
        expire - now_epoch
    } else {
        expire
    };

    Ok(Oauth2Grant {
        access_token,
        refresh_token,
        expires_in,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_products_sums_stock_infos() {
        let data = json!({
            "total": 1,
            "products": [
                {
                    "id": "789",
                    "skus": [
                        {
                            "id": "901",
                            "seller_sku": "AE007",
                            "stock_infos": [
                                {"warehouse_id": "w1", "available_stock": 3},
                                {"warehouse_id": "w2", "available_stock": 4},
                            ]
                        },
                        {"id": "902", "stock_infos": []}
                    ]
                }
            ]
        });

        let records = parse_products(&data);
        // SKU without a seller_sku is dropped entirely.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model, "AE007");
        assert_eq!(records[0].quantity, 7);
        assert_eq!(records[0].product_id, "789");
        assert_eq!(records[0].sku_id, "901");
    }

    #[test]
    fn test_parse_grant_relative_expiry() {
        let grant = parse_grant(
            &json!({"access_token": "at", "refresh_token": "rt", "expires_in": 7200}),
            1_700_000_000,
        )
        .unwrap();
        assert_eq!(grant.expires_in, 7200);
    }

    #[test]
    fn test_parse_grant_epoch_expiry_is_normalised() {
        let grant = parse_grant(
            &json!({
                "access_token": "at",
                "refresh_token": "rt",
                "access_token_expire_in": 1_700_007_200i64
            }),
            1_700_000_000,
        )
        .unwrap();
        assert_eq!(grant.expires_in, 7200);
    }

    #[test]
    fn test_parse_grant_requires_tokens() {
        assert!(parse_grant(&json!({"access_token": "at"}), 0).is_err());
    }
}
