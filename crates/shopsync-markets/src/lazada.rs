//! # Lazada Adapter
//!
//! Talks to the Lazada Open Platform: signed JSON-over-HTTPS with an
//! XML payload on the price/quantity update path.
//!
//! ## Platform Quirks
//! - `stocks` is derived: `quantity - reserved`, where `reserved` falls
//!   out of the optional `Available` field (`reserved = quantity -
//!   Available`; platforms that omit `Available` report zero reserved).
//! - Updates MUST carry `ItemId` and `SkuId` alongside the seller SKU.
//! - Lazada occasionally accepts a quantity update and keeps serving the
//!   old number. Writes are therefore confirmed with a direct re-query;
//!   a mismatch raises [`MarketError::PlatformNotBehaving`] so the engine
//!   can latch the pair as not-behaving.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::adapter::{lookup_snapshot, Marketplace, Oauth2Grant};
use crate::error::{MarketError, MarketResult};
use crate::signing::lazada_signature;
use crate::util::{coerce_i64, coerce_string};
use shopsync_core::{Product, System, WriteOutcome, ERROR_SUCCESS};

/// Auth domain for the OAuth2 token endpoints.
pub const LAZADA_AUTH_DOMAIN: &str = "https://auth.lazada.com/rest";

const PARTNER_ID: &str = "shopsync-sdk-rust";
const PAGE_LIMIT: i64 = 50;

// =============================================================================
// Configuration
// =============================================================================

/// Credentials and endpoints for one Lazada shop.
#[derive(Debug, Clone)]
pub struct LazadaConfig {
    /// API domain, e.g. `https://api.lazada.com.ph/rest`.
    pub domain: String,
    pub app_key: String,
    pub app_secret: String,
    /// OAuth2 access token; empty for token-exchange-only clients.
    pub access_token: String,
    /// Reconfirm from Lazada after every quantity update.
    pub confirm_writes: bool,
}

impl LazadaConfig {
    pub fn new(
        domain: impl Into<String>,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        LazadaConfig {
            domain: domain.into(),
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            access_token: String::new(),
            confirm_writes: true,
        }
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    pub fn confirm_writes(mut self, confirm: bool) -> Self {
        self.confirm_writes = confirm;
        self
    }
}

// =============================================================================
// Snapshot Records
// =============================================================================

/// One Lazada SKU as cached from `/products/get`.
#[derive(Debug, Clone)]
struct LazadaRecord {
    model: String,
    quantity: i64,
    reserved: i64,
    item_id: String,
    sku_id: String,
}

impl LazadaRecord {
    /// Sellable stocks: `quantity - reserved`.
    fn stocks(&self) -> i64 {
        self.quantity - self.reserved
    }

    fn to_product(&self) -> Product {
        Product {
            model: self.model.clone(),
            stocks: self.stocks(),
            item_id: Some(self.item_id.clone()),
            sku_id: Some(self.sku_id.clone()),
        }
    }
}

/// Outcome of one Lazada request: `"0"` code means the platform was happy.
#[derive(Debug)]
struct LazadaReply {
    error_code: String,
    error_description: String,
    data: Value,
}

impl LazadaReply {
    fn is_success(&self) -> bool {
        self.error_code == ERROR_SUCCESS
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Marketplace adapter for Lazada.
#[derive(Debug)]
pub struct LazadaMarketplace {
    config: LazadaConfig,
    http: Client,
    products: Vec<LazadaRecord>,
}

impl LazadaMarketplace {
    pub fn new(config: LazadaConfig) -> MarketResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(LazadaMarketplace {
            config,
            http,
            products: Vec::new(),
        })
    }

    /// Creates and sends one signed request.
    ///
    /// `with_token` is false for the auth endpoints, which are signed with
    /// the app secret but carry no access token.
    async fn request(
        &self,
        endpoint: &str,
        api_params: &[(&str, String)],
        payload: Option<String>,
        domain: Option<&str>,
        with_token: bool,
    ) -> MarketResult<LazadaReply> {
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("app_key".to_string(), self.config.app_key.clone());
        params.insert("sign_method".to_string(), "sha256".to_string());
        params.insert(
            "timestamp".to_string(),
            Utc::now().timestamp_millis().to_string(),
        );
        params.insert("partner_id".to_string(), PARTNER_ID.to_string());
        if with_token && !self.config.access_token.is_empty() {
            params.insert("access_token".to_string(), self.config.access_token.clone());
        }
        if let Some(ref payload) = payload {
            params.insert("payload".to_string(), payload.clone());
        }
        for (key, value) in api_params {
            params.insert(key.to_string(), value.clone());
        }
        params.insert(
            "sign".to_string(),
            lazada_signature(&self.config.app_secret, endpoint, &params),
        );

        let domain = domain.unwrap_or(&self.config.domain);
        let url = format!("{domain}{endpoint}");

        let response = if payload.is_some() {
            self.http.post(&url).form(&params).send().await?
        } else {
            self.http.get(&url).query(&params).send().await?
        };

        let body: Value = response.json().await?;
        Ok(parse_reply(body, !with_token))
    }

    fn record(&self, model: &str) -> MarketResult<&LazadaRecord> {
        lookup_snapshot(System::Lazada, &self.products, model, |r| r.model.as_str())
    }

    /// Exchanges an authorization code for a fresh OAuth2 token pair.
    pub async fn create_oauth2_tokens(&self, code: &str) -> MarketResult<Oauth2Grant> {
        let reply = self
            .request(
                "/auth/token/create",
                &[("code", code.to_string())],
                None,
                Some(LAZADA_AUTH_DOMAIN),
                false,
            )
            .await?;

        if !reply.is_success() {
            return Err(MarketError::Communication(format!(
                "Error creating oauth2: {}",
                reply.error_description
            )));
        }

        parse_grant(&reply.data)
    }

    /// Refreshes the OAuth2 token pair from a stored refresh token.
    pub async fn refresh_oauth2_tokens(&self, refresh_token: &str) -> MarketResult<Oauth2Grant> {
        let reply = self
            .request(
                "/auth/token/refresh",
                &[("refresh_token", refresh_token.to_string())],
                None,
                Some(LAZADA_AUTH_DOMAIN),
                false,
            )
            .await?;

        if !reply.is_success() {
            return Err(MarketError::Communication(format!(
                "Error updating oauth2: {}",
                reply.error_description
            )));
        }

        parse_grant(&reply.data)
    }

    /// Re-queries Lazada for one model, bypassing the snapshot.
    async fn fetch_direct(&self, model: &str) -> MarketResult<LazadaRecord> {
        let reply = self
            .request(
                "/products/get",
                &[("search", model.to_string())],
                None,
                None,
                true,
            )
            .await?;

        if !reply.is_success() {
            return Err(MarketError::Communication(format!(
                "Error communicating: {}",
                reply.error_description
            )));
        }

        let (_, records) = parse_products(&reply.data);
        let mut matches: Vec<LazadaRecord> =
            records.into_iter().filter(|r| r.model == model).collect();

        if matches.is_empty() {
            return Err(MarketError::NotFound(format!("No results for {model}")));
        }
        if matches.len() > 1 {
            // Search is fuzzy; a duplicate here is Lazada noise, not a
            // snapshot ambiguity. Take the first and carry on.
            warn!(model = %model, "Lazada has multiple direct results");
        }

        Ok(matches.swap_remove(0))
    }
}

#[async_trait]
impl Marketplace for LazadaMarketplace {
    fn system(&self) -> System {
        System::Lazada
    }

    async fn refresh(&mut self) -> MarketResult<()> {
        let mut offset: i64 = 0;
        let mut total: i64 = 0;
        let mut items: Vec<LazadaRecord> = Vec::new();

        loop {
            let reply = self
                .request(
                    "/products/get",
                    &[
                        ("offset", offset.to_string()),
                        ("limit", PAGE_LIMIT.to_string()),
                    ],
                    None,
                    None,
                    true,
                )
                .await?;

            if !reply.is_success() {
                return Err(MarketError::Communication(format!(
                    "Error communicating: {}",
                    reply.error_description
                )));
            }

            let (page_total, mut records) = parse_products(&reply.data);
            total = page_total;
            items.append(&mut records);

            info!(loaded = items.len(), total, "Loaded Lazada items");

            offset += PAGE_LIMIT;
            if offset >= total {
                break;
            }
        }

        info!(total = items.len(), "Total Lazada items");
        self.products = items;

        Ok(())
    }

    fn list_products(&self) -> Vec<Product> {
        self.products.iter().map(LazadaRecord::to_product).collect()
    }

    fn get_product(&self, model: &str) -> MarketResult<Product> {
        self.record(model).map(LazadaRecord::to_product)
    }

    async fn update_product_stocks(&self, model: &str, stocks: i64) -> MarketResult<WriteOutcome> {
        let record = self.record(model)?;
        // The platform wants the gross quantity; reserved units ride along.
        let quantity = stocks + record.reserved;

        let payload =
            build_update_payload(&record.model, quantity, &record.item_id, &record.sku_id);
        let reply = self
            .request("/product/price_quantity/update", &[], Some(payload), None, true)
            .await?;

        let outcome = if reply.is_success() {
            WriteOutcome::success()
        } else {
            WriteOutcome::failure(reply.error_code, reply.error_description)
        };

        if self.config.confirm_writes && outcome.is_success() {
            let updated = self.fetch_direct(model).await?;
            if updated.stocks() != stocks {
                return Err(MarketError::PlatformNotBehaving(format!(
                    "{model}: wrote {stocks}, Lazada reports {}",
                    updated.stocks()
                )));
            }
        }

        Ok(outcome)
    }

    async fn get_product_direct(&self, model: &str) -> MarketResult<Product> {
        self.fetch_direct(model).await.map(|r| r.to_product())
    }
}

// =============================================================================
// Payload Parsing / Building
// =============================================================================

fn parse_reply(body: Value, raw: bool) -> LazadaReply {
    let code = body.get("code").and_then(coerce_string);

    match code {
        Some(code) if code != ERROR_SUCCESS => LazadaReply {
            error_description: body
                .get("message")
                .and_then(coerce_string)
                .unwrap_or_default(),
            error_code: code,
            data: Value::Null,
        },
        _ => {
            let data = if raw {
                body
            } else {
                body.get("data").cloned().unwrap_or(Value::Null)
            };
            LazadaReply {
                error_code: ERROR_SUCCESS.to_string(),
                error_description: String::new(),
                data,
            }
        }
    }
}

/// Parses one `/products/get` page into `(total_products, records)`.
fn parse_products(data: &Value) -> (i64, Vec<LazadaRecord>) {
    let total = data
        .get("total_products")
        .and_then(coerce_i64)
        .unwrap_or(0);

    let mut records = Vec::new();
    let products = data
        .get("products")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for product in &products {
        let item_id = product
            .get("item_id")
            .and_then(coerce_string)
            .unwrap_or_default();
        let skus = product
            .get("skus")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for sku in &skus {
            let Some(model) = sku.get("SellerSku").and_then(coerce_string) else {
                continue;
            };
            let quantity = sku.get("quantity").and_then(coerce_i64).unwrap_or(0);
            // Lazada dropped "Available" from some responses; absent means
            // nothing is reserved.
            let available = sku.get("Available").and_then(coerce_i64).unwrap_or(quantity);
            let reserved = quantity - available;
            let sku_id = sku.get("SkuId").and_then(coerce_string).unwrap_or_default();

            records.push(LazadaRecord {
                model,
                quantity,
                reserved,
                item_id: item_id.clone(),
                sku_id,
            });
        }
    }

    (total, records)
}

/// Builds the XML payload for `/product/price_quantity/update`.
///
/// `ItemId` and `SkuId` are required by the endpoint and must carry the
/// values captured at refresh time.
fn build_update_payload(model: &str, quantity: i64, item_id: &str, sku_id: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8" ?>"#,
            "<Request><Product><Skus><Sku>",
            "<SellerSku>{model}</SellerSku>",
            "<Quantity>{quantity}</Quantity>",
            "<ItemId>{item_id}</ItemId>",
            "<SkuId>{sku_id}</SkuId>",
            "</Sku></Skus></Product></Request>"
        ),
        model = xml_escape(model),
        quantity = quantity,
        item_id = xml_escape(item_id),
        sku_id = xml_escape(sku_id),
    )
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn parse_grant(data: &Value) -> MarketResult<Oauth2Grant> {
    let access_token = data
        .get("access_token")
        .and_then(coerce_string)
        .ok_or_else(|| MarketError::Communication("grant missing access_token".to_string()))?;
    let refresh_token = data
        .get("refresh_token")
        .and_then(coerce_string)
        .ok_or_else(|| MarketError::Communication("grant missing refresh_token".to_string()))?;
    let expires_in = data.get("expires_in").and_then(coerce_i64).unwrap_or(0);

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
    use serde_json::json;

    #[test]
    fn test_parse_products_derives_reserved_from_available() {
        let data = json!({
            "total_products": 2,
            "products": [
                {
                    "item_id": 111,
                    "skus": [
                        {"SellerSku": "WHC0011RF", "quantity": "10", "Available": "7", "SkuId": 901},
                        {"SellerSku": "DFR0431", "quantity": 5, "SkuId": 902},
                    ]
                }
            ]
        });

        let (total, records) = parse_products(&data);
        assert_eq!(total, 2);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].model, "WHC0011RF");
        assert_eq!(records[0].quantity, 10);
        assert_eq!(records[0].reserved, 3);
        assert_eq!(records[0].stocks(), 7);
        assert_eq!(records[0].item_id, "111");
        assert_eq!(records[0].sku_id, "901");

        // No "Available" field: nothing reserved.
        assert_eq!(records[1].reserved, 0);
        assert_eq!(records[1].stocks(), 5);
    }

    #[test]
    fn test_parse_products_skips_rows_without_seller_sku() {
        let data = json!({
            "total_products": 1,
            "products": [{"item_id": 1, "skus": [{"quantity": 3}]}]
        });
        let (_, records) = parse_products(&data);
        assert!(records.is_empty());
    }

    #[test]
    fn test_update_payload_carries_item_and_sku_ids() {
        let payload = build_update_payload("WHC0011RF", 4, "111", "901");

        assert!(payload.starts_with(r#"<?xml version="1.0" encoding="utf-8" ?>"#));
        assert!(payload.contains("<SellerSku>WHC0011RF</SellerSku>"));
        assert!(payload.contains("<Quantity>4</Quantity>"));
        assert!(payload.contains("<ItemId>111</ItemId>"));
        assert!(payload.contains("<SkuId>901</SkuId>"));
    }

    #[test]
    fn test_update_payload_escapes_model() {
        let payload = build_update_payload("A&B<C>", 1, "", "");
        assert!(payload.contains("<SellerSku>A&amp;B&lt;C&gt;</SellerSku>"));
    }

    #[test]
    fn test_parse_reply_error_and_success() {
        let err = parse_reply(json!({"code": "1001", "message": "nope"}), false);
        assert!(!err.is_success());
        assert_eq!(err.error_code, "1001");
        assert_eq!(err.error_description, "nope");

        let ok = parse_reply(json!({"code": "0", "data": {"x": 1}}), false);
        assert!(ok.is_success());
        assert_eq!(ok.data, json!({"x": 1}));

        // Raw replies keep the whole body (auth endpoints).
        let raw = parse_reply(json!({"access_token": "t"}), true);
        assert!(raw.is_success());
        assert_eq!(raw.data, json!({"access_token": "t"}));
    }

    #[test]
    fn test_parse_grant() {
        let grant = parse_grant(&json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 604800
        }))
        .unwrap();
        assert_eq!(grant.access_token, "at");
        assert_eq!(grant.refresh_token, "rt");
        assert_eq!(grant.expires_in, 604800);

        assert!(parse_grant(&json!({"refresh_token": "rt"})).is_err());
    }
}
