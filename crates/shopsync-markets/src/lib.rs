//! # shopsync-markets: Marketplace Adapters
//!
//! One canonical adapter per marketplace, all speaking the same
//! [`Marketplace`] contract. The reconciliation engine names only this
//! capability set; signing, pagination, retry and variant explosion stay
//! behind it.
//!
//! ## Adapters
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Marketplace trait                                  │
//! │                            ▲                                            │
//! │      ┌───────────┬─────────┼──────────┬───────────────┐                │
//! │      │           │         │          │               │                │
//! │  ┌───┴────┐ ┌────┴───┐ ┌───┴────┐ ┌───┴─────────┐ ┌───┴─────┐         │
//! │  │ Lazada │ │ Shopee │ │ TikTok │ │ WooCommerce │ │ Opencart│         │
//! │  │ signed │ │ signed │ │ signed │ │ wc/v3 REST  │ │ legacy  │         │
//! │  │ JSON + │ │ JSON,  │ │ JSON,  │ │ key/secret  │ │ admin   │         │
//! │  │ XML    │ │ variant│ │ ware-  │ │             │ │ login   │         │
//! │  │ update │ │ flatten│ │ houses │ │             │ │         │         │
//! │  └────────┘ └────────┘ └────────┘ └─────────────┘ └─────────┘         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adapter;
pub mod error;
pub mod lazada;
pub mod opencart;
pub mod shopee;
pub mod tiktok;
pub mod woocommerce;

mod signing;
mod util;

// =============================================================================
// Re-exports
// =============================================================================

pub use adapter::{Marketplace, Oauth2Grant};
pub use error::{MarketError, MarketResult};

pub use lazada::{LazadaConfig, LazadaMarketplace, LAZADA_AUTH_DOMAIN};
pub use opencart::{OpencartConfig, OpencartMarketplace};
pub use shopee::{ShopeeConfig, ShopeeMarketplace};
pub use tiktok::{TiktokConfig, TiktokMarketplace, TIKTOK_AUTH_DOMAIN};
pub use woocommerce::{WooCommerceConfig, WooCommerceMarketplace};
