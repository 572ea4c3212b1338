//! # Application Configuration
//!
//! TOML configuration, one table per enabled marketplace plus a `[common]`
//! table for the store path and the default system.
//!
//! ## Configuration File Format
//! ```toml
//! [common]
//! store = "./shopsync.db"
//! default_system = "OPENCART"
//!
//! [opencart]
//! domain = "https://shop.example.com/admin/index.php?route="
//! username = "sync"
//! password = "secret"
//!
//! [lazada]
//! domain = "https://api.lazada.com.ph/rest"
//! app_key = "102505"
//! app_secret = "..."
//!
//! [shopee]
//! shop_id = 123456
//! partner_id = 840000
//! partner_key = "..."
//!
//! [tiktok]
//! domain = "https://open-api.tiktokglobalshop.com"
//! app_key = "..."
//! app_secret = "..."
//! shop_id = "..."
//! warehouse_id = ""     # discovered on refresh when empty
//!
//! [woocommerce]
//! domain = "https://shop.example.com"
//! consumer_key = "ck_..."
//! consumer_secret = "cs_..."
//! ```
//!
//! A marketplace is enabled by the presence of its table. OAuth2 access
//! tokens (Lazada, TikTok) are not configured here; they live in the
//! store and are maintained through the reauth commands.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use shopsync_core::System;

/// Default config path, overridable with `CONFIG_PATH` or `--config`.
pub const DEFAULT_CONFIG_PATH: &str = "configs/shopsync.toml";

// =============================================================================
// Sections
// =============================================================================

/// The `[common]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonConfig {
    /// Path of the SQLite store.
    pub store: PathBuf,

    /// The canonical catalogue; sole origin for previously-unseen SKUs.
    pub default_system: System,
}

/// The `[opencart]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct OpencartSection {
    pub domain: String,
    pub username: String,
    pub password: String,
}

/// The `[lazada]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct LazadaSection {
    pub domain: String,
    pub app_key: String,
    pub app_secret: String,
    /// Read-after-write confirmation; on by default because Lazada lags.
    #[serde(default = "default_true")]
    pub confirm_writes: bool,
}

/// The `[shopee]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ShopeeSection {
    pub shop_id: i64,
    pub partner_id: i64,
    pub partner_key: String,
}

/// The `[tiktok]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct TiktokSection {
    pub domain: String,
    pub app_key: String,
    pub app_secret: String,
    pub shop_id: String,
    /// Warehouse to stock from/to; discovered on refresh when empty.
    #[serde(default)]
    pub warehouse_id: String,
}

/// The `[woocommerce]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct WooCommerceSection {
    pub domain: String,
    pub consumer_key: String,
    pub consumer_secret: String,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// AppConfig
// =============================================================================

/// Full application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub common: CommonConfig,

    #[serde(default)]
    pub opencart: Option<OpencartSection>,
    #[serde(default)]
    pub lazada: Option<LazadaSection>,
    #[serde(default)]
    pub shopee: Option<ShopeeSection>,
    #[serde(default)]
    pub tiktok: Option<TiktokSection>,
    #[serde(default)]
    pub woocommerce: Option<WooCommerceSection>,
}

impl AppConfig {
    /// Loads and validates the configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");

        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&raw)?;
        config.validate()?;

        Ok(config)
    }

    /// Parses configuration from a TOML string (tests, embedded configs).
    pub fn from_toml(raw: &str) -> EngineResult<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the config path: CLI flag, `CONFIG_PATH`, then default.
    pub fn resolve_path(cli_path: Option<PathBuf>) -> PathBuf {
        cli_path
            .or_else(|| std::env::var_os("CONFIG_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// The marketplaces enabled by the presence of their table.
    pub fn enabled_systems(&self) -> Vec<System> {
        let mut systems = Vec::new();
        if self.opencart.is_some() {
            systems.push(System::Opencart);
        }
        if self.lazada.is_some() {
            systems.push(System::Lazada);
        }
        if self.shopee.is_some() {
            systems.push(System::Shopee);
        }
        if self.tiktok.is_some() {
            systems.push(System::Tiktok);
        }
        if self.woocommerce.is_some() {
            systems.push(System::WooCommerce);
        }
        systems
    }

    fn validate(&self) -> EngineResult<()> {
        let enabled = self.enabled_systems();

        if enabled.is_empty() {
            return Err(EngineError::Config(
                "no marketplace sections enabled".to_string(),
            ));
        }
        if !enabled.contains(&self.common.default_system) {
            return Err(EngineError::Config(format!(
                "default system {} has no enabled section",
                self.common.default_system
            )));
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
