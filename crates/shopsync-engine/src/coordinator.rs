//! # Batch Coordinator
//!
//! Owns everything around a batch: opening the store, constructing the
//! enabled adapters (with their stored OAuth2 tokens), refreshing them,
//! running cleanup and reconciliation, and refreshing short-lived tokens
//! afterwards. Also hosts the reauth flows and the configuration summary.
//!
//! ## Failure Semantics
//! A refresh failure is fatal for that adapter only: the batch proceeds
//! with the remaining adapters, and the absent adapter's SKUs contribute
//! no delta. All adapters failing is fatal for the batch.

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::engine::{ReconciliationEngine, SyncReport};
use crate::error::{EngineError, EngineResult};
use shopsync_core::System;
use shopsync_db::{Database, DbConfig};
use shopsync_markets::{
    LazadaConfig, LazadaMarketplace, Marketplace, Oauth2Grant, OpencartConfig,
    OpencartMarketplace, ShopeeConfig, ShopeeMarketplace, TiktokConfig, TiktokMarketplace,
    WooCommerceConfig, WooCommerceMarketplace,
};

// =============================================================================
// Configuration Summary
// =============================================================================

/// Stored-token digest for one OAuth2 marketplace. No secrets.
#[derive(Debug, Clone)]
pub struct TokenSummary {
    pub system: System,
    pub created_on: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
}

/// What `chkconfig` reports.
#[derive(Debug, Clone)]
pub struct ConfigSummary {
    pub enabled: Vec<System>,
    pub default_system: System,
    pub tokens: Vec<TokenSummary>,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Drives one batch end to end.
pub struct BatchCoordinator {
    config: AppConfig,
}

impl BatchCoordinator {
    pub fn new(config: AppConfig) -> Self {
        BatchCoordinator { config }
    }

    /// Cleanup plus reconciliation: the `sync` subcommand.
    pub async fn run_sync(&self, read_only: bool) -> EngineResult<SyncReport> {
        let db = self.open_store().await?;

        let adapters = self.build_refreshed_adapters(&db).await?;
        let engine = ReconciliationEngine::new(
            db.clone(),
            adapters,
            self.config.common.default_system,
        );

        match engine.cleanup().await {
            Ok(deleted) => {
                if !deleted.is_empty() {
                    info!(count = deleted.len(), "Pruned stale inventory models");
                }
            }
            // The default marketplace didn't survive refresh; reconcile
            // what's left and prune another day.
            Err(EngineError::Config(message)) => {
                warn!(reason = %message, "Skipping cleanup");
            }
            Err(e) => return Err(e),
        }

        let report = engine.sync(read_only).await?;

        self.refresh_oauth2_tokens(&db, read_only).await?;

        db.close().await;
        Ok(report)
    }

    /// Prune-only: the `cleanup` subcommand.
    pub async fn run_cleanup(&self) -> EngineResult<Vec<String>> {
        let db = self.open_store().await?;
        let system = self.config.common.default_system;

        let mut adapter = self.build_adapter(&db, system).await?;
        adapter.refresh().await?;

        let engine = ReconciliationEngine::new(db.clone(), vec![adapter], system);
        let deleted = engine.cleanup().await?;

        db.close().await;
        Ok(deleted)
    }

    /// Exchanges a Lazada authorization code for tokens and stores them.
    pub async fn reauth_lazada(&self, code: &str) -> EngineResult<()> {
        let section = self
            .config
            .lazada
            .as_ref()
            .ok_or_else(|| EngineError::Config("Lazada is not enabled".to_string()))?;

        let client = LazadaMarketplace::new(LazadaConfig::new(
            &section.domain,
            &section.app_key,
            &section.app_secret,
        ))?;
        let grant = client.create_oauth2_tokens(code).await?;

        let db = self.open_store().await?;
        self.save_grant(&db, System::Lazada, grant).await?;
        db.close().await;

        Ok(())
    }

    /// Exchanges a TikTok authorization code for tokens and stores them.
    pub async fn reauth_tiktok(&self, code: &str) -> EngineResult<()> {
        let section = self
            .config
            .tiktok
            .as_ref()
            .ok_or_else(|| EngineError::Config("TikTok is not enabled".to_string()))?;

        let client = TiktokMarketplace::new(TiktokConfig {
            domain: section.domain.clone(),
            app_key: section.app_key.clone(),
            app_secret: section.app_secret.clone(),
            access_token: String::new(),
            shop_id: section.shop_id.clone(),
            warehouse_id: section.warehouse_id.clone(),
        })?;
        let grant = client.exchange_auth_code(code).await?;

        let db = self.open_store().await?;
        self.save_grant(&db, System::Tiktok, grant).await?;
        db.close().await;

        Ok(())
    }

    /// Enabled marketplaces plus a digest of the stored OAuth2 tokens.
    pub async fn check_config(&self) -> EngineResult<ConfigSummary> {
        let db = self.open_store().await?;

        let mut tokens = Vec::new();
        for system in self.config.enabled_systems() {
            if !system.uses_oauth2() {
                continue;
            }
            match db.oauth2().get(system).await {
                Ok(stored) => tokens.push(TokenSummary {
                    system,
                    created_on: stored.created_on,
                    expires_on: stored.expires_on,
                }),
                Err(e) if e.is_not_found() => {
                    warn!(system = %system, "No OAuth2 tokens stored yet");
                }
                Err(e) => return Err(e.into()),
            }
        }

        db.close().await;

        Ok(ConfigSummary {
            enabled: self.config.enabled_systems(),
            default_system: self.config.common.default_system,
            tokens,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn open_store(&self) -> EngineResult<Database> {
        Ok(Database::new(DbConfig::new(&self.config.common.store)).await?)
    }

    /// Constructs one adapter, pulling stored OAuth2 tokens where needed.
    /// Does not refresh.
    async fn build_adapter(
        &self,
        db: &Database,
        system: System,
    ) -> EngineResult<Box<dyn Marketplace>> {
        let adapter: Box<dyn Marketplace> = match system {
            System::Opencart => {
                let section = self.config.opencart.as_ref().ok_or_else(|| {
                    EngineError::Config("Opencart section missing".to_string())
                })?;
                Box::new(OpencartMarketplace::new(OpencartConfig {
                    domain: section.domain.clone(),
                    username: section.username.clone(),
                    password: section.password.clone(),
                })?)
            }
            System::Lazada => {
                let section = self.config.lazada.as_ref().ok_or_else(|| {
                    EngineError::Config("Lazada section missing".to_string())
                })?;
                let config = LazadaConfig::new(
                    &section.domain,
                    &section.app_key,
                    &section.app_secret,
                )
                .access_token(self.stored_access_token(db, System::Lazada).await?)
                .confirm_writes(section.confirm_writes);
                Box::new(LazadaMarketplace::new(config)?)
            }
            System::Shopee => {
                let section = self.config.shopee.as_ref().ok_or_else(|| {
                    EngineError::Config("Shopee section missing".to_string())
                })?;
                Box::new(ShopeeMarketplace::new(ShopeeConfig {
                    shop_id: section.shop_id,
                    partner_id: section.partner_id,
                    partner_key: section.partner_key.clone(),
                })?)
            }
            System::Tiktok => {
                let section = self.config.tiktok.as_ref().ok_or_else(|| {
                    EngineError::Config("TikTok section missing".to_string())
                })?;
                Box::new(TiktokMarketplace::new(TiktokConfig {
                    domain: section.domain.clone(),
                    app_key: section.app_key.clone(),
                    app_secret: section.app_secret.clone(),
                    access_token: self.stored_access_token(db, System::Tiktok).await?,
                    shop_id: section.shop_id.clone(),
                    warehouse_id: section.warehouse_id.clone(),
                })?)
            }
            System::WooCommerce => {
                let section = self.config.woocommerce.as_ref().ok_or_else(|| {
                    EngineError::Config("WooCommerce section missing".to_string())
                })?;
                Box::new(WooCommerceMarketplace::new(WooCommerceConfig {
                    domain: section.domain.clone(),
                    consumer_key: section.consumer_key.clone(),
                    consumer_secret: section.consumer_secret.clone(),
                })?)
            }
        };

        Ok(adapter)
    }

    /// Builds every enabled adapter and refreshes it; adapters that fail
    /// to refresh are dropped from the batch.
    async fn build_refreshed_adapters(
        &self,
        db: &Database,
    ) -> EngineResult<Vec<Box<dyn Marketplace>>> {
        let mut adapters = Vec::new();

        for system in self.config.enabled_systems() {
            let mut adapter = self.build_adapter(db, system).await?;
            match adapter.refresh().await {
                Ok(()) => adapters.push(adapter),
                Err(e) => {
                    error!(system = %system, error = %e, "Dropping marketplace: refresh failed");
                }
            }
        }

        retain_or_fail(adapters)
    }

    async fn stored_access_token(&self, db: &Database, system: System) -> EngineResult<String> {
        match db.oauth2().get(system).await {
            Ok(tokens) => Ok(tokens.access_token),
            Err(e) if e.is_not_found() => {
                warn!(system = %system, "No OAuth2 tokens stored; run the reauth command");
                Ok(String::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Post-batch refresh of the short-lived OAuth2 access tokens.
    async fn refresh_oauth2_tokens(&self, db: &Database, read_only: bool) -> EngineResult<()> {
        if read_only {
            info!("Skipping OAuth2 token refresh: read-only mode");
            return Ok(());
        }

        if let Some(section) = &self.config.lazada {
            if let Some(stored) = self.stored_refresh_token(db, System::Lazada).await? {
                let client = LazadaMarketplace::new(LazadaConfig::new(
                    &section.domain,
                    &section.app_key,
                    &section.app_secret,
                ))?;
                let grant = client.refresh_oauth2_tokens(&stored).await?;
                self.save_grant(db, System::Lazada, grant).await?;
            }
        }

        if let Some(section) = &self.config.tiktok {
            if let Some(stored) = self.stored_refresh_token(db, System::Tiktok).await? {
                let client = TiktokMarketplace::new(TiktokConfig {
                    domain: section.domain.clone(),
                    app_key: section.app_key.clone(),
                    app_secret: section.app_secret.clone(),
                    access_token: String::new(),
                    shop_id: section.shop_id.clone(),
                    warehouse_id: section.warehouse_id.clone(),
                })?;
                let grant = client.refresh_oauth2_tokens(&stored).await?;
                self.save_grant(db, System::Tiktok, grant).await?;
            }
        }

        Ok(())
    }

    async fn stored_refresh_token(
        &self,
        db: &Database,
        system: System,
    ) -> EngineResult<Option<String>> {
        match db.oauth2().get(system).await {
            Ok(tokens) => Ok(Some(tokens.refresh_token)),
            Err(e) if e.is_not_found() => {
                warn!(system = %system, "No tokens to refresh");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_grant(
        &self,
        db: &Database,
        system: System,
        grant: Oauth2Grant,
    ) -> EngineResult<()> {
        let expires_on = Utc::now() + Duration::seconds(grant.expires_in);
        db.oauth2()
            .save(system, &grant.access_token, &grant.refresh_token, expires_on)
            .await?;

        info!(system = %system, %expires_on, "Stored OAuth2 tokens");
        Ok(())
    }
}

/// An empty adapter set means nothing can be reconciled.
fn retain_or_fail(adapters: Vec<Box<dyn Marketplace>>) -> EngineResult<Vec<Box<dyn Marketplace>>> {
    if adapters.is_empty() {
        return Err(EngineError::AllSystemsFailed);
    }
    Ok(adapters)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockMarketplace;

    async fn refresh_all(
        mut adapters: Vec<Box<dyn Marketplace>>,
    ) -> EngineResult<Vec<Box<dyn Marketplace>>> {
        let mut survivors = Vec::new();
        for adapter in adapters.iter_mut() {
            if adapter.refresh().await.is_ok() {
                survivors.push(adapter.system());
            }
        }
        let kept: Vec<Box<dyn Marketplace>> = adapters
            .into_iter()
            .filter(|a| survivors.contains(&a.system()))
            .collect();
        retain_or_fail(kept)
    }

    #[tokio::test]
    async fn test_failed_refresh_drops_only_that_adapter() {
        let healthy = MockMarketplace::new(System::Opencart, &[("X", 1)]);
        let broken = MockMarketplace::new(System::Shopee, &[("X", 1)]);
        broken.set_fail_refresh(true);

        let kept = refresh_all(vec![Box::new(healthy), Box::new(broken)])
            .await
            .unwrap();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].system(), System::Opencart);
    }

    #[tokio::test]
    async fn test_all_adapters_failing_is_fatal() {
        let a = MockMarketplace::new(System::Opencart, &[]);
        let b = MockMarketplace::new(System::Shopee, &[]);
        a.set_fail_refresh(true);
        b.set_fail_refresh(true);

        let err = refresh_all(vec![Box::new(a), Box::new(b)]).await.unwrap_err();
        assert!(matches!(err, EngineError::AllSystemsFailed));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_check_config_reports_enabled_systems() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store.db");

        let config = AppConfig::from_toml(&format!(
            r#"
            [common]
            store = "{}"
            default_system = "OPENCART"

            [opencart]
            domain = "d"
            username = "u"
            password = "p"

            [lazada]
            domain = "d"
            app_key = "k"
            app_secret = "s"
            "#,
            store.display()
        ))
        .unwrap();

        let summary = BatchCoordinator::new(config).check_config().await.unwrap();

        assert_eq!(summary.enabled, vec![System::Opencart, System::Lazada]);
        assert_eq!(summary.default_system, System::Opencart);
        // Nothing stored yet, so no token summaries and no secrets.
        assert!(summary.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_reauth_requires_the_section() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_toml(&format!(
            r#"
            [common]
            store = "{}"
            default_system = "OPENCART"

            [opencart]
            domain = "d"
            username = "u"
            password = "p"
            "#,
            dir.path().join("store.db").display()
        ))
        .unwrap();

        let coordinator = BatchCoordinator::new(config);
        assert_eq!(coordinator.reauth_lazada("code").await.unwrap_err().exit_code(), 1);
        assert_eq!(coordinator.reauth_tiktok("code").await.unwrap_err().exit_code(), 1);
    }
}
