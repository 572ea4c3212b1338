//! # Reconciliation Engine
//!
//! The per-batch algorithm: snapshot → delta → aggregate → apply →
//! cache-forward.
//!
//! ## One Batch
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  batch_id ← start_batch(version)                                       │
//! │                                                                         │
//! │  for each model across all snapshots:                                  │
//! │      Δ ← Σ over marketplaces of (current - cached)                     │
//! │          • cache row absent or not_behaving ⇒ cached = current (δ=0)   │
//! │          • lookup failure ⇒ (0, 0), marketplace cannot poison the sum  │
//! │          • every non-zero δ is appended to the delta audit log         │
//! │                                                                         │
//! │      item ← inventory row, else default marketplace, else skip         │
//! │      item.stocks ← max(0, item.stocks + Δ)      ← clamp, never negative│
//! │                                                                         │
//! │      read-only? stop here (observe only)                               │
//! │                                                                         │
//! │      upsert inventory; for each marketplace:                           │
//! │          freshen cache with its pre-write observation                  │
//! │          write if observation ≠ item.stocks                            │
//! │          log the attempt; on success, cache-forward item.stocks        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Between batch k and k+1 the cache holds the value last written and
//! confirmed, so a sale of `s` units shows up as exactly one δ = -s and
//! is absorbed exactly once. The engine aggregates; it never arbitrates:
//! unexplained gains are applied unchanged.

use std::collections::BTreeSet;

use tracing::{error, info, warn};

use crate::error::{EngineError, EngineResult};
use shopsync_core::{clamp_stocks, InventoryItem, SyncLogEntry, System, ENGINE_VERSION};
use shopsync_db::Database;
use shopsync_markets::{MarketError, Marketplace};

// =============================================================================
// Sync Report
// =============================================================================

/// Summary of one reconciliation batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Batch id handed out by the store.
    pub batch_id: i64,

    /// Distinct models observed across all marketplaces.
    pub models_seen: usize,

    /// Models skipped because the default marketplace doesn't know them.
    pub models_skipped: usize,

    /// Marketplace writes attempted (one per sync log row).
    pub writes_attempted: usize,

    /// Attempted writes that did not land.
    pub writes_failed: usize,
}

/// What `update_external` did for one `(marketplace, model)` pair.
struct UpdateOutcome {
    wrote: bool,
    success: bool,
}

// =============================================================================
// Engine
// =============================================================================

/// Owns the per-batch reconciliation algorithm.
///
/// Adapters arrive already refreshed; the engine runs one SKU at a time
/// and, within a SKU, one marketplace at a time. Store failures abort the
/// batch; marketplace failures are absorbed per `(SKU, marketplace)`.
pub struct ReconciliationEngine {
    db: Database,
    adapters: Vec<Box<dyn Marketplace>>,
    default_system: System,
}

impl ReconciliationEngine {
    /// Creates an engine over an adapter set.
    ///
    /// `default_system` names the fallback origin for previously-unseen
    /// SKUs; it should normally be present in `adapters`.
    pub fn new(
        db: Database,
        adapters: Vec<Box<dyn Marketplace>>,
        default_system: System,
    ) -> Self {
        for adapter in &adapters {
            info!(system = %adapter.system(), "Enabling system");
        }

        ReconciliationEngine {
            db,
            adapters,
            default_system,
        }
    }

    /// Executes the whole syncing batch process.
    pub async fn sync(&self, read_only: bool) -> EngineResult<SyncReport> {
        let batch_id = self.db.batches().start(ENGINE_VERSION).await?;
        let models = self.collect_models();

        let mut report = SyncReport {
            batch_id,
            models_seen: models.len(),
            ..SyncReport::default()
        };

        for model in &models {
            // Aggregate the observed deltas across all marketplaces.
            let mut stocks_delta: i64 = 0;
            for adapter in &self.adapters {
                let (delta, current) = self.system_stocks_delta(adapter.as_ref(), model).await;
                if delta != 0 {
                    info!(
                        system = %adapter.system(),
                        model = %model,
                        delta,
                        "Change in stocks"
                    );
                    self.db
                        .cache()
                        .append_delta(
                            adapter.system(),
                            model,
                            current - delta,
                            current,
                            delta,
                            batch_id,
                        )
                        .await?;
                    stocks_delta += delta;
                }
            }

            // Authoritative row, falling back to the default marketplace
            // for SKUs the store has never seen.
            let mut item = match self.db.inventory().get(model).await {
                Ok(item) => item,
                Err(e) if e.is_not_found() => match self.default_product(model) {
                    Some(item) => item,
                    None => {
                        error!(model = %model, "This item is not in the default system");
                        report.models_skipped += 1;
                        continue;
                    }
                },
                Err(e) => return Err(e.into()),
            };

            item.stocks = clamp_stocks(item.stocks + stocks_delta);
            item.last_sync_batch_id = batch_id;

            if read_only {
                info!(
                    model = %item.model,
                    stocks = item.stocks,
                    "Skip updating item: read-only mode"
                );
                continue;
            }

            self.db.inventory().upsert(&item).await?;

            // Push the authoritative value back out everywhere.
            for adapter in &self.adapters {
                match self.update_external(adapter.as_ref(), &item, batch_id).await {
                    Ok(outcome) => {
                        if outcome.wrote {
                            report.writes_attempted += 1;
                            if !outcome.success {
                                report.writes_failed += 1;
                            }
                        }
                    }
                    Err(EngineError::Market(e)) => match e {
                        MarketError::NotFound(_) => {
                            warn!(error = %e, "Skipping external update")
                        }
                        MarketError::MultipleResults(_) => {
                            warn!(error = %e, "Skipping external update due to multiple")
                        }
                        _ => {
                            // The write was attempted; it has a sync log row.
                            report.writes_attempted += 1;
                            report.writes_failed += 1;
                            error!(error = %e, "Skipping external update due to error");
                        }
                    },
                    Err(fatal) => return Err(fatal),
                }
            }
        }

        info!(
            batch_id,
            models = report.models_seen,
            writes = report.writes_attempted,
            failed = report.writes_failed,
            "Sync batch finished"
        );

        Ok(report)
    }

    /// Prunes local inventory of SKUs the default marketplace no longer
    /// lists. Returns the deleted models.
    pub async fn cleanup(&self) -> EngineResult<Vec<String>> {
        let adapter = self.default_adapter().ok_or_else(|| {
            EngineError::Config(format!("{} is not initialized", self.default_system))
        })?;

        let cached: BTreeSet<String> = self
            .db
            .inventory()
            .list()
            .await?
            .into_iter()
            .map(|item| item.model)
            .collect();

        let online: BTreeSet<String> = adapter
            .list_products()
            .into_iter()
            .map(|p| p.model)
            .filter(|m| !m.is_empty())
            .collect();

        // An empty catalogue is a marketplace failure, not a store wipe.
        if online.is_empty() {
            return Err(EngineError::Market(MarketError::Communication(
                "Unexpected number of external product models".to_string(),
            )));
        }

        let deleted: Vec<String> = cached.difference(&online).cloned().collect();
        self.db.inventory().delete_many(&deleted).await?;

        Ok(deleted)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn default_adapter(&self) -> Option<&dyn Marketplace> {
        self.adapters
            .iter()
            .find(|a| a.system() == self.default_system)
            .map(|a| a.as_ref())
    }

    fn default_product(&self, model: &str) -> Option<InventoryItem> {
        let product = self.default_adapter()?.get_product(model).ok()?;
        Some(InventoryItem {
            model: product.model,
            stocks: product.stocks,
            last_sync_batch_id: 0,
        })
    }

    /// All unique non-empty product models across the enabled snapshots.
    fn collect_models(&self) -> BTreeSet<String> {
        let mut models = BTreeSet::new();
        for adapter in &self.adapters {
            for product in adapter.list_products() {
                // Skip falsy product models, ie: undefined, empty strings
                if product.model.is_empty() {
                    continue;
                }
                models.insert(product.model);
            }
        }
        models
    }

    /// The delta between last-agreed and currently-reported stocks of one
    /// model at one marketplace, with the current observation.
    ///
    /// Tolerant by contract: a failed lookup contributes `(0, 0)` so that
    /// a flaky marketplace cannot poison the aggregation. A missing cache
    /// row (first sighting) and a latched `not_behaving` flag both force
    /// `cached = current`, which zeroes the delta.
    async fn system_stocks_delta(&self, adapter: &dyn Marketplace, model: &str) -> (i64, i64) {
        let current = match adapter.get_product(model) {
            Ok(product) => product.stocks,
            Err(e) => {
                warn!(system = %adapter.system(), model = %model, error = %e, "No current stocks");
                return (0, 0);
            }
        };

        let cached = match self.db.cache().get(adapter.system(), model).await {
            Ok(item) if item.not_behaving => current,
            Ok(item) => item.stocks,
            Err(e) if e.is_not_found() => current,
            Err(e) => {
                warn!(system = %adapter.system(), model = %model, error = %e, "No cached stocks");
                return (0, 0);
            }
        };

        (current - cached, current)
    }

    /// Updates one marketplace with the authoritative stocks of one item.
    ///
    /// 1. Snapshot lookup; `NotFound`/`MultipleResults` propagate out.
    /// 2. Pre-write freshening: cache what the remote thought just before
    ///    the write, so the delta log keeps the observed-and-agreed
    ///    baseline.
    /// 3. Equal stocks need no write.
    /// 4. Write; a `PlatformNotBehaving` latches the pair, any returned
    ///    outcome clears it.
    /// 5. Every attempted write lands one sync log row.
    /// 6. Post-write commit: on success the cache holds the value written,
    ///    so the next batch measures its delta from here.
    async fn update_external(
        &self,
        adapter: &dyn Marketplace,
        item: &InventoryItem,
        batch_id: i64,
    ) -> EngineResult<UpdateOutcome> {
        let system = adapter.system();
        let system_item = adapter
            .get_product(&item.model)
            .map_err(EngineError::Market)?;

        info!(system = %system, model = %item.model, "Updating inventory system cache");
        self.db
            .cache()
            .upsert(system, &item.model, system_item.stocks, batch_id)
            .await?;

        if item.stocks == system_item.stocks {
            info!(system = %system, model = %item.model, "No need to update: same");
            return Ok(UpdateOutcome {
                wrote: false,
                success: true,
            });
        }

        info!(
            system = %system,
            model = %item.model,
            from = system_item.stocks,
            to = item.stocks,
            "Updating stocks"
        );

        let outcome = match adapter.update_product_stocks(&item.model, item.stocks).await {
            Ok(outcome) => {
                self.db
                    .cache()
                    .mark_not_behaving(system, &item.model, false)
                    .await?;
                outcome
            }
            Err(MarketError::PlatformNotBehaving(message)) => {
                self.db
                    .cache()
                    .mark_not_behaving(system, &item.model, true)
                    .await?;
                self.append_sync_log(batch_id, system, item, system_item.stocks, "NOT_BEHAVING", &message)
                    .await?;
                return Err(EngineError::Market(MarketError::PlatformNotBehaving(
                    message,
                )));
            }
            Err(MarketError::Communication(message)) => {
                self.append_sync_log(batch_id, system, item, system_item.stocks, "COMMUNICATION", &message)
                    .await?;
                return Err(EngineError::Market(MarketError::Communication(message)));
            }
            Err(other) => return Err(EngineError::Market(other)),
        };

        self.append_sync_log(
            batch_id,
            system,
            item,
            system_item.stocks,
            &outcome.error_code,
            &outcome.error_description,
        )
        .await?;

        if outcome.is_success() {
            self.db
                .cache()
                .upsert(system, &item.model, item.stocks, batch_id)
                .await?;
        }

        Ok(UpdateOutcome {
            wrote: true,
            success: outcome.is_success(),
        })
    }

    async fn append_sync_log(
        &self,
        batch_id: i64,
        system: System,
        item: &InventoryItem,
        previous_stocks: i64,
        error_code: &str,
        error_description: &str,
    ) -> EngineResult<()> {
        self.db
            .batches()
            .append_log(&SyncLogEntry {
                sync_batch_id: batch_id,
                model: item.model.clone(),
                system,
                previous_stocks,
                computed_stocks: item.stocks,
                upload_error_code: error_code.to_string(),
                upload_error_description: error_description.to_string(),
            })
            .await?;

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockMarketplace, WriteBehavior};
    use shopsync_db::DbConfig;

    async fn engine_with(
        adapters: Vec<Box<dyn Marketplace>>,
        default_system: System,
    ) -> (Database, ReconciliationEngine) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = ReconciliationEngine::new(db.clone(), adapters, default_system);
        (db, engine)
    }

    async fn stocks_of(db: &Database, model: &str) -> i64 {
        db.inventory().get(model).await.unwrap().stocks
    }

    async fn cached_stocks(db: &Database, system: System, model: &str) -> i64 {
        db.cache().get(system, model).await.unwrap().stocks
    }

    #[tokio::test]
    async fn test_cold_start() {
        let a = MockMarketplace::new(System::Opencart, &[("X", 10)]);
        let b = MockMarketplace::new(System::Shopee, &[("X", 10)]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        let report = engine.sync(false).await.unwrap();

        assert_eq!(report.models_seen, 1);
        assert_eq!(report.writes_attempted, 0);
        assert_eq!(stocks_of(&db, "X").await, 10);
        assert_eq!(cached_stocks(&db, System::Opencart, "X").await, 10);
        assert_eq!(cached_stocks(&db, System::Shopee, "X").await, 10);

        // Everything already agreed: no deltas, no attempted writes.
        assert_eq!(db.cache().count_deltas().await.unwrap(), 0);
        assert_eq!(db.batches().count_logs().await.unwrap(), 0);
        assert!(a.writes().is_empty());
        assert!(b.writes().is_empty());
    }

    #[tokio::test]
    async fn test_single_sale_is_attributed_once() {
        let a = MockMarketplace::new(System::Opencart, &[("X", 10)]);
        let b = MockMarketplace::new(System::Shopee, &[("X", 10)]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        engine.sync(false).await.unwrap();

        // Three units sold on Opencart between batches.
        a.set_stocks("X", 7);
        let report = engine.sync(false).await.unwrap();

        assert_eq!(stocks_of(&db, "X").await, 7);
        assert_eq!(cached_stocks(&db, System::Opencart, "X").await, 7);
        assert_eq!(cached_stocks(&db, System::Shopee, "X").await, 7);

        let deltas = db.cache().list_deltas(System::Opencart, "X").await.unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(
            (deltas[0].cached_stocks, deltas[0].current_stocks, deltas[0].stocks_delta),
            (10, 7, -3)
        );

        // Only Shopee needed a write.
        assert_eq!(report.writes_attempted, 1);
        assert_eq!(b.writes(), vec![("X".to_string(), 7)]);
        assert!(a.writes().is_empty());

        let logs = db.batches().list_logs(report.batch_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].system, System::Shopee);
        assert_eq!(logs[0].previous_stocks, 10);
        assert_eq!(logs[0].computed_stocks, 7);
        assert_eq!(logs[0].upload_error_code, "0");
    }

    #[tokio::test]
    async fn test_concurrent_sales_clamp_at_zero() {
        let a = MockMarketplace::new(System::Opencart, &[("X", 7)]);
        let b = MockMarketplace::new(System::Shopee, &[("X", 7)]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        engine.sync(false).await.unwrap();

        // Both marketplaces oversold the shared pool: 7 - 5 - 4 < 0.
        a.set_stocks("X", 2);
        b.set_stocks("X", 3);
        engine.sync(false).await.unwrap();

        assert_eq!(stocks_of(&db, "X").await, 0);
        assert_eq!(cached_stocks(&db, System::Opencart, "X").await, 0);
        assert_eq!(cached_stocks(&db, System::Shopee, "X").await, 0);
        assert_eq!(a.writes(), vec![("X".to_string(), 0)]);
        assert_eq!(b.writes(), vec![("X".to_string(), 0)]);
    }

    #[tokio::test]
    async fn test_not_behaving_latch_lifecycle() {
        let lazada = MockMarketplace::new(System::Lazada, &[("X", 10)]);
        let oc = MockMarketplace::new(System::Opencart, &[("X", 10)]);
        let (db, engine) = engine_with(
            vec![Box::new(lazada.clone()), Box::new(oc.clone())],
            System::Opencart,
        )
        .await;

        engine.sync(false).await.unwrap();

        // Five units sell on Opencart; Lazada accepts the corrective write
        // but does not apply it.
        oc.set_stocks("X", 5);
        lazada.set_write_behavior(WriteBehavior::NotBehaving);
        let report = engine.sync(false).await.unwrap();

        assert_eq!(stocks_of(&db, "X").await, 5);
        let cache = db.cache().get(System::Lazada, "X").await.unwrap();
        assert!(cache.not_behaving);
        // Pre-write freshening stands; no cache-forward happened.
        assert_eq!(cache.stocks, 10);

        let logs = db.batches().list_logs(report.batch_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].upload_error_code, "NOT_BEHAVING");

        // Lazada applies the write late, between batches. Without the
        // latch this would read as a 5-unit sale and double-count.
        lazada.set_stocks("X", 5);
        lazada.set_write_behavior(WriteBehavior::Apply);
        engine.sync(false).await.unwrap();

        assert_eq!(stocks_of(&db, "X").await, 5);
        assert!(db.cache().get(System::Lazada, "X").await.unwrap().not_behaving);

        // The next real write lands and clears the latch.
        oc.set_stocks("X", 3);
        engine.sync(false).await.unwrap();

        assert_eq!(stocks_of(&db, "X").await, 3);
        let cache = db.cache().get(System::Lazada, "X").await.unwrap();
        assert!(!cache.not_behaving);
        assert_eq!(cache.stocks, 3);
        assert_eq!(lazada.writes().last(), Some(&("X".to_string(), 3)));
    }

    #[tokio::test]
    async fn test_ambiguous_sku_is_skipped_per_marketplace() {
        let a = MockMarketplace::new(System::Opencart, &[("Y", 10)]);
        let b = MockMarketplace::new(System::Shopee, &[("Y", 4)]);
        b.add_duplicate("Y", 6);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        engine.sync(false).await.unwrap();

        // The ambiguous marketplace is skipped entirely for this SKU...
        assert!(b.writes().is_empty());
        assert!(db
            .cache()
            .get(System::Shopee, "Y")
            .await
            .unwrap_err()
            .is_not_found());

        // ...while the default marketplace still settles the item.
        assert_eq!(stocks_of(&db, "Y").await, 10);
        assert_eq!(cached_stocks(&db, System::Opencart, "Y").await, 10);
    }

    #[tokio::test]
    async fn test_read_only_observes_and_reobserves() {
        let a = MockMarketplace::new(System::Opencart, &[("X", 10)]);
        let b = MockMarketplace::new(System::Shopee, &[("X", 10)]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        engine.sync(false).await.unwrap();
        a.set_stocks("X", 7);

        engine.sync(true).await.unwrap();

        // Observed but not applied: inventory and cache are untouched.
        assert_eq!(stocks_of(&db, "X").await, 10);
        assert_eq!(cached_stocks(&db, System::Opencart, "X").await, 10);
        assert_eq!(db.cache().count_deltas().await.unwrap(), 1);
        assert!(b.writes().is_empty());

        // Cache was not forwarded, so the same drift is observed again.
        engine.sync(true).await.unwrap();
        assert_eq!(db.cache().count_deltas().await.unwrap(), 2);

        // The next writing batch converges as usual.
        engine.sync(false).await.unwrap();
        assert_eq!(stocks_of(&db, "X").await, 7);
        assert_eq!(cached_stocks(&db, System::Shopee, "X").await, 7);
        assert_eq!(b.writes(), vec![("X".to_string(), 7)]);
    }

    #[tokio::test]
    async fn test_topup_and_sale_are_aggregated_not_arbitrated() {
        let a = MockMarketplace::new(System::Opencart, &[("X", 10)]);
        let b = MockMarketplace::new(System::Shopee, &[("X", 10)]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        engine.sync(false).await.unwrap();

        // Manual top-up on one marketplace, sale on the other.
        a.set_stocks("X", 15);
        b.set_stocks("X", 7);
        engine.sync(false).await.unwrap();

        // Δ = +5 - 3; both observations are in the audit log.
        assert_eq!(stocks_of(&db, "X").await, 12);
        assert_eq!(db.cache().count_deltas().await.unwrap(), 2);
        assert_eq!(a.writes(), vec![("X".to_string(), 12)]);
        assert_eq!(b.writes(), vec![("X".to_string(), 12)]);
    }

    #[tokio::test]
    async fn test_unknown_sku_without_default_listing_is_skipped() {
        let a = MockMarketplace::new(System::Opencart, &[]);
        let b = MockMarketplace::new(System::Shopee, &[("Z", 5)]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        let report = engine.sync(false).await.unwrap();

        assert_eq!(report.models_seen, 1);
        assert_eq!(report.models_skipped, 1);
        assert!(db.inventory().get("Z").await.unwrap_err().is_not_found());
        assert!(b.writes().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_write_is_logged_and_not_cache_forwarded() {
        let a = MockMarketplace::new(System::Opencart, &[("X", 10)]);
        let b = MockMarketplace::new(System::Shopee, &[("X", 10)]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        engine.sync(false).await.unwrap();

        a.set_stocks("X", 7);
        b.set_write_behavior(WriteBehavior::Reject("1001".to_string()));
        let report = engine.sync(false).await.unwrap();

        assert_eq!(report.writes_attempted, 1);
        assert_eq!(report.writes_failed, 1);
        assert_eq!(stocks_of(&db, "X").await, 7);

        // The rejection is in the audit log with the platform's code...
        let logs = db.batches().list_logs(report.batch_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].upload_error_code, "1001");

        // ...and the cache keeps the pre-write observation, so the next
        // batch sees no phantom delta.
        assert_eq!(cached_stocks(&db, System::Shopee, "X").await, 10);
        let deltas_before = db.cache().count_deltas().await.unwrap();
        engine.sync(false).await.unwrap();
        assert_eq!(db.cache().count_deltas().await.unwrap(), deltas_before);
    }

    #[tokio::test]
    async fn test_communication_failure_on_write_is_absorbed() {
        let a = MockMarketplace::new(System::Opencart, &[("X", 10)]);
        let b = MockMarketplace::new(System::Shopee, &[("X", 10)]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        engine.sync(false).await.unwrap();

        a.set_stocks("X", 7);
        b.set_write_behavior(WriteBehavior::Communication);
        let report = engine.sync(false).await.unwrap();

        // The batch finished; the failure is an audit row, not an abort.
        assert_eq!(stocks_of(&db, "X").await, 7);
        let logs = db.batches().list_logs(report.batch_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].upload_error_code, "COMMUNICATION");
    }

    #[tokio::test]
    async fn test_marketplace_not_listing_a_model_cannot_poison_it() {
        let a = MockMarketplace::new(System::Opencart, &[("X", 10)]);
        let b = MockMarketplace::new(System::Shopee, &[]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        engine.sync(false).await.unwrap();

        assert_eq!(stocks_of(&db, "X").await, 10);
        assert!(b.writes().is_empty());
        assert!(db
            .cache()
            .get(System::Shopee, "X")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_cleanup_prunes_models_gone_from_default() {
        let a = MockMarketplace::new(System::Opencart, &[("KEEP", 4)]);
        let (db, engine) =
            engine_with(vec![Box::new(a.clone())], System::Opencart).await;

        for model in ["KEEP", "GONE"] {
            db.inventory()
                .upsert(&InventoryItem {
                    model: model.to_string(),
                    stocks: 1,
                    last_sync_batch_id: 1,
                })
                .await
                .unwrap();
        }

        let deleted = engine.cleanup().await.unwrap();

        assert_eq!(deleted, vec!["GONE".to_string()]);
        let left = db.inventory().list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].model, "KEEP");
    }

    #[tokio::test]
    async fn test_cleanup_refuses_an_empty_default_catalogue() {
        let a = MockMarketplace::new(System::Opencart, &[]);
        let (db, engine) =
            engine_with(vec![Box::new(a.clone())], System::Opencart).await;

        db.inventory()
            .upsert(&InventoryItem {
                model: "KEEP".to_string(),
                stocks: 1,
                last_sync_batch_id: 1,
            })
            .await
            .unwrap();

        let err = engine.cleanup().await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        // Nothing was deleted.
        assert_eq!(db.inventory().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_logs_only_grow() {
        let a = MockMarketplace::new(System::Opencart, &[("X", 10)]);
        let b = MockMarketplace::new(System::Shopee, &[("X", 10)]);
        let (db, engine) = engine_with(
            vec![Box::new(a.clone()), Box::new(b.clone())],
            System::Opencart,
        )
        .await;

        let mut last_deltas = 0;
        let mut last_logs = 0;
        for round in 0..4 {
            a.set_stocks("X", 10 - round);
            engine.sync(false).await.unwrap();

            let deltas = db.cache().count_deltas().await.unwrap();
            let logs = db.batches().count_logs().await.unwrap();
            assert!(deltas >= last_deltas);
            assert!(logs >= last_logs);
            last_deltas = deltas;
            last_logs = logs;
        }
    }
}
