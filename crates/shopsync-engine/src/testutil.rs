//! Scriptable in-memory marketplaces for engine tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use shopsync_core::{Product, System, WriteOutcome};
use shopsync_markets::{MarketError, MarketResult, Marketplace};

/// How the mock reacts to `update_product_stocks`.
#[derive(Debug, Clone)]
pub(crate) enum WriteBehavior {
    /// Accept the write and apply it to the snapshot.
    Apply,
    /// Raise `PlatformNotBehaving` and keep the old value.
    NotBehaving,
    /// Raise `Communication` and keep the old value.
    Communication,
    /// Return a platform rejection outcome and keep the old value.
    Reject(String),
}

#[derive(Debug)]
struct MockState {
    products: Mutex<Vec<Product>>,
    write_behavior: Mutex<WriteBehavior>,
    writes: Mutex<Vec<(String, i64)>>,
    fail_refresh: Mutex<bool>,
}

/// A scriptable marketplace. Clones share state, so a test can keep one
/// handle for scripting while the engine owns boxed clones.
#[derive(Debug, Clone)]
pub(crate) struct MockMarketplace {
    system: System,
    state: Arc<MockState>,
}

impl MockMarketplace {
    pub(crate) fn new(system: System, products: &[(&str, i64)]) -> Self {
        let products = products
            .iter()
            .map(|(model, stocks)| Product::new(*model, *stocks))
            .collect();

        MockMarketplace {
            system,
            state: Arc::new(MockState {
                products: Mutex::new(products),
                write_behavior: Mutex::new(WriteBehavior::Apply),
                writes: Mutex::new(Vec::new()),
                fail_refresh: Mutex::new(false),
            }),
        }
    }

    /// Simulates marketplace-side drift (sales, manual top-ups) between
    /// batches.
    pub(crate) fn set_stocks(&self, model: &str, stocks: i64) {
        let mut products = self.state.products.lock().unwrap();
        for product in products.iter_mut() {
            if product.model == model {
                product.stocks = stocks;
            }
        }
    }

    /// Adds another listing with the same model (ambiguous SKU).
    pub(crate) fn add_duplicate(&self, model: &str, stocks: i64) {
        self.state
            .products
            .lock()
            .unwrap()
            .push(Product::new(model, stocks));
    }

    pub(crate) fn set_write_behavior(&self, behavior: WriteBehavior) {
        *self.state.write_behavior.lock().unwrap() = behavior;
    }

    pub(crate) fn set_fail_refresh(&self, fail: bool) {
        *self.state.fail_refresh.lock().unwrap() = fail;
    }

    /// All writes the engine attempted against this marketplace, applied
    /// or not.
    pub(crate) fn writes(&self) -> Vec<(String, i64)> {
        self.state.writes.lock().unwrap().clone()
    }

    fn find(&self, model: &str) -> MarketResult<Product> {
        let products = self.state.products.lock().unwrap();
        let matches: Vec<&Product> = products.iter().filter(|p| p.model == model).collect();

        match matches.len() {
            0 => Err(MarketError::NotFound(format!("{model} in {}", self.system))),
            1 => Ok(matches[0].clone()),
            _ => Err(MarketError::MultipleResults(format!(
                "{model} in {}",
                self.system
            ))),
        }
    }
}

#[async_trait]
impl Marketplace for MockMarketplace {
    fn system(&self) -> System {
        self.system
    }

    async fn refresh(&mut self) -> MarketResult<()> {
        if *self.state.fail_refresh.lock().unwrap() {
            return Err(MarketError::Communication(format!(
                "{} is unreachable",
                self.system
            )));
        }
        Ok(())
    }

    fn list_products(&self) -> Vec<Product> {
        self.state.products.lock().unwrap().clone()
    }

    fn get_product(&self, model: &str) -> MarketResult<Product> {
        self.find(model)
    }

    async fn update_product_stocks(&self, model: &str, stocks: i64) -> MarketResult<WriteOutcome> {
        self.find(model)?;
        self.state
            .writes
            .lock()
            .unwrap()
            .push((model.to_string(), stocks));

        let behavior = self.state.write_behavior.lock().unwrap().clone();
        match behavior {
            WriteBehavior::Apply => {
                self.set_stocks(model, stocks);
                Ok(WriteOutcome::success())
            }
            WriteBehavior::NotBehaving => Err(MarketError::PlatformNotBehaving(format!(
                "{model}: write did not take effect"
            ))),
            WriteBehavior::Communication => {
                Err(MarketError::Communication("socket closed".to_string()))
            }
            WriteBehavior::Reject(code) => Ok(WriteOutcome::failure(code, "rejected")),
        }
    }

    async fn get_product_direct(&self, model: &str) -> MarketResult<Product> {
        self.find(model)
    }
}
