//! # shopsync-db: The Reconciliation Store
//!
//! Durable persistence for the reconciliation engine: authoritative
//! inventory, per-marketplace cache, the append-only delta and sync-log
//! audit tables, batch records and OAuth2 tokens. SQLite via sqlx.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Store per batch                                     │
//! │                                                                         │
//! │  ReconciliationEngine                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   shopsync-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌───────────────┐   │   │
//! │  │   │   Database    │   │  Repositories  │   │  Migrations   │   │   │
//! │  │   │   (pool.rs)   │◄──│ inventory      │   │  (embedded)   │   │   │
//! │  │   │               │   │ cache / batch  │   │ 001_initial…  │   │   │
//! │  │   │  SqlitePool   │   │ oauth2         │   │               │   │   │
//! │  │   └───────────────┘   └────────────────┘   └───────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Single SQLite file (inventory, cache, delta, batch, logs, oauth2)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation commits individually. The engine does not run as one
//! mega-transaction: partial progress across a batch is acceptable because
//! later batches re-converge.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::batch::BatchRepository;
pub use repository::cache::CacheRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::oauth2::Oauth2Repository;
