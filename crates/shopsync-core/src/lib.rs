//! # shopsync-core: Pure Domain Types for Shopsync
//!
//! This crate holds the domain model shared by every other crate in the
//! workspace: the marketplace tag enum, the product/inventory/cache item
//! types, the write-outcome type and the core error taxonomy. It has zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Shopsync Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ shopsync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌─────────────┐  ┌──────────────────────┐     │   │
//! │  │   │  System   │  │   Product   │  │ InventoryItem        │     │   │
//! │  │   │  tag enum │  │ WriteOutcome│  │ CacheItem, CacheDelta│     │   │
//! │  │   └───────────┘  └─────────────┘  └──────────────────────┘     │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                             │   │
//! │  └───────────────┬─────────────────────────┬───────────────────────┘   │
//! │                  │                         │                           │
//! │  ┌───────────────▼──────────┐  ┌──────────▼───────────────────────┐   │
//! │  │       shopsync-db        │  │        shopsync-markets          │   │
//! │  │  SQLite store            │  │  Marketplace HTTP adapters       │   │
//! │  └──────────────────────────┘  └──────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (System, Product, inventory/cache items)
//! - [`error`] - Core error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Version string recorded with every sync batch.
///
/// Stored in `sync_batch.script_version` so that a batch in the audit log
/// can always be traced back to the engine revision that produced it.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
