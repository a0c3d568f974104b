//! # rafidain-db: Ledger and Database Layer
//!
//! Everything that touches SQLite lives here: the stock ledger, the
//! costing engine, the transaction processors and the side services.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       Rafidain Ledger Data Flow                     │
//! │                                                                     │
//! │  Application boundary (one ledger operation per request)            │
//! │       │                                                             │
//! │  ┌────▼────────────────────────────────────────────────────────┐    │
//! │  │                  rafidain-db (THIS CRATE)                   │    │
//! │  │                                                             │    │
//! │  │   Processors            Leaves              Side services   │    │
//! │  │   ┌──────────────┐     ┌──────────────┐    ┌────────────┐   │    │
//! │  │   │ SaleProcessor│────►│ stock ledger │    │ customers  │   │    │
//! │  │   │ ReturnProc.  │────►│ costing      │    │ rate oracle│   │    │
//! │  │   │ PurchaseProc.│     └──────────────┘    └────────────┘   │    │
//! │  │   └──────┬───────┘                                          │    │
//! │  │          │  write lock + BEGIN ... COMMIT (all or nothing)  │    │
//! │  └──────────┼──────────────────────────────────────────────────┘    │
//! │             ▼                                                       │
//! │     Single SQLite file (one shared connection)                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - connection management, write lock, handle to everything
//! - [`migrations`] - embedded database migrations
//! - [`error`] - storage and ledger error types
//! - [`stock`] - stock ledger leaf (deltas + audit trail)
//! - [`costing`] - weighted-average costing engine leaf
//! - [`catalog`] - branch and variant repositories
//! - [`customer`] - denormalized customer aggregates
//! - [`rate`] - exchange-rate oracle with TTL cache
//! - [`ledger`] - the transaction processors (sales, returns, receiving)

pub mod catalog;
pub mod costing;
pub mod customer;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod rate;
pub mod stock;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{DbError, LedgerError, LedgerResult};
pub use pool::{Database, DbConfig};

pub use catalog::{BranchRepository, VariantRepository};
pub use customer::CustomerRepository;
pub use ledger::purchase::PurchaseOrderProcessor;
pub use ledger::returns::ReturnProcessor;
pub use ledger::sale::SaleProcessor;
pub use rate::ExchangeRateOracle;
pub use stock::StockRepository;
