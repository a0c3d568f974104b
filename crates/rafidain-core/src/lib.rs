//! # rafidain-core: Pure Domain Logic for the Rafidain POS Ledger
//!
//! This crate is the I/O-free heart of the ledger. It holds the domain
//! types shared between the database layer and the application boundary,
//! plus the money math that the transaction processors lean on.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Rafidain Ledger Architecture                 │
//! │                                                                 │
//! │  Application boundary (IPC, printing, import - out of scope)    │
//! │                              │                                  │
//! │  ┌───────────────────────────▼──────────────────────────────┐   │
//! │  │              ★ rafidain-core (THIS CRATE) ★              │   │
//! │  │                                                          │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌────────────┐  ┌─────────┐  │   │
//! │  │   │  types  │  │  money  │  │ validation │  │  error  │  │   │
//! │  │   │ Variant │  │ IQD/USD │  │   checks   │  │  enums  │  │   │
//! │  │   │  Sale   │  │ profit  │  │            │  │         │  │   │
//! │  │   └─────────┘  └─────────┘  └────────────┘  └─────────┘  │   │
//! │  │                                                          │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS     │   │
//! │  └───────────────────────────┬──────────────────────────────┘   │
//! │                              │                                  │
//! │  ┌───────────────────────────▼──────────────────────────────┐   │
//! │  │                 rafidain-db (Ledger Layer)               │   │
//! │  │        SQLite, migrations, stock ledger, processors      │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Pure functions**: deterministic, no side effects
//! 2. **Integer local currency**: IQD amounts are whole-dinar `i64`
//! 3. **Fractional hard currency**: USD unit costs are `f64` because the
//!    weighted-average cost is fractional by nature
//! 4. **Explicit errors**: typed enums, never strings or panics

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

pub use error::{CoreError, ValidationError};
pub use types::*;

/// Amount of IQD spend that earns one loyalty point.
pub const IQD_PER_LOYALTY_POINT: i64 = 1_000;

/// Default time-to-live for the cached exchange rate, in seconds.
///
/// The rate changes a handful of times a day at most; five minutes keeps
/// reads cheap while staying close to the street rate.
pub const EXCHANGE_RATE_TTL_SECS: u64 = 300;
