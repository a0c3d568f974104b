//! # Transaction Processors
//!
//! The three multi-step ledger operations: sales, returns/exchanges and
//! purchase receiving. Each processor follows the same discipline:
//!
//! ```text
//! validate payload            (no mutation yet)
//! fetch exchange rate         (before BEGIN; the single connection
//!                              cannot serve the pool mid-transaction)
//! acquire write lock
//! BEGIN
//!   header + line inserts
//!   costing engine            (receiving only, before the stock delta)
//!   stock deltas              (one per line, with audit rows)
//! COMMIT
//! post-commit side effects    (customer aggregates)
//! ```
//!
//! Any error between BEGIN and COMMIT drops the transaction, which rolls
//! everything back; partial application is impossible by construction.

pub mod purchase;
pub mod returns;
pub mod sale;
