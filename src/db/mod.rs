//! SQLite ledger: asset classes, rate events and debt transactions.
//!
//! Computed columns (`cumulative_index`, `adjusted_amount`) are written at
//! most once; every update is guarded by `IS NULL` in SQL.

pub mod migrations;
pub mod repo;

pub use migrations::{init_db, SCHEMA_VERSION};
pub use repo::Repository;
