//! SQLite backend for the Census person registry.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every mutation runs the
//! reconciliation controller inside one `IMMEDIATE` transaction.

mod encode;
mod ledger;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use ledger::{SqliteLedger, in_transaction};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
