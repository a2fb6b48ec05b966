//! Core types and the version-reconciliation engine for the Census person
//! registry.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Backends implement the transaction-scoped traits in [`ledger`] and the
//! async [`store::PersonStore`]; [`reconcile`] and [`replay`] hold the logic
//! that decides how every write is applied.

pub mod changes;
pub mod error;
pub mod event;
pub mod ledger;
pub mod person;
pub mod reconcile;
pub mod replay;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
