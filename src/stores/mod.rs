//! Contains the store traits used by the reconciler and their implementations.

mod ledger;

pub mod sqlite;

pub use ledger::{EntryDateFilter, LedgerStore, LedgerTransaction};
pub use sqlite::SQLiteLedgerStore;
