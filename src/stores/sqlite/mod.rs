//! The SQLite backend for the ledger store.

mod ledger;

pub use ledger::{SQLiteLedgerStore, create_ledger_entry_table, create_recurring_rule_table};
