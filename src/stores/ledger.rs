//! Defines the transactional store contract used to reconcile rules and their entries.

use time::Date;

use crate::{
    Error, LedgerEntry, UserID,
    recurring::{RecurringRule, RuleId},
};

/// Selects which of a rule's entries to delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryDateFilter {
    /// Every entry that refers to the rule.
    All,
    /// Only entries dated strictly after the given date.
    After(Date),
}

/// Stores recurring rules and ledger entries.
pub trait LedgerStore {
    /// Run `operation` inside a single store transaction.
    ///
    /// Implementers must commit if `operation` returns `Ok` and roll back
    /// otherwise, including when `operation` panics, so that no partial
    /// state is ever visible to other readers.
    fn transact<T, F>(&self, operation: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn LedgerTransaction) -> Result<T, Error>;

    /// Retrieve the rule `rule_id` owned by `user_id`.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if the rule does not exist or belongs to another user.
    fn get_rule(&self, user_id: UserID, rule_id: RuleId) -> Result<RecurringRule, Error>;

    /// Retrieve all of a user's rules, most recent start date first.
    fn get_rules(&self, user_id: UserID) -> Result<Vec<RecurringRule>, Error>;

    /// Retrieve the entries that refer to `rule_id`, oldest first.
    ///
    /// Entries are returned even if the rule itself has been deleted.
    fn get_entries_by_rule(
        &self,
        user_id: UserID,
        rule_id: RuleId,
    ) -> Result<Vec<LedgerEntry>, Error>;
}

/// The writes available inside a [LedgerStore::transact] call.
///
/// All operations are scoped to the owning user of the rule or entries.
pub trait LedgerTransaction {
    /// Insert a new rule.
    fn insert_rule(&mut self, rule: &RecurringRule) -> Result<(), Error>;

    /// Overwrite the stored fields of the rule with the same ID and user.
    ///
    /// Returns the number of rows affected, zero if no such rule exists.
    fn update_rule(&mut self, rule: &RecurringRule) -> Result<usize, Error>;

    /// Delete a rule.
    ///
    /// Returns the number of rows affected, zero if no such rule exists.
    fn delete_rule(&mut self, user_id: UserID, rule_id: RuleId) -> Result<usize, Error>;

    /// Delete the entries that refer to `rule_id` and match `filter`.
    ///
    /// Returns the number of entries deleted.
    fn delete_entries_by_rule(
        &mut self,
        user_id: UserID,
        rule_id: RuleId,
        filter: EntryDateFilter,
    ) -> Result<usize, Error>;

    /// Insert `entries` as a single batch.
    fn insert_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), Error>;
}
