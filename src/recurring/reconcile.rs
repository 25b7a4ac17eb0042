//! Keeps a recurring rule and its generated entries consistent when the rule is
//! created, edited or deleted.
//!
//! Each operation runs in one store transaction: the rule row and its entries
//! are either both updated or both left as they were. The operations hold no
//! state of their own; "today" is passed in by the caller so that the split
//! between past and future entries is deterministic.

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error, UserID,
    recurring::{GenerationStart, RecurringRule, RuleFields, RuleId, generate},
    stores::{EntryDateFilter, LedgerStore},
};

/// How an edited rule's existing entries are reconciled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Delete every entry of the rule and regenerate the series from the
    /// rule's start date.
    ReplaceAll,
    /// Keep entries dated on or before today and regenerate only the later
    /// ones, so past entries keep the values of the old rule.
    ReplaceFutureOnly,
}

/// What happens to a deleted rule's entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Delete every entry of the rule.
    RemoveAll,
    /// Keep entries dated on or before today as historical records.
    RemoveFutureOnly,
}

/// The outcome of reconciling a rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// The rule that was reconciled.
    pub rule_id: RuleId,
    /// The number of existing entries that were deleted.
    pub entries_removed: usize,
    /// The number of entries that were generated and inserted.
    pub entries_created: usize,
}

/// Create a recurring rule for `user_id` and insert every entry it generates.
///
/// The rule gets a fresh ID. Entries are generated from the rule's start date
/// with the full occurrence budget.
///
/// # Errors
/// Returns a storage error, e.g. [Error::SqlError], if the rule or its entries
/// could not be stored. Nothing is stored in that case.
pub fn create_rule<S: LedgerStore>(
    store: &S,
    user_id: UserID,
    fields: RuleFields,
) -> Result<RecurringRule, Error> {
    let rule = RecurringRule::from_fields(RuleId::new_random(), user_id, fields);
    let entries = generate(&rule, GenerationStart::RuleStart);

    store.transact(|transaction| {
        transaction.insert_rule(&rule)?;
        transaction.insert_entries(&entries)
    })?;

    tracing::info!(
        "created rule {} for user {} with {} entries",
        rule.id,
        user_id,
        entries.len()
    );

    Ok(rule)
}

/// Replace the fields of the rule `rule_id` with `fields` and regenerate its
/// entries according to `mode`.
///
/// With [UpdateMode::ReplaceFutureOnly], entries dated on or before `today`
/// are not touched and the occurrences up to and including `today` count
/// against the new occurrence budget.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingRule] if the rule does not exist or belongs to another user,
/// - or a storage error such as [Error::SqlError] if the store failed.
///
/// The rule and its entries are unchanged if an error is returned.
pub fn update_rule<S: LedgerStore>(
    store: &S,
    user_id: UserID,
    rule_id: RuleId,
    fields: RuleFields,
    mode: UpdateMode,
    today: Date,
) -> Result<ReconcileSummary, Error> {
    let rule = RecurringRule::from_fields(rule_id, user_id, fields);

    let (filter, start) = match mode {
        UpdateMode::ReplaceAll => (EntryDateFilter::All, GenerationStart::RuleStart),
        UpdateMode::ReplaceFutureOnly => (
            EntryDateFilter::After(today),
            GenerationStart::After(today),
        ),
    };
    let entries = generate(&rule, start);

    tracing::debug!("updating rule {rule_id} with {mode:?} on {today}");

    let summary = store.transact(|transaction| {
        if transaction.update_rule(&rule)? == 0 {
            return Err(Error::UpdateMissingRule);
        }

        let entries_removed = transaction.delete_entries_by_rule(user_id, rule_id, filter)?;
        transaction.insert_entries(&entries)?;

        Ok(ReconcileSummary {
            rule_id,
            entries_removed,
            entries_created: entries.len(),
        })
    })?;

    tracing::info!(
        "updated rule {} for user {}: removed {} entries, created {}",
        rule_id,
        user_id,
        summary.entries_removed,
        summary.entries_created
    );

    Ok(summary)
}

/// Delete the rule `rule_id` and its entries according to `mode`.
///
/// With [DeleteMode::RemoveFutureOnly], entries dated on or before `today`
/// are kept and still refer to the deleted rule.
///
/// # Errors
/// This function will return a:
/// - [Error::DeleteMissingRule] if the rule does not exist or belongs to another user,
/// - or a storage error such as [Error::SqlError] if the store failed.
///
/// The rule and its entries are unchanged if an error is returned.
pub fn delete_rule<S: LedgerStore>(
    store: &S,
    user_id: UserID,
    rule_id: RuleId,
    mode: DeleteMode,
    today: Date,
) -> Result<ReconcileSummary, Error> {
    let filter = match mode {
        DeleteMode::RemoveAll => EntryDateFilter::All,
        DeleteMode::RemoveFutureOnly => EntryDateFilter::After(today),
    };

    let summary = store.transact(|transaction| {
        if transaction.delete_rule(user_id, rule_id)? == 0 {
            return Err(Error::DeleteMissingRule);
        }

        let entries_removed = transaction.delete_entries_by_rule(user_id, rule_id, filter)?;

        Ok(ReconcileSummary {
            rule_id,
            entries_removed,
            entries_created: 0,
        })
    })?;

    tracing::info!(
        "deleted rule {} for user {} with {:?}: removed {} entries",
        rule_id,
        user_id,
        mode,
        summary.entries_removed
    );

    Ok(summary)
}
