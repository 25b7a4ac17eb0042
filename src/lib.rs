//! Recurring expenses for a personal budgeting ledger.
//!
//! A [RecurringRule] ("rent, $1200, monthly, starting Jan 1, 24 occurrences")
//! is expanded into a bounded sequence of dated [LedgerEntry] rows. Creating,
//! editing and deleting a rule keeps its entries consistent with it inside a
//! single store transaction, either for the whole series or only for the
//! occurrences after today so that past, already reconciled entries are left
//! alone.
//!
//! The storage backend is abstracted behind [LedgerStore]; a SQLite
//! implementation is provided in [SQLiteLedgerStore].

#![warn(missing_docs)]

mod db;
mod entry;
mod recurring;
mod stores;
mod timezone;
mod user;

pub use db::initialize as initialize_db;
pub use entry::{EntryId, LedgerEntry};
pub use recurring::{
    DeleteMode, GenerationStart, Interval, OPEN_ENDED_OCCURRENCE_CEILING, Occurrences,
    ReconcileSummary, RecurringRule, RuleDraft, RuleFields, RuleId, UpdateMode, create_rule,
    delete_rule, generate, resolve_occurrence_budget, update_rule,
};
pub use stores::{EntryDateFilter, LedgerStore, LedgerTransaction, SQLiteLedgerStore};
pub use timezone::{get_local_offset, today_in_timezone};
pub use user::UserID;

/// The errors that may occur when managing recurring expenses.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An empty string was used as the name of a recurring rule.
    #[error("the rule name cannot be empty")]
    EmptyRuleName,

    /// An empty string was used as the category of a recurring rule.
    #[error("the rule category cannot be empty")]
    EmptyCategory,

    /// The rule does not have a start date.
    #[error("the rule must have a start date")]
    MissingStartDate,

    /// The interval is not one of daily, weekly, monthly or yearly.
    #[error("\"{0}\" is not a valid interval, expected one of daily, weekly, monthly or yearly")]
    InvalidInterval(String),

    /// A recurring rule must occur at least twice, or zero for open-ended
    /// rules.
    ///
    /// A single occurrence is a plain expense, not a recurring one.
    #[error("{0} is not a valid occurrence count, use 0 for open-ended rules or at least 2")]
    InvalidOccurrenceCount(u32),

    /// The amount is NaN or infinite.
    #[error("{0} is not a valid amount")]
    InvalidAmount(f64),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Tried to update a rule that does not exist or belongs to another user.
    #[error("tried to update a rule that is not in the database")]
    UpdateMissingRule,

    /// Tried to delete a rule that does not exist or belongs to another user.
    #[error("tried to delete a rule that is not in the database")]
    DeleteMissingRule,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// An error occurred while serializing or deserializing JSON.
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// A stored row holds a value that cannot be read back, e.g. a malformed
    /// ID, an unknown interval or tags that are not a JSON array.
    #[error("the database holds an invalid value: {0}")]
    InvalidStoredValue(String),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),
}

impl Error {
    /// Whether the error was caused by invalid input rather than by the store.
    ///
    /// Validation errors are raised before any transaction is started.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::EmptyRuleName
                | Error::EmptyCategory
                | Error::MissingStartDate
                | Error::InvalidInterval(_)
                | Error::InvalidOccurrenceCount(_)
                | Error::InvalidAmount(_)
        )
    }

    /// Whether the error means the targeted rule does not exist for the user.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound | Error::UpdateMissingRule | Error::DeleteMissingRule
        )
    }

    /// Whether the caller may retry the operation.
    ///
    /// Storage failures roll back the whole operation, so retrying cannot
    /// observe partial state. No retries are performed by this crate.
    ///
    /// Invalid stored values and serialization errors fail the same way every
    /// time and are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SqlError(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            rusqlite::Error::FromSqlConversionFailure(column, _, error) => {
                tracing::error!("could not read stored value in column {column}: {error}");
                Error::InvalidStoredValue(format!("column {column}: {error}"))
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::JSONSerializationError(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;

    #[test]
    fn validation_errors_are_not_retryable() {
        let error = Error::InvalidOccurrenceCount(1);

        assert!(error.is_validation());
        assert!(!error.is_retryable());
        assert!(!error.is_not_found());
    }

    #[test]
    fn sql_errors_are_retryable() {
        let error = Error::SqlError(rusqlite::Error::InvalidQuery);

        assert!(error.is_retryable());
        assert!(!error.is_validation());
    }

    #[test]
    fn conversion_failure_maps_to_invalid_stored_value() {
        let error: Error = rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::InvalidInterval("hourly".to_owned())),
        )
        .into();

        assert!(matches!(error, Error::InvalidStoredValue(_)));
        assert!(!error.is_retryable());
        assert!(!error.is_validation());
    }

    #[test]
    fn json_errors_are_not_retryable() {
        let error: Error = serde_json::from_str::<Vec<String>>("not json")
            .unwrap_err()
            .into();

        assert!(matches!(error, Error::JSONSerializationError(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let error: Error = rusqlite::Error::QueryReturnedNoRows.into();

        assert_eq!(error, Error::NotFound);
        assert!(error.is_not_found());
    }
}
