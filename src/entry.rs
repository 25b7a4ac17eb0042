//! Materialized ledger entries, i.e. the concrete dated expenses generated from a rule.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::{UserID, recurring::RuleId};

/// The opaque identifier of a [LedgerEntry].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new, random entry ID.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl ToSql for EntryId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}

impl FromSql for EntryId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// A dated expense in the ledger.
///
/// Entries generated from a recurring rule keep the rule's ID in
/// `recurring_rule_id`. The rule may since have been deleted, in which case the
/// reference dangles and the entry should be read as "was recurring".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The ID of the entry.
    pub id: EntryId,
    /// The user that owns the entry.
    pub user_id: UserID,
    /// A short description of the expense.
    pub name: String,
    /// How much was spent.
    pub amount: f64,
    /// The lowercase currency code.
    pub currency: String,
    /// The category label.
    pub category: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// When the expense occurs.
    pub date: Date,
    /// The rule this entry was generated from, `None` for manually entered expenses.
    pub recurring_rule_id: Option<RuleId>,
}
