//! The recurring rule model and validation of user input.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::{Error, UserID, recurring::Interval};

/// The opaque identifier of a [RecurringRule].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(Uuid);

impl RuleId {
    /// Create a new, random rule ID.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RuleId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl ToSql for RuleId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}

impl FromSql for RuleId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// A user-authored template for an expense that repeats on a regular schedule,
/// e.g. rent or a phone bill.
///
/// The entries generated from a rule carry the rule's ID as a back-reference,
/// but the rule does not own them: entries may outlive the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringRule {
    /// The ID of the rule, stable across edits.
    pub id: RuleId,
    /// The user that owns the rule and every entry generated from it.
    pub user_id: UserID,
    /// A short description copied onto each generated entry.
    pub name: String,
    /// The amount of each occurrence.
    pub amount: f64,
    /// The lowercase currency code, e.g. "usd".
    pub currency: String,
    /// The category label copied onto each generated entry.
    pub category: String,
    /// Free-form tags copied onto each generated entry.
    pub tags: Vec<String>,
    /// The date of the first occurrence.
    pub start_date: Date,
    /// How far apart consecutive occurrences are.
    pub interval: Interval,
    /// The number of occurrences, or zero for an open-ended rule.
    ///
    /// Never one.
    pub occurrence_count: u32,
}

impl RecurringRule {
    /// Create a rule with the ID `id` from already validated `fields`.
    pub fn from_fields(id: RuleId, user_id: UserID, fields: RuleFields) -> Self {
        Self {
            id,
            user_id,
            name: fields.name,
            amount: fields.amount,
            currency: fields.currency,
            category: fields.category,
            tags: fields.tags,
            start_date: fields.start_date,
            interval: fields.interval,
            occurrence_count: fields.occurrence_count,
        }
    }

    /// Whether the rule repeats without a fixed number of occurrences.
    pub fn is_open_ended(&self) -> bool {
        self.occurrence_count == 0
    }
}

/// The validated, user-editable fields of a [RecurringRule].
///
/// Obtain one through [RuleDraft::validate].
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFields {
    pub(crate) name: String,
    pub(crate) amount: f64,
    pub(crate) currency: String,
    pub(crate) category: String,
    pub(crate) tags: Vec<String>,
    pub(crate) start_date: Date,
    pub(crate) interval: Interval,
    pub(crate) occurrence_count: u32,
}

/// Unvalidated rule data as submitted by a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDraft {
    /// A short description of the expense.
    pub name: String,
    /// The amount of each occurrence.
    pub amount: f64,
    /// The currency code. Falls back to the default currency if missing or empty.
    #[serde(default)]
    pub currency: Option<String>,
    /// The category label.
    pub category: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// The date of the first occurrence.
    pub start_date: Option<Date>,
    /// One of daily, weekly, monthly or yearly.
    pub interval: String,
    /// The number of occurrences, zero for open-ended.
    #[serde(default)]
    pub occurrence_count: u32,
}

impl RuleDraft {
    /// Check the draft and turn it into [RuleFields].
    ///
    /// Names, categories and tags are trimmed, empty tags are dropped and the
    /// currency code is lower-cased. `default_currency` is used when the
    /// draft has no currency.
    ///
    /// # Errors
    ///
    /// This function will return a:
    /// - [Error::EmptyRuleName] if the name is empty,
    /// - [Error::EmptyCategory] if the category is empty,
    /// - [Error::InvalidAmount] if the amount is NaN or infinite,
    /// - [Error::MissingStartDate] if there is no start date,
    /// - [Error::InvalidInterval] if the interval is not daily, weekly, monthly or yearly,
    /// - or [Error::InvalidOccurrenceCount] if the occurrence count is one.
    pub fn validate(self, default_currency: &str) -> Result<RuleFields, Error> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::EmptyRuleName);
        }

        let category = self.category.trim();
        if category.is_empty() {
            return Err(Error::EmptyCategory);
        }

        if !self.amount.is_finite() {
            return Err(Error::InvalidAmount(self.amount));
        }

        let start_date = self.start_date.ok_or(Error::MissingStartDate)?;
        let interval: Interval = self.interval.parse()?;

        if self.occurrence_count == 1 {
            return Err(Error::InvalidOccurrenceCount(self.occurrence_count));
        }

        let currency = self
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|currency| !currency.is_empty())
            .unwrap_or(default_currency)
            .to_lowercase();

        let tags = self
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(RuleFields {
            name: name.to_owned(),
            amount: self.amount,
            currency,
            category: category.to_owned(),
            tags,
            start_date,
            interval,
            occurrence_count: self.occurrence_count,
        })
    }
}
