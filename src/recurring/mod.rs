//! The recurring expense engine.
//!
//! - [Interval] steps a date forward by one period.
//! - [resolve_occurrence_budget] turns an occurrence count into a generation bound.
//! - [generate] expands a [RecurringRule] into dated [LedgerEntry](crate::LedgerEntry) values.
//! - [create_rule], [update_rule] and [delete_rule] keep a rule and its
//!   entries consistent inside a single store transaction.

mod budget;
mod interval;
mod materialize;
mod reconcile;
mod rule;

pub use budget::{OPEN_ENDED_OCCURRENCE_CEILING, resolve_occurrence_budget};
pub use interval::Interval;
pub use materialize::{GenerationStart, Occurrences, generate};
pub use reconcile::{
    DeleteMode, ReconcileSummary, UpdateMode, create_rule, delete_rule, update_rule,
};
pub use rule::{RecurringRule, RuleDraft, RuleFields, RuleId};
