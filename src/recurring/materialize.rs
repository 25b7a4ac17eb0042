//! Expands a recurring rule into concrete ledger entries.

use time::Date;

use crate::{
    EntryId, LedgerEntry,
    recurring::{Interval, RecurringRule, resolve_occurrence_budget},
};

/// Where generation of a rule's entries begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationStart {
    /// Start at the rule's start date and use the whole occurrence budget.
    RuleStart,
    /// Skip every occurrence dated on or before the given date.
    ///
    /// For rules with a fixed occurrence count, the skipped occurrences use up
    /// the budget as if they had been generated. Open-ended rules get the full
    /// open-ended ceiling counted from the first occurrence after the date.
    After(Date),
}

/// The dates on which a rule occurs, in increasing order.
///
/// The sequence is finite and can be restarted by cloning it before iterating.
#[derive(Clone, Debug)]
pub struct Occurrences {
    interval: Interval,
    cursor: Date,
    remaining: u32,
}

impl Occurrences {
    /// Create the sequence of occurrence dates for `rule`, beginning at `start`.
    pub fn new(rule: &RecurringRule, start: GenerationStart) -> Self {
        let mut cursor = rule.start_date;
        let mut remaining = resolve_occurrence_budget(rule.occurrence_count);

        if let GenerationStart::After(date) = start {
            while cursor <= date && remaining > 0 {
                let next = rule.interval.advance(cursor);
                if next == cursor {
                    // Saturated at the last representable date.
                    remaining = 0;
                    break;
                }

                cursor = next;

                if !rule.is_open_ended() {
                    remaining -= 1;
                }
            }
        }

        Self {
            interval: rule.interval,
            cursor,
            remaining,
        }
    }
}

impl Iterator for Occurrences {
    type Item = Date;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let date = self.cursor;
        let next = self.interval.advance(date);

        if next == date {
            self.remaining = 0;
        } else {
            self.cursor = next;
            self.remaining -= 1;
        }

        Some(date)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

/// Generate the ledger entries implied by `rule`, beginning at `start`.
///
/// Each entry copies the rule's name, amount, currency, category and tags,
/// refers back to the rule through `recurring_rule_id` and gets a fresh
/// [EntryId]. Apart from the IDs the output is fully determined by `rule` and
/// `start`.
pub fn generate(rule: &RecurringRule, start: GenerationStart) -> Vec<LedgerEntry> {
    let entries: Vec<LedgerEntry> = Occurrences::new(rule, start)
        .map(|date| LedgerEntry {
            id: EntryId::new_random(),
            user_id: rule.user_id,
            name: rule.name.clone(),
            amount: rule.amount,
            currency: rule.currency.clone(),
            category: rule.category.clone(),
            tags: rule.tags.clone(),
            date,
            recurring_rule_id: Some(rule.id),
        })
        .collect();

    tracing::debug!(
        "generated {} entries for rule {} starting from {:?}",
        entries.len(),
        rule.id,
        start
    );

    entries
}
