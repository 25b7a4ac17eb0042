//! Implements a SQLite backed store for recurring rules and ledger entries.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, Row, Transaction, TransactionBehavior, types::Type};

use crate::{
    Error, LedgerEntry, UserID,
    recurring::{RecurringRule, RuleId},
    stores::{EntryDateFilter, LedgerStore, LedgerTransaction},
};

/// Stores recurring rules and ledger entries in a SQLite database.
///
/// The tables must have been created with [crate::initialize_db] first.
#[derive(Debug, Clone)]
pub struct SQLiteLedgerStore {
    connection: Arc<Mutex<Connection>>,
}

impl SQLiteLedgerStore {
    /// Create a new store for the SQLite `connection`.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Lock the connection.
    ///
    /// A panic inside [LedgerStore::transact] poisons the mutex, but the open
    /// transaction has already been rolled back when it was dropped, so the
    /// connection is still consistent and the lock is recovered.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("recovering database lock after a panic");
            PoisonError::into_inner(poisoned)
        })
    }
}

impl LedgerStore for SQLiteLedgerStore {
    /// Run `operation` in an immediate SQLite transaction.
    ///
    /// The write lock is taken when the transaction begins, so concurrent
    /// edits to the same rule are serialized. If `operation` fails the
    /// transaction is rolled back. If it panics, dropping the
    /// [rusqlite::Transaction] rolls it back.
    fn transact<T, F>(&self, operation: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn LedgerTransaction) -> Result<T, Error>,
    {
        let connection = self.lock();
        let transaction = Transaction::new_unchecked(&connection, TransactionBehavior::Immediate)?;
        let mut ledger_transaction = SQLiteLedgerTransaction { transaction };

        match operation(&mut ledger_transaction) {
            Ok(value) => {
                ledger_transaction.transaction.commit()?;
                Ok(value)
            }
            Err(error) => {
                tracing::warn!("rolling back transaction after error: {error}");

                if let Err(rollback_error) = ledger_transaction.transaction.rollback() {
                    tracing::error!("could not roll back transaction: {rollback_error}");
                }

                Err(error)
            }
        }
    }

    /// Retrieve the rule `rule_id` owned by `user_id`.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NotFound] if the rule does not exist or belongs to another user,
    /// - or [Error::SqlError] if there is some other SQL error.
    fn get_rule(&self, user_id: UserID, rule_id: RuleId) -> Result<RecurringRule, Error> {
        let connection = self.lock();

        connection
            .prepare(
                "SELECT id, user_id, name, amount, currency, category, tags, start_date, interval, occurrence_count
                 FROM recurring_rule
                 WHERE id = ?1 AND user_id = ?2",
            )?
            .query_row((rule_id, user_id.as_i64()), map_rule_row)
            .map_err(|error| error.into())
    }

    fn get_rules(&self, user_id: UserID) -> Result<Vec<RecurringRule>, Error> {
        let connection = self.lock();

        connection
            .prepare(
                "SELECT id, user_id, name, amount, currency, category, tags, start_date, interval, occurrence_count
                 FROM recurring_rule
                 WHERE user_id = ?1
                 ORDER BY start_date DESC, name ASC",
            )?
            .query_map([user_id.as_i64()], map_rule_row)?
            .map(|maybe_rule| maybe_rule.map_err(|error| error.into()))
            .collect()
    }

    fn get_entries_by_rule(
        &self,
        user_id: UserID,
        rule_id: RuleId,
    ) -> Result<Vec<LedgerEntry>, Error> {
        let connection = self.lock();

        connection
            .prepare(
                "SELECT id, user_id, recurring_rule_id, name, amount, currency, category, tags, date
                 FROM ledger_entry
                 WHERE user_id = ?1 AND recurring_rule_id = ?2
                 ORDER BY date ASC",
            )?
            .query_map((user_id.as_i64(), rule_id), map_entry_row)?
            .map(|maybe_entry| maybe_entry.map_err(|error| error.into()))
            .collect()
    }
}

/// A [LedgerTransaction] over an open SQLite transaction.
struct SQLiteLedgerTransaction<'conn> {
    transaction: Transaction<'conn>,
}

impl LedgerTransaction for SQLiteLedgerTransaction<'_> {
    fn insert_rule(&mut self, rule: &RecurringRule) -> Result<(), Error> {
        let tags = serde_json::to_string(&rule.tags)?;

        self.transaction.execute(
            "INSERT INTO recurring_rule
             (id, user_id, name, amount, currency, category, tags, start_date, interval, occurrence_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            (
                rule.id,
                rule.user_id.as_i64(),
                &rule.name,
                rule.amount,
                &rule.currency,
                &rule.category,
                tags,
                rule.start_date,
                rule.interval,
                rule.occurrence_count,
            ),
        )?;

        Ok(())
    }

    fn update_rule(&mut self, rule: &RecurringRule) -> Result<usize, Error> {
        let tags = serde_json::to_string(&rule.tags)?;

        let rows_affected = self.transaction.execute(
            "UPDATE recurring_rule
             SET name = ?1, amount = ?2, currency = ?3, category = ?4, tags = ?5,
                 start_date = ?6, interval = ?7, occurrence_count = ?8
             WHERE id = ?9 AND user_id = ?10",
            (
                &rule.name,
                rule.amount,
                &rule.currency,
                &rule.category,
                tags,
                rule.start_date,
                rule.interval,
                rule.occurrence_count,
                rule.id,
                rule.user_id.as_i64(),
            ),
        )?;

        Ok(rows_affected)
    }

    fn delete_rule(&mut self, user_id: UserID, rule_id: RuleId) -> Result<usize, Error> {
        let rows_affected = self.transaction.execute(
            "DELETE FROM recurring_rule WHERE id = ?1 AND user_id = ?2",
            (rule_id, user_id.as_i64()),
        )?;

        Ok(rows_affected)
    }

    fn delete_entries_by_rule(
        &mut self,
        user_id: UserID,
        rule_id: RuleId,
        filter: EntryDateFilter,
    ) -> Result<usize, Error> {
        let rows_affected = match filter {
            EntryDateFilter::All => self.transaction.execute(
                "DELETE FROM ledger_entry WHERE user_id = ?1 AND recurring_rule_id = ?2",
                (user_id.as_i64(), rule_id),
            )?,
            EntryDateFilter::After(date) => self.transaction.execute(
                "DELETE FROM ledger_entry
                 WHERE user_id = ?1 AND recurring_rule_id = ?2 AND date > ?3",
                (user_id.as_i64(), rule_id, date),
            )?,
        };

        Ok(rows_affected)
    }

    fn insert_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), Error> {
        if entries.is_empty() {
            return Ok(());
        }

        // Prepare the insert statement once for reuse
        let mut statement = self.transaction.prepare(
            "INSERT INTO ledger_entry
             (id, user_id, recurring_rule_id, name, amount, currency, category, tags, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for entry in entries {
            let tags = serde_json::to_string(&entry.tags)?;

            statement.execute((
                entry.id,
                entry.user_id.as_i64(),
                entry.recurring_rule_id,
                &entry.name,
                entry.amount,
                &entry.currency,
                &entry.category,
                tags,
                entry.date,
            ))?;
        }

        Ok(())
    }
}

/// Create the recurring rule table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_recurring_rule_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS recurring_rule (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                category TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                start_date TEXT NOT NULL,
                interval TEXT NOT NULL CHECK (interval IN ('daily', 'weekly', 'monthly', 'yearly')),
                occurrence_count INTEGER NOT NULL CHECK (occurrence_count = 0 OR occurrence_count >= 2)
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_recurring_rule_user ON recurring_rule(user_id, start_date)",
        (),
    )?;

    Ok(())
}

/// Create the ledger entry table in the database.
///
/// `recurring_rule_id` is deliberately not a foreign key: entries kept after
/// a rule is deleted still refer to it.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_ledger_entry_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS ledger_entry (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                recurring_rule_id TEXT,
                name TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                category TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                date TEXT NOT NULL
                )",
        (),
    )?;

    // Used when reconciling a rule's entries.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entry_rule_date
         ON ledger_entry(user_id, recurring_rule_id, date)",
        (),
    )?;

    Ok(())
}

fn map_rule_row(row: &Row) -> Result<RecurringRule, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = UserID::new(row.get(1)?);
    let name = row.get(2)?;
    let amount = row.get(3)?;
    let currency = row.get(4)?;
    let category = row.get(5)?;
    let tags = parse_tags(row, 6)?;
    let start_date = row.get(7)?;
    let interval = row.get(8)?;
    let occurrence_count = row.get(9)?;

    Ok(RecurringRule {
        id,
        user_id,
        name,
        amount,
        currency,
        category,
        tags,
        start_date,
        interval,
        occurrence_count,
    })
}

fn map_entry_row(row: &Row) -> Result<LedgerEntry, rusqlite::Error> {
    let id = row.get(0)?;
    let user_id = UserID::new(row.get(1)?);
    let recurring_rule_id = row.get(2)?;
    let name = row.get(3)?;
    let amount = row.get(4)?;
    let currency = row.get(5)?;
    let category = row.get(6)?;
    let tags = parse_tags(row, 7)?;
    let date = row.get(8)?;

    Ok(LedgerEntry {
        id,
        user_id,
        name,
        amount,
        currency,
        category,
        tags,
        date,
        recurring_rule_id,
    })
}

/// Tags are stored as a JSON array of strings.
fn parse_tags(row: &Row, column: usize) -> Result<Vec<String>, rusqlite::Error> {
    let raw_tags: String = row.get(column)?;

    serde_json::from_str(&raw_tags).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
    })
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{AssertUnwindSafe, catch_unwind},
        sync::{Arc, Mutex},
    };

    use rusqlite::Connection;
    use time::{Date, macros::date};

    use crate::{
        EntryId, Error, LedgerEntry, UserID,
        db::initialize,
        recurring::{Interval, RecurringRule, RuleId},
        stores::{EntryDateFilter, LedgerStore, SQLiteLedgerStore},
    };

    fn get_test_store() -> SQLiteLedgerStore {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        SQLiteLedgerStore::new(Arc::new(Mutex::new(connection)))
    }

    fn test_rule(user_id: UserID) -> RecurringRule {
        RecurringRule {
            id: RuleId::new_random(),
            user_id,
            name: "Phone".to_owned(),
            amount: 35.0,
            currency: "nzd".to_owned(),
            category: "Utilities".to_owned(),
            tags: vec!["bills".to_owned(), "mobile".to_owned()],
            start_date: date!(2024 - 01 - 05),
            interval: Interval::Monthly,
            occurrence_count: 12,
        }
    }

    fn test_entry(rule: &RecurringRule, date: Date) -> LedgerEntry {
        LedgerEntry {
            id: EntryId::new_random(),
            user_id: rule.user_id,
            name: rule.name.clone(),
            amount: rule.amount,
            currency: rule.currency.clone(),
            category: rule.category.clone(),
            tags: rule.tags.clone(),
            date,
            recurring_rule_id: Some(rule.id),
        }
    }

    #[test]
    fn insert_and_get_rule() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));

        store
            .transact(|transaction| transaction.insert_rule(&rule))
            .expect("Could not insert rule");

        let got_rule = store.get_rule(rule.user_id, rule.id);
        assert_eq!(got_rule, Ok(rule));
    }

    #[test]
    fn get_rule_of_other_user_returns_not_found() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));
        store
            .transact(|transaction| transaction.insert_rule(&rule))
            .unwrap();

        let got_rule = store.get_rule(UserID::new(2), rule.id);

        assert_eq!(got_rule, Err(Error::NotFound));
    }

    #[test]
    fn get_rules_lists_newest_start_first() {
        let store = get_test_store();
        let user_id = UserID::new(1);
        let older = test_rule(user_id);
        let newer = RecurringRule {
            id: RuleId::new_random(),
            start_date: date!(2025 - 06 - 01),
            ..test_rule(user_id)
        };
        let other_user = test_rule(UserID::new(2));
        store
            .transact(|transaction| {
                transaction.insert_rule(&older)?;
                transaction.insert_rule(&newer)?;
                transaction.insert_rule(&other_user)
            })
            .unwrap();

        let got_rules = store.get_rules(user_id).expect("Could not get rules");

        assert_eq!(got_rules, vec![newer, older]);
    }

    #[test]
    fn update_rule_overwrites_fields() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));
        store
            .transact(|transaction| transaction.insert_rule(&rule))
            .unwrap();
        let updated = RecurringRule {
            amount: 40.0,
            interval: Interval::Weekly,
            occurrence_count: 0,
            tags: vec![],
            ..rule.clone()
        };

        let rows_affected = store
            .transact(|transaction| transaction.update_rule(&updated))
            .unwrap();

        assert_eq!(rows_affected, 1);
        assert_eq!(store.get_rule(rule.user_id, rule.id), Ok(updated));
    }

    #[test]
    fn update_rule_of_other_user_affects_nothing() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));
        store
            .transact(|transaction| transaction.insert_rule(&rule))
            .unwrap();
        let hijacked = RecurringRule {
            user_id: UserID::new(2),
            amount: 0.0,
            ..rule.clone()
        };

        let rows_affected = store
            .transact(|transaction| transaction.update_rule(&hijacked))
            .unwrap();

        assert_eq!(rows_affected, 0);
        assert_eq!(store.get_rule(rule.user_id, rule.id), Ok(rule));
    }

    #[test]
    fn delete_rule_keeps_entries() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));
        let entry = test_entry(&rule, date!(2024 - 01 - 05));
        store
            .transact(|transaction| {
                transaction.insert_rule(&rule)?;
                transaction.insert_entries(std::slice::from_ref(&entry))
            })
            .unwrap();

        let rows_affected = store
            .transact(|transaction| transaction.delete_rule(rule.user_id, rule.id))
            .unwrap();

        assert_eq!(rows_affected, 1);
        assert_eq!(store.get_rule(rule.user_id, rule.id), Err(Error::NotFound));
        assert_eq!(store.get_entries_by_rule(rule.user_id, rule.id), Ok(vec![entry]));
    }

    #[test]
    fn delete_missing_rule_affects_nothing() {
        let store = get_test_store();

        let rows_affected = store
            .transact(|transaction| transaction.delete_rule(UserID::new(1), RuleId::new_random()))
            .unwrap();

        assert_eq!(rows_affected, 0);
    }

    #[test]
    fn delete_entries_after_date_keeps_earlier_entries() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));
        let entries = vec![
            test_entry(&rule, date!(2024 - 01 - 05)),
            test_entry(&rule, date!(2024 - 02 - 05)),
            test_entry(&rule, date!(2024 - 03 - 05)),
        ];
        store
            .transact(|transaction| transaction.insert_entries(&entries))
            .unwrap();

        let deleted = store
            .transact(|transaction| {
                transaction.delete_entries_by_rule(
                    rule.user_id,
                    rule.id,
                    EntryDateFilter::After(date!(2024 - 02 - 05)),
                )
            })
            .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(
            store.get_entries_by_rule(rule.user_id, rule.id),
            Ok(entries[..2].to_vec())
        );
    }

    #[test]
    fn delete_all_entries_only_touches_the_rule() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));
        let other_rule = test_rule(UserID::new(1));
        let other_entry = test_entry(&other_rule, date!(2024 - 01 - 05));
        store
            .transact(|transaction| {
                transaction.insert_entries(&[
                    test_entry(&rule, date!(2024 - 01 - 05)),
                    test_entry(&rule, date!(2024 - 02 - 05)),
                    other_entry.clone(),
                ])
            })
            .unwrap();

        let deleted = store
            .transact(|transaction| {
                transaction.delete_entries_by_rule(rule.user_id, rule.id, EntryDateFilter::All)
            })
            .unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(
            store.get_entries_by_rule(other_rule.user_id, other_rule.id),
            Ok(vec![other_entry])
        );
    }

    #[test]
    fn failed_operation_rolls_back() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));

        let result: Result<(), Error> = store.transact(|transaction| {
            transaction.insert_rule(&rule)?;
            transaction.insert_entries(&[test_entry(&rule, rule.start_date)])?;
            Err(Error::NotFound)
        });

        assert_eq!(result, Err(Error::NotFound));
        assert_eq!(store.get_rule(rule.user_id, rule.id), Err(Error::NotFound));
        assert_eq!(store.get_entries_by_rule(rule.user_id, rule.id), Ok(vec![]));
    }

    #[test]
    fn duplicate_entry_id_fails_the_whole_batch() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));
        let entry = test_entry(&rule, date!(2024 - 01 - 05));
        let duplicate = LedgerEntry {
            date: date!(2024 - 02 - 05),
            ..entry.clone()
        };

        let result = store.transact(|transaction| transaction.insert_entries(&[entry, duplicate]));

        assert!(matches!(result, Err(Error::SqlError(_))));
        assert_eq!(store.get_entries_by_rule(rule.user_id, rule.id), Ok(vec![]));
    }

    #[test]
    fn panic_in_transaction_rolls_back_and_store_stays_usable() {
        let store = get_test_store();
        let rule = test_rule(UserID::new(1));

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), Error> = store.transact(|transaction| {
                transaction.insert_rule(&rule)?;
                panic!("operation panicked mid-transaction");
            });
        }));

        assert!(result.is_err());
        assert_eq!(store.get_rules(rule.user_id), Ok(vec![]));
        store
            .transact(|transaction| transaction.insert_rule(&rule))
            .expect("Could not insert rule after a panic");
        assert_eq!(store.get_rules(rule.user_id), Ok(vec![rule]));
    }

    #[test]
    fn malformed_stored_values_are_not_retryable() {
        let connection = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        initialize(&connection.lock().unwrap()).unwrap();
        let store = SQLiteLedgerStore::new(connection.clone());
        connection
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO recurring_rule
                 (id, user_id, name, amount, currency, category, tags, start_date, interval, occurrence_count)
                 VALUES ('not-a-uuid', 1, 'Rent', 1200.0, 'usd', 'Housing', '[]', '2024-01-01', 'monthly', 0)",
                (),
            )
            .unwrap();

        let error = store
            .get_rules(UserID::new(1))
            .expect_err("Malformed rule ID should not be readable");

        assert!(matches!(error, Error::InvalidStoredValue(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn malformed_tags_are_invalid_stored_values() {
        let connection = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        initialize(&connection.lock().unwrap()).unwrap();
        let store = SQLiteLedgerStore::new(connection.clone());
        let rule = test_rule(UserID::new(1));
        store
            .transact(|transaction| transaction.insert_entries(&[test_entry(&rule, rule.start_date)]))
            .unwrap();
        connection
            .lock()
            .unwrap()
            .execute("UPDATE ledger_entry SET tags = 'bills,mobile'", ())
            .unwrap();

        let result = store.get_entries_by_rule(rule.user_id, rule.id);

        assert!(matches!(result, Err(Error::InvalidStoredValue(_))));
    }
}
