//! Sets up the application database.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::{
    Error,
    stores::sqlite::{create_ledger_entry_table, create_recurring_rule_table},
};

/// Create the tables for recurring rules and ledger entries.
///
/// Existing tables are left untouched, so this is safe to call on every start.
///
/// # Errors
/// Returns an [Error::SqlError] if a table could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction = Transaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_recurring_rule_table(&transaction)?;
    create_ledger_entry_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::initialize;

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).expect("Could not initialize database");
        initialize(&connection).expect("Could not initialize database a second time");

        let table_count: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('recurring_rule', 'ledger_entry')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table_count, 2);
    }

    #[test]
    fn rule_table_rejects_single_occurrence() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        let result = connection.execute(
            "INSERT INTO recurring_rule
             (id, user_id, name, amount, currency, category, tags, start_date, interval, occurrence_count)
             VALUES ('a', 1, 'Rent', 1.0, 'usd', 'Housing', '[]', '2024-01-01', 'monthly', 1)",
            (),
        );

        assert!(result.is_err());
    }
}
