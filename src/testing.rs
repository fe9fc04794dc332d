//! Testing utilities for migration development and verification.
//!
//! This module provides a test harness for writing migration tests:
//! navigating the chain to a specific revision, executing and querying SQL,
//! asserting on schema shape, and snapshotting the reflected schema for
//! comparison.

use crate::runner::Runner;
use crate::sqlite::{reflect_schema, SqliteConnection};
use crate::{Error, ReflectedSchema, SchemaConnection};

/// A test harness that pairs a [Runner] with an in-memory database and
/// provides navigation and assertion helpers.
///
/// # Example
///
/// ```
/// use schemashift::testing::MigrationTestHarness;
/// use schemashift::{
///     schema_migration, ColumnDef, ColumnType, Runner, SchemaEdit, SchemaModel, TableDef,
/// };
///
/// schema_migration!(CreateUsers, "a1f0c3", parent: None, "create users",
///     up: [SchemaEdit::CreateTable(
///         TableDef::new("users")
///             .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
///             .with_column(ColumnDef::new("name", ColumnType::Text))
///     )],
///     down: [SchemaEdit::DropTable { table: "users".to_string() }]
/// );
///
/// # fn test() -> Result<(), schemashift::Error> {
/// let model = SchemaModel::new();
/// let mut harness =
///     MigrationTestHarness::new(Runner::new(vec![Box::new(CreateUsers)], model))?;
///
/// harness.migrate_to("a1f0c3")?;
/// harness.execute("INSERT INTO users VALUES (1, 'alice')")?;
/// harness.assert_table_exists("users")?;
///
/// let name: String = harness.query_one("SELECT name FROM users WHERE id = 1")?;
/// assert_eq!(name, "alice");
/// # Ok(())
/// # }
/// # test().unwrap();
/// ```
pub struct MigrationTestHarness {
    conn: SqliteConnection,
    runner: Runner,
}

impl MigrationTestHarness {
    /// Create a test harness over an in-memory SQLite database.
    ///
    /// Pass the same runner construction the production code uses: as the
    /// chain grows, assertions against earlier revisions should not change.
    pub fn new(runner: Runner) -> Result<Self, Error> {
        Ok(Self {
            conn: SqliteConnection::open_in_memory()?,
            runner,
        })
    }

    /// Create a test harness with a custom connection, for file-based
    /// databases or custom settings.
    pub fn with_connection(conn: SqliteConnection, runner: Runner) -> Self {
        Self { conn, runner }
    }

    /// Migrate to a specific revision, upgrading or downgrading as needed.
    pub fn migrate_to(&mut self, revision: &str) -> Result<(), Error> {
        let target = self.chain_position(revision)?;
        let current = match self.runner.current_revision(&mut self.conn)? {
            Some(current) => Some(self.chain_position(&current)?),
            None => None,
        };

        let report = match current {
            Some(current) if target < current => {
                self.runner.downgrade(&mut self.conn, Some(revision))?
            }
            Some(current) if target == current => return Ok(()),
            _ => self.runner.upgrade_to(&mut self.conn, revision)?,
        };
        match report.failing_migration {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }

    /// Apply every pending migration.
    pub fn migrate_all(&mut self) -> Result<(), Error> {
        let report = self.runner.upgrade(&mut self.conn)?;
        match report.failing_migration {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }

    /// Roll everything back to an empty database.
    pub fn migrate_down_all(&mut self) -> Result<(), Error> {
        let report = self.runner.downgrade(&mut self.conn, None)?;
        match report.failing_migration {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }

    /// The currently applied revision.
    pub fn current_revision(&mut self) -> Result<Option<String>, Error> {
        self.runner.current_revision(&mut self.conn)
    }

    /// Execute a statement against the database.
    pub fn execute(&mut self, sql: &str) -> Result<usize, Error> {
        self.conn.execute(sql)
    }

    /// Run a query expected to produce exactly one value.
    pub fn query_one<T: rusqlite::types::FromSql>(&mut self, sql: &str) -> Result<T, Error> {
        let value = self.conn.raw().query_row(sql, [], |row| row.get(0))?;
        Ok(value)
    }

    /// Run a query, mapping each row with `f`.
    pub fn query_map<T, F>(&mut self, sql: &str, f: F) -> Result<Vec<T>, Error>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let raw = self.conn.raw();
        let mut stmt = raw.prepare(sql)?;
        let rows = stmt.query_map([], f)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Assert that a table exists.
    pub fn assert_table_exists(&mut self, table: &str) -> Result<(), Error> {
        let count: i64 = self.conn.raw().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Err(Error::Generic(format!("table '{}' does not exist", table)));
        }
        Ok(())
    }

    /// Assert that a table has a column.
    pub fn assert_column_exists(&mut self, table: &str, column: &str) -> Result<(), Error> {
        let schema = self.capture_schema()?;
        let found = schema
            .table(table)
            .map(|t| t.column(column).is_some())
            .unwrap_or(false);
        if !found {
            return Err(Error::Generic(format!(
                "column '{}.{}' does not exist",
                table, column
            )));
        }
        Ok(())
    }

    /// Assert that an index exists on a table.
    pub fn assert_index_exists(&mut self, table: &str, index: &str) -> Result<(), Error> {
        let schema = self.capture_schema()?;
        let found = schema
            .table(table)
            .map(|t| t.index(index).is_some())
            .unwrap_or(false);
        if !found {
            return Err(Error::Generic(format!(
                "index '{}' does not exist on table '{}'",
                index, table
            )));
        }
        Ok(())
    }

    /// Snapshot the reflected schema, excluding the version table. The
    /// snapshot serializes with serde for storage alongside tests.
    pub fn capture_schema(&mut self) -> Result<ReflectedSchema, Error> {
        let skip = self.runner.version_table_name().to_string();
        reflect_schema(&mut self.conn, &[skip.as_str()])
    }

    /// Assert that the current schema matches a previously captured
    /// snapshot.
    pub fn assert_schema_matches(&mut self, expected: &ReflectedSchema) -> Result<(), Error> {
        let actual = self.capture_schema()?;
        if &actual != expected {
            return Err(Error::Generic(format!(
                "schema mismatch: expected {:?}, found {:?}",
                expected, actual
            )));
        }
        Ok(())
    }

    fn chain_position(&self, revision: &str) -> Result<usize, Error> {
        self.runner
            .scripts()
            .iter()
            .position(|s| s.revision() == revision)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "revision '{}' does not exist. Available revisions: {}",
                    revision,
                    self.runner
                        .scripts()
                        .iter()
                        .map(|s| s.revision().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}
