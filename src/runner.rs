//! The migration runner.
//!
//! Resolves the currently applied revision from the version table, computes
//! the pending scripts in chain order, and applies each one inside its own
//! transaction: plan the script's edits, execute the statements, write the
//! version marker, commit. Any failure rolls the whole migration back
//! (the schema edits and the marker write are atomic together) and stops
//! the run; earlier migrations stay committed, so a re-run resumes from
//! the marker.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::conn::SchemaConnection;
use crate::dialect::Dialect;
use crate::error::Error;
use crate::planner::{sql_string, Planner, SchemaEdit};
use crate::render;
use crate::schema::SchemaModel;
use crate::txn::{check_foreign_keys, BeginMode, TxnController};

pub const DEFAULT_VERSION_TABLE_NAME: &str = "_schemashift_version_";

/// A versioned, reversible schema-change script: one node in the revision
/// chain.
///
/// # IMPORTANT WARNING
///
/// **Once a script has been applied to any database, its revision and name
/// must NEVER be changed.** Both feed the checksum used to verify that
/// applied migrations still match the codebase; changing either fails
/// validation on the next run.
pub trait MigrationScript {
    /// Unique revision identifier for this script.
    fn revision(&self) -> &str;

    /// The revision this script builds on; `None` for the root of the
    /// chain.
    fn parent(&self) -> Option<&str>;

    /// Human-readable name, included in the checksum. The default is
    /// derived from the revision.
    fn name(&self) -> String {
        format!("migration {}", self.revision())
    }

    /// Free-form documentation; not used for tracking or validation and
    /// safe to change at any time.
    fn description(&self) -> Option<&'static str> {
        None
    }

    /// The schema edits that bring the database up to this revision.
    fn upgrade(&self) -> Vec<SchemaEdit>;

    /// The schema edits that undo this revision. Optional - the default
    /// implementation panics. Implement this method to enable rollback.
    fn downgrade(&self) -> Vec<SchemaEdit> {
        panic!(
            "migration {} ('{}') does not support downgrade. Implement the downgrade() method to enable rollback.",
            self.revision(),
            self.name()
        )
    }
}

impl PartialEq for dyn MigrationScript {
    fn eq(&self, other: &Self) -> bool {
        self.revision() == other.revision()
    }
}

impl std::fmt::Debug for dyn MigrationScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationScript")
            .field("revision", &self.revision())
            .field("name", &self.name())
            .finish()
    }
}

/// Represents a failure during a migration.
#[derive(Debug, PartialEq)]
pub struct MigrationFailure<'migration> {
    pub(crate) migration: &'migration Box<dyn MigrationScript>,
    pub(crate) error: Error,
}

impl<'migration> MigrationFailure<'migration> {
    /// Get the migration that failed.
    pub fn migration(&self) -> &dyn MigrationScript {
        self.migration.as_ref()
    }

    /// Get the error that caused the migration to fail.
    pub fn error(&self) -> &Error {
        &self.error
    }
}

/// A report of actions performed during a migration run.
#[derive(Debug, PartialEq)]
pub struct MigrationReport<'migration> {
    pub version_table_existed: bool,
    pub version_table_created: bool,
    /// Revisions applied (or rolled back) during this run, in order.
    pub migrations_run: Vec<String>,
    pub failing_migration: Option<MigrationFailure<'migration>>,
}

/// A migration that has been applied to the database.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMigration {
    pub revision: String,
    pub name: String,
    pub applied_at: chrono::DateTime<Utc>,
    /// The checksum of the migration at the time it was applied.
    pub checksum: String,
}

/// How the runner's entry point applies migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Render the SQL the pending migrations would run, without connecting.
    Offline,
    /// Connect and execute.
    Live,
}

/// Connection configuration for [Runner::run].
#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    pub mode: Mode,
}

impl Config {
    pub fn new(url: impl Into<String>, mode: Mode) -> Self {
        Self {
            url: url.into(),
            mode,
        }
    }
}

/// The entrypoint for applying a chain of [MigrationScript]s.
///
/// Construct with the full list of scripts (any order; they are sorted
/// into chain order) and the declared target [SchemaModel], which supplies
/// the end-state structure of any table that needs a batch rebuild.
pub struct Runner {
    scripts: Vec<Box<dyn MigrationScript>>,
    model: SchemaModel,
    version_table: String,
    controller: TxnController,
    on_migration_start: Option<Box<dyn Fn(&str, &str) + Send + Sync>>,
    on_migration_complete: Option<Box<dyn Fn(&str, &str, std::time::Duration) + Send + Sync>>,
    on_migration_error: Option<Box<dyn Fn(&str, &str, &Error) + Send + Sync>>,
}

// Manual Debug impl since closures don't implement Debug
impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("scripts", &self.scripts)
            .field("version_table", &self.version_table)
            .field("on_migration_start", &self.on_migration_start.is_some())
            .field(
                "on_migration_complete",
                &self.on_migration_complete.is_some(),
            )
            .field("on_migration_error", &self.on_migration_error.is_some())
            .finish()
    }
}

/// Calculate a checksum for a script based on its revision and name.
/// Used to verify that migrations haven't been modified after being applied.
pub(crate) fn calculate_checksum(script: &dyn MigrationScript) -> String {
    let mut hasher = Sha256::new();
    hasher.update(script.revision().as_bytes());
    hasher.update(b"|");
    hasher.update(script.name().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

impl Runner {
    /// Create a new Runner, validating the revision chain.
    ///
    /// The chain must have unique, non-empty revisions, exactly one root,
    /// parents that all resolve, and no revision with two children: the
    /// scripts must form a single linear chain.
    pub fn try_new(
        mut scripts: Vec<Box<dyn MigrationScript>>,
        model: SchemaModel,
    ) -> Result<Self, Error> {
        let mut revisions: HashSet<String> = HashSet::new();
        for script in &scripts {
            let revision = script.revision();
            if revision.is_empty() {
                return Err(Error::Configuration(
                    "migration revision must be non-empty".to_string(),
                ));
            }
            if !revisions.insert(revision.to_string()) {
                return Err(Error::Configuration(format!(
                    "duplicate migration revision '{}'",
                    revision
                )));
            }
            if script.parent() == Some(revision) {
                return Err(Error::Configuration(format!(
                    "migration '{}' names itself as its parent",
                    revision
                )));
            }
        }

        if !scripts.is_empty() {
            let order: Vec<String> = {
                let roots: Vec<&str> = scripts
                    .iter()
                    .filter(|s| s.parent().is_none())
                    .map(|s| s.revision())
                    .collect();
                if roots.len() != 1 {
                    return Err(Error::Configuration(format!(
                        "revision chain must have exactly one root, found {}",
                        roots.len()
                    )));
                }

                let mut child: HashMap<&str, &str> = HashMap::new();
                for script in &scripts {
                    if let Some(parent) = script.parent() {
                        if !revisions.contains(parent) {
                            return Err(Error::Configuration(format!(
                                "migration '{}' names unknown parent '{}'",
                                script.revision(),
                                parent
                            )));
                        }
                        if child.insert(parent, script.revision()).is_some() {
                            return Err(Error::Configuration(format!(
                                "revision '{}' has more than one child; the chain is ambiguous",
                                parent
                            )));
                        }
                    }
                }

                let mut order = Vec::with_capacity(scripts.len());
                let mut cursor = Some(roots[0]);
                while let Some(revision) = cursor {
                    order.push(revision.to_string());
                    if order.len() > scripts.len() {
                        break;
                    }
                    cursor = child.get(revision).copied();
                }
                if order.len() != scripts.len() {
                    return Err(Error::Configuration(
                        "revision chain is disconnected: not every script is reachable from the root"
                            .to_string(),
                    ));
                }
                order
            };

            let position: HashMap<String, usize> = order
                .into_iter()
                .enumerate()
                .map(|(i, revision)| (revision, i))
                .collect();
            scripts.sort_by_key(|s| position.get(s.revision()).copied().unwrap_or(usize::MAX));
        }

        Ok(Self {
            scripts,
            model,
            version_table: DEFAULT_VERSION_TABLE_NAME.to_string(),
            controller: TxnController::new(),
            on_migration_start: None,
            on_migration_complete: None,
            on_migration_error: None,
        })
    }

    /// Create a new Runner, panicking if the revision chain is invalid.
    /// For a non-panicking version, use `try_new`.
    pub fn new(scripts: Vec<Box<dyn MigrationScript>>, model: SchemaModel) -> Self {
        match Self::try_new(scripts, model) {
            Ok(runner) => runner,
            Err(err) => panic!("{}", err),
        }
    }

    /// Set a custom name for the version tracking table.
    /// Defaults to "_schemashift_version_".
    pub fn with_version_table_name(mut self, name: impl Into<String>) -> Self {
        self.version_table = name.into();
        self
    }

    /// Set a callback invoked when a migration starts, with its revision
    /// and name.
    pub fn on_migration_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.on_migration_start = Some(Box::new(callback));
        self
    }

    /// Set a callback invoked when a migration completes, with its
    /// revision, name, and duration.
    pub fn on_migration_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str, std::time::Duration) + Send + Sync + 'static,
    {
        self.on_migration_complete = Some(Box::new(callback));
        self
    }

    /// Set a callback invoked when a migration fails, with its revision,
    /// name, and error.
    pub fn on_migration_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str, &Error) + Send + Sync + 'static,
    {
        self.on_migration_error = Some(Box::new(callback));
        self
    }

    /// All scripts, in chain order.
    pub fn scripts(&self) -> &[Box<dyn MigrationScript>] {
        &self.scripts
    }

    /// The declared target schema.
    pub fn model(&self) -> &SchemaModel {
        &self.model
    }

    pub fn version_table_name(&self) -> &str {
        &self.version_table
    }

    /// The last revision in the chain, if any.
    pub fn head_revision(&self) -> Option<&str> {
        self.scripts.last().map(|s| s.revision())
    }

    /// Top-level entry point: renders pending SQL in [Mode::Offline],
    /// connects and applies in [Mode::Live]. Live application is one
    /// synchronous unit of work on the calling thread.
    pub fn run(&self, config: &Config, out: &mut dyn Write) -> Result<(), Error> {
        let dialect = Dialect::from_url(&config.url)?;
        match config.mode {
            Mode::Offline => self.render_upgrade(dialect, None, out),
            Mode::Live => {
                let report = match dialect {
                    #[cfg(feature = "sqlite")]
                    Dialect::Sqlite => {
                        let mut conn = crate::sqlite::SqliteConnection::connect(&config.url)?;
                        self.upgrade(&mut conn)?
                    }
                    #[cfg(feature = "postgres")]
                    Dialect::Postgresql => {
                        let mut conn = crate::postgres::PostgresConnection::connect(&config.url)?;
                        self.upgrade(&mut conn)?
                    }
                    other => {
                        return Err(Error::Configuration(format!(
                            "no live driver available for dialect '{}'",
                            other.name()
                        )))
                    }
                };
                match report.failing_migration {
                    Some(failure) => Err(failure.error),
                    None => Ok(()),
                }
            }
        }
    }

    /// Render the SQL that `upgrade` would execute, starting after `from`
    /// (or from an empty database when `None`), without connecting.
    pub fn render_upgrade(
        &self,
        dialect: Dialect,
        from: Option<&str>,
        out: &mut dyn Write,
    ) -> Result<(), Error> {
        render::render_upgrade(self, dialect, from, out)
    }

    /// The currently applied revision, or `None` for a fresh database.
    pub fn current_revision<C: SchemaConnection>(
        &self,
        conn: &mut C,
    ) -> Result<Option<String>, Error> {
        if !self.version_table_exists(conn)? {
            return Ok(None);
        }
        let rows = conn.query_strings(&format!(
            "SELECT revision FROM {} ORDER BY ordinal DESC LIMIT 1",
            self.version_table
        ))?;
        Ok(rows.into_iter().next().and_then(|row| row.into_iter().next()).flatten())
    }

    /// The history of applied migrations, in application order. Empty for
    /// a fresh database.
    pub fn history<C: SchemaConnection>(
        &self,
        conn: &mut C,
    ) -> Result<Vec<AppliedMigration>, Error> {
        if !self.version_table_exists(conn)? {
            return Ok(vec![]);
        }
        self.applied_rows(conn)
    }

    /// The scripts `upgrade` would apply, in order, without running them.
    pub fn preview_upgrade<C: SchemaConnection>(
        &self,
        conn: &mut C,
    ) -> Result<Vec<&Box<dyn MigrationScript>>, Error> {
        let current = self.current_revision(conn)?;
        Ok(self.pending_after(current.as_deref())?.iter().collect())
    }

    /// The scripts `downgrade` would roll back, in rollback order, without
    /// running them.
    pub fn preview_downgrade<C: SchemaConnection>(
        &self,
        conn: &mut C,
        target: Option<&str>,
    ) -> Result<Vec<&Box<dyn MigrationScript>>, Error> {
        if !self.version_table_exists(conn)? {
            return Ok(vec![]);
        }
        let applied = self.applied_rows(conn)?;
        self.validate_applied(&applied)?;
        let keep = self.rollback_boundary(&applied, target)?;
        let mut scripts = Vec::new();
        for row in applied[keep..].iter().rev() {
            scripts.push(self.script_for(&row.revision)?);
        }
        Ok(scripts)
    }

    /// Apply all previously-unapplied scripts.
    pub fn upgrade<'r, C: SchemaConnection>(
        &'r self,
        conn: &mut C,
    ) -> Result<MigrationReport<'r>, Error> {
        self.upgrade_internal(conn, None)
    }

    /// Apply pending scripts up to and including `target`.
    pub fn upgrade_to<'r, C: SchemaConnection>(
        &'r self,
        conn: &mut C,
        target: &str,
    ) -> Result<MigrationReport<'r>, Error> {
        if !self.scripts.iter().any(|s| s.revision() == target) {
            return Err(Error::Configuration(format!(
                "target revision '{}' does not exist in the migration chain",
                target
            )));
        }
        self.upgrade_internal(conn, Some(target))
    }

    fn upgrade_internal<'r, C: SchemaConnection>(
        &'r self,
        conn: &mut C,
        target: Option<&str>,
    ) -> Result<MigrationReport<'r>, Error> {
        let version_table_existed = self.version_table_exists(conn)?;
        if !version_table_existed {
            conn.execute(&self.version_table_ddl(conn.dialect()))?;
        }

        let applied = if version_table_existed {
            self.applied_rows(conn)?
        } else {
            vec![]
        };
        self.validate_applied(&applied)?;

        let current = applied.last().map(|a| a.revision.clone());
        let mut pending = self.pending_after(current.as_deref())?;
        if let Some(target) = target {
            match pending.iter().position(|s| s.revision() == target) {
                Some(last) => pending = &pending[..=last],
                // Already applied: nothing to do.
                None => pending = &pending[..0],
            }
        }

        let planner = Planner::new(conn.dialect());
        let mut migrations_run: Vec<String> = Vec::new();
        let mut failing_migration: Option<MigrationFailure> = None;
        // All migrations in this run get the same timestamp.
        let batch_applied_at = Utc::now().to_rfc3339();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            current_revision = ?current,
            target = ?target,
            pending = ?pending.iter().map(|s| s.revision().to_string()).collect::<Vec<_>>(),
            "Considering migrations to run"
        );

        for script in pending {
            #[cfg(feature = "tracing")]
            let _span = tracing::info_span!(
                "migration_up",
                revision = %script.revision(),
                name = %script.name()
            )
            .entered();

            #[cfg(feature = "tracing")]
            tracing::info!("Starting migration");

            if let Some(ref callback) = self.on_migration_start {
                callback(script.revision(), &script.name());
            }

            let migration_start = Instant::now();
            let result =
                self.apply_script(conn, &planner, script.as_ref(), &batch_applied_at, Direction::Up);

            match result {
                Ok(()) => {
                    let migration_duration = migration_start.elapsed();

                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        duration_ms = migration_duration.as_millis(),
                        "Migration completed successfully"
                    );

                    migrations_run.push(script.revision().to_string());

                    if let Some(ref callback) = self.on_migration_complete {
                        callback(script.revision(), &script.name(), migration_duration);
                    }
                }
                Err(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %error, "Migration failed");

                    if let Some(ref callback) = self.on_migration_error {
                        callback(script.revision(), &script.name(), &error);
                    }

                    failing_migration = Some(MigrationFailure {
                        migration: script,
                        error,
                    });
                    break;
                }
            }
        }

        Ok(MigrationReport {
            version_table_existed,
            version_table_created: !version_table_existed,
            migrations_run,
            failing_migration,
        })
    }

    /// Roll back applied scripts down to `target` (exclusive). Pass `None`
    /// to roll back everything.
    pub fn downgrade<'r, C: SchemaConnection>(
        &'r self,
        conn: &mut C,
        target: Option<&str>,
    ) -> Result<MigrationReport<'r>, Error> {
        let version_table_existed = self.version_table_exists(conn)?;
        if !version_table_existed {
            // No migrations have been applied yet.
            return Ok(MigrationReport {
                version_table_existed: false,
                version_table_created: false,
                migrations_run: vec![],
                failing_migration: None,
            });
        }

        let applied = self.applied_rows(conn)?;
        self.validate_applied(&applied)?;
        let keep = self.rollback_boundary(&applied, target)?;

        let planner = Planner::new(conn.dialect());
        let mut migrations_run: Vec<String> = Vec::new();
        let mut failing_migration: Option<MigrationFailure> = None;
        let batch_applied_at = Utc::now().to_rfc3339();

        for row in applied[keep..].iter().rev() {
            let script = self.script_for(&row.revision)?;

            #[cfg(feature = "tracing")]
            let _span = tracing::info_span!(
                "migration_down",
                revision = %script.revision(),
                name = %script.name()
            )
            .entered();

            #[cfg(feature = "tracing")]
            tracing::info!("Rolling back migration");

            if let Some(ref callback) = self.on_migration_start {
                callback(script.revision(), &script.name());
            }

            let migration_start = Instant::now();
            let result = self.apply_script(
                conn,
                &planner,
                script.as_ref(),
                &batch_applied_at,
                Direction::Down,
            );

            match result {
                Ok(()) => {
                    let migration_duration = migration_start.elapsed();

                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        duration_ms = migration_duration.as_millis(),
                        "Migration rolled back successfully"
                    );

                    migrations_run.push(script.revision().to_string());

                    if let Some(ref callback) = self.on_migration_complete {
                        callback(script.revision(), &script.name(), migration_duration);
                    }
                }
                Err(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %error, "Migration rollback failed");

                    if let Some(ref callback) = self.on_migration_error {
                        callback(script.revision(), &script.name(), &error);
                    }

                    failing_migration = Some(MigrationFailure {
                        migration: script,
                        error,
                    });
                    break;
                }
            }
        }

        Ok(MigrationReport {
            version_table_existed,
            version_table_created: false,
            migrations_run,
            failing_migration,
        })
    }

    /// Apply one script inside its own transaction. The version-marker
    /// write happens in the same transaction as the schema edits. Plans
    /// containing a batch rebuild run inside the foreign-key-disabled
    /// scope with an integrity check before enforcement returns.
    fn apply_script<C: SchemaConnection>(
        &self,
        conn: &mut C,
        planner: &Planner,
        script: &dyn MigrationScript,
        applied_at: &str,
        direction: Direction,
    ) -> Result<(), Error> {
        let edits = match direction {
            Direction::Up => script.upgrade(),
            Direction::Down => script.downgrade(),
        };
        let plan = planner.plan(&self.model, &edits)?;

        let revision = script.revision().to_string();
        let bookkeeping = match direction {
            Direction::Up => format!(
                "INSERT INTO {} (revision, name, applied_at, checksum) VALUES ({}, {}, {}, {})",
                self.version_table,
                sql_string(&revision),
                sql_string(&script.name()),
                sql_string(applied_at),
                sql_string(&calculate_checksum(script)),
            ),
            Direction::Down => format!(
                "DELETE FROM {} WHERE revision = {}",
                self.version_table,
                sql_string(&revision),
            ),
        };

        // SQLite's deferred locking risks write-write races; take the
        // write lock up front for the duration of this step.
        let _mode = match conn.dialect() {
            Dialect::Sqlite => Some(self.controller.push_mode(BeginMode::Immediate)),
            _ => None,
        };

        self.controller.begin(conn)?;

        let exec = |conn: &mut C| -> Result<(), Error> {
            for statement in &plan.statements {
                conn.execute(statement).map_err(|e| Error::Execution {
                    revision: revision.clone(),
                    message: e.to_string(),
                })?;
            }
            conn.execute(&bookkeeping).map_err(|e| Error::Execution {
                revision: revision.clone(),
                message: e.to_string(),
            })?;
            Ok(())
        };

        let result = if plan.uses_batch {
            self.controller.with_foreign_keys_disabled(conn, |conn| {
                exec(conn)?;
                check_foreign_keys(conn)
            })
        } else {
            exec(conn)
        };

        match result {
            Ok(()) => self.controller.commit(conn),
            Err(error) => {
                let _ = self.controller.rollback(conn);
                Err(error)
            }
        }
    }

    pub(crate) fn version_table_ddl(&self, dialect: Dialect) -> String {
        let name = &self.version_table;
        match dialect {
            Dialect::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {} (ordinal INTEGER PRIMARY KEY AUTOINCREMENT, \
                 revision TEXT NOT NULL UNIQUE, name TEXT NOT NULL, applied_at TEXT NOT NULL, \
                 checksum TEXT NOT NULL)",
                name
            ),
            Dialect::Postgresql => format!(
                "CREATE TABLE IF NOT EXISTS {} (ordinal BIGSERIAL PRIMARY KEY, \
                 revision TEXT NOT NULL UNIQUE, name TEXT NOT NULL, applied_at TEXT NOT NULL, \
                 checksum TEXT NOT NULL)",
                name
            ),
            Dialect::Mysql => format!(
                "CREATE TABLE IF NOT EXISTS {} (ordinal BIGINT AUTO_INCREMENT PRIMARY KEY, \
                 revision VARCHAR(64) NOT NULL UNIQUE, name VARCHAR(255) NOT NULL, \
                 applied_at VARCHAR(64) NOT NULL, checksum VARCHAR(64) NOT NULL)",
                name
            ),
        }
    }

    fn version_table_exists<C: SchemaConnection>(&self, conn: &mut C) -> Result<bool, Error> {
        let sql = match conn.dialect() {
            Dialect::Sqlite => format!(
                "SELECT name FROM sqlite_master WHERE type='table' AND name={}",
                sql_string(&self.version_table)
            ),
            _ => format!(
                "SELECT table_name FROM information_schema.tables WHERE table_name={}",
                sql_string(&self.version_table)
            ),
        };
        Ok(!conn.query_strings(&sql)?.is_empty())
    }

    fn applied_rows<C: SchemaConnection>(
        &self,
        conn: &mut C,
    ) -> Result<Vec<AppliedMigration>, Error> {
        let rows = conn.query_strings(&format!(
            "SELECT revision, name, applied_at, checksum FROM {} ORDER BY ordinal",
            self.version_table
        ))?;
        let mut applied = Vec::with_capacity(rows.len());
        for row in rows {
            let get = |i: usize| -> String {
                row.get(i).cloned().flatten().unwrap_or_default()
            };
            let applied_at_raw = get(2);
            let applied_at = chrono::DateTime::parse_from_rfc3339(&applied_at_raw)
                .map_err(|e| {
                    Error::Generic(format!(
                        "corrupt applied_at value '{}' in version table: {}",
                        applied_at_raw, e
                    ))
                })?
                .with_timezone(&Utc);
            applied.push(AppliedMigration {
                revision: get(0),
                name: get(1),
                applied_at,
                checksum: get(3),
            });
        }
        Ok(applied)
    }

    /// Verify that every applied row still matches a script in the chain,
    /// that no applied migration has been modified, and that the applied
    /// sequence is a prefix of the chain.
    fn validate_applied(&self, applied: &[AppliedMigration]) -> Result<(), Error> {
        for row in applied {
            match self.scripts.iter().find(|s| s.revision() == row.revision) {
                Some(script) => {
                    let current = calculate_checksum(script.as_ref());
                    if current != row.checksum {
                        return Err(Error::Configuration(format!(
                            "migration {} checksum mismatch. Expected '{}' but found '{}'. \
                             Name in DB: '{}', current name: '{}'. \
                             This indicates the migration was modified after being applied.",
                            row.revision,
                            row.checksum,
                            current,
                            row.name,
                            script.name()
                        )));
                    }
                }
                None => {
                    return Err(Error::Configuration(format!(
                        "migration {} ('{}') was previously applied but is no longer present \
                         in the migration chain. Applied migrations cannot be removed from the codebase.",
                        row.revision, row.name
                    )));
                }
            }
        }

        for (i, row) in applied.iter().enumerate() {
            if self.scripts[i].revision() != row.revision {
                return Err(Error::Configuration(format!(
                    "applied migrations are out of order: position {} holds '{}' but the chain \
                     expects '{}'. This likely means a migration was inserted before revisions \
                     that were already applied.",
                    i,
                    row.revision,
                    self.scripts[i].revision()
                )));
            }
        }

        Ok(())
    }

    pub(crate) fn pending_after(
        &self,
        current: Option<&str>,
    ) -> Result<&[Box<dyn MigrationScript>], Error> {
        match current {
            None => Ok(&self.scripts),
            Some(revision) => {
                let index = self
                    .scripts
                    .iter()
                    .position(|s| s.revision() == revision)
                    .ok_or_else(|| {
                        Error::Configuration(format!(
                            "applied revision '{}' is not part of the migration chain",
                            revision
                        ))
                    })?;
                Ok(&self.scripts[index + 1..])
            }
        }
    }

    /// Index of the first applied row to roll back for the given target.
    fn rollback_boundary(
        &self,
        applied: &[AppliedMigration],
        target: Option<&str>,
    ) -> Result<usize, Error> {
        match target {
            None => Ok(0),
            Some(revision) => applied
                .iter()
                .position(|a| a.revision == revision)
                .map(|p| p + 1)
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "cannot downgrade to '{}': it is not an applied revision",
                        revision
                    ))
                }),
        }
    }

    fn script_for(&self, revision: &str) -> Result<&Box<dyn MigrationScript>, Error> {
        self.scripts
            .iter()
            .find(|s| s.revision() == revision)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "no script found for applied revision '{}'",
                    revision
                ))
            })
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::planner::SchemaEdit;
    use crate::schema::{ColumnDef, ColumnType, ForeignKeyDef, TableDef};
    use crate::sqlite::SqliteConnection;

    /// Test scripts carry their chain position and edits as data.
    struct Script {
        revision: &'static str,
        parent: Option<&'static str>,
        name: &'static str,
        up: Vec<SchemaEdit>,
        down: Option<Vec<SchemaEdit>>,
    }

    impl MigrationScript for Script {
        fn revision(&self) -> &str {
            self.revision
        }
        fn parent(&self) -> Option<&str> {
            self.parent
        }
        fn name(&self) -> String {
            self.name.to_string()
        }
        fn upgrade(&self) -> Vec<SchemaEdit> {
            self.up.clone()
        }
        fn downgrade(&self) -> Vec<SchemaEdit> {
            match &self.down {
                Some(edits) => edits.clone(),
                None => panic!("migration {} does not support downgrade", self.revision),
            }
        }
    }

    fn script(
        revision: &'static str,
        parent: Option<&'static str>,
        name: &'static str,
        up: Vec<SchemaEdit>,
    ) -> Box<dyn MigrationScript> {
        Box::new(Script {
            revision,
            parent,
            name,
            up,
            down: None,
        })
    }

    fn reversible_script(
        revision: &'static str,
        parent: Option<&'static str>,
        name: &'static str,
        up: Vec<SchemaEdit>,
        down: Vec<SchemaEdit>,
    ) -> Box<dyn MigrationScript> {
        Box::new(Script {
            revision,
            parent,
            name,
            up,
            down: Some(down),
        })
    }

    fn status_enum(variants: &[&str]) -> ColumnType {
        ColumnType::Enum {
            name: "account_status".to_string(),
            variants: variants.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn accounts_table(variants: &[&str]) -> TableDef {
        TableDef::new("accounts")
            .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .with_column(
                ColumnDef::new("status", status_enum(variants))
                    .not_null()
                    .default_value("'active'"),
            )
    }

    fn sessions_table() -> TableDef {
        TableDef::new("sessions")
            .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
            .with_column(ColumnDef::new("account_id", ColumnType::Integer).not_null())
            .with_foreign_key(ForeignKeyDef::new(["account_id"], "accounts", ["id"]))
    }

    fn base_model() -> SchemaModel {
        SchemaModel::new()
            .with_table(accounts_table(&["active", "disabled"]))
            .with_table(sessions_table())
    }

    fn create_base_script() -> Box<dyn MigrationScript> {
        script(
            "a1f0c3",
            None,
            "create base tables",
            vec![
                SchemaEdit::CreateTable(accounts_table(&["active", "disabled"])),
                SchemaEdit::CreateTable(sessions_table()),
            ],
        )
    }

    #[test]
    fn rejects_duplicate_revisions() {
        let err = Runner::try_new(
            vec![
                script("aaa", None, "one", vec![]),
                script("aaa", Some("aaa"), "two", vec![]),
            ],
            SchemaModel::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_multiple_roots() {
        let err = Runner::try_new(
            vec![
                script("aaa", None, "one", vec![]),
                script("bbb", None, "two", vec![]),
            ],
            SchemaModel::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one root"));
    }

    #[test]
    fn rejects_ambiguous_branch() {
        let err = Runner::try_new(
            vec![
                script("aaa", None, "one", vec![]),
                script("bbb", Some("aaa"), "two", vec![]),
                script("ccc", Some("aaa"), "three", vec![]),
            ],
            SchemaModel::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than one child"));
    }

    #[test]
    fn rejects_unknown_parent() {
        let err = Runner::try_new(
            vec![
                script("aaa", None, "one", vec![]),
                script("bbb", Some("zzz"), "two", vec![]),
            ],
            SchemaModel::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown parent"));
    }

    #[test]
    fn orders_scripts_into_chain_order() {
        let runner = Runner::new(
            vec![
                script("ccc", Some("bbb"), "three", vec![]),
                script("aaa", None, "one", vec![]),
                script("bbb", Some("aaa"), "two", vec![]),
            ],
            SchemaModel::new(),
        );
        let revisions: Vec<&str> = runner.scripts().iter().map(|s| s.revision()).collect();
        assert_eq!(revisions, vec!["aaa", "bbb", "ccc"]);
        assert_eq!(runner.head_revision(), Some("ccc"));
    }

    #[test]
    fn upgrade_from_clean_applies_all() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let runner = Runner::new(
            vec![
                create_base_script(),
                script(
                    "b7d210",
                    Some("a1f0c3"),
                    "add account email",
                    vec![SchemaEdit::AddColumn {
                        table: "accounts".to_string(),
                        column: ColumnDef::new("email", ColumnType::Text),
                    }],
                ),
            ],
            base_model(),
        );

        let report = runner.upgrade(&mut conn).unwrap();
        assert!(!report.version_table_existed);
        assert!(report.version_table_created);
        assert_eq!(
            report.migrations_run,
            vec!["a1f0c3".to_string(), "b7d210".to_string()]
        );
        assert!(report.failing_migration.is_none());

        assert_eq!(
            runner.current_revision(&mut conn).unwrap(),
            Some("b7d210".to_string())
        );

        let history = runner.history(&mut conn).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].revision, "a1f0c3");
        assert_eq!(history[0].name, "create base tables");
        assert!(!history[0].checksum.is_empty());

        // The schema is in place.
        let columns = conn
            .query_strings("PRAGMA table_info(\"accounts\")")
            .unwrap();
        let names: Vec<String> = columns
            .iter()
            .map(|r| r[1].clone().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["id", "status", "email"]);
    }

    #[test]
    fn second_upgrade_is_a_no_op() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let runner = Runner::new(vec![create_base_script()], base_model());
        runner.upgrade(&mut conn).unwrap();

        let report = runner.upgrade(&mut conn).unwrap();
        assert!(report.version_table_existed);
        assert!(!report.version_table_created);
        assert!(report.migrations_run.is_empty());
        assert!(report.failing_migration.is_none());
    }

    #[test]
    fn failing_migration_rolls_back_and_stops() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let runner = Runner::new(
            vec![
                create_base_script(),
                // Adds a column to a table that doesn't exist: the first
                // statement (a table create) succeeds, then the ALTER fails,
                // and the whole migration must roll back.
                script(
                    "b7d210",
                    Some("a1f0c3"),
                    "broken migration",
                    vec![
                        SchemaEdit::CreateTable(
                            TableDef::new("partial").with_column(
                                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                            ),
                        ),
                        SchemaEdit::AddColumn {
                            table: "missing".to_string(),
                            column: ColumnDef::new("c", ColumnType::Text),
                        },
                    ],
                ),
                script(
                    "c9e1aa",
                    Some("b7d210"),
                    "add account email",
                    vec![SchemaEdit::AddColumn {
                        table: "accounts".to_string(),
                        column: ColumnDef::new("email", ColumnType::Text),
                    }],
                ),
            ],
            base_model(),
        );

        let report = runner.upgrade(&mut conn).unwrap();
        assert_eq!(report.migrations_run, vec!["a1f0c3".to_string()]);
        let failure = report.failing_migration.as_ref().unwrap();
        assert_eq!(failure.migration().revision(), "b7d210");
        assert!(matches!(
            failure.error(),
            Error::Execution { revision, .. } if revision == "b7d210"
        ));

        // The failing migration's partial work was rolled back.
        let tables = conn
            .query_strings(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='partial'",
            )
            .unwrap();
        assert!(tables.is_empty());

        // The marker stayed at the last committed migration.
        assert_eq!(
            runner.current_revision(&mut conn).unwrap(),
            Some("a1f0c3".to_string())
        );
        assert_eq!(runner.history(&mut conn).unwrap().len(), 1);
    }

    #[test]
    fn resume_after_failure_applies_remaining() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let broken = Runner::new(
            vec![
                create_base_script(),
                script(
                    "b7d210",
                    Some("a1f0c3"),
                    "add account email",
                    vec![SchemaEdit::AddColumn {
                        table: "missing".to_string(),
                        column: ColumnDef::new("email", ColumnType::Text),
                    }],
                ),
                script(
                    "c9e1aa",
                    Some("b7d210"),
                    "add session label",
                    vec![SchemaEdit::AddColumn {
                        table: "sessions".to_string(),
                        column: ColumnDef::new("label", ColumnType::Text),
                    }],
                ),
            ],
            base_model(),
        );
        let report = broken.upgrade(&mut conn).unwrap();
        assert!(report.failing_migration.is_some());

        // Same chain with the defect fixed; revision and name unchanged.
        let fixed = Runner::new(
            vec![
                create_base_script(),
                script(
                    "b7d210",
                    Some("a1f0c3"),
                    "add account email",
                    vec![SchemaEdit::AddColumn {
                        table: "accounts".to_string(),
                        column: ColumnDef::new("email", ColumnType::Text),
                    }],
                ),
                script(
                    "c9e1aa",
                    Some("b7d210"),
                    "add session label",
                    vec![SchemaEdit::AddColumn {
                        table: "sessions".to_string(),
                        column: ColumnDef::new("label", ColumnType::Text),
                    }],
                ),
            ],
            base_model(),
        );
        let report = fixed.upgrade(&mut conn).unwrap();
        // The root migration is not re-applied.
        assert_eq!(
            report.migrations_run,
            vec!["b7d210".to_string(), "c9e1aa".to_string()]
        );
        assert!(report.failing_migration.is_none());
        assert_eq!(
            fixed.current_revision(&mut conn).unwrap(),
            Some("c9e1aa".to_string())
        );
    }

    #[test]
    fn batch_rewrite_preserves_foreign_keys() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();

        let v1_model = SchemaModel::new()
            .with_table(
                TableDef::new("t")
                    .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                    .with_column(ColumnDef::new("val", ColumnType::Text)),
            )
            .with_table(
                TableDef::new("u")
                    .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
                    .with_column(ColumnDef::new("t_id", ColumnType::Integer).not_null())
                    .with_foreign_key(ForeignKeyDef::new(["t_id"], "t", ["id"])),
            );
        let v1 = Runner::new(
            vec![script(
                "aaa111",
                None,
                "create t and u",
                vec![
                    SchemaEdit::CreateTable(v1_model.table("t").unwrap().clone()),
                    SchemaEdit::CreateTable(v1_model.table("u").unwrap().clone()),
                ],
            )],
            v1_model.clone(),
        );
        v1.upgrade(&mut conn).unwrap();

        conn.execute("INSERT INTO t (id, val) VALUES (1, 'x')").unwrap();
        conn.execute("INSERT INTO t (id, val) VALUES (2, 'y')").unwrap();
        conn.execute("INSERT INTO u (id, t_id) VALUES (10, 1)").unwrap();
        conn.execute("INSERT INTO u (id, t_id) VALUES (20, 2)").unwrap();

        // Dropping t.val forces a copy-swap rebuild of t, which u
        // references.
        let mut v2_model = v1_model.clone();
        v2_model.tables[0] = TableDef::new("t")
            .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key());
        let v2 = Runner::new(
            vec![
                script(
                    "aaa111",
                    None,
                    "create t and u",
                    vec![
                        SchemaEdit::CreateTable(v1_model.table("t").unwrap().clone()),
                        SchemaEdit::CreateTable(v1_model.table("u").unwrap().clone()),
                    ],
                ),
                script(
                    "bbb222",
                    Some("aaa111"),
                    "drop t.val",
                    vec![SchemaEdit::DropColumn {
                        table: "t".to_string(),
                        column: "val".to_string(),
                    }],
                ),
            ],
            v2_model,
        );
        let report = v2.upgrade(&mut conn).unwrap();
        assert!(report.failing_migration.is_none());
        assert_eq!(report.migrations_run, vec!["bbb222".to_string()]);

        // u's rows still reference t's rows.
        let joined = conn
            .query_strings("SELECT COUNT(*) FROM u JOIN t ON u.t_id = t.id")
            .unwrap();
        assert_eq!(joined[0][0], Some("2".to_string()));

        // Referential integrity holds and enforcement is back on.
        assert!(conn
            .query_strings("PRAGMA foreign_key_check")
            .unwrap()
            .is_empty());
        let fk = conn.query_strings("PRAGMA foreign_keys").unwrap();
        assert_eq!(fk[0][0], Some("1".to_string()));
        assert!(conn
            .execute("INSERT INTO u (id, t_id) VALUES (30, 99)")
            .is_err());

        assert_eq!(
            v2.current_revision(&mut conn).unwrap(),
            Some("bbb222".to_string())
        );
    }

    #[test]
    fn end_to_end_enum_rebuild() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();

        let v1 = Runner::new(vec![create_base_script()], base_model());
        v1.upgrade(&mut conn).unwrap();

        conn.execute("INSERT INTO accounts (id, status) VALUES (1, 'active')")
            .unwrap();
        conn.execute("INSERT INTO accounts (id, status) VALUES (2, 'disabled')")
            .unwrap();
        conn.execute("INSERT INTO sessions (id, account_id) VALUES (10, 1)")
            .unwrap();
        conn.execute("INSERT INTO sessions (id, account_id) VALUES (20, 2)")
            .unwrap();

        // Widening the enum changes the column's CHECK constraint, which
        // SQLite can only express through a rebuild of accounts.
        let widened = &["active", "disabled", "suspended"];
        let v2_model = SchemaModel::new()
            .with_table(accounts_table(widened))
            .with_table(sessions_table());
        let v2 = Runner::new(
            vec![
                create_base_script(),
                script(
                    "b7d210",
                    Some("a1f0c3"),
                    "allow suspended accounts",
                    vec![SchemaEdit::AlterColumn {
                        table: "accounts".to_string(),
                        column: ColumnDef::new("status", status_enum(widened))
                            .not_null()
                            .default_value("'active'"),
                    }],
                ),
            ],
            v2_model,
        );
        let report = v2.upgrade(&mut conn).unwrap();
        assert!(report.failing_migration.is_none());

        // accounts was rebuilt with the widened constraint.
        let sql = conn
            .query_strings("SELECT sql FROM sqlite_master WHERE type='table' AND name='accounts'")
            .unwrap();
        let create_sql = sql[0][0].clone().unwrap();
        assert!(create_sql.contains("suspended"));
        assert!(conn
            .execute("INSERT INTO accounts (id, status) VALUES (3, 'suspended')")
            .is_ok());

        // sessions' rows survived the swap and still reference accounts.
        let joined = conn
            .query_strings(
                "SELECT COUNT(*) FROM sessions JOIN accounts ON sessions.account_id = accounts.id",
            )
            .unwrap();
        assert_eq!(joined[0][0], Some("2".to_string()));
        assert!(conn
            .query_strings("PRAGMA foreign_key_check")
            .unwrap()
            .is_empty());

        // The marker advanced to the last script.
        assert_eq!(
            v2.current_revision(&mut conn).unwrap(),
            Some("b7d210".to_string())
        );
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let original = Runner::new(vec![create_base_script()], base_model());
        original.upgrade(&mut conn).unwrap();

        // Same revision, different name: the checksum no longer matches.
        let renamed = Runner::new(
            vec![script(
                "a1f0c3",
                None,
                "create base tables, renamed",
                vec![],
            )],
            base_model(),
        );
        let err = renamed.upgrade(&mut conn).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn removed_applied_migration_is_rejected() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let original = Runner::new(vec![create_base_script()], base_model());
        original.upgrade(&mut conn).unwrap();

        let rewritten = Runner::new(
            vec![script("fff999", None, "unrelated root", vec![])],
            base_model(),
        );
        let err = rewritten.upgrade(&mut conn).unwrap_err();
        assert!(err.to_string().contains("no longer present"));
    }

    #[test]
    fn upgrade_to_stops_at_target() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let runner = Runner::new(
            vec![
                create_base_script(),
                script(
                    "b7d210",
                    Some("a1f0c3"),
                    "add account email",
                    vec![SchemaEdit::AddColumn {
                        table: "accounts".to_string(),
                        column: ColumnDef::new("email", ColumnType::Text),
                    }],
                ),
                script(
                    "c9e1aa",
                    Some("b7d210"),
                    "add session label",
                    vec![SchemaEdit::AddColumn {
                        table: "sessions".to_string(),
                        column: ColumnDef::new("label", ColumnType::Text),
                    }],
                ),
            ],
            base_model(),
        );

        let report = runner.upgrade_to(&mut conn, "b7d210").unwrap();
        assert_eq!(
            report.migrations_run,
            vec!["a1f0c3".to_string(), "b7d210".to_string()]
        );
        assert_eq!(
            runner.current_revision(&mut conn).unwrap(),
            Some("b7d210".to_string())
        );

        assert!(matches!(
            runner.upgrade_to(&mut conn, "zzzzzz"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn downgrade_rolls_back_in_reverse() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let runner = Runner::new(
            vec![
                reversible_script(
                    "a1f0c3",
                    None,
                    "create base tables",
                    vec![
                        SchemaEdit::CreateTable(accounts_table(&["active", "disabled"])),
                        SchemaEdit::CreateTable(sessions_table()),
                    ],
                    vec![
                        SchemaEdit::DropTable {
                            table: "sessions".to_string(),
                        },
                        SchemaEdit::DropTable {
                            table: "accounts".to_string(),
                        },
                    ],
                ),
                reversible_script(
                    "b7d210",
                    Some("a1f0c3"),
                    "create audit log",
                    vec![SchemaEdit::CreateTable(
                        TableDef::new("audit_log").with_column(
                            ColumnDef::new("id", ColumnType::Integer).primary_key(),
                        ),
                    )],
                    vec![SchemaEdit::DropTable {
                        table: "audit_log".to_string(),
                    }],
                ),
            ],
            base_model(),
        );
        runner.upgrade(&mut conn).unwrap();

        let report = runner.downgrade(&mut conn, Some("a1f0c3")).unwrap();
        assert_eq!(report.migrations_run, vec!["b7d210".to_string()]);
        assert_eq!(
            runner.current_revision(&mut conn).unwrap(),
            Some("a1f0c3".to_string())
        );
        let tables = conn
            .query_strings(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='audit_log'",
            )
            .unwrap();
        assert!(tables.is_empty());

        let report = runner.downgrade(&mut conn, None).unwrap();
        assert_eq!(report.migrations_run, vec!["a1f0c3".to_string()]);
        assert_eq!(runner.current_revision(&mut conn).unwrap(), None);
        assert!(runner.history(&mut conn).unwrap().is_empty());
    }

    #[test]
    fn preview_lists_pending_without_running() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let runner = Runner::new(
            vec![
                create_base_script(),
                script(
                    "b7d210",
                    Some("a1f0c3"),
                    "add account email",
                    vec![SchemaEdit::AddColumn {
                        table: "accounts".to_string(),
                        column: ColumnDef::new("email", ColumnType::Text),
                    }],
                ),
            ],
            base_model(),
        );

        let pending = runner.preview_upgrade(&mut conn).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].revision(), "a1f0c3");
        assert_eq!(pending[1].revision(), "b7d210");
        // Nothing ran.
        assert_eq!(runner.current_revision(&mut conn).unwrap(), None);

        runner.upgrade(&mut conn).unwrap();
        assert!(runner.preview_upgrade(&mut conn).unwrap().is_empty());

        let rollback = runner.preview_downgrade(&mut conn, Some("a1f0c3")).unwrap();
        assert_eq!(rollback.len(), 1);
        assert_eq!(rollback[0].revision(), "b7d210");
    }

    #[test]
    fn observability_hooks_fire() {
        use std::sync::{Arc, Mutex};

        let events = Arc::new(Mutex::new(Vec::new()));
        let started = Arc::clone(&events);
        let completed = Arc::clone(&events);

        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let runner = Runner::new(vec![create_base_script()], base_model())
            .on_migration_start(move |revision, name| {
                started
                    .lock()
                    .unwrap()
                    .push(format!("start {} ({})", revision, name));
            })
            .on_migration_complete(move |revision, name, _duration| {
                completed
                    .lock()
                    .unwrap()
                    .push(format!("done {} ({})", revision, name));
            });
        runner.upgrade(&mut conn).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "start a1f0c3 (create base tables)",
                "done a1f0c3 (create base tables)",
            ]
        );
    }

    #[test]
    fn error_hook_receives_the_failure() {
        use std::sync::{Arc, Mutex};

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);

        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let runner = Runner::new(
            vec![script(
                "a1f0c3",
                None,
                "broken",
                vec![SchemaEdit::AddColumn {
                    table: "missing".to_string(),
                    column: ColumnDef::new("c", ColumnType::Text),
                }],
            )],
            base_model(),
        )
        .on_migration_error(move |revision, _name, error| {
            sink.lock()
                .unwrap()
                .push(format!("{}: {}", revision, error));
        });
        let report = runner.upgrade(&mut conn).unwrap();
        assert!(report.failing_migration.is_some());
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("a1f0c3:"));
    }

    #[test]
    fn run_live_applies_in_memory() {
        let runner = Runner::new(vec![create_base_script()], base_model());
        let config = Config::new("sqlite://", Mode::Live);
        let mut out: Vec<u8> = Vec::new();
        runner.run(&config, &mut out).unwrap();
        // Live mode writes nothing to the sink.
        assert!(out.is_empty());
    }

    #[test]
    fn run_live_surfaces_the_failing_migration() {
        let runner = Runner::new(
            vec![script(
                "a1f0c3",
                None,
                "broken",
                vec![SchemaEdit::AddColumn {
                    table: "missing".to_string(),
                    column: ColumnDef::new("c", ColumnType::Text),
                }],
            )],
            base_model(),
        );
        let config = Config::new("sqlite://", Mode::Live);
        let mut out: Vec<u8> = Vec::new();
        let err = runner.run(&config, &mut out).unwrap_err();
        assert!(matches!(err, Error::Execution { revision, .. } if revision == "a1f0c3"));
    }

    #[test]
    fn run_rejects_dialects_without_a_driver() {
        let runner = Runner::new(vec![create_base_script()], base_model());
        let config = Config::new("mysql://localhost/db", Mode::Live);
        let mut out: Vec<u8> = Vec::new();
        let err = runner.run(&config, &mut out).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
