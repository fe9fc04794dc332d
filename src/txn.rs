//! Transaction and isolation control.
//!
//! SQLite's default deferred locking acquires a write lock lazily, which
//! risks write-write races against other connections holding read locks.
//! Migrations on SQLite therefore run under `BEGIN IMMEDIATE`. The begin
//! mode is context-scoped state: the runner pushes an override for each
//! migration step and a guard restores the prior value when the step ends,
//! whether it succeeded, failed, or unwound.

use std::cell::Cell;

use crate::conn::SchemaConnection;
use crate::dialect::Dialect;
use crate::error::Error;

/// Lock-acquisition mode for `BEGIN` on dialects that distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginMode {
    /// Acquire locks lazily (SQLite's default).
    Deferred,
    /// Acquire the write lock up front.
    Immediate,
}

/// Scoped override of the controller's begin mode. Restores the prior mode
/// on drop.
#[must_use = "the override ends when this guard is dropped"]
pub struct ModeGuard<'a> {
    controller: &'a TxnController,
    prior: BeginMode,
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        self.controller.mode.set(self.prior);
    }
}

/// Issues transaction-control statements with the per-dialect begin mode,
/// and brackets destructive rebuilds with foreign-key suspension.
#[derive(Debug)]
pub struct TxnController {
    mode: Cell<BeginMode>,
}

impl Default for TxnController {
    fn default() -> Self {
        Self::new()
    }
}

impl TxnController {
    pub fn new() -> Self {
        Self {
            mode: Cell::new(BeginMode::Deferred),
        }
    }

    pub fn current_mode(&self) -> BeginMode {
        self.mode.get()
    }

    /// Override the begin mode until the returned guard drops.
    pub fn push_mode(&self, mode: BeginMode) -> ModeGuard<'_> {
        let prior = self.mode.replace(mode);
        ModeGuard {
            controller: self,
            prior,
        }
    }

    fn begin_sql(&self, dialect: Dialect) -> &'static str {
        match (dialect, self.mode.get()) {
            (Dialect::Sqlite, BeginMode::Immediate) => "BEGIN IMMEDIATE",
            (Dialect::Sqlite, BeginMode::Deferred) => "BEGIN DEFERRED",
            _ => "BEGIN",
        }
    }

    pub fn begin<C: SchemaConnection>(&self, conn: &mut C) -> Result<(), Error> {
        let sql = self.begin_sql(conn.dialect());
        conn.execute(sql)?;
        Ok(())
    }

    pub fn commit<C: SchemaConnection>(&self, conn: &mut C) -> Result<(), Error> {
        conn.execute("COMMIT")?;
        Ok(())
    }

    pub fn rollback<C: SchemaConnection>(&self, conn: &mut C) -> Result<(), Error> {
        conn.execute("ROLLBACK")?;
        Ok(())
    }

    /// Run `body` with foreign-key enforcement suspended.
    ///
    /// On SQLite: commits the open transaction (`PRAGMA foreign_keys` is a
    /// no-op inside one), disables enforcement, begins a new transaction
    /// under the current begin mode, and runs `body`. On exit the body's
    /// transaction is committed (or rolled back on error), enforcement is
    /// re-enabled, and a fresh transaction is begun; enforcement comes
    /// back on even when `body` fails. On other dialects `body` runs
    /// unchanged inside the already-open transaction.
    ///
    /// Needed because a copy-drop-rename rebuild transiently breaks
    /// foreign keys that reference the table being rebuilt.
    pub fn with_foreign_keys_disabled<C, F, T>(&self, conn: &mut C, body: F) -> Result<T, Error>
    where
        C: SchemaConnection,
        F: FnOnce(&mut C) -> Result<T, Error>,
    {
        if conn.dialect() != Dialect::Sqlite {
            return body(conn);
        }

        conn.execute("COMMIT")?;
        conn.execute("PRAGMA foreign_keys=OFF")?;
        self.begin(conn)?;

        match body(conn) {
            Ok(value) => {
                conn.execute("COMMIT")?;
                conn.execute("PRAGMA foreign_keys=ON")?;
                self.begin(conn)?;
                Ok(value)
            }
            Err(error) => {
                // Best effort: enforcement must come back on even if the
                // rollback itself fails.
                let _ = conn.execute("ROLLBACK");
                let _ = conn.execute("PRAGMA foreign_keys=ON");
                let _ = self.begin(conn);
                Err(error)
            }
        }
    }
}

/// Check referential integrity on SQLite, surfacing any violation as
/// [Error::Integrity]. Run inside the foreign-key-disabled scope, after a
/// rebuild and before enforcement is re-enabled.
pub fn check_foreign_keys<C: SchemaConnection>(conn: &mut C) -> Result<(), Error> {
    if conn.dialect() != Dialect::Sqlite {
        return Ok(());
    }
    let rows = conn.query_strings("PRAGMA foreign_key_check")?;
    if let Some(row) = rows.first() {
        let table = row
            .first()
            .and_then(|v| v.clone())
            .unwrap_or_else(|| "<unknown>".to_string());
        return Err(Error::Integrity {
            table,
            message: format!("{} row(s) with dangling foreign key references", rows.len()),
        });
    }
    Ok(())
}
