//! Offline SQL rendering.
//!
//! Shares the planner with live execution, so the emitted SQL (including
//! batch rebuilds on SQLite) matches what a live run would do. Parameter
//! values are inlined as literals; the output contains no placeholders.

use std::io::Write;

use chrono::Utc;

use crate::dialect::Dialect;
use crate::error::Error;
use crate::planner::{sql_string, Planner};
use crate::runner::{calculate_checksum, Runner};

/// Write the SQL that upgrading would execute, one block per migration,
/// starting after `from` (or from an empty database when `None`, in which
/// case the version table's creation is included).
pub(crate) fn render_upgrade(
    runner: &Runner,
    dialect: Dialect,
    from: Option<&str>,
    out: &mut dyn Write,
) -> Result<(), Error> {
    let planner = Planner::new(dialect);
    let pending = runner.pending_after(from)?;
    let applied_at = Utc::now().to_rfc3339();

    if from.is_none() {
        writeln!(out, "{};", runner.version_table_ddl(dialect)).map_err(io_error)?;
        writeln!(out).map_err(io_error)?;
    }

    for script in pending {
        writeln!(
            out,
            "-- running upgrade {} -> {} ({})",
            script.parent().unwrap_or("<base>"),
            script.revision(),
            script.name()
        )
        .map_err(io_error)?;

        let plan = planner.plan(runner.model(), &script.upgrade())?;
        for statement in &plan.statements {
            writeln!(out, "{};", statement).map_err(io_error)?;
        }

        writeln!(
            out,
            "INSERT INTO {} (revision, name, applied_at, checksum) VALUES ({}, {}, {}, {});",
            runner.version_table_name(),
            sql_string(script.revision()),
            sql_string(&script.name()),
            sql_string(&applied_at),
            sql_string(&calculate_checksum(script.as_ref()))
        )
        .map_err(io_error)?;
        writeln!(out).map_err(io_error)?;
    }

    Ok(())
}

fn io_error(e: std::io::Error) -> Error {
    Error::Generic(format!("failed to write rendered SQL: {}", e))
}
