//! SQLite support: a rusqlite-backed [SchemaConnection] and live-schema
//! reflection.
//!
//! SQLite is the engine that motivates most of this crate's machinery: it
//! has almost no `ALTER TABLE` support, weak concurrent-writer behavior
//! under deferred locking, and no enum type. The adapter here enables
//! foreign-key enforcement and a busy timeout up front so concurrent
//! openers wait for locks instead of failing immediately.

use std::time::Duration;

use rusqlite::Connection;

use crate::conn::SchemaConnection;
use crate::dialect::Dialect;
use crate::error::Error;
use crate::schema::{
    type_kind_from_sql, ReflectedColumn, ReflectedIndex, ReflectedSchema, ReflectedTable,
};

/// A rusqlite connection adapted to the engine's connection seam.
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    /// Wrap an existing rusqlite connection, enabling foreign-key
    /// enforcement and a 30 second busy timeout.
    pub fn new(conn: Connection) -> Result<Self, Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// Open a connection from a `sqlite://` URL.
    ///
    /// `sqlite://` and `sqlite:///:memory:` open an in-memory database;
    /// `sqlite:///relative.db` opens a relative path and
    /// `sqlite:////absolute.db` an absolute one.
    pub fn connect(url: &str) -> Result<Self, Error> {
        match database_path(url)? {
            None => Self::open_in_memory(),
            Some(path) => Self::new(Connection::open(path)?),
        }
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Adjust how long concurrent migration attempts wait for locks.
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self, Error> {
        self.conn.busy_timeout(timeout)?;
        Ok(self)
    }

    /// Direct access to the underlying rusqlite connection.
    pub fn raw(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn into_inner(self) -> Connection {
        self.conn
    }
}

impl SchemaConnection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str) -> Result<usize, Error> {
        self.conn.execute_batch(sql)?;
        Ok(self.conn.changes() as usize)
    }

    fn query_strings(&mut self, sql: &str) -> Result<Vec<Vec<Option<String>>>, Error> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let value: rusqlite::types::Value = row.get(i)?;
                    values.push(match value {
                        rusqlite::types::Value::Null => None,
                        rusqlite::types::Value::Integer(v) => Some(v.to_string()),
                        rusqlite::types::Value::Real(v) => Some(v.to_string()),
                        rusqlite::types::Value::Text(v) => Some(v),
                        rusqlite::types::Value::Blob(v) => {
                            Some(String::from_utf8_lossy(&v).into_owned())
                        }
                    });
                }
                Ok(values)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Extract the filesystem path from a `sqlite://` URL. `None` means an
/// in-memory database.
fn database_path(url: &str) -> Result<Option<&str>, Error> {
    if Dialect::from_url(url)? != Dialect::Sqlite {
        return Err(Error::Configuration(format!(
            "'{}' is not a sqlite connection URL",
            url
        )));
    }
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or("");
    let path = rest.strip_prefix('/').unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        Ok(None)
    } else {
        Ok(Some(path))
    }
}

/// Reflect the live database's tables, columns, and indexes.
///
/// Tables named in `skip` (typically the engine's version table) and
/// SQLite-internal tables are left out. Auto-created indexes backing
/// primary keys and unique constraints are not reported; only explicitly
/// created indexes reflect.
pub fn reflect_schema<C: SchemaConnection>(
    conn: &mut C,
    skip: &[&str],
) -> Result<ReflectedSchema, Error> {
    let rows = conn.query_strings(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let mut tables = Vec::new();
    for row in rows {
        let Some(Some(name)) = row.into_iter().next() else {
            continue;
        };
        if skip.contains(&name.as_str()) {
            continue;
        }
        tables.push(reflect_table(conn, &name)?);
    }
    Ok(ReflectedSchema { tables })
}

fn reflect_table<C: SchemaConnection>(conn: &mut C, name: &str) -> Result<ReflectedTable, Error> {
    let mut columns = Vec::new();
    // table_info columns: cid, name, type, notnull, dflt_value, pk
    for row in conn.query_strings(&format!("PRAGMA table_info(\"{}\")", name))? {
        let column_name = cell(&row, 1);
        let declared_type = cell(&row, 2);
        let not_null = cell(&row, 3) == "1";
        let pk_position = cell(&row, 5);
        columns.push(ReflectedColumn {
            type_kind: type_kind_from_sql(&declared_type),
            name: column_name,
            declared_type,
            nullable: !not_null,
            primary_key: !pk_position.is_empty() && pk_position != "0",
        });
    }

    let mut indexes = Vec::new();
    // index_list columns: seq, name, unique, origin, partial
    for row in conn.query_strings(&format!("PRAGMA index_list(\"{}\")", name))? {
        let index_name = cell(&row, 1);
        let unique = cell(&row, 2) == "1";
        // Origin 'c' = explicitly created; 'pk'/'u' are constraint-backed.
        if cell(&row, 3) != "c" {
            continue;
        }
        let mut index_columns = Vec::new();
        for info in conn.query_strings(&format!("PRAGMA index_info(\"{}\")", index_name))? {
            let column = cell(&info, 2);
            if !column.is_empty() {
                index_columns.push(column);
            }
        }
        indexes.push(ReflectedIndex {
            name: index_name,
            columns: index_columns,
            unique,
        });
    }

    Ok(ReflectedTable {
        name: name.to_string(),
        columns,
        indexes,
    })
}

fn cell(row: &[Option<String>], index: usize) -> String {
    row.get(index).cloned().flatten().unwrap_or_default()
}
