#![cfg_attr(docsrs, feature(doc_cfg))]
//! `schemashift` is a schema migration engine: it applies an ordered chain
//! of versioned, reversible schema-change scripts against a relational
//! database, tracks which revisions have been applied, and supports both
//! live execution and dry-run SQL rendering.
//!
//! # Core concepts
//!
//! - Scripts describe their changes as declarative [SchemaEdit]s; a
//!   dialect-aware planner turns them into DDL. On engines with almost no
//!   `ALTER TABLE` support (SQLite), structural changes become a
//!   copy-transform-swap rebuild run with foreign-key enforcement
//!   suspended and re-checked before it returns.
//! - Scripts form a revision chain (each names its parent); the runner
//!   applies each pending script in its own transaction and records the
//!   version marker in that same transaction, so a failed migration rolls
//!   back completely and a re-run resumes from the last committed
//!   revision.
//! - A declared [SchemaModel] describes the target end state; diffing it
//!   against a reflected live schema goes through an inclusion filter that
//!   absorbs dialect-specific reflection artifacts (enum-as-text columns,
//!   functional and case-insensitive index flavors).
//!
//! # Example
//!
//! ```
//! use schemashift::{
//!     schema_migration, ColumnDef, ColumnType, Runner, SchemaEdit, SchemaModel, TableDef,
//! };
//! use schemashift::sqlite::SqliteConnection;
//!
//! schema_migration!(CreateUsers, "8c1f02", parent: None, "create users",
//!     up: [SchemaEdit::CreateTable(
//!         TableDef::new("users")
//!             .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
//!             .with_column(ColumnDef::new("name", ColumnType::Text))
//!     )]
//! );
//!
//! schema_migration!(AddEmail, "f44a1b", parent: Some("8c1f02"), "add user email",
//!     up: [SchemaEdit::AddColumn {
//!         table: "users".to_string(),
//!         column: ColumnDef::new("email", ColumnType::Text),
//!     }]
//! );
//!
//! let model = SchemaModel::new().with_table(
//!     TableDef::new("users")
//!         .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
//!         .with_column(ColumnDef::new("name", ColumnType::Text))
//!         .with_column(ColumnDef::new("email", ColumnType::Text)),
//! );
//!
//! let runner = Runner::new(vec![Box::new(CreateUsers), Box::new(AddEmail)], model);
//! let mut conn = SqliteConnection::open_in_memory().unwrap();
//! let report = runner.upgrade(&mut conn).unwrap();
//! assert_eq!(report.migrations_run, vec!["8c1f02".to_string(), "f44a1b".to_string()]);
//! assert_eq!(runner.current_revision(&mut conn).unwrap(), Some("f44a1b".to_string()));
//! ```
//!
//! # Dry runs
//!
//! With no live connection configured, the same planning logic renders the
//! SQL a run would execute, batch rebuilds included, with parameter
//! values inlined:
//!
//! ```
//! # use schemashift::{schema_migration, ColumnDef, ColumnType, Runner, SchemaEdit,
//! #     SchemaModel, TableDef, Config, Mode};
//! # schema_migration!(CreateUsers, "8c1f02", parent: None, "create users",
//! #     up: [SchemaEdit::CreateTable(
//! #         TableDef::new("users")
//! #             .with_column(ColumnDef::new("id", ColumnType::Integer).primary_key())
//! #     )]
//! # );
//! let runner = Runner::new(vec![Box::new(CreateUsers)], SchemaModel::new());
//! let config = Config::new("sqlite:///app.db", Mode::Offline);
//! let mut sql = Vec::new();
//! runner.run(&config, &mut sql).unwrap();
//! assert!(String::from_utf8(sql).unwrap().contains("CREATE TABLE \"users\""));
//! ```
//!
//! # Database support
//!
//! - SQLite (batch mode, immediate locking): `sqlite` feature flag,
//!   enabled by default.
//! - PostgreSQL (direct DDL): `postgres` feature flag.
//! - MySQL is supported for planning and dry-run rendering; live
//!   execution requires supplying a [SchemaConnection] implementation.
//!
//! Tracing integration is available with the `tracing` feature flag, and
//! testing utilities with the `testing` feature flag.

mod conn;
pub use conn::SchemaConnection;

mod dialect;
pub use dialect::Dialect;

mod diff;
pub use diff::diff;

mod error;
pub use error::Error;

mod filter;
pub use filter::should_include;

#[macro_use]
mod macros;

mod planner;
pub use planner::{MigrationPlan, Planner, SchemaEdit, BATCH_TMP_PREFIX};

mod render;

mod runner;
pub use runner::{
    AppliedMigration, Config, MigrationFailure, MigrationReport, MigrationScript, Mode, Runner,
    DEFAULT_VERSION_TABLE_NAME,
};

mod schema;
pub use schema::{
    type_kind_from_sql, ColumnDef, ColumnType, DdlIf, ForeignKeyDef, IndexDef, ObjectKind,
    ReflectedColumn, ReflectedIndex, ReflectedSchema, ReflectedTable, SchemaModel, SchemaObject,
    TableDef, TypeKind, UniqueDef,
};

mod txn;
pub use txn::{check_foreign_keys, BeginMode, ModeGuard, TxnController};

#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres;

#[cfg(feature = "testing")]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;
