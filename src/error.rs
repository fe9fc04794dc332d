/// Error type for the schemashift crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The engine could not be configured: unresolvable dialect, missing
    /// connection URL, or an invalid revision chain. Surfaced before any
    /// migration is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A schema diff produced an object that could not be resolved
    /// unambiguously. This indicates a bug in the declared model or the
    /// diff rules, not a user-recoverable condition.
    #[error("schema conflict: {0}")]
    SchemaConflict(String),
    /// A statement failed while applying a migration. The migration's
    /// transaction has been rolled back; earlier committed migrations
    /// remain applied.
    #[error("migration {revision} failed: {message}")]
    Execution { revision: String, message: String },
    /// A foreign-key check failed after a batch table rewrite, before
    /// enforcement was re-enabled.
    #[error("foreign key integrity violation on table {table}: {message}")]
    Integrity { table: String, message: String },
    #[cfg(feature = "sqlite")]
    #[error("{0}")]
    Sqlite(rusqlite::Error),
    #[cfg(feature = "postgres")]
    #[error("{0}")]
    Postgres(#[from] postgres::Error),
    #[error("{0}")]
    Generic(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Generic(value)
    }
}

// Manual PartialEq implementation because postgres::Error doesn't implement PartialEq
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Configuration(a), Self::Configuration(b)) => a == b,
            (Self::SchemaConflict(a), Self::SchemaConflict(b)) => a == b,
            (
                Self::Execution {
                    revision: ra,
                    message: ma,
                },
                Self::Execution {
                    revision: rb,
                    message: mb,
                },
            ) => ra == rb && ma == mb,
            (
                Self::Integrity {
                    table: ta,
                    message: ma,
                },
                Self::Integrity {
                    table: tb,
                    message: mb,
                },
            ) => ta == tb && ma == mb,
            #[cfg(feature = "sqlite")]
            (Self::Sqlite(a), Self::Sqlite(b)) => a == b,
            #[cfg(feature = "postgres")]
            (Self::Postgres(a), Self::Postgres(b)) => a.to_string() == b.to_string(),
            (Self::Generic(a), Self::Generic(b)) => a == b,
            _ => false,
        }
    }
}
