//! Dialect resolution from connection URLs.

use crate::error::Error;

/// Identifier for the target database engine's SQL variant and capabilities.
/// Resolved once from the connection configuration and immutable for the
/// lifetime of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgresql,
    Sqlite,
    Mysql,
}

impl Dialect {
    /// The canonical lowercase name of the dialect.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgresql => "postgresql",
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
        }
    }

    /// Resolve a dialect from a connection URL.
    ///
    /// The scheme may carry a `+driver` suffix (e.g. `postgresql+asyncpg://...`),
    /// which is ignored. Returns [Error::Configuration] for an unknown scheme
    /// or a URL with no scheme at all.
    ///
    /// # Example
    /// ```
    /// use schemashift::Dialect;
    ///
    /// assert_eq!(Dialect::from_url("sqlite:///app.db").unwrap(), Dialect::Sqlite);
    /// assert_eq!(
    ///     Dialect::from_url("postgresql+asyncpg://localhost/app").unwrap(),
    ///     Dialect::Postgresql
    /// );
    /// assert!(Dialect::from_url("oracle://localhost/app").is_err());
    /// ```
    pub fn from_url(url: &str) -> Result<Dialect, Error> {
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| {
                Error::Configuration(format!("connection URL '{}' has no scheme", url))
            })?;
        // "postgresql+asyncpg" names both the dialect and the driver; only
        // the dialect part matters here.
        let dialect = scheme.split('+').next().unwrap_or(scheme).to_lowercase();
        match dialect.as_str() {
            "postgresql" | "postgres" => Ok(Dialect::Postgresql),
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" => Ok(Dialect::Mysql),
            other => Err(Error::Configuration(format!(
                "unknown database dialect '{}' in connection URL",
                other
            ))),
        }
    }

    /// Whether the dialect supports in-place `ALTER TABLE` for structural
    /// changes. Dialects that don't (SQLite) are migrated through a
    /// copy-transform-swap rebuild instead.
    pub fn supports_native_alter(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
