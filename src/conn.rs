//! The connection seam between the engine and the database driver.

use crate::dialect::Dialect;
use crate::error::Error;

/// The engine-side interface to the external connection provider.
///
/// The engine drives everything through plain SQL text: DDL, DML, the
/// version-table bookkeeping, and transaction control statements issued by
/// the [TxnController](crate::TxnController). Implementations exist for
/// rusqlite (`sqlite` feature) and the `postgres` crate (`postgres`
/// feature); any other driver can participate by implementing this trait.
pub trait SchemaConnection {
    /// The dialect this connection speaks.
    fn dialect(&self) -> Dialect;

    /// Execute a statement, returning the number of rows changed (0 for
    /// DDL and transaction control).
    fn execute(&mut self, sql: &str) -> Result<usize, Error>;

    /// Run a query and return every row with each value rendered as text
    /// (`None` for SQL NULL). Used for version-marker reads, reflection
    /// queries, and integrity checks, none of which need typed access.
    fn query_strings(&mut self, sql: &str) -> Result<Vec<Vec<Option<String>>>, Error>;
}
