//! PostgreSQL support: a `postgres`-crate-backed [SchemaConnection].
//!
//! PostgreSQL has full `ALTER TABLE` support and transactional DDL, so
//! migrations run as direct statements with no batch rewrites and no
//! foreign-key suspension.

use postgres::{Client, NoTls};

use crate::conn::SchemaConnection;
use crate::dialect::Dialect;
use crate::error::Error;

/// A `postgres::Client` adapted to the engine's connection seam.
pub struct PostgresConnection {
    client: Client,
}

impl PostgresConnection {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect from a `postgresql://` URL.
    pub fn connect(url: &str) -> Result<Self, Error> {
        if Dialect::from_url(url)? != Dialect::Postgresql {
            return Err(Error::Configuration(format!(
                "'{}' is not a postgresql connection URL",
                url
            )));
        }
        Ok(Self::new(Client::connect(url, NoTls)?))
    }

    /// Direct access to the underlying client.
    pub fn raw(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl SchemaConnection for PostgresConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }

    fn execute(&mut self, sql: &str) -> Result<usize, Error> {
        self.client.batch_execute(sql)?;
        Ok(0)
    }

    fn query_strings(&mut self, sql: &str) -> Result<Vec<Vec<Option<String>>>, Error> {
        let mut rows = Vec::new();
        for message in self.client.simple_query(sql)? {
            if let postgres::SimpleQueryMessage::Row(row) = message {
                let mut values = Vec::with_capacity(row.len());
                for i in 0..row.len() {
                    values.push(row.get(i).map(|v| v.to_string()));
                }
                rows.push(values);
            }
        }
        Ok(rows)
    }
}
