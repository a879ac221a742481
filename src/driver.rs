//! Driver seam between the pooling/insert layer and the wire client.
//!
//! [`Connector`] opens sessions and [`Session`] runs statements on one of
//! them. The TDengine implementation lives in [`connection`](crate::connection);
//! anything else implementing these traits (for instance an in-memory fake)
//! can be plugged into [`TaosDatabase::connect_with`](crate::TaosDatabase::connect_with).

use async_trait::async_trait;

use crate::bind::BindValue;
use crate::error::Result;
use crate::types::{Row, Value};

/// Opens new database sessions. Called by the pool when it fills up or
/// replaces a session that failed its health check.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Session>>;
}

/// One live database session.
///
/// Sessions are handed to a single thread at a time by the pool, but the
/// methods take `&self` so a session can be shared between nested scopes on
/// that thread.
#[async_trait]
pub trait Session: Send + Sync {
    /// Runs a query and returns its column names and rows.
    fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Runs a statement and returns the affected row count.
    fn exec(&self, sql: &str) -> Result<usize>;

    /// Prepares `sql` (with `?` placeholders), binds each row of typed
    /// parameters as one batch entry, executes, and returns affected rows.
    fn exec_prepared(&self, sql: &str, rows: &[Vec<BindValue>]) -> Result<usize>;

    /// Health check run by the pool before a session is reused.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Column names plus rows of a query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub fields: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(fields: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { fields, rows }
    }

    /// Zips every row with the field names.
    pub fn into_rows(self) -> Vec<Row> {
        let fields = self.fields;
        self.rows
            .into_iter()
            .map(|values| fields.iter().cloned().zip(values).collect())
            .collect()
    }
}
