//! The database handle.
//!
//! [`TaosDatabase`] owns the session pool, the schema catalog and the
//! statement cache for one TDengine database. Every operation runs inside a
//! [`ConnectionScope`], so calls nested in [`TaosDatabase::with_connection`]
//! share the caller's session.

use std::sync::Arc;

use crate::bind::BindValue;
use crate::cache::SchemaCache;
use crate::config::TaosConfig;
use crate::connection::TaosConnector;
use crate::context::{ConnectionScope, ScopeKey};
use crate::driver::{Connector, Session};
use crate::error::{Result, TaosError};
use crate::insert::{InsertReport, Inserter};
use crate::pool::TaosPool;
use crate::schema::Catalog;
use crate::sql::InsertSqlCache;
use crate::types::{Row, Value};
use crate::utils::Runtime;

/// Handle to one TDengine database.
///
/// Cheap to share by reference across threads; each thread gets its own
/// pooled session for the duration of a call or scope.
///
/// # Example
/// ```ignore
/// let db = TaosDatabase::open(TaosConfig::new("power").with_pool_size(4))?;
/// let row = Row::new()
///     .with("ts", "2021-11-19 17:30:43.123")
///     .with("current", 10.3)
///     .with("location", "Beijing");
/// db.insert_one_with_stable("d1001", "meters", &row)?;
/// ```
#[derive(Debug)]
pub struct TaosDatabase {
    config: TaosConfig,
    scope: ScopeKey,
    catalog: Catalog,
    statements: InsertSqlCache,
    pool: TaosPool,
}

impl TaosDatabase {
    /// Connects to TDengine, opens `pool_size` sessions and warms the schema
    /// cache.
    ///
    /// # Errors
    /// `InvalidOption` for a bad config, `Connection` if the server cannot be
    /// reached, or the error of the initial metadata queries.
    pub fn open(config: TaosConfig) -> Result<Self> {
        config.validate()?;
        let rt = runtime()?;
        let connector = Arc::new(TaosConnector::new(config.dsn()?, Arc::clone(&rt)));
        Self::build(config, connector, rt)
    }

    /// Like [`open`](Self::open), but sessions come from `connector`.
    pub fn connect_with(config: TaosConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let rt = runtime()?;
        Self::build(config, connector, rt)
    }

    fn build(config: TaosConfig, connector: Arc<dyn Connector>, rt: Arc<Runtime>) -> Result<Self> {
        let pool = TaosPool::new(connector, config.pool_size, rt)?;
        let catalog = Catalog::new(
            config.database.clone(),
            SchemaCache::with_ttl(config.cache_ttl()),
        );
        let db = Self {
            config,
            scope: ScopeKey::new(),
            catalog,
            statements: InsertSqlCache::new(),
            pool,
        };
        db.refresh_cache()?;

        tracing::info!(
            database = %db.config.database,
            pool_size = db.config.pool_size,
            "TDengine database ready"
        );
        Ok(db)
    }

    pub fn config(&self) -> &TaosConfig {
        &self.config
    }

    /// The schema cache shared by every session of this handle.
    pub fn cache(&self) -> &SchemaCache {
        self.catalog.cache()
    }

    /// Opens a connection scope on the calling thread.
    ///
    /// Operations called while the guard is alive reuse its session.
    pub fn connection(&self) -> Result<ConnectionScope> {
        ConnectionScope::enter(self.scope, &self.pool)
    }

    /// Runs `f` inside a connection scope.
    pub fn with_connection<T>(&self, f: impl FnOnce(&dyn Session) -> Result<T>) -> Result<T> {
        let scope = self.connection()?;
        f(&*scope)
    }

    /// Runs a statement and returns the affected row count.
    pub fn execute(&self, sql: &str) -> Result<usize> {
        self.with_connection(|session| session.exec(sql))
    }

    /// Runs a `?`-parameterized insert with one bound row per entry.
    pub fn execute_with_params(&self, sql: &str, rows: &[Vec<BindValue>]) -> Result<usize> {
        if rows.is_empty() {
            return self.execute(sql);
        }
        self.with_connection(|session| session.exec_prepared(sql, rows))
    }

    /// Returns the single value of a one-column query, or `None` without rows.
    ///
    /// # Errors
    /// `MultiColumnResult` if the query returns more than one column.
    pub fn get(&self, sql: &str) -> Result<Option<Value>> {
        let result = self.with_connection(|session| session.query(sql))?;
        if result.fields.len() > 1 {
            return Err(TaosError::multi_column(result.fields.len()));
        }
        Ok(result.rows.into_iter().next().and_then(|row| row.into_iter().next()))
    }

    /// Returns the first row of a query, if any.
    pub fn select_one(&self, sql: &str) -> Result<Option<Row>> {
        Ok(self.select(sql)?.into_iter().next())
    }

    /// Returns every row of a query.
    pub fn select(&self, sql: &str) -> Result<Vec<Row>> {
        Ok(self.with_connection(|session| session.query(sql))?.into_rows())
    }

    /// Inserts one row into an existing child table.
    ///
    /// # Errors
    /// `TableNotFound` if the table does not exist.
    pub fn insert_one(&self, table: &str, row: &Row) -> Result<usize> {
        self.with_inserter(|inserter| inserter.insert(table, None, std::slice::from_ref(row)))
    }

    /// Inserts one row, creating `table` from `stable` if it does not exist.
    ///
    /// # Errors
    /// `StableMismatch` if `table` exists under another supertable,
    /// `StableNotFound` if `stable` does not exist, `MissingTag` if a new
    /// table would get no tag value.
    pub fn insert_one_with_stable(&self, table: &str, stable: &str, row: &Row) -> Result<usize> {
        self.with_inserter(|inserter| inserter.insert(table, Some(stable), std::slice::from_ref(row)))
    }

    /// Inserts rows into an existing child table in chunks of `batch_size`
    /// (the configured default when `None`).
    pub fn insert_many(&self, table: &str, rows: &[Row], batch_size: Option<usize>) -> Result<InsertReport> {
        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        self.with_inserter(|inserter| inserter.insert_batch(table, None, rows, batch_size))
    }

    /// Inserts rows in chunks, creating `table` from `stable` (tagged from
    /// the first row) if it does not exist.
    pub fn insert_many_with_stable(
        &self,
        table: &str,
        stable: &str,
        rows: &[Row],
        batch_size: Option<usize>,
    ) -> Result<InsertReport> {
        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        self.with_inserter(|inserter| inserter.insert_batch(table, Some(stable), rows, batch_size))
    }

    /// Inserts rows that each carry a `table` key (and a `stable` key for
    /// tables that may not exist yet).
    ///
    /// # Errors
    /// `MissingTableKey` if a row has no `table`; resolution errors for any
    /// row are returned before anything is written.
    pub fn insert_many_tables(&self, rows: &[Row], batch_size: Option<usize>) -> Result<InsertReport> {
        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        self.with_inserter(|inserter| inserter.insert_tables(rows, batch_size))
    }

    /// Drops a table if it exists and forgets it.
    pub fn drop_table(&self, table: &str) -> Result<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", table))?;
        self.catalog.forget_table(table);
        self.statements.remove(table);
        Ok(())
    }

    /// Reloads every supertable descriptor and child table mapping.
    ///
    /// Returns the number of supertables and child tables found.
    pub fn refresh_cache(&self) -> Result<(usize, usize)> {
        self.with_connection(|session| self.catalog.warm(session))
    }

    /// Closes the pool. Later operations fail with a `Connection` error.
    pub fn close(&self) {
        self.pool.close();
    }

    fn with_inserter<T>(&self, f: impl FnOnce(&Inserter<'_>) -> Result<T>) -> Result<T> {
        self.with_connection(|session| {
            f(&Inserter::new(
                session,
                &self.catalog,
                &self.statements,
                self.config.tz_offset,
            ))
        })
    }
}

fn runtime() -> Result<Arc<Runtime>> {
    Runtime::new()
        .map(Arc::new)
        .map_err(|e| TaosError::connection(format!("Failed to create runtime: {}", e)))
}
