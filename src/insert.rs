//! Insert orchestration.
//!
//! Resolves the target table through the schema catalog, picks the plain or
//! the create-and-insert statement, binds and executes it, and heals stale
//! cache entries when the database reports the table missing. Batches are
//! split into chunks whose failures are isolated into an [`InsertReport`].

use std::fmt;

use crate::bind::{BindValue, bind_rows};
use crate::driver::Session;
use crate::error::{Result, TaosError};
use crate::schema::{Catalog, StableDescriptor};
use crate::sql::{self, InsertSqlCache};
use crate::types::Row;

/// A chunk of a batch that could not be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    /// Index of the chunk's first row in the input.
    pub offset: usize,
    /// Number of rows in the chunk.
    pub len: usize,
    /// Rendered error.
    pub error: String,
}

/// Outcome of a batch insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Rows the database reported as inserted.
    pub affected: usize,
    /// Chunks that failed, in input order.
    pub failures: Vec<ChunkFailure>,
}

impl InsertReport {
    /// True when no chunk failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of input rows in failed chunks.
    pub fn failed_rows(&self) -> usize {
        self.failures.iter().map(|f| f.len).sum()
    }

    fn record(&mut self, offset: usize, len: usize, table: &str, err: &TaosError) {
        tracing::error!(table = %table, offset, rows = len, error = %err, "Insert chunk failed");
        self.failures.push(ChunkFailure {
            offset,
            len,
            error: err.to_string(),
        });
    }
}

impl fmt::Display for InsertReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows inserted", self.affected)?;
        if !self.failures.is_empty() {
            write!(
                f,
                ", {} rows in {} failed chunks",
                self.failed_rows(),
                self.failures.len()
            )?;
        }
        Ok(())
    }
}

/// Where a table's rows go.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// The table exists under this supertable.
    Known(String),
    /// The table has to be created from this supertable.
    Create(String),
}

impl Target {
    fn stable(&self) -> &str {
        match self {
            Target::Known(stable) | Target::Create(stable) => stable,
        }
    }
}

/// Runs inserts on one session against a shared catalog.
pub struct Inserter<'a> {
    session: &'a dyn Session,
    catalog: &'a Catalog,
    statements: &'a InsertSqlCache,
    tz_offset: i32,
}

impl<'a> Inserter<'a> {
    pub fn new(
        session: &'a dyn Session,
        catalog: &'a Catalog,
        statements: &'a InsertSqlCache,
        tz_offset: i32,
    ) -> Self {
        Self {
            session,
            catalog,
            statements,
            tz_offset,
        }
    }

    /// Inserts `rows` into `table` as one statement.
    ///
    /// Without `stable` the table must already exist. With `stable` a missing
    /// table is created from it, tagged from the first row.
    ///
    /// # Errors
    /// `TableNotFound`, `StableNotFound`, `StableMismatch` and `MissingTag`
    /// from resolution, coercion errors from binding, and any driver error
    /// other than a missing table.
    pub fn insert(&self, table: &str, stable: Option<&str>, rows: &[Row]) -> Result<usize> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let target = self.plan(table, stable)?;
        self.run(table, &target, rows, first).inspect_err(|e| {
            tracing::error!(table = %table, error = %e, "Insert failed");
        })
    }

    /// Inserts `rows` into `table` in chunks of `batch_size`.
    ///
    /// Resolution errors are returned before anything is written. After
    /// that, a failing chunk is logged and recorded in the report and the
    /// remaining chunks still run. Once the first chunk has created the
    /// table the rest use the plain statement.
    pub fn insert_batch(
        &self,
        table: &str,
        stable: Option<&str>,
        rows: &[Row],
        batch_size: usize,
    ) -> Result<InsertReport> {
        let mut report = InsertReport::default();
        let Some(first) = rows.first() else {
            return Ok(report);
        };
        if batch_size == 0 {
            return Err(TaosError::invalid_option("batch_size must be at least 1".to_string()));
        }

        let mut target = self.plan(table, stable)?;
        if let Target::Create(stable) = &target {
            let desc = self.catalog.stable(self.session, stable)?;
            sql::tag_values(&desc, first)?;
        }

        for (index, chunk) in rows.chunks(batch_size).enumerate() {
            let offset = index * batch_size;
            match self.run(table, &target, chunk, first) {
                Ok(affected) => {
                    report.affected += affected;
                    if let Target::Create(stable) = &target {
                        target = Target::Known(stable.clone());
                    }
                }
                Err(e) => report.record(offset, chunk.len(), table, &e),
            }
        }

        tracing::debug!(table = %table, %report, "Batch insert finished");
        Ok(report)
    }

    /// Inserts rows that each name their own `table` (and optionally
    /// `stable`), one literal multi-table statement per chunk.
    ///
    /// Every row is resolved before the first chunk runs. If a chunk hits a
    /// missing table, it is retried once with every row in auto-create form.
    pub fn insert_tables(&self, rows: &[Row], batch_size: usize) -> Result<InsertReport> {
        let mut report = InsertReport::default();
        if rows.is_empty() {
            return Ok(report);
        }
        if batch_size == 0 {
            return Err(TaosError::invalid_option("batch_size must be at least 1".to_string()));
        }

        let planned = rows
            .iter()
            .map(|row| self.plan_row(row))
            .collect::<Result<Vec<_>>>()?;

        for (index, chunk) in planned.chunks(batch_size).enumerate() {
            let offset = index * batch_size;
            match self.run_tables(chunk) {
                Ok(affected) => report.affected += affected,
                Err(e) => report.record(offset, chunk.len(), chunk[0].table, &e),
            }
        }

        tracing::debug!(tables = rows.len(), %report, "Multi-table insert finished");
        Ok(report)
    }

    fn plan(&self, table: &str, requested: Option<&str>) -> Result<Target> {
        match (self.catalog.table_stable(self.session, table)?, requested) {
            (Some(cached), Some(requested)) if cached != requested => {
                Err(TaosError::stable_mismatch(table, &cached, requested))
            }
            (Some(cached), _) => Ok(Target::Known(cached)),
            (None, Some(requested)) => Ok(Target::Create(requested.to_string())),
            (None, None) => Err(TaosError::table_not_found(table)),
        }
    }

    fn run(&self, table: &str, target: &Target, rows: &[Row], tag_row: &Row) -> Result<usize> {
        let desc = self.catalog.stable(self.session, target.stable())?;
        let params = bind_rows(&desc, rows, self.tz_offset)?;
        match target {
            Target::Known(stable) => self.insert_plain(table, stable, &desc, &params, tag_row),
            Target::Create(stable) => self.create_and_insert(table, stable, &desc, &params, tag_row),
        }
    }

    fn insert_plain(
        &self,
        table: &str,
        stable: &str,
        desc: &StableDescriptor,
        params: &[Vec<BindValue>],
        tag_row: &Row,
    ) -> Result<usize> {
        let sql = self.statements.get(table, desc.columns());
        match self.session.exec_prepared(&sql, params) {
            Err(e) if e.is_table_missing() => {
                tracing::warn!(
                    table = %table,
                    stable = %stable,
                    error = %e,
                    "Table missing, retrying as create-and-insert"
                );
                self.catalog.forget_table(table);
                self.statements.remove(table);
                self.create_and_insert(table, stable, desc, params, tag_row)
            }
            result => result,
        }
    }

    fn create_and_insert(
        &self,
        table: &str,
        stable: &str,
        desc: &StableDescriptor,
        params: &[Vec<BindValue>],
        tag_row: &Row,
    ) -> Result<usize> {
        let tags = sql::tag_values(desc, tag_row)?;
        let sql = sql::create_insert_sql(table, stable, &tags, desc.columns());
        match self.session.exec_prepared(&sql, params) {
            Ok(affected) => {
                self.catalog.remember_table(table, stable);
                tracing::debug!(table = %table, stable = %stable, "Created table");
                Ok(affected)
            }
            // Someone else created it first, possibly under another stable
            Err(e) if e.is_table_exists() => {
                self.catalog.forget_table(table);
                match self.catalog.table_stable(self.session, table)? {
                    Some(owner) if owner == stable => {
                        tracing::debug!(table = %table, stable = %stable, "Table created concurrently");
                        let sql = self.statements.get(table, desc.columns());
                        self.session.exec_prepared(&sql, params)
                    }
                    Some(owner) => Err(TaosError::stable_mismatch(table, &owner, stable)),
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn plan_row<'r>(&self, row: &'r Row) -> Result<PlannedRow<'r>> {
        let table = row.table().ok_or_else(TaosError::missing_table_key)?;
        let target = self.plan(table, row.stable())?;
        let desc = self.catalog.stable(self.session, target.stable())?;
        let clause = match &target {
            Target::Known(_) => sql::values_clause(table, &desc, row),
            Target::Create(stable) => sql::using_clause(table, stable, &desc, row)?,
        };
        Ok(PlannedRow {
            table,
            row,
            target,
            clause,
        })
    }

    fn run_tables(&self, chunk: &[PlannedRow<'_>]) -> Result<usize> {
        let sql = sql::multi_insert_sql(&chunk.iter().map(|p| &p.clause).collect::<Vec<_>>());
        let affected = match self.session.exec(&sql) {
            Err(e) if e.is_table_missing() => {
                tracing::warn!(error = %e, "Table missing in multi-table insert, retrying with auto-create");
                let clauses = chunk
                    .iter()
                    .map(|p| {
                        self.catalog.forget_table(p.table);
                        let desc = self.catalog.stable(self.session, p.target.stable())?;
                        sql::using_clause(p.table, p.target.stable(), &desc, p.row)
                    })
                    .collect::<Result<Vec<_>>>()?;
                let affected = self.session.exec(&sql::multi_insert_sql(&clauses))?;
                for p in chunk {
                    self.catalog.remember_table(p.table, p.target.stable());
                }
                affected
            }
            result => {
                let affected = result?;
                for p in chunk.iter().filter(|p| matches!(p.target, Target::Create(_))) {
                    self.catalog.remember_table(p.table, p.target.stable());
                }
                affected
            }
        };
        Ok(affected)
    }
}

/// A multi-table row with its resolved target and rendered clause.
struct PlannedRow<'r> {
    table: &'r str,
    row: &'r Row,
    target: Target,
    clause: String,
}
