//! Supertable descriptors and lazy schema resolution.
//!
//! [`Catalog`] answers the two questions the insert path asks: "which
//! supertable owns this table?" and "what does this supertable look like?".
//! Answers come from the [`SchemaCache`] when present and from
//! `information_schema` / `DESCRIBE` otherwise, after which they are cached.

use std::str::FromStr;
use std::sync::Arc;

use crate::cache::SchemaCache;
use crate::driver::Session;
use crate::error::{Result, TaosError};
use crate::sql::quote_str;
use crate::types::{FieldType, Row, Value};

/// Whether a field is an ordinary column or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Column,
    Tag,
}

/// One field of a supertable as reported by `DESCRIBE`, minus its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: FieldType,
    pub role: FieldRole,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: FieldType, role: FieldRole) -> Self {
        Self {
            name: name.into(),
            ty,
            role,
        }
    }

    pub fn is_tag(&self) -> bool {
        self.role == FieldRole::Tag
    }

    /// Builds a descriptor from one `DESCRIBE` result row.
    ///
    /// Column names are matched case-insensitively so both the 2.x
    /// (`Field`/`Type`/`Note`) and 3.x (`field`/`type`/`note`) layouts work.
    /// The `length` column is ignored.
    pub fn from_describe_row(row: &Row) -> Result<Self> {
        let name = text_column(row, "field")?;
        let ty = FieldType::from_str(&text_column(row, "type")?)?;
        let role = match row.get("note").and_then(Value::as_str) {
            Some(note) if note.trim().eq_ignore_ascii_case("TAG") => FieldRole::Tag,
            _ => FieldRole::Column,
        };
        Ok(Self::new(name, ty, role))
    }
}

/// Field layout of a supertable, in database column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StableDescriptor {
    columns: usize,
    tags: usize,
    fields: Vec<FieldDescriptor>,
}

impl StableDescriptor {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        let tags = fields.iter().filter(|f| f.is_tag()).count();
        Self {
            columns: fields.len() - tags,
            tags,
            fields,
        }
    }

    /// Number of ordinary columns, i.e. placeholders in an insert.
    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn tags(&self) -> usize {
        self.tags
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Ordinary columns in order.
    pub fn column_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.is_tag())
    }

    /// Tag fields in order.
    pub fn tag_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_tag())
    }
}

/// Schema lookups for one database, backed by the cache.
#[derive(Debug)]
pub struct Catalog {
    database: String,
    cache: SchemaCache,
}

impl Catalog {
    pub fn new(database: impl Into<String>, cache: SchemaCache) -> Self {
        Self {
            database: database.into(),
            cache,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    /// Loads every supertable descriptor and every child table mapping of the
    /// database into the cache. Existing entries are overwritten, nothing is
    /// evicted.
    pub fn warm(&self, session: &dyn Session) -> Result<(usize, usize)> {
        let stables = session
            .query(&format!(
                "SELECT stable_name FROM information_schema.ins_stables WHERE db_name = {}",
                quote_str(&self.database)
            ))?
            .into_rows();
        for row in &stables {
            let stable = text_column(row, "stable_name")?;
            let desc = self.describe(session, &stable)?;
            self.cache.set_stable(stable, desc);
        }

        let tables = session
            .query(&format!(
                "SELECT table_name, stable_name FROM information_schema.ins_tables WHERE db_name = {}",
                quote_str(&self.database)
            ))?
            .into_rows();
        let mut children = 0;
        for row in &tables {
            if let Some((table, stable)) = child_table(row)? {
                self.cache.set_table(table, stable);
                children += 1;
            }
        }

        tracing::info!(
            database = %self.database,
            stables = stables.len(),
            tables = children,
            "schema cache warmed"
        );
        Ok((stables.len(), children))
    }

    /// Returns the supertable owning `table`, or `None` if no such child table
    /// exists. A miss is not an error: it is how callers learn the table has
    /// to be created.
    pub fn table_stable(&self, session: &dyn Session, table: &str) -> Result<Option<String>> {
        if let Some(stable) = self.cache.table_stable(table) {
            return Ok(Some(stable));
        }

        let rows = session
            .query(&format!(
                "SELECT table_name, stable_name FROM information_schema.ins_tables \
                 WHERE db_name = {} AND table_name = {}",
                quote_str(&self.database),
                quote_str(table)
            ))?
            .into_rows();
        for row in &rows {
            if let Some((name, stable)) = child_table(row)?
                && name == table
            {
                self.cache.set_table(name, stable.clone());
                return Ok(Some(stable));
            }
        }
        Ok(None)
    }

    /// Returns the descriptor of `stable`, describing it on a cache miss.
    ///
    /// # Errors
    /// `StableNotFound` if the database has no such supertable.
    pub fn stable(&self, session: &dyn Session, stable: &str) -> Result<Arc<StableDescriptor>> {
        if let Some(desc) = self.cache.stable(stable) {
            return Ok(desc);
        }

        let rows = session
            .query(&format!(
                "SELECT stable_name FROM information_schema.ins_stables \
                 WHERE db_name = {} AND stable_name = {}",
                quote_str(&self.database),
                quote_str(stable)
            ))?
            .into_rows();
        for row in &rows {
            if text_column(row, "stable_name")? == stable {
                let desc = self.describe(session, stable)?;
                self.cache.set_stable(stable, Arc::clone(&desc));
                return Ok(desc);
            }
        }
        Err(TaosError::stable_not_found(stable))
    }

    pub fn remember_table(&self, table: &str, stable: &str) {
        self.cache.set_table(table, stable);
    }

    pub fn forget_table(&self, table: &str) {
        self.cache.delete(table);
    }

    fn describe(&self, session: &dyn Session, stable: &str) -> Result<Arc<StableDescriptor>> {
        let fields = session
            .query(&format!("DESCRIBE {}", stable))?
            .into_rows()
            .iter()
            .map(FieldDescriptor::from_describe_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(StableDescriptor::new(fields)))
    }
}

/// Extracts `(table_name, stable_name)` from an `ins_tables` row. Normal
/// tables have a NULL or empty stable and yield `None`.
fn child_table(row: &Row) -> Result<Option<(String, String)>> {
    let table = text_column(row, "table_name")?;
    match row.get_present("stable_name").map(Value::to_string) {
        Some(stable) if !stable.is_empty() => Ok(Some((table, stable))),
        _ => Ok(None),
    }
}

fn text_column(row: &Row, name: &str) -> Result<String> {
    match row.get_present(name) {
        Some(Value::Text(s)) => Ok(s.clone()),
        Some(Value::Bytes(b)) => Ok(String::from_utf8_lossy(b).into_owned()),
        Some(other) => Err(TaosError::conversion(format!(
            "Expected text in column '{}', got {:?}",
            name, other
        ))),
        None => Err(TaosError::conversion(format!(
            "Missing column '{}' in metadata result",
            name
        ))),
    }
}
