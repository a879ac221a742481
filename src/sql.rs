//! INSERT statement synthesis.
//!
//! Prepared statements use `?` placeholders for ordinary columns and inline
//! tag literals; multi-table batches inline every value. Literal rendering
//! follows the declared field type: text-like and time types are quoted,
//! numbers and booleans are bare, missing values are `NULL`.

use dashmap::DashMap;

use crate::error::{Result, TaosError};
use crate::schema::{FieldDescriptor, StableDescriptor};
use crate::types::{FieldType, Row, Value};

/// Quotes a string literal, escaping backslashes and single quotes.
pub fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Renders `value` as a SQL literal for a field of the given declaration.
pub fn literal(field: &FieldDescriptor, value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        // Epoch milliseconds, as on the prepared path
        Some(value) if field.ty == FieldType::Timestamp && value.as_i64().is_some() => value.to_string(),
        Some(value) if field.ty.is_quoted() => quote_str(&value.to_string()),
        Some(Value::Text(s)) => quote_str(s),
        Some(value) => value.to_string(),
    }
}

/// Renders the `TAGS(...)` value list for a new child table.
///
/// # Errors
/// `MissingTag` if the row has no value for any tag, which would create an
/// untagged table.
pub fn tag_values(desc: &StableDescriptor, row: &Row) -> Result<String> {
    let mut any = false;
    let values: Vec<String> = desc
        .tag_fields()
        .map(|tag| {
            let value = row.get_present(&tag.name);
            any |= value.is_some();
            literal(tag, value)
        })
        .collect();

    if !any {
        return Err(TaosError::missing_tag(
            desc.tag_fields().map(|t| t.name.clone()).collect(),
        ));
    }
    Ok(values.join(","))
}

/// Renders the ordinary column values of `row` in descriptor order.
pub fn column_values(desc: &StableDescriptor, row: &Row) -> String {
    desc.column_fields()
        .map(|field| literal(field, row.get(&field.name)))
        .collect::<Vec<_>>()
        .join(",")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// `INSERT INTO <table> VALUES (?,...)`.
pub fn insert_sql(table: &str, columns: usize) -> String {
    format!("INSERT INTO {} VALUES ({})", table, placeholders(columns))
}

/// `INSERT INTO <table> USING <stable> TAGS(<tags>) VALUES (?,...)`.
pub fn create_insert_sql(table: &str, stable: &str, tags: &str, columns: usize) -> String {
    format!(
        "INSERT INTO {} USING {} TAGS({}) VALUES ({})",
        table,
        stable,
        tags,
        placeholders(columns)
    )
}

/// `<table> VALUES (<literals>)`, one clause of a multi-table insert.
pub fn values_clause(table: &str, desc: &StableDescriptor, row: &Row) -> String {
    format!("{} VALUES ({})", table, column_values(desc, row))
}

/// `<table> USING <stable> TAGS(...) VALUES (<literals>)`, one auto-creating
/// clause of a multi-table insert.
pub fn using_clause(table: &str, stable: &str, desc: &StableDescriptor, row: &Row) -> Result<String> {
    Ok(format!(
        "{} USING {} TAGS({}) VALUES ({})",
        table,
        stable,
        tag_values(desc, row)?,
        column_values(desc, row)
    ))
}

/// Joins clauses into one `INSERT INTO` statement.
pub fn multi_insert_sql<S: AsRef<str>>(clauses: &[S]) -> String {
    let mut sql = String::from("INSERT INTO");
    for clause in clauses {
        sql.push(' ');
        sql.push_str(clause.as_ref());
    }
    sql
}

/// Per-table cache of plain parameterized insert statements.
#[derive(Debug, Default)]
pub struct InsertSqlCache {
    statements: DashMap<String, String>,
}

impl InsertSqlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the plain insert for `table`, building it on first use.
    ///
    /// The statement is rebuilt if the column count changed since it was
    /// cached.
    pub fn get(&self, table: &str, columns: usize) -> String {
        if let Some(sql) = self.statements.get(table)
            && sql.matches('?').count() == columns
        {
            return sql.clone();
        }
        let sql = insert_sql(table, columns);
        self.statements.insert(table.to_string(), sql.clone());
        sql
    }

    pub fn remove(&self, table: &str) {
        self.statements.remove(table);
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
