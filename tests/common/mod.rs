//! Common utilities for integration tests.
//!
//! [`FakeTaos`] is an in-memory stand-in for a TDengine database that
//! understands exactly the statements taostd issues: the
//! `information_schema` lookups, `DESCRIBE`, `DROP TABLE IF EXISTS`,
//! `SELECT COUNT(*)`, prepared plain and `USING ... TAGS` inserts, and
//! literal multi-table inserts. Missing tables fail with the same driver
//! code as a real server.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use taostd::{BindValue, Connector, QueryResult, Session, TaosConfig, TaosDatabase, TaosError, Value};

/// Driver code TDengine 3.x reports for "Table does not exist".
pub const TABLE_NOT_EXIST: i32 = 0x2662;
/// Driver code for a generic syntax error.
pub const SYNTAX_ERROR: i32 = 0x2600;

/// Test configuration loaded from environment.
pub struct TestConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl TestConfig {
    /// Loads test configuration from environment variables.
    ///
    /// Falls back to defaults if variables are not set.
    pub fn from_env() -> Self {
        // Try to load .env file first
        let _ = dotenvy::dotenv();

        Self {
            host: std::env::var("TAOS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("TAOS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(6030),
            user: std::env::var("TAOS_USER").unwrap_or_else(|_| "root".to_string()),
            password: std::env::var("TAOS_PASSWORD").unwrap_or_else(|_| "taosdata".to_string()),
            database: std::env::var("TAOS_DATABASE").unwrap_or_else(|_| "taostd_test".to_string()),
        }
    }

    pub fn taos_config(&self) -> TaosConfig {
        TaosConfig::new(self.database.clone())
            .with_uri(format!("taos://{}:{}", self.host, self.port))
            .with_credentials(self.user.clone(), self.password.clone())
    }
}

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
struct FakeField {
    name: String,
    ty: String,
    length: i32,
    tag: bool,
}

#[derive(Debug, Default, Clone)]
pub struct FakeTable {
    pub stable: Option<String>,
    /// Raw `TAGS(...)` contents the table was created with.
    pub tags: Option<String>,
    pub bound: Vec<Vec<BindValue>>,
    pub literal: Vec<Vec<String>>,
}

impl FakeTable {
    pub fn row_count(&self) -> usize {
        self.bound.len() + self.literal.len()
    }
}

#[derive(Debug, Default)]
struct State {
    database: String,
    stables: BTreeMap<String, Vec<FakeField>>,
    tables: BTreeMap<String, FakeTable>,
    creations: usize,
    connects: usize,
    log: Vec<String>,
    /// Drops the table once this many more prepared inserts into it succeed.
    drop_after: Option<(String, usize)>,
    /// Child table another client creates right before our next prepared
    /// insert into it: (table, stable, tags).
    race: Option<(String, String, String)>,
    /// Reject `USING` on any existing table, as older servers did.
    strict_using: bool,
}

/// Shared in-memory database; clones see the same state.
#[derive(Debug, Clone)]
pub struct FakeTaos {
    state: Arc<Mutex<State>>,
}

impl FakeTaos {
    pub fn new(database: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                database: database.to_string(),
                ..Default::default()
            })),
        }
    }

    /// `power.meters (ts, current, voltage, phase) TAGS (location, groupid)`
    /// with child tables `d1001` and `d1002`, plus a normal table `notes`.
    pub fn meters() -> Self {
        let fake = Self::new("power");
        fake.add_stable(
            "meters",
            &[
                ("ts", "TIMESTAMP", 8, false),
                ("current", "FLOAT", 4, false),
                ("voltage", "INT", 4, false),
                ("phase", "FLOAT", 4, false),
                ("location", "NCHAR", 64, true),
                ("groupid", "INT", 4, true),
            ],
        );
        fake.add_stable(
            "weather",
            &[
                ("ts", "TIMESTAMP", 8, false),
                ("temperature", "DOUBLE", 8, false),
                ("city", "VARCHAR", 32, true),
            ],
        );
        fake.add_child("d1001", "meters", "'California.SanFrancisco',2");
        fake.add_child("d1002", "meters", "'California.LosAngeles',3");
        fake.add_normal("notes");
        fake
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_stable(&self, name: &str, fields: &[(&str, &str, i32, bool)]) {
        let fields = fields
            .iter()
            .map(|(name, ty, length, tag)| FakeField {
                name: name.to_string(),
                ty: ty.to_string(),
                length: *length,
                tag: *tag,
            })
            .collect();
        self.state().stables.insert(name.to_string(), fields);
    }

    pub fn add_child(&self, table: &str, stable: &str, tags: &str) {
        self.state().tables.insert(
            table.to_string(),
            FakeTable {
                stable: Some(stable.to_string()),
                tags: Some(tags.to_string()),
                ..Default::default()
            },
        );
    }

    pub fn add_normal(&self, table: &str) {
        self.state().tables.insert(table.to_string(), FakeTable::default());
    }

    /// Drops `table` behind the client's back.
    pub fn drop_externally(&self, table: &str) {
        self.state().tables.remove(table);
    }

    /// Drops `table` behind the client's back right after the next `inserts`
    /// prepared inserts into it have succeeded.
    pub fn drop_after_inserts(&self, table: &str, inserts: usize) {
        self.state().drop_after = Some((table.to_string(), inserts));
    }

    /// Has another client create `table` under `stable` just before the next
    /// prepared insert into it, after the client has resolved it as missing.
    pub fn create_concurrently(&self, table: &str, stable: &str, tags: &str) {
        self.state().race = Some((table.to_string(), stable.to_string(), tags.to_string()));
    }

    /// Makes `USING` fail with "table already exists" whenever the table
    /// exists, whatever its supertable.
    pub fn strict_using(&self) {
        self.state().strict_using = true;
    }

    pub fn table(&self, table: &str) -> Option<FakeTable> {
        self.state().tables.get(table).cloned()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state().tables.contains_key(table)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.table(table).map_or(0, |t| t.row_count())
    }

    /// Number of tables created through `USING ... TAGS`.
    pub fn creations(&self) -> usize {
        self.state().creations
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    /// Every statement received, in order.
    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    pub fn count_statements(&self, prefix: &str) -> usize {
        self.state().log.iter().filter(|s| s.starts_with(prefix)).count()
    }

    /// Opens a database handle on this fake.
    pub fn open(&self, config: TaosConfig) -> TaosDatabase {
        TaosDatabase::connect_with(config, Arc::new(self.clone())).unwrap()
    }

    pub fn open_default(&self) -> TaosDatabase {
        let database = self.state().database.clone();
        self.open(TaosConfig::new(database))
    }
}

#[async_trait]
impl Connector for FakeTaos {
    async fn connect(&self) -> taostd::Result<Box<dyn Session>> {
        self.state().connects += 1;
        Ok(Box::new(FakeSession { fake: self.clone() }))
    }
}

/// One session on a [`FakeTaos`].
pub struct FakeSession {
    fake: FakeTaos,
}

fn table_missing() -> TaosError {
    TaosError::driver(TABLE_NOT_EXIST, "Table does not exist")
}

fn syntax(sql: &str) -> TaosError {
    TaosError::driver(SYNTAX_ERROR, format!("syntax error near '{}'", sql))
}

/// Returns the quoted literal following `key = ` in `sql`.
fn filter_value(sql: &str, key: &str) -> Option<String> {
    let start = sql.find(&format!("{} = '", key))? + key.len() + 4;
    let end = sql[start..].find('\'')? + start;
    Some(sql[start..end].to_string())
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

impl Session for FakeSession {
    fn query(&self, sql: &str) -> taostd::Result<QueryResult> {
        let mut state = self.fake.state();
        state.log.push(sql.to_string());

        if sql.contains("information_schema.ins_stables") {
            if filter_value(sql, "db_name").as_deref() != Some(state.database.as_str()) {
                return Ok(QueryResult::new(vec!["stable_name".into()], vec![]));
            }
            let wanted = filter_value(sql, "stable_name");
            let rows = state
                .stables
                .keys()
                .filter(|name| wanted.as_ref().is_none_or(|w| w == *name))
                .map(|name| vec![text(name)])
                .collect();
            return Ok(QueryResult::new(vec!["stable_name".into()], rows));
        }

        if sql.contains("information_schema.ins_tables") {
            let fields = vec!["table_name".into(), "stable_name".into()];
            if filter_value(sql, "db_name").as_deref() != Some(state.database.as_str()) {
                return Ok(QueryResult::new(fields, vec![]));
            }
            let wanted = filter_value(sql, "table_name");
            let rows = state
                .tables
                .iter()
                .filter(|(name, _)| wanted.as_ref().is_none_or(|w| w == *name))
                .map(|(name, table)| {
                    let stable = table.stable.as_deref().map_or(Value::Null, text);
                    vec![text(name), stable]
                })
                .collect();
            return Ok(QueryResult::new(fields, rows));
        }

        if let Some(stable) = sql.strip_prefix("DESCRIBE ") {
            let fields = state.stables.get(stable.trim()).ok_or_else(table_missing)?;
            let rows = fields
                .iter()
                .map(|f| {
                    vec![
                        text(&f.name),
                        text(&f.ty),
                        Value::Int(f.length),
                        text(if f.tag { "TAG" } else { "" }),
                    ]
                })
                .collect();
            return Ok(QueryResult::new(
                vec!["field".into(), "type".into(), "length".into(), "note".into()],
                rows,
            ));
        }

        if let Some(table) = sql.strip_prefix("SELECT COUNT(*) FROM ") {
            let table = state.tables.get(table.trim()).ok_or_else(table_missing)?;
            return Ok(QueryResult::new(
                vec!["count(*)".into()],
                vec![vec![Value::BigInt(table.row_count() as i64)]],
            ));
        }

        Err(syntax(sql))
    }

    fn exec(&self, sql: &str) -> taostd::Result<usize> {
        let mut state = self.fake.state();
        state.log.push(sql.to_string());

        if let Some(table) = sql.strip_prefix("DROP TABLE IF EXISTS ") {
            state.tables.remove(table.trim());
            return Ok(0);
        }
        if sql.starts_with("CREATE ") {
            return Ok(0);
        }
        if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
            let clauses = parse_clauses(rest).ok_or_else(|| syntax(sql))?;
            // Statement is atomic: check every target before writing
            for clause in &clauses {
                if clause.using.is_none() && !state.tables.contains_key(&clause.table) {
                    return Err(table_missing());
                }
                let stable = clause
                    .using
                    .as_ref()
                    .map(|(stable, _)| stable.clone())
                    .or_else(|| state.tables.get(&clause.table).and_then(|t| t.stable.clone()));
                let columns = stable
                    .and_then(|s| state.stables.get(&s))
                    .map(|fields| fields.iter().filter(|f| !f.tag).count());
                if columns.is_some_and(|n| n != clause.values.len()) {
                    return Err(syntax(sql));
                }
            }
            for clause in &clauses {
                if let Some((stable, tags)) = &clause.using {
                    create_table(&mut state, &clause.table, stable, tags)?;
                }
                if let Some(table) = state.tables.get_mut(&clause.table) {
                    table.literal.push(clause.values.clone());
                }
            }
            return Ok(clauses.len());
        }
        Err(syntax(sql))
    }

    fn exec_prepared(&self, sql: &str, rows: &[Vec<BindValue>]) -> taostd::Result<usize> {
        let mut state = self.fake.state();
        state.log.push(sql.to_string());

        let rest = sql.strip_prefix("INSERT INTO ").ok_or_else(|| syntax(sql))?;
        let clauses = parse_clauses(rest).ok_or_else(|| syntax(sql))?;
        let [clause] = clauses.as_slice() else {
            return Err(syntax(sql));
        };

        if let Some((table, stable, tags)) = state.race.clone()
            && table == clause.table
        {
            state.race = None;
            state.tables.insert(
                table,
                FakeTable {
                    stable: Some(stable),
                    tags: Some(tags),
                    ..Default::default()
                },
            );
        }

        match &clause.using {
            Some((stable, tags)) => create_table(&mut state, &clause.table, stable, tags)?,
            None if !state.tables.contains_key(&clause.table) => return Err(table_missing()),
            None => {}
        }

        let stable = state.tables[&clause.table].stable.clone();
        if let Some(fields) = stable.as_ref().and_then(|s| state.stables.get(s)) {
            let columns = fields.iter().filter(|f| !f.tag).count();
            if clause.values.len() != columns || rows.iter().any(|r| r.len() != columns) {
                return Err(syntax(sql));
            }
        }

        if let Some(table) = state.tables.get_mut(&clause.table) {
            table.bound.extend(rows.iter().cloned());
        }

        if let Some((table, remaining)) = state.drop_after.clone()
            && table == clause.table
        {
            if remaining <= 1 {
                state.drop_after = None;
                state.tables.remove(&table);
            } else {
                state.drop_after = Some((table, remaining - 1));
            }
        }
        Ok(rows.len())
    }
}

fn create_table(state: &mut State, table: &str, stable: &str, tags: &str) -> taostd::Result<()> {
    if !state.stables.contains_key(stable) {
        return Err(TaosError::driver(0x0362, "STable not exist"));
    }
    if let Some(existing) = state.tables.get(table) {
        // USING on an existing table only writes rows
        if state.strict_using || existing.stable.as_deref() != Some(stable) {
            return Err(TaosError::driver(0x2602, "Table already exists in other stables"));
        }
        return Ok(());
    }
    state.creations += 1;
    state.tables.insert(
        table.to_string(),
        FakeTable {
            stable: Some(stable.to_string()),
            tags: Some(tags.to_string()),
            ..Default::default()
        },
    );
    Ok(())
}

/// One `<table> [USING <stable> TAGS(...)] VALUES (...)` clause.
#[derive(Debug)]
struct Clause {
    table: String,
    using: Option<(String, String)>,
    values: Vec<String>,
}

fn parse_clauses(mut rest: &str) -> Option<Vec<Clause>> {
    let mut clauses = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Some(clauses);
        }
        let (table, after) = word(rest)?;
        rest = after.trim_start();

        let mut using = None;
        if let Some(after) = rest.strip_prefix("USING ") {
            let (stable, after) = word(after.trim_start())?;
            let after = after.trim_start().strip_prefix("TAGS")?;
            let (tags, after) = group(after.trim_start())?;
            using = Some((stable.to_string(), tags.to_string()));
            rest = after.trim_start();
        }

        let after = rest.strip_prefix("VALUES")?;
        let (values, after) = group(after.trim_start())?;
        clauses.push(Clause {
            table: table.to_string(),
            using,
            values: split_values(values),
        });
        rest = after;
    }
}

fn word(s: &str) -> Option<(&str, &str)> {
    let end = s.find(|c: char| c.is_whitespace() || c == '(').unwrap_or(s.len());
    (end > 0).then(|| (&s[..end], &s[end..]))
}

/// Splits `(...)` off the front of `s`, honouring quoted literals.
fn group(s: &str) -> Option<(&str, &str)> {
    let body = s.strip_prefix('(')?;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '\'' => quoted = !quoted,
            ')' if !quoted => return Some((&body[..i], &body[i + 1..])),
            _ => {}
        }
    }
    None
}

fn split_values(s: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in s.chars() {
        match c {
            _ if escaped => {
                escaped = false;
                current.push(c);
            }
            '\\' if quoted => {
                escaped = true;
                current.push(c);
            }
            '\'' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => values.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    if !s.trim().is_empty() {
        values.push(current.trim().to_string());
    }
    values
}
