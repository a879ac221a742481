//! taostd: a pooled, schema-aware TDengine client.
//!
//! This crate wraps the `taos` client with the pieces most time-series
//! writers end up building themselves: a fixed pool of sessions with
//! thread-scoped reuse, a cache of supertable schemas and child table
//! ownership, and INSERT synthesis that creates child tables on demand.
//!
//! # Features
//!
//! - Fixed-size session pool via `deadpool`, opened eagerly
//! - Re-entrant per-thread connection scopes
//! - Supertable descriptor and table ownership cache
//! - Prepared inserts with typed binding and timezone shifting
//! - Automatic `INSERT ... USING ... TAGS` when a child table is missing
//! - Chunked batch inserts with per-chunk failure reports
//!
//! # Quick Start
//!
//! ```ignore
//! use taostd::{Row, TaosConfig, TaosDatabase};
//!
//! let db = TaosDatabase::open(TaosConfig::new("power").with_pool_size(4))?;
//!
//! let rows: Vec<Row> = (0..1000)
//!     .map(|i| {
//!         Row::new()
//!             .with("ts", 1_637_314_243_000i64 + i)
//!             .with("current", 10.3)
//!             .with("voltage", 219)
//!             .with("location", "Beijing")
//!             .with("groupid", 2)
//!     })
//!     .collect();
//! let report = db.insert_many_with_stable("d1001", "meters", &rows, None)?;
//! println!("{}", report);
//!
//! let count = db.get("SELECT COUNT(*) FROM d1001")?;
//! ```
//!
//! # Sharing a session
//!
//! ```ignore
//! db.with_connection(|session| {
//!     session.exec("CREATE TABLE IF NOT EXISTS t (ts TIMESTAMP, v INT)")?;
//!     db.insert_one("d1001", &row)?; // same session
//!     Ok(())
//! })?;
//! ```
//!
//! # Module Structure
//!
//! - [`database`]: The public handle and its operations
//! - [`insert`]: Insert orchestration and batch reports
//! - [`pool`]: Session pooling
//! - [`context`]: Thread-scoped session reuse
//! - [`schema`] and [`cache`]: Schema metadata
//! - [`sql`] and [`bind`]: Statement synthesis and parameter binding
//! - [`driver`]: The connector/session seam
//! - [`connection`] and [`statement`]: The TDengine implementation of the seam
//! - [`config`]: Configuration
//! - [`error`]: Error types

pub mod bind;
pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
pub mod database;
pub mod driver;
pub mod error;
pub mod insert;
pub mod pool;
pub mod schema;
pub mod sql;
pub mod statement;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use bind::BindValue;
pub use cache::{CacheEntry, SchemaCache};
pub use config::TaosConfig;
pub use connection::{TaosConnector, TaosSession};
pub use context::ConnectionScope;
pub use database::TaosDatabase;
pub use driver::{Connector, QueryResult, Session};
pub use error::{Result, TaosError};
pub use insert::{ChunkFailure, InsertReport};
pub use pool::{PooledSession, TaosPool};
pub use schema::{FieldDescriptor, FieldRole, StableDescriptor};
pub use types::{FieldType, Row, Value};
pub use utils::Runtime;
