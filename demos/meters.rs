//! Walkthrough of the taostd API against a local TDengine.
//!
//! Create the database first: `CREATE DATABASE IF NOT EXISTS test;`
//! (or point `TAOS_DATABASE` and the other `TAOS_*` variables elsewhere).
//!
//! ```bash
//! RUST_LOG=taostd=debug cargo run --example meters
//! ```

use anyhow::Result;
use chrono::{Duration, Local};
use taostd::{Row, TaosConfig, TaosDatabase};
use tracing_subscriber::EnvFilter;

fn reading(ts: impl Into<taostd::Value>, phase: i32) -> Row {
    Row::new()
        .with("ts", ts)
        .with("current", 0.355)
        .with("voltage", 0.5542)
        .with("phase", phase)
}

fn count(db: &TaosDatabase, table: &str) -> Result<i64> {
    let value = db.get(&format!("SELECT COUNT(*) FROM {}", table))?;
    Ok(value.and_then(|v| v.as_i64()).unwrap_or(0))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load TAOS_* variables from .env file if present
    dotenvy::dotenv().ok();
    let config = if std::env::var("TAOS_DATABASE").is_ok() {
        TaosConfig::from_env()?
    } else {
        TaosConfig::new("test").with_pool_size(2).with_tz_offset(8)
    };
    let db = TaosDatabase::open(config)?;
    let now = Local::now().naive_local();

    db.execute(
        "CREATE STABLE IF NOT EXISTS meters (ts TIMESTAMP, current FLOAT, voltage FLOAT, phase INT) \
         TAGS (location NCHAR(20), groupid TINYINT)",
    )?;
    db.refresh_cache()?;

    // The table does not exist yet: tags are required
    let first = reading(now - Duration::hours(1), 0)
        .with("location", "Beijing")
        .with("groupid", 0);
    db.insert_one_with_stable("meter_01", "meters", &first)?;
    assert_eq!(count(&db, "meter_01")?, 1);

    // Known table: neither stable nor tags needed
    db.insert_one("meter_01", &reading(now - Duration::minutes(10), 1))?;
    assert_eq!(count(&db, "meter_01")?, 2);

    let batch = vec![
        reading(now - Duration::minutes(1), 2),
        reading(now + Duration::hours(1), 3),
    ];
    db.insert_many("meter_01", &batch, None)?;
    assert_eq!(count(&db, "meter_01")?, 4);

    let batch = vec![
        reading("2021-11-19 15:30:44.123445", 0)
            .with("location", "Shanghai")
            .with("groupid", 1),
        reading(now - Duration::hours(1), 1)
            .with("location", "Shanghai")
            .with("groupid", 1),
    ];
    db.insert_many_with_stable("meter_02", "meters", &batch, None)?;
    assert_eq!(count(&db, "meter_02")?, 2);

    // Existing tables need no stable, new ones do
    let mixed = vec![
        reading("2021-11-19 17:30:43.1234", 4).with("table", "meter_01"),
        reading("2021-11-19 17:30:43.1234", 2).with("table", "meter_02"),
        reading(now, 0)
            .with("table", "meter_03")
            .with("stable", "meters")
            .with("location", "Tianjin")
            .with("groupid", 2),
    ];
    let report = db.insert_many_tables(&mixed, None)?;
    println!("{}", report);
    assert_eq!(count(&db, "meter_01")?, 5);
    assert_eq!(count(&db, "meter_02")?, 3);
    assert_eq!(count(&db, "meter_03")?, 1);

    if let Some(row) = db.select_one("SELECT LAST_ROW(*) FROM meters")? {
        println!("last_row: {:?}", row);
    }
    println!("--------------------------------------------------");
    for row in db.select("SELECT * FROM meters LIMIT 5")? {
        let line: Vec<String> = row.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("{}", line.join(" "));
    }

    // One session for the whole cleanup
    db.with_connection(|_| {
        for table in ["meter_01", "meter_02", "meter_03"] {
            db.drop_table(table)?;
        }
        db.execute("DROP STABLE IF EXISTS meters")?;
        Ok(())
    })?;

    db.close();
    Ok(())
}
