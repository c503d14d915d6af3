use crate::strava::Activity;
use crate::tabular::TableData;
use anyhow::{Context, Result};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::{params, Connection};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Definition of a table exposed to the NL-to-SQL agent.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub description: Option<String>,
}

impl TableDefinition {
    /// Render the definition as a prompt block for SQL generation.
    pub fn describe(&self) -> String {
        let mut out = format!("Table {} — {}\n", self.name, self.description);
        for col in &self.columns {
            match &col.description {
                Some(desc) => {
                    let _ = writeln!(out, "  - {} {} — {}", col.name, col.data_type, desc);
                }
                None => {
                    let _ = writeln!(out, "  - {} {}", col.name, col.data_type);
                }
            }
        }
        out
    }
}

// DuckDB has no column comments, so the schema catalog the SQL agent sees
// carries these descriptions (units matter: the agent converts at SQL level).
fn table_description(table: &str) -> &'static str {
    match table {
        "activities" => {
            "A user's Strava activity records. Pace in minutes per mile can be derived as \
             (moving_time / 60) / (distance / 1609.34) AS pace_min_mi"
        }
        _ => "",
    }
}

fn column_description(table: &str, column: &str) -> Option<&'static str> {
    if table != "activities" {
        return None;
    }
    Some(match column {
        "id" => "unique identifier for each activity",
        "name" => "name of the activity",
        "distance" => "total distance covered in meters (convert to km with distance / 1000)",
        "moving_time" => "time spent moving in seconds (display in HH:MM:SS format)",
        "elapsed_time" => "total elapsed time in seconds (display in HH:MM:SS format)",
        "total_elevation_gain" => "total elevation gain in meters",
        "type" => "type of activity (e.g., Run, Ride, Swim)",
        "start_date" => "when the activity started",
        _ => return None,
    })
}

/// DuckDB-backed store for synced Strava activities.
///
/// Connections are opened per call against a database file, so one store
/// handle can be shared freely across a session.
pub struct ActivityStore {
    db_path: PathBuf,
}

impl ActivityStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path };
        store.initialize_db()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("Failed to open DuckDB connection")
    }

    fn initialize_db(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS activities (
                id BIGINT PRIMARY KEY,
                name TEXT,
                distance DOUBLE,
                moving_time BIGINT,
                elapsed_time BIGINT,
                total_elevation_gain DOUBLE,
                type TEXT,
                start_date TEXT
            )",
            [],
        )?;
        Ok(())
    }

    /// Extract table definitions (with the description catalog attached)
    /// from the live database schema.
    pub fn table_definitions(&self) -> Result<Vec<TableDefinition>> {
        let conn = self.connection()?;

        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = 'main' ORDER BY table_name",
        )?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut definitions = Vec::with_capacity(tables.len());
        for table in tables {
            let mut stmt = conn.prepare(
                "SELECT column_name, data_type FROM information_schema.columns
                 WHERE table_name = ? ORDER BY ordinal_position",
            )?;
            let columns = stmt
                .query_map([&table], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|(name, data_type)| ColumnDefinition {
                    description: column_description(&table, &name).map(String::from),
                    name,
                    data_type,
                })
                .collect();
            definitions.push(TableDefinition {
                description: table_description(&table).to_string(),
                name: table,
                columns,
            });
        }
        Ok(definitions)
    }

    /// Execute a SQL query and collect the full result set as JSON scalars.
    pub fn execute_query(&self, sql: &str) -> Result<TableData> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .with_context(|| "Failed to prepare SQL query")?;

        let mut columns: Vec<String> = Vec::new();
        let mut out_rows: Vec<Vec<Value>> = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if columns.is_empty() {
                let stmt_ref = row.as_ref();
                for i in 0..stmt_ref.column_count() {
                    columns.push(stmt_ref.column_name(i)?.to_string());
                }
            }
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(value_ref_to_json(row.get_ref(i)?));
            }
            out_rows.push(values);
        }
        if columns.is_empty() {
            // Empty result set: column names still come from the statement.
            for i in 0..stmt.column_count() {
                columns.push(stmt.column_name(i)?.to_string());
            }
        }

        Ok(TableData::new(columns, out_rows))
    }

    /// Upsert a batch of fetched activities.
    pub fn upsert_activities(&self, activities: &[Activity]) -> Result<usize> {
        let conn = self.connection()?;
        conn.execute("BEGIN TRANSACTION", [])?;
        for activity in activities {
            conn.execute(
                "INSERT OR REPLACE INTO activities
                 (id, name, distance, moving_time, elapsed_time, total_elevation_gain, type, start_date)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    activity.id,
                    activity.name,
                    activity.distance,
                    activity.moving_time,
                    activity.elapsed_time,
                    activity.total_elevation_gain,
                    activity.kind,
                    activity.start_date,
                ],
            )?;
        }
        conn.execute("COMMIT", [])?;
        Ok(activities.len())
    }

    /// Import activities from a CSV export with the same column layout.
    pub fn import_csv(&self, path: &Path) -> Result<usize> {
        let conn = self.connection()?;
        let before = self.activity_count()?;
        let query = format!(
            "INSERT OR REPLACE INTO activities
             SELECT id, name, distance, moving_time, elapsed_time, total_elevation_gain, type, start_date
             FROM read_csv_auto('{}', header=true)",
            path.display()
        );
        conn.execute(&query, [])?;
        let after = self.activity_count()?;
        Ok((after - before).max(0) as usize)
    }

    pub fn activity_count(&self) -> Result<i64> {
        let conn = self.connection()?;
        let count = conn.query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Convert a DuckDB value to a plain JSON scalar. Dates and timestamps
/// become strings the chart layer can parse back to temporal values.
fn value_ref_to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => b.into(),
        ValueRef::TinyInt(x) => i64::from(x).into(),
        ValueRef::SmallInt(x) => i64::from(x).into(),
        ValueRef::Int(x) => i64::from(x).into(),
        ValueRef::BigInt(x) => x.into(),
        ValueRef::HugeInt(x) => match i64::try_from(x) {
            Ok(v) => v.into(),
            Err(_) => (x as f64).into(),
        },
        ValueRef::UTinyInt(x) => u64::from(x).into(),
        ValueRef::USmallInt(x) => u64::from(x).into(),
        ValueRef::UInt(x) => u64::from(x).into(),
        ValueRef::UBigInt(x) => x.into(),
        ValueRef::Float(x) => f64::from(x).into(),
        ValueRef::Double(x) => x.into(),
        ValueRef::Decimal(d) => {
            let text = d.to_string();
            match text.parse::<f64>() {
                Ok(f) => f.into(),
                Err(_) => Value::String(text),
            }
        }
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Date32(days) => {
            match chrono::DateTime::from_timestamp(i64::from(days) * 86_400, 0) {
                Some(dt) => Value::String(dt.date_naive().to_string()),
                None => Value::Null,
            }
        }
        ValueRef::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            match chrono::DateTime::from_timestamp_micros(micros) {
                Some(dt) => Value::String(dt.to_rfc3339()),
                None => Value::Null,
            }
        }
        other => Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded_store() -> (tempfile::TempDir, ActivityStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ActivityStore::new(dir.path().join("strava.duckdb")).unwrap();
        store
            .upsert_activities(&[
                Activity {
                    id: 1,
                    name: "Morning Run".into(),
                    distance: 5012.0,
                    moving_time: 1500,
                    elapsed_time: 1580,
                    total_elevation_gain: 42.0,
                    kind: "Run".into(),
                    start_date: "2024-05-01 06:30:00".into(),
                },
                Activity {
                    id: 2,
                    name: "Evening Ride".into(),
                    distance: 20345.0,
                    moving_time: 3600,
                    elapsed_time: 3710,
                    total_elevation_gain: 230.0,
                    kind: "Ride".into(),
                    start_date: "2024-05-02 18:00:00".into(),
                },
            ])
            .unwrap();
        (dir, store)
    }

    #[test]
    fn query_returns_named_columns_and_rows() {
        let (_dir, store) = seeded_store();
        let data = store
            .execute_query(
                "SELECT start_date, distance / 1000 AS distance_km FROM activities ORDER BY id",
            )
            .unwrap();
        assert_eq!(data.columns, vec!["start_date", "distance_km"]);
        assert_eq!(data.row_count(), 2);
        assert_eq!(data.rows[0][1], json!(5.012));
    }

    #[test]
    fn upsert_replaces_existing_rows() {
        let (_dir, store) = seeded_store();
        store
            .upsert_activities(&[Activity {
                id: 1,
                name: "Renamed Run".into(),
                distance: 5012.0,
                moving_time: 1500,
                elapsed_time: 1580,
                total_elevation_gain: 42.0,
                kind: "Run".into(),
                start_date: "2024-05-01 06:30:00".into(),
            }])
            .unwrap();
        assert_eq!(store.activity_count().unwrap(), 2);
        let data = store
            .execute_query("SELECT name FROM activities WHERE id = 1")
            .unwrap();
        assert_eq!(data.rows[0][0], json!("Renamed Run"));
    }

    #[test]
    fn table_definitions_carry_descriptions() {
        let (_dir, store) = seeded_store();
        let defs = store.table_definitions().unwrap();
        let activities = defs.iter().find(|d| d.name == "activities").unwrap();
        let distance = activities
            .columns
            .iter()
            .find(|c| c.name == "distance")
            .unwrap();
        assert!(distance.description.as_deref().unwrap().contains("meters"));
        assert!(activities.describe().contains("pace_min_mi"));
    }
}
