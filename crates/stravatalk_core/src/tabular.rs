use crate::chat::Record;
use chrono::NaiveDate;
use serde_json::Value;

/// A query result: ordered named columns plus rows of JSON scalars.
/// This is the in-memory form; chart data persisted into chat history is
/// the record-sequence form produced by `to_records`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableData {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Convert to the plain record sequence stored in chat history.
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Record::new();
                for (col, value) in self.columns.iter().zip(row.iter()) {
                    record.insert(col.clone(), value.clone());
                }
                record
            })
            .collect()
    }

    /// Rebuild a table from stored records. Column order follows the first
    /// record; rows missing a column are filled with null.
    pub fn from_records(records: &[Record]) -> Self {
        let columns: Vec<String> = records
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|col| record.get(col).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Up to `limit` rows as records, for response-agent context.
    pub fn sample_records(&self, limit: usize) -> Vec<Record> {
        let mut sample = self.clone();
        sample.rows.truncate(limit);
        sample.to_records()
    }
}

/// Whether a column name suggests date/time content.
pub fn looks_temporal(column: &str) -> bool {
    let lower = column.to_ascii_lowercase();
    lower.contains("date") || lower.contains("time")
}

/// Result of a best-effort temporal coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionOutcome {
    /// Every non-null value parsed; the column was rewritten to RFC 3339.
    Coerced,
    /// At least one value did not parse; the column was left untouched.
    Unchanged,
}

/// Try to coerce a column's values to a temporal type, normalizing them to
/// RFC 3339 strings (still plain JSON, so history stays serializable). Any
/// value that fails to parse leaves the whole column as-is; this is a
/// convenience for axis rendering, never an error path.
pub fn coerce_temporal_column(data: &mut TableData, column: &str) -> CoercionOutcome {
    let Some(idx) = data.column_index(column) else {
        return CoercionOutcome::Unchanged;
    };

    let mut coerced: Vec<Option<String>> = Vec::with_capacity(data.rows.len());
    for row in &data.rows {
        match row.get(idx) {
            Some(Value::Null) | None => coerced.push(None),
            Some(Value::String(s)) => match parse_temporal(s) {
                Some(ts) => coerced.push(Some(ts)),
                None => return CoercionOutcome::Unchanged,
            },
            // Numbers, bools, nested values: not a date column.
            Some(_) => return CoercionOutcome::Unchanged,
        }
    }

    for (row, value) in data.rows.iter_mut().zip(coerced) {
        if let Some(ts) = value {
            row[idx] = Value::String(ts);
        }
    }
    CoercionOutcome::Coerced
}

/// Parse the date formats Strava data actually contains.
pub fn parse_temporal(s: &str) -> Option<String> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.to_rfc3339());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().to_rfc3339());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().to_rfc3339());
    }
    None
}

/// Seconds since the epoch for a parseable temporal string, for hosts that
/// plot dates on a numeric axis.
pub fn temporal_to_epoch_seconds(s: &str) -> Option<f64> {
    let normalized = parse_temporal(s)?;
    let dt = chrono::DateTime::parse_from_rfc3339(&normalized).ok()?;
    Some(dt.timestamp() as f64)
}

/// Format a minutes value as H:MM:SS (or M:SS under an hour), the way
/// moving-time and pace figures are shown to athletes.
pub fn format_time_value(minutes: f64) -> String {
    let total_seconds = (minutes * 60.0).round() as i64;
    let hours = total_seconds / 3600;
    let mins = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> TableData {
        TableData::new(
            vec!["start_date".into(), "distance_km".into()],
            vec![
                vec![json!("2024-05-01"), json!(10.2)],
                vec![json!("2024-05-08"), json!(12.0)],
            ],
        )
    }

    #[test]
    fn records_round_trip_losslessly() {
        let t = table();
        let rebuilt = TableData::from_records(&t.to_records());
        assert_eq!(t, rebuilt);
    }

    #[test]
    fn coercion_rewrites_parseable_dates() {
        let mut t = table();
        assert_eq!(
            coerce_temporal_column(&mut t, "start_date"),
            CoercionOutcome::Coerced
        );
        assert_eq!(t.rows[0][0], json!("2024-05-01T00:00:00+00:00"));
    }

    #[test]
    fn coercion_keeps_original_values_on_failure() {
        let mut t = table();
        t.rows[1][0] = json!("last tuesday");
        assert_eq!(
            coerce_temporal_column(&mut t, "start_date"),
            CoercionOutcome::Unchanged
        );
        // Nothing was rewritten, not even the parseable first row.
        assert_eq!(t.rows[0][0], json!("2024-05-01"));
    }

    #[test]
    fn time_formatting() {
        assert_eq!(format_time_value(83.75), "1:23:45");
        assert_eq!(format_time_value(8.5), "8:30");
    }
}
