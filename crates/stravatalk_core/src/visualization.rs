use crate::tabular::{looks_temporal, parse_temporal, TableData};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VizError {
    #[error("unsupported chart type '{0}'")]
    UnsupportedChartType(String),
    #[error("x-axis column '{0}' not found in data")]
    MissingXColumn(String),
    #[error("y-axis column(s) not found in data: {0}")]
    MissingYColumns(String),
    #[error("cannot chart an empty result set")]
    EmptyData,
}

/// Outcome of chart-input validation. All failure is communicated through
/// `is_valid` and `error`; this function is the seam that protects the
/// renderer from malformed or stale chart directives.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartValidation {
    pub is_valid: bool,
    pub valid_y_columns: Vec<String>,
    pub error: Option<String>,
}

impl ChartValidation {
    fn invalid(message: String) -> Self {
        Self {
            is_valid: false,
            valid_y_columns: Vec::new(),
            error: Some(message),
        }
    }
}

/// Validate that `x_column` and at least one of `y_columns` exist in `data`.
/// Never fails with an error value; missing y-columns are filtered out in
/// input order and an empty remainder makes the whole request invalid.
pub fn validate_chart_inputs(data: &TableData, x_column: &str, y_columns: &[String]) -> ChartValidation {
    if data.is_empty() {
        return ChartValidation::invalid("No data available to chart".into());
    }
    if !data.has_column(x_column) {
        return ChartValidation::invalid(format!(
            "X-axis column '{}' not in data columns: {:?}",
            x_column, data.columns
        ));
    }

    let valid_y_columns: Vec<String> = y_columns
        .iter()
        .filter(|col| data.has_column(col))
        .cloned()
        .collect();
    if valid_y_columns.is_empty() {
        return ChartValidation::invalid(format!(
            "None of the Y-axis columns {:?} found in data columns: {:?}",
            y_columns, data.columns
        ));
    }

    ChartValidation {
        is_valid: true,
        valid_y_columns,
        error: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    VegaLite,
}

/// A built chart: a Vega-Lite spec with the data values embedded, so the
/// spec itself is self-contained plain JSON.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PlotSpec {
    pub kind: PlotKind,
    pub spec: Value,
}

/// Build a chart from tabular data and validated column selections.
///
/// Pure: the record values are embedded into the returned spec and no
/// reference to `data` is retained, so a chart can be rebuilt from stored
/// history records on every render.
pub fn build_chart(
    data: &TableData,
    x_column: &str,
    y_columns: &[String],
    chart_type: &str,
) -> Result<PlotSpec, VizError> {
    if data.is_empty() {
        return Err(VizError::EmptyData);
    }
    if !data.has_column(x_column) {
        return Err(VizError::MissingXColumn(x_column.to_string()));
    }
    let missing: Vec<&String> = y_columns.iter().filter(|c| !data.has_column(c)).collect();
    if !missing.is_empty() || y_columns.is_empty() {
        let joined = missing
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(VizError::MissingYColumns(joined));
    }

    let mark = match chart_type {
        "line" => json!({"type": "line", "point": true}),
        "area" => json!({"type": "area", "opacity": 0.7}),
        "bar" => json!({"type": "bar"}),
        "scatter" => json!({"type": "point", "filled": true}),
        other => return Err(VizError::UnsupportedChartType(other.to_string())),
    };

    let x_encoding = json!({
        "field": x_column,
        "type": infer_field_type(data, x_column),
        "title": axis_title(x_column),
    });

    let multi_series = matches!(chart_type, "line" | "area") && y_columns.len() > 1;
    let mut spec = json!({
        "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
        "title": format!("{} by {}", y_columns.join(", "), x_column),
        "data": {"values": data.to_records()},
        "mark": mark,
    });

    if multi_series {
        // Fold the selected series into metric/value pairs, the Vega-Lite
        // equivalent of melting the frame for a colored multi-line chart.
        spec["transform"] = json!([{"fold": y_columns, "as": ["metric", "value"]}]);
        spec["encoding"] = json!({
            "x": x_encoding,
            "y": {"field": "value", "type": "quantitative", "title": shared_y_title(y_columns)},
            "color": {"field": "metric", "type": "nominal"},
            "tooltip": [
                {"field": x_column},
                {"field": "metric"},
                {"field": "value"},
            ],
        });
    } else {
        // Bar and scatter charts plot a single series.
        let y = &y_columns[0];
        spec["encoding"] = json!({
            "x": x_encoding,
            "y": {"field": y, "type": "quantitative", "title": axis_title(y)},
            "tooltip": [{"field": x_column}, {"field": y}],
        });
    }

    Ok(PlotSpec {
        kind: PlotKind::VegaLite,
        spec,
    })
}

/// Vega-Lite field type for a column, from its name and a sample value.
fn infer_field_type(data: &TableData, column: &str) -> &'static str {
    let Some(idx) = data.column_index(column) else {
        return "nominal";
    };
    let sample = data
        .rows
        .iter()
        .filter_map(|row| row.get(idx))
        .find(|v| !v.is_null());
    match sample {
        Some(Value::Number(_)) => "quantitative",
        Some(Value::String(s)) if looks_temporal(column) && parse_temporal(s).is_some() => {
            "temporal"
        }
        Some(Value::String(s)) if parse_temporal(s).is_some() => "temporal",
        _ => "nominal",
    }
}

/// Axis titles carry units when the column name itself does not.
/// Unit conversions happen at the SQL level; this only labels them.
fn axis_title(column: &str) -> String {
    let lower = column.to_ascii_lowercase();
    if lower.contains("distance") && !lower.ends_with("_km") {
        format!("{column} (km)")
    } else if (lower.contains("moving") || lower.contains("elapsed"))
        && !lower.contains("_minutes")
    {
        format!("{column} (minutes)")
    } else {
        column.to_string()
    }
}

fn shared_y_title(y_columns: &[String]) -> String {
    if y_columns
        .iter()
        .all(|y| y.to_ascii_lowercase().contains("distance"))
    {
        "Distance (km)".into()
    } else if y_columns.iter().all(|y| {
        let l = y.to_ascii_lowercase();
        l.contains("time") || l.contains("elapsed") || l.contains("moving")
    }) {
        "Time".into()
    } else {
        "Value".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> TableData {
        TableData::new(
            vec!["start_date".into(), "distance_km".into(), "pace_min_mi".into()],
            vec![
                vec![json!("2024-05-01"), json!(10.2), json!(8.4)],
                vec![json!("2024-05-08"), json!(12.0), json!(8.1)],
            ],
        )
    }

    #[test]
    fn unknown_chart_type_is_rejected() {
        let t = table();
        let err = build_chart(&t, "start_date", &["distance_km".into()], "pie").unwrap_err();
        assert!(matches!(err, VizError::UnsupportedChartType(ref k) if k == "pie"));
    }

    #[test]
    fn temporal_x_axis_is_inferred_from_name_and_values() {
        let t = table();
        let plot = build_chart(&t, "start_date", &["distance_km".into()], "line").unwrap();
        assert_eq!(plot.spec["encoding"]["x"]["type"], json!("temporal"));
    }

    #[test]
    fn multiple_series_fold_into_metric_value() {
        let t = table();
        let plot = build_chart(
            &t,
            "start_date",
            &["distance_km".into(), "pace_min_mi".into()],
            "line",
        )
        .unwrap();
        assert_eq!(plot.spec["transform"][0]["fold"][1], json!("pace_min_mi"));
        assert_eq!(plot.spec["encoding"]["color"]["field"], json!("metric"));
    }
}
