mod common;

use common::{assert_chart_invariant, seeded_store, session_with_script, RecordingSurface};
use serde_json::json;
use stravatalk_core::chat::Role;
use stravatalk_core::controller::handle_query;
use stravatalk_core::render::render_history;
use stravatalk_core::store::ActivityStore;
use stravatalk_core::strava::Activity;
use stravatalk_core::tabular::parse_temporal;

fn conversational_script() -> Vec<serde_json::Value> {
    vec![
        json!({"query_type": "conversational", "confidence": 0.95, "reasoning": "greeting"}),
        json!({"response": "Hello! Ask me about your activities."}),
    ]
}

fn viz_script() -> Vec<serde_json::Value> {
    vec![
        json!({"query_type": "viz", "confidence": 0.9, "reasoning": "asks for a trend"}),
        json!({
            "sql_query": "SELECT start_date, distance / 1000 AS distance_km FROM activities ORDER BY start_date",
            "explanation": "distance per activity over time",
            "confidence": 0.9,
            "warnings": [],
            "chart": {"x_column": "start_date", "y_columns": ["distance_km"], "chart_type": "line"}
        }),
        json!({"response": "Here is your running distance over time."}),
    ]
}

#[tokio::test]
async fn conversational_turn_produces_text_only() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(conversational_script());
    let mut surface = RecordingSurface::default();

    handle_query(&mut state, &store, &mut surface, "hello there").await;

    assert_eq!(state.chat_history.len(), 3); // welcome + user + assistant
    let answer = state.chat_history.last().unwrap();
    assert_eq!(answer.text, "Hello! Ask me about your activities.");
    assert!(answer.sql_query.is_none());
    assert!(answer.chart_directive().is_none());
    assert!(surface.sql.is_empty(), "no SQL shown for conversational turns");
    assert!(surface.status.iter().any(|s| s.contains("conversational")));
    assert!(!state.is_processing);
    assert_chart_invariant(&state);

    // The pipeline records both turns in shared memory (after the welcome).
    assert_eq!(state.shared_memory.len(), 3);
}

#[tokio::test]
async fn viz_turn_persists_a_validated_chart_directive() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(viz_script());
    let mut surface = RecordingSurface::default();

    handle_query(&mut state, &store, &mut surface, "show my runs over time").await;

    let answer = state.chat_history.last().unwrap();
    let (records, info) = answer.chart_directive().expect("chart directive persisted");
    assert_eq!(info.x_column, "start_date");
    assert_eq!(info.y_columns, vec!["distance_km".to_string()]);
    assert_eq!(info.chart_type, "line");
    assert_eq!(records.len(), 3);

    // Dates were coerced to a temporal form before persisting.
    let date = records[0]["start_date"].as_str().unwrap();
    assert!(parse_temporal(date).is_some());
    assert!(date.contains('T'), "stored as RFC 3339, got {date}");

    assert_eq!(surface.charts.len(), 1, "new chart rendered immediately");
    assert!(surface.sql.iter().any(|s| s.contains("distance_km")));
    assert!(surface.status.iter().any(|s| s.contains("Query returned 3 rows")));
    assert!(!state.is_processing);
    assert_chart_invariant(&state);
}

#[tokio::test]
async fn unparseable_dates_fall_back_to_raw_values() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ActivityStore::new(dir.path().join("strava.duckdb")).unwrap();
    store
        .upsert_activities(&[Activity {
            id: 1,
            name: "Mystery Run".into(),
            distance: 5000.0,
            moving_time: 1500,
            elapsed_time: 1500,
            total_elevation_gain: 10.0,
            kind: "Run".into(),
            start_date: "sometime in May".into(),
        }])
        .unwrap();
    let mut state = session_with_script(viz_script());
    let mut surface = RecordingSurface::default();

    handle_query(&mut state, &store, &mut surface, "show my runs over time").await;

    // Coercion failure is silent: the directive is still attached with the
    // original values, and the chart still renders (nominal x axis).
    let (records, _) = state
        .chat_history
        .last()
        .unwrap()
        .chart_directive()
        .expect("directive survives coercion failure");
    assert_eq!(records[0]["start_date"], json!("sometime in May"));
    assert_eq!(surface.charts.len(), 1);
    assert!(surface.errors.is_empty());
    assert!(!state.is_processing);
}

#[tokio::test]
async fn invalid_y_columns_degrade_to_a_warning() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(vec![
        json!({"query_type": "viz", "confidence": 0.9, "reasoning": "asks for a trend"}),
        json!({
            "sql_query": "SELECT start_date, distance / 1000 AS distance_km FROM activities ORDER BY start_date",
            "explanation": "distance per activity",
            "confidence": 0.9,
            "chart": {"x_column": "start_date", "y_columns": ["speed"], "chart_type": "line"}
        }),
        json!({"response": "Here is your data."}),
    ]);
    let mut surface = RecordingSurface::default();

    handle_query(&mut state, &store, &mut surface, "plot my speed").await;

    let answer = state.chat_history.last().unwrap();
    assert!(answer.chart_directive().is_none(), "invalid chart state is never persisted");
    assert_eq!(answer.text, "Here is your data.");
    assert!(surface.warnings.iter().any(|w| w.contains("Y-axis")));
    assert!(surface.charts.is_empty());
    assert!(!state.is_processing);
    assert_chart_invariant(&state);
}

#[tokio::test]
async fn sql_execution_failure_is_a_soft_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(vec![
        json!({"query_type": "sql", "confidence": 0.8, "reasoning": "count question"}),
        json!({
            "sql_query": "SELECT nope FROM missing_table",
            "explanation": "bad",
            "confidence": 0.2
        }),
        json!({"response": "I couldn't run that query against your data."}),
    ]);
    let mut surface = RecordingSurface::default();

    handle_query(&mut state, &store, &mut surface, "how many runs?").await;

    let answer = state.chat_history.last().unwrap();
    assert_eq!(answer.text, "I couldn't run that query against your data.");
    assert_eq!(answer.sql_query.as_deref(), Some("SELECT nope FROM missing_table"));
    assert!(answer.chart_directive().is_none());
    assert!(surface.status.iter().any(|s| s.contains("Error executing query")));
    assert!(!state.is_processing);
    assert_chart_invariant(&state);
}

#[tokio::test]
async fn pipeline_failure_becomes_a_visible_error_message() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    // The classification agent returns an unusable shape.
    let mut state = session_with_script(vec![json!({"classification": 42})]);
    let mut surface = RecordingSurface::default();

    handle_query(&mut state, &store, &mut surface, "hello").await;

    assert_eq!(state.chat_history.len(), 3);
    let answer = state.chat_history.last().unwrap();
    assert_eq!(answer.role, Role::Assistant);
    assert!(answer.text.starts_with("Error:"));
    assert!(!surface.errors.is_empty());
    assert!(!state.is_processing, "cleanup holds on the failure path");
    assert_chart_invariant(&state);
}

#[tokio::test]
async fn chart_display_failure_does_not_roll_back_history() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(viz_script());
    let mut surface = RecordingSurface {
        fail_chart_display: true,
        ..Default::default()
    };

    handle_query(&mut state, &store, &mut surface, "show my runs over time").await;

    assert!(surface
        .errors
        .iter()
        .any(|e| e.contains("Error displaying visualization")));
    // The entry was appended before rendering and stays.
    assert!(state.chat_history.last().unwrap().chart_directive().is_some());
    assert!(!state.is_processing);
}

#[tokio::test]
async fn empty_input_is_ignored() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(vec![]);
    let mut surface = RecordingSurface::default();

    handle_query(&mut state, &store, &mut surface, "   ").await;

    assert_eq!(state.chat_history.len(), 1); // just the welcome message
    assert!(!state.is_processing);
    assert!(surface.status.is_empty());
}

#[tokio::test]
async fn replay_rebuilds_stored_charts() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(viz_script());
    let mut turn_surface = RecordingSurface::default();
    handle_query(&mut state, &store, &mut turn_surface, "show my runs over time").await;

    let mut replay = RecordingSurface::default();
    render_history(&state, &mut replay);

    assert_eq!(replay.markdown.len(), state.chat_history.len());
    assert_eq!(replay.charts.len(), 1, "directive re-validates and re-renders");
    assert!(replay.warnings.is_empty());
}

#[tokio::test]
async fn replay_skips_chart_work_while_processing() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(viz_script());
    let mut turn_surface = RecordingSurface::default();
    handle_query(&mut state, &store, &mut turn_surface, "show my runs over time").await;

    state.is_processing = true;
    let mut replay = RecordingSurface::default();
    render_history(&state, &mut replay);

    assert_eq!(replay.markdown.len(), state.chat_history.len());
    assert!(replay.charts.is_empty());
}

#[tokio::test]
async fn stale_directive_degrades_to_a_warning_on_replay() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(viz_script());
    let mut turn_surface = RecordingSurface::default();
    handle_query(&mut state, &store, &mut turn_surface, "show my runs over time").await;

    // A directive referencing a column that no longer matches the data,
    // as if the validator behavior changed between sessions.
    state
        .chat_history
        .last_mut()
        .unwrap()
        .chart_info
        .as_mut()
        .unwrap()
        .y_columns = vec!["renamed_metric".into()];

    let mut replay = RecordingSurface::default();
    render_history(&state, &mut replay);

    assert!(replay.charts.is_empty());
    assert!(replay.warnings.iter().any(|w| w.contains("renamed_metric")));
    assert!(replay.errors.is_empty(), "a stale chart is a warning, not an error");
}

#[tokio::test]
async fn debug_mode_surfaces_diagnostic_payloads() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut state = session_with_script(viz_script()).with_debug(true);
    let mut surface = RecordingSurface::default();

    handle_query(&mut state, &store, &mut surface, "show my runs over time").await;

    assert!(surface.debug.iter().any(|d| d.contains("result data")));
    assert!(surface.debug.iter().any(|d| d.contains("chart info")));
}
