use crate::chat::{ChartInfo, ChatMessage, Role};
use crate::orchestrator::{process_query, PipelineResult};
use crate::render::render_chart_directive;
use crate::session::SessionState;
use crate::store::ActivityStore;
use crate::surface::ChatSurface;
use crate::tabular::{coerce_temporal_column, looks_temporal};
use crate::visualization::validate_chart_inputs;
use serde_json::json;
use tracing::error;

/// Run one user turn: append the user message, invoke the query pipeline,
/// interpret its result, persist the assistant message (with a chart
/// directive only when it validated), and render the new entry once.
///
/// Nothing escapes this boundary: every failure ends in a visible
/// assistant-role message, and `is_processing` is cleared on every exit
/// path. The pipeline call is the sole suspension point and has no
/// timeout; a hung pipeline blocks the turn.
pub async fn handle_query(
    state: &mut SessionState,
    store: &ActivityStore,
    surface: &mut dyn ChatSurface,
    user_query: &str,
) {
    let query = user_query.trim();
    if query.is_empty() {
        return;
    }

    state.is_processing = true;
    state.chat_history.push(ChatMessage::user(query));
    surface.show_markdown(Role::User, query);

    surface.status_begin("Processing your query...");
    let outcome = process_query(&state.agents, store, &mut state.shared_memory, query).await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "query pipeline failed");
            surface.status_end(false, "Error processing query");
            let text = format!("Error: {e:#}");
            state.chat_history.push(ChatMessage::assistant(&text));
            state.is_processing = false;
            surface.show_error(&text);
            if state.debug_mode {
                surface.show_debug("pipeline failure", &json!({ "error": format!("{e:?}") }));
            }
            return;
        }
    };

    report_status(&result, state.debug_mode, surface);

    let mut message =
        ChatMessage::assistant(&result.response_text).with_sql(result.sql_query.clone());

    if let (Some(info), Some(data)) = (&result.chart_info, &result.data) {
        if !data.is_empty() {
            let validation = validate_chart_inputs(data, &info.x_column, &info.y_columns);
            if validation.is_valid {
                let mut chart_table = data.clone();
                if looks_temporal(&info.x_column) {
                    // Best-effort convenience: values that fail to parse
                    // keep the column exactly as the query returned it.
                    let _ = coerce_temporal_column(&mut chart_table, &info.x_column);
                }
                message.attach_chart(
                    chart_table.to_records(),
                    ChartInfo {
                        x_column: info.x_column.clone(),
                        y_columns: validation.valid_y_columns,
                        chart_type: info.chart_type.clone(),
                    },
                );
            } else if let Some(error) = &validation.error {
                // Invalid directives are never persisted; the text answer stands.
                surface.show_warning(error);
            }
        }
    }

    state.chat_history.push(message.clone());
    state.is_processing = false;

    // Render the new entry immediately; the host's next refresh replays the
    // full history, so only this message is drawn here. A display failure
    // shows inline and does not roll back the appended entry.
    surface.show_markdown(Role::Assistant, &message.text);
    if let Some((records, info)) = message.chart_directive() {
        render_chart_directive(records, info, state.debug_mode, surface);
    }
}

/// Write the status-area diagnostics for a completed pipeline run. SQL and
/// row-count details only surface for query types that ran SQL.
fn report_status(result: &PipelineResult, debug: bool, surface: &mut dyn ChatSurface) {
    surface.status_note(&format!("Query type: {}", result.classification.query_type));

    if !result.classification.query_type.needs_sql() {
        surface.status_end(true, "Query processed");
        return;
    }

    if let Some(sql) = &result.sql_query {
        surface.status_note("SQL Query:");
        surface.show_sql(sql);
    }

    if result.success {
        if let Some(data) = &result.data {
            surface.status_note(&format!("Query returned {} rows", data.row_count()));
            if debug {
                surface.show_debug(
                    "result data",
                    &json!({ "columns": data.columns, "rows": data.sample_records(10) }),
                );
                if let Some(info) = &result.chart_info {
                    surface.show_debug("chart info", &json!(info));
                }
            }
        }
        surface.status_end(true, "Query processed successfully!");
    } else {
        surface.status_end(false, "Error executing query");
    }
}
