use crate::chat::{ChartInfo, ChatMessage, Record, Role};
use crate::session::SessionState;
use crate::surface::ChatSurface;
use crate::tabular::TableData;
use crate::visualization::{build_chart, validate_chart_inputs};
use serde_json::json;

/// Replay the whole chat history onto a surface. Called on every interface
/// refresh; chart directives are re-validated and rebuilt each time so a
/// stale directive degrades to a warning instead of wedging the replay.
pub fn render_history(state: &SessionState, surface: &mut dyn ChatSurface) {
    render_messages(
        &state.chat_history,
        state.is_processing,
        state.debug_mode,
        surface,
    );
}

/// Same as `render_history` for hosts that mirror the session fields
/// across a thread boundary instead of sharing the state object.
pub fn render_messages(
    history: &[ChatMessage],
    is_processing: bool,
    debug: bool,
    surface: &mut dyn ChatSurface,
) {
    for message in history {
        surface.show_markdown(message.role, &message.text);

        // While a turn is in flight, skip chart work for historical
        // messages; the full replay after the turn picks them back up.
        if is_processing || message.role != Role::Assistant {
            continue;
        }
        if let Some((records, info)) = message.chart_directive() {
            render_chart_directive(records, info, debug, surface);
        }
    }
}

/// Rebuild and display one stored chart directive. Validation failure is a
/// warning; build/display failure is an inline error. Nothing escapes.
pub(crate) fn render_chart_directive(
    records: &[Record],
    info: &ChartInfo,
    debug: bool,
    surface: &mut dyn ChatSurface,
) {
    let data = TableData::from_records(records);
    if debug {
        surface.show_debug("chart data", &json!({ "columns": data.columns, "rows": records }));
        surface.show_debug("chart info", &json!(info));
    }

    let validation = validate_chart_inputs(&data, &info.x_column, &info.y_columns);
    if !validation.is_valid {
        surface.show_warning(
            validation
                .error
                .as_deref()
                .unwrap_or("Chart inputs are no longer valid"),
        );
        return;
    }

    let shown = build_chart(
        &data,
        &info.x_column,
        &validation.valid_y_columns,
        &info.chart_type,
    )
    .map_err(anyhow::Error::from)
    .and_then(|plot| surface.show_chart(&plot));

    if let Err(e) = shown {
        surface.show_error(&format!("Error displaying visualization: {e}"));
        if debug {
            surface.show_debug(
                "visualization error",
                &json!({ "error": format!("{e:?}"), "chart_info": info }),
            );
        }
    }
}
