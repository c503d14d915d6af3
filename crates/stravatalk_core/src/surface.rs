use crate::chat::Role;
use crate::visualization::PlotSpec;
use anyhow::Result;
use serde_json::Value;

/// The seam between the session core and whatever is displaying the chat.
///
/// Hosts (terminal REPL, egui window) implement this; the turn controller
/// and history renderer only ever talk to the trait. Status methods default
/// to no-ops for surfaces without a status area.
pub trait ChatSurface {
    fn show_markdown(&mut self, role: Role, text: &str);

    fn show_warning(&mut self, text: &str);

    fn show_error(&mut self, text: &str);

    /// Display a built chart. Failures are reported back so the caller can
    /// degrade to an inline error instead of losing the turn.
    fn show_chart(&mut self, plot: &PlotSpec) -> Result<()>;

    /// Show the SQL behind an answer in the status area.
    fn show_sql(&mut self, sql: &str) {
        let _ = sql;
    }

    fn status_begin(&mut self, label: &str) {
        let _ = label;
    }

    fn status_note(&mut self, line: &str) {
        let _ = line;
    }

    fn status_end(&mut self, ok: bool, label: &str) {
        let _ = (ok, label);
    }

    /// Raw diagnostic payloads, only invoked in debug mode.
    fn show_debug(&mut self, label: &str, payload: &Value) {
        let _ = (label, payload);
    }
}
