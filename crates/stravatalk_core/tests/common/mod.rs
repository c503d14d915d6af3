use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use stravatalk_core::agents::initialize_agents;
use stravatalk_core::chat::Role;
use stravatalk_core::llm::LlmExchange;
use stravatalk_core::session::SessionState;
use stravatalk_core::store::ActivityStore;
use stravatalk_core::strava::Activity;
use stravatalk_core::surface::ChatSurface;
use stravatalk_core::visualization::PlotSpec;

/// Scripted LLM exchange: each call pops the next canned JSON reply.
pub struct MockExchange {
    responses: Mutex<VecDeque<Value>>,
}

impl MockExchange {
    pub fn new(responses: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl LlmExchange for MockExchange {
    async fn complete_json(&self, _system: &str, _user: &str) -> Result<Value> {
        self.responses
            .lock()
            .expect("mock lock")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("mock exchange exhausted"))
    }
}

/// Surface that records everything the core asks it to display.
#[derive(Default)]
pub struct RecordingSurface {
    pub markdown: Vec<(Role, String)>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub charts: Vec<PlotSpec>,
    pub sql: Vec<String>,
    pub status: Vec<String>,
    pub debug: Vec<String>,
    /// Simulate a display backend that throws on chart rendering.
    pub fail_chart_display: bool,
}

impl ChatSurface for RecordingSurface {
    fn show_markdown(&mut self, role: Role, text: &str) {
        self.markdown.push((role, text.to_string()));
    }

    fn show_warning(&mut self, text: &str) {
        self.warnings.push(text.to_string());
    }

    fn show_error(&mut self, text: &str) {
        self.errors.push(text.to_string());
    }

    fn show_chart(&mut self, plot: &PlotSpec) -> Result<()> {
        if self.fail_chart_display {
            anyhow::bail!("display backend unavailable");
        }
        self.charts.push(plot.clone());
        Ok(())
    }

    fn show_sql(&mut self, sql: &str) {
        self.sql.push(sql.to_string());
    }

    fn status_begin(&mut self, label: &str) {
        self.status.push(label.to_string());
    }

    fn status_note(&mut self, line: &str) {
        self.status.push(line.to_string());
    }

    fn status_end(&mut self, _ok: bool, label: &str) {
        self.status.push(label.to_string());
    }

    fn show_debug(&mut self, label: &str, _payload: &Value) {
        self.debug.push(label.to_string());
    }
}

pub fn seeded_store(dir: &tempfile::TempDir) -> ActivityStore {
    let store = ActivityStore::new(dir.path().join("strava.duckdb")).expect("store");
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
                name: "Tempo Run".into(),
                distance: 8100.0,
                moving_time: 2400,
                elapsed_time: 2460,
                total_elevation_gain: 65.0,
                kind: "Run".into(),
                start_date: "2024-05-08 06:45:00".into(),
            },
            Activity {
                id: 3,
                name: "Long Run".into(),
                distance: 16500.0,
                moving_time: 5400,
                elapsed_time: 5520,
                total_elevation_gain: 180.0,
                kind: "Run".into(),
                start_date: "2024-05-15 07:00:00".into(),
            },
        ])
        .expect("seed activities");
    store
}

pub fn session_with_script(responses: Vec<Value>) -> SessionState {
    SessionState::new(initialize_agents(MockExchange::new(responses))).with_debug(false)
}

/// Every persisted message carries either both chart fields or neither.
pub fn assert_chart_invariant(state: &SessionState) {
    for message in &state.chat_history {
        assert_eq!(
            message.chart_data.is_some(),
            message.chart_info.is_some(),
            "chart_data and chart_info must be attached together"
        );
    }
}
