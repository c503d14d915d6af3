use crate::agents::memory::SharedMemory;
use crate::chat::Record;
use crate::llm::LlmExchange;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the response agent gets to work with: the SQL outcome, not the
/// full result set (at most a handful of sample rows).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlOutcomeSummary {
    pub query: String,
    pub sql_query: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub column_names: Option<Vec<String>>,
    pub sample_rows: Option<Vec<Record>>,
    pub row_count: usize,
    pub has_visualization: bool,
}

impl SqlOutcomeSummary {
    /// A turn that never reached SQL (conversational or clarification).
    pub fn without_sql(query: &str, note: &str) -> Self {
        Self {
            query: query.to_string(),
            sql_query: String::new(),
            success: false,
            error_message: Some(note.to_string()),
            column_names: None,
            sample_rows: None,
            row_count: 0,
            has_visualization: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponseOutput {
    response: String,
}

fn system_prompt() -> String {
    r#"
You create helpful, motivating responses about Strava fitness data, in
markdown. Return ONLY a JSON object: {"response": "<markdown>"}

Rules:
- Use a friendly, encouraging tone.
- Column names carry units: _km is kilometers, _minutes is minutes,
  pace_min_mi is minutes per mile.
- Format durations as HH:MM:SS (1:23:45, not 83.75 minutes) and pace as
  MM:SS per mile.
- If a chart will be shown, focus on insights instead of listing every row.
- If SQL failed or the question was not answerable from the data, explain in
  user-friendly terms what you can help with instead.
- Keep answers concise but complete.
"#
    .to_string()
}

pub struct ResponseAgent {
    exchange: Arc<dyn LlmExchange>,
}

impl ResponseAgent {
    pub fn new(exchange: Arc<dyn LlmExchange>) -> Self {
        Self { exchange }
    }

    #[tracing::instrument(skip_all)]
    pub async fn run(&self, memory: &SharedMemory, summary: &SqlOutcomeSummary) -> Result<String> {
        let mut user = String::new();
        if !memory.is_empty() {
            user.push_str("Conversation so far:\n");
            user.push_str(&memory.render(6));
            user.push('\n');
        }
        user.push_str("SQL outcome:\n");
        user.push_str(&serde_json::to_string_pretty(summary)?);

        let value = self.exchange.complete_json(&system_prompt(), &user).await?;
        let output: ResponseOutput =
            serde_json::from_value(value).context("Response agent returned an unexpected shape")?;
        Ok(output.response)
    }
}
