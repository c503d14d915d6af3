use crate::agents::memory::SharedMemory;
use crate::chat::ChartInfo;
use crate::llm::LlmExchange;
use crate::store::TableDefinition;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Output of the NL-to-SQL agent. `chart` is only requested (and only
/// honored) for visualization turns; its y-columns are unvalidated until
/// the controller checks them against the actual result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlGeneration {
    pub sql_query: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub chart: Option<ChartInfo>,
}

fn system_prompt(want_chart: bool) -> String {
    let mut prompt = r#"
You are an expert SQL developer converting natural language to SQL for a
fitness activity database. Return ONLY a JSON object:
  {"sql_query": "<SQL>",
   "explanation": "<plain language explanation>",
   "confidence": <0.0-1.0>,
   "warnings": ["<assumption or caveat>", ...]"#
        .to_string();
    if want_chart {
        prompt.push_str(
            r#",
   "chart": {"x_column": "<projected column>",
             "y_columns": ["<projected column>", ...],
             "chart_type": "line" | "area" | "bar" | "scatter"}"#,
        );
    }
    prompt.push_str(
        r#"}

Rules:
- Use only tables and columns from the provided schema.
- Convert units in SQL and name columns accordingly (distance / 1000 AS
  distance_km, moving_time / 60.0 AS moving_time_minutes).
- Alias every computed column; chart columns must match the projection.
- Prefer ORDER BY on date columns for time-based questions.
"#,
    );
    prompt
}

pub struct SqlAgent {
    exchange: Arc<dyn LlmExchange>,
}

impl SqlAgent {
    pub fn new(exchange: Arc<dyn LlmExchange>) -> Self {
        Self { exchange }
    }

    #[tracing::instrument(skip_all, fields(query = %query, want_chart))]
    pub async fn run(
        &self,
        memory: &SharedMemory,
        query: &str,
        database_type: &str,
        tables: &[TableDefinition],
        custom_instructions: &str,
        want_chart: bool,
    ) -> Result<SqlGeneration> {
        let mut user = String::new();
        user.push_str(&format!("Database type: {database_type}\n\nSchema:\n"));
        for table in tables {
            user.push_str(&table.describe());
            user.push('\n');
        }
        if !custom_instructions.trim().is_empty() {
            user.push_str("Custom instructions:\n");
            user.push_str(custom_instructions.trim());
            user.push_str("\n\n");
        }
        if !memory.is_empty() {
            user.push_str("Conversation so far:\n");
            user.push_str(&memory.render(6));
            user.push('\n');
        }
        user.push_str("Convert to SQL: ");
        user.push_str(query);

        let value = self
            .exchange
            .complete_json(&system_prompt(want_chart), &user)
            .await?;
        let generation: SqlGeneration =
            serde_json::from_value(value).context("SQL agent returned an unexpected shape")?;
        tracing::debug!(sql = %generation.sql_query, confidence = generation.confidence, "generated SQL");
        Ok(generation)
    }
}
