use crate::agents::memory::SharedMemory;
use crate::llm::LlmExchange;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Upstream determination of query intent. Only `Sql` and `Viz` lead to
/// SQL synthesis and result-table handling downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Sql,
    Viz,
    Conversational,
    Clarification,
}

impl QueryType {
    pub fn needs_sql(self) -> bool {
        matches!(self, QueryType::Sql | QueryType::Viz)
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryType::Sql => "SQL",
            QueryType::Viz => "VIZ",
            QueryType::Conversational => "conversational",
            QueryType::Clarification => "clarification",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub query_type: QueryType,
    pub confidence: f32,
    pub reasoning: String,
}

fn system_prompt() -> String {
    r#"
You classify user queries about Strava fitness data. Return ONLY a JSON object:
  {"query_type": "sql" | "viz" | "conversational" | "clarification",
   "confidence": <0.0-1.0>,
   "reasoning": "<one or two sentences>"}

Guidance:
- "sql": the question is answerable with a query against the user's activity
  database (counts, totals, filters, rankings) and a textual answer suffices.
- "viz": like sql, but the user asks to see a trend, comparison or chart
  ("show", "plot", "over time", "per week").
- "conversational": greetings, questions about you, training advice, anything
  the activity database cannot answer.
- "clarification": the request is data-shaped but too ambiguous to query.
"#
    .to_string()
}

pub struct ClassifyAgent {
    exchange: Arc<dyn LlmExchange>,
}

impl ClassifyAgent {
    pub fn new(exchange: Arc<dyn LlmExchange>) -> Self {
        Self { exchange }
    }

    #[tracing::instrument(skip_all, fields(query = %query))]
    pub async fn run(&self, memory: &SharedMemory, query: &str) -> Result<ClassificationResult> {
        let mut user = String::new();
        if !memory.is_empty() {
            user.push_str("Conversation so far:\n");
            user.push_str(&memory.render(6));
            user.push('\n');
        }
        user.push_str("Query to classify: ");
        user.push_str(query);

        let value = self.exchange.complete_json(&system_prompt(), &user).await?;
        let result: ClassificationResult =
            serde_json::from_value(value).context("Classification agent returned an unexpected shape")?;
        tracing::debug!(query_type = %result.query_type, confidence = result.confidence, "classified query");
        Ok(result)
    }
}
