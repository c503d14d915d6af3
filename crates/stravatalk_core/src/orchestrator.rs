use crate::agents::classify::ClassificationResult;
use crate::agents::memory::SharedMemory;
use crate::agents::respond::SqlOutcomeSummary;
use crate::agents::AgentSet;
use crate::chat::ChartInfo;
use crate::store::ActivityStore;
use crate::tabular::TableData;
use anyhow::Result;
use tracing::{debug, info, warn};

/// GPS distances are noisy; filters like "runs over 10k" get a tolerance.
const CUSTOM_SQL_INSTRUCTIONS: &str = "Include a margin of error for distance filters to \
    account for GPS inaccuracies. The margin of error should be 1% of the distance in meters.";

/// Everything one pipeline run produces. Constructed fresh per call and
/// consumed immediately by the turn controller; never mutated after return.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub classification: ClassificationResult,
    pub sql_query: Option<String>,
    pub success: bool,
    pub data: Option<TableData>,
    pub chart_info: Option<ChartInfo>,
    pub response_text: String,
}

/// Run the full query pipeline for one user turn: classify, optionally
/// synthesize and execute SQL, then generate the response text. SQL
/// execution failure is a soft failure (`success = false`, narrated in the
/// response); agent failures propagate to the caller's boundary.
#[tracing::instrument(skip_all, fields(query = %query))]
pub async fn process_query(
    agents: &AgentSet,
    store: &ActivityStore,
    memory: &mut SharedMemory,
    query: &str,
) -> Result<PipelineResult> {
    let classification = agents.classify.run(memory, query).await?;
    info!(query_type = %classification.query_type, confidence = classification.confidence, "classified query");

    let result = if classification.query_type.needs_sql() {
        run_sql_turn(agents, store, memory, query, classification).await?
    } else {
        // Conversational and clarification turns skip SQL entirely.
        let note = format!("Query classified as {}", classification.query_type);
        let summary = SqlOutcomeSummary::without_sql(query, &note);
        let response_text = agents.respond.run(memory, &summary).await?;
        PipelineResult {
            classification,
            sql_query: None,
            success: true,
            data: None,
            chart_info: None,
            response_text,
        }
    };

    // The transcript is recorded once per turn, after the agents ran, so
    // none of them sees the in-flight query twice.
    memory.add_user(query);
    memory.add_assistant(&result.response_text);
    Ok(result)
}

async fn run_sql_turn(
    agents: &AgentSet,
    store: &ActivityStore,
    memory: &SharedMemory,
    query: &str,
    classification: ClassificationResult,
) -> Result<PipelineResult> {
    use crate::agents::classify::QueryType;

    let tables = store.table_definitions()?;
    let want_chart = classification.query_type == QueryType::Viz;
    let generation = agents
        .sql
        .run(memory, query, "duckdb", &tables, CUSTOM_SQL_INSTRUCTIONS, want_chart)
        .await?;
    for warning in &generation.warnings {
        debug!(warning, "SQL generation warning");
    }

    match store.execute_query(&generation.sql_query) {
        Ok(data) => {
            info!(rows = data.row_count(), "SQL query executed");
            let chart_info = if want_chart { generation.chart } else { None };
            let summary = SqlOutcomeSummary {
                query: query.to_string(),
                sql_query: generation.sql_query.clone(),
                success: true,
                error_message: None,
                column_names: Some(data.columns.clone()),
                sample_rows: Some(data.sample_records(5)),
                row_count: data.row_count(),
                has_visualization: chart_info.is_some(),
            };
            let response_text = agents.respond.run(memory, &summary).await?;
            Ok(PipelineResult {
                classification,
                sql_query: Some(generation.sql_query),
                success: true,
                data: Some(data),
                chart_info,
                response_text,
            })
        }
        Err(e) => {
            warn!(error = %e, "SQL execution failed");
            let summary = SqlOutcomeSummary {
                query: query.to_string(),
                sql_query: generation.sql_query.clone(),
                success: false,
                error_message: Some(e.to_string()),
                column_names: None,
                sample_rows: None,
                row_count: 0,
                has_visualization: false,
            };
            let response_text = agents.respond.run(memory, &summary).await?;
            Ok(PipelineResult {
                classification,
                sql_query: Some(generation.sql_query),
                success: false,
                data: None,
                chart_info: None,
                response_text,
            })
        }
    }
}
