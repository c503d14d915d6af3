pub mod classify;
pub mod memory;
pub mod respond;
pub mod sql;

use crate::llm::LlmExchange;
use classify::ClassifyAgent;
use respond::ResponseAgent;
use sql::SqlAgent;
use std::sync::Arc;

/// The three agents of a session, constructed once and reused across turns.
pub struct AgentSet {
    pub classify: ClassifyAgent,
    pub sql: SqlAgent,
    pub respond: ResponseAgent,
}

/// Build the agent set over one shared LLM exchange.
pub fn initialize_agents(exchange: Arc<dyn LlmExchange>) -> AgentSet {
    AgentSet {
        classify: ClassifyAgent::new(exchange.clone()),
        sql: SqlAgent::new(exchange.clone()),
        respond: ResponseAgent::new(exchange),
    }
}
