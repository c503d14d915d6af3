use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of chart data: column name -> JSON scalar.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Chart directive stored alongside chart data on an assistant message.
/// This is the one persisted "wire format" of the session: plain JSON,
/// no live handles, so history survives state round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartInfo {
    pub x_column: String,
    pub y_columns: Vec<String>,
    #[serde(default = "default_chart_type")]
    pub chart_type: String,
}

pub fn default_chart_type() -> String {
    "line".into()
}

/// One turn in the chat history.
///
/// `chart_data` and `chart_info` are either both present or both absent;
/// the controller only attaches them together after validation, and
/// `chart_directive()` is the accessor that enforces the pairing on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<Vec<Record>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_info: Option<ChartInfo>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            sql_query: None,
            chart_data: None,
            chart_info: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            sql_query: None,
            chart_data: None,
            chart_info: None,
        }
    }

    pub fn with_sql(mut self, sql_query: Option<String>) -> Self {
        self.sql_query = sql_query;
        self
    }

    /// Attach a validated chart directive. Both fields are set together;
    /// there is no way to persist one without the other.
    pub fn attach_chart(&mut self, data: Vec<Record>, info: ChartInfo) {
        self.chart_data = Some(data);
        self.chart_info = Some(info);
    }

    /// The chart directive, if this message carries one.
    pub fn chart_directive(&self) -> Option<(&[Record], &ChartInfo)> {
        match (&self.chart_data, &self.chart_info) {
            (Some(data), Some(info)) => Some((data.as_slice(), info)),
            _ => None,
        }
    }
}
