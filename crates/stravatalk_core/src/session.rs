use crate::agents::memory::SharedMemory;
use crate::agents::AgentSet;
use crate::chat::ChatMessage;
use crate::util::env_flag;

pub const WELCOME_MESSAGE: &str = "Welcome to the Strava Data Assistant! I can help you \
    analyze your Strava activities. How can I assist you today?";

/// All mutable state of one interactive session. Created at session start,
/// passed by reference into the turn controller and history renderer, torn
/// down when the host exits; nothing here is shared across sessions.
pub struct SessionState {
    /// Append-only within a session; the controller never reorders or
    /// deletes entries.
    pub chat_history: Vec<ChatMessage>,
    /// Cooperative flag: set for the duration of a turn so the history
    /// renderer skips redundant chart work. Not a lock — hosts serialize
    /// submissions themselves.
    pub is_processing: bool,
    pub shared_memory: SharedMemory,
    pub agents: AgentSet,
    /// Surfaces raw diagnostic payloads on render/pipeline failures.
    pub debug_mode: bool,
}

impl SessionState {
    pub fn new(agents: AgentSet) -> Self {
        let mut shared_memory = SharedMemory::new();
        shared_memory.add_assistant(WELCOME_MESSAGE);
        Self {
            chat_history: vec![ChatMessage::assistant(WELCOME_MESSAGE)],
            is_processing: false,
            shared_memory,
            agents,
            debug_mode: env_flag("STRAVATALK_DEBUG"),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        self
    }
}
