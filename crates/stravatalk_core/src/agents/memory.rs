use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptItem {
    pub role: String, // "user" | "assistant"
    pub content: String,
}

/// Conversation transcript shared by all three agents. Each agent renders
/// the recent turns into its prompt so follow-up questions ("what about
/// rides?") resolve against earlier context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedMemory {
    items: Vec<TranscriptItem>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.items.push(TranscriptItem {
            role: "user".into(),
            content: content.into(),
        });
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.items.push(TranscriptItem {
            role: "assistant".into(),
            content: content.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Render the last `last_n` turns as a prompt block, oldest first.
    pub fn render(&self, last_n: usize) -> String {
        let start = self.items.len().saturating_sub(last_n);
        let mut out = String::new();
        for item in &self.items[start..] {
            out.push_str(&format!("[{}] {}\n", item.role, item.content));
        }
        out
    }
}
