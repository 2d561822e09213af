use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::MessageRole;

/// One entry of the conversation transcript. The transcript is ordered by
/// emission time and append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: NaiveDateTime,
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn patient(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Patient,
            content: content.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }
}
