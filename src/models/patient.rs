use serde::{Deserialize, Serialize};

/// Loaded once at conversation start; immutable for the whole conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub first_names: String,
    pub last_names: String,
    pub district: String,
    pub specialty_id: String,
    pub email: String,
    pub condition: Option<String>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_names, self.last_names)
    }
}
