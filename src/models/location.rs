use serde::{Deserialize, Serialize};

/// A clinic location (sede). Static reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub address: String,
    pub district: String,
    /// Districts this location also serves, beyond its own.
    pub nearby_districts: Vec<String>,
}
