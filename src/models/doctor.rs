use serde::{Deserialize, Serialize};

/// Static reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: String,
    pub first_names: String,
    pub last_names: String,
    pub license_number: String,
    pub location_id: String,
    pub specialty_id: String,
}

impl Doctor {
    /// "Dr(a). Ana Muñoz Vega" — the form used in every patient-facing message.
    pub fn display_name(&self) -> String {
        format!("Dr(a). {} {}", self.first_names, self.last_names)
    }
}
