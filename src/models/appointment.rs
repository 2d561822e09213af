use serde::{Deserialize, Serialize};

use super::enums::AppointmentStatus;

/// Created exactly once per successful booking; never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub location_id: String,
    pub slot_id: String,
    pub status: AppointmentStatus,
}
