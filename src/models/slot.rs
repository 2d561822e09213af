use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::doctor::Doctor;
use super::enums::SlotStatus;

/// One bookable doctor-date-time unit. The only entity with a lifecycle
/// transition inside the core: available → booked, exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub doctor_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SlotStatus,
}

impl Slot {
    /// "09:00" — times are always shown without seconds.
    pub fn start_hhmm(&self) -> String {
        self.start_time.format("%H:%M").to_string()
    }

    pub fn end_hhmm(&self) -> String {
        self.end_time.format("%H:%M").to_string()
    }
}

/// Composite query row: a doctor together with their available slots
/// inside the requested window, sorted by (date, start_time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSlots {
    pub doctor: Doctor,
    pub slots: Vec<Slot>,
}
