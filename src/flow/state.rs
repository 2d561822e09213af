//! Conversation state and the stage contract.
//!
//! Everything here is serde-serializable: a suspended conversation is a
//! value, not a paused call stack. [`Pending`] names the question the
//! conversation is waiting on and carries exactly the locals needed to
//! interpret the answer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Phase;
use crate::calendar::DateWindow;
use crate::models::{Appointment, ChatMessage, Doctor, DoctorSlots, Location, Patient, Slot};

/// The question a suspended conversation is waiting on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Pending {
    /// Pick one of `state.locations`.
    LocationChoice,
    /// The chosen location had no slots; pick one of these instead.
    AlternativeLocation { offered: Vec<Location> },
    /// No slots in the current window; accept or decline this one.
    NextWeekOffer { window: DateWindow },
    /// Pick a doctor and slot from `state.doctors`.
    DoctorSlotChoice,
    /// Doctor and day are settled; only the hour is open.
    HourForDoctorDay { doctor_idx: usize, date: NaiveDate },
    /// Doctor is settled; pick one of their slots.
    SlotForDoctor { doctor_idx: usize },
    /// Day is settled; pick one of that day's slots.
    SlotForDay { date: NaiveDate },
    /// Yes/no on the booking summary.
    Confirmation,
}

/// Full state of one conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    pub patient: Patient,
    pub phase: Phase,
    pub pending: Option<Pending>,
    /// Locations offered during ChooseLocation, in display order.
    pub locations: Vec<Location>,
    pub chosen_location: Option<Location>,
    /// Date window of the current doctor listing.
    pub window: Option<DateWindow>,
    /// Doctors offered during ChooseDoctorAndSlot, in display order.
    pub doctors: Vec<DoctorSlots>,
    /// (doctor_idx, slot_idx) into `doctors`, once settled.
    pub selected: Option<(usize, usize)>,
    /// The alternative-location offer is made at most once per conversation.
    pub offered_alternatives: bool,
    /// Set once a next-week offer was accepted; the requery happens at most
    /// once per location, an empty result afterwards ends the conversation.
    pub window_extended: bool,
    pub appointment: Option<Appointment>,
    /// Append-only, ordered by emission.
    pub transcript: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new(thread_id: &str, patient: Patient) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            patient,
            phase: Phase::ChooseLocation,
            pending: None,
            locations: Vec::new(),
            chosen_location: None,
            window: None,
            doctors: Vec::new(),
            selected: None,
            offered_alternatives: false,
            window_extended: false,
            appointment: None,
            transcript: Vec::new(),
        }
    }

    /// Merge a stage's update. Only fields the stage set change.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(locations) = update.locations {
            self.locations = locations;
        }
        if let Some(location) = update.chosen_location {
            self.chosen_location = Some(location);
        }
        if update.reset_window {
            self.window = None;
            self.window_extended = false;
        }
        if update.window_extended {
            self.window_extended = true;
        }
        if let Some(window) = update.window {
            self.window = Some(window);
        }
        if let Some(doctors) = update.doctors {
            self.doctors = doctors;
        }
        if let Some(selected) = update.selected {
            self.selected = Some(selected);
        }
        if update.reset_selection {
            self.selected = None;
        }
        if update.offered_alternatives {
            self.offered_alternatives = true;
        }
        if let Some(appointment) = update.appointment {
            self.appointment = Some(appointment);
        }
    }

    /// The settled (doctor, slot) pair, if a selection exists and is valid.
    pub fn selected_slot(&self) -> Option<(&Doctor, &Slot)> {
        let (doctor_idx, slot_idx) = self.selected?;
        let entry = self.doctors.get(doctor_idx)?;
        let slot = entry.slots.get(slot_idx)?;
        Some((&entry.doctor, slot))
    }
}

/// Partial state change produced by one stage step.
#[derive(Debug, Default)]
pub struct StateUpdate {
    pub locations: Option<Vec<Location>>,
    pub chosen_location: Option<Location>,
    pub window: Option<DateWindow>,
    pub reset_window: bool,
    pub window_extended: bool,
    pub doctors: Option<Vec<DoctorSlots>>,
    pub selected: Option<(usize, usize)>,
    pub reset_selection: bool,
    pub offered_alternatives: bool,
    pub appointment: Option<Appointment>,
}

/// What the stage decided: suspend on a question, or continue elsewhere.
#[derive(Debug)]
pub enum Outcome {
    Ask(Pending),
    Goto(Phase),
}

/// Result of running one stage step.
#[derive(Debug)]
pub struct StageOutput {
    pub messages: Vec<String>,
    pub update: StateUpdate,
    pub outcome: Outcome,
}

impl StageOutput {
    pub fn ask(messages: Vec<String>, update: StateUpdate, pending: Pending) -> Self {
        Self {
            messages,
            update,
            outcome: Outcome::Ask(pending),
        }
    }

    pub fn goto(messages: Vec<String>, update: StateUpdate, phase: Phase) -> Self {
        Self {
            messages,
            update,
            outcome: Outcome::Goto(phase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> Patient {
        Patient {
            id: "pac-001".into(),
            first_names: "Lucía".into(),
            last_names: "Ramos Torres".into(),
            district: "Miraflores".into(),
            specialty_id: "esp-002".into(),
            email: "lucia.ramos@example.com".into(),
            condition: Some("dermatitis atópica".into()),
        }
    }

    #[test]
    fn apply_merges_only_set_fields() {
        let mut state = ConversationState::new("t1", patient());
        state.selected = Some((0, 1));

        state.apply(StateUpdate {
            window: Some(DateWindow {
                from: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
                to: NaiveDate::from_ymd_opt(2026, 3, 7).unwrap(),
            }),
            ..Default::default()
        });

        assert!(state.window.is_some());
        // untouched fields survive
        assert_eq!(state.selected, Some((0, 1)));
        assert!(!state.offered_alternatives);
    }

    #[test]
    fn reset_selection_clears_prior_choice() {
        let mut state = ConversationState::new("t1", patient());
        state.selected = Some((1, 2));
        state.apply(StateUpdate {
            reset_selection: true,
            ..Default::default()
        });
        assert_eq!(state.selected, None);
    }

    #[test]
    fn offered_alternatives_is_sticky() {
        let mut state = ConversationState::new("t1", patient());
        state.apply(StateUpdate {
            offered_alternatives: true,
            ..Default::default()
        });
        state.apply(StateUpdate::default());
        assert!(state.offered_alternatives);
    }

    #[test]
    fn reset_window_clears_the_extension_flag() {
        let mut state = ConversationState::new("t1", patient());
        state.apply(StateUpdate {
            window_extended: true,
            ..Default::default()
        });
        assert!(state.window_extended);
        // Switching location starts over with a fresh window.
        state.apply(StateUpdate {
            reset_window: true,
            ..Default::default()
        });
        assert!(!state.window_extended);
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = ConversationState::new("t1", patient());
        state.phase = Phase::ChooseDoctorAndSlot;
        state.pending = Some(Pending::HourForDoctorDay {
            doctor_idx: 0,
            date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
        });
        state.transcript.push(ChatMessage::assistant("Hola 🏥"));

        let json = serde_json::to_string(&state).unwrap();
        let restored: ConversationState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.thread_id, "t1");
        assert_eq!(restored.phase, Phase::ChooseDoctorAndSlot);
        assert!(matches!(
            restored.pending,
            Some(Pending::HourForDoctorDay { doctor_idx: 0, .. })
        ));
        assert_eq!(restored.transcript.len(), 1);
    }

    #[test]
    fn selected_slot_guards_against_stale_indices() {
        let mut state = ConversationState::new("t1", patient());
        state.selected = Some((3, 0));
        assert!(state.selected_slot().is_none());
    }
}
