//! The conversation engine: an explicit, serializable state machine.
//!
//! A conversation moves through phases; inside a phase it may suspend on a
//! named [`state::Pending`] question and resume when the patient answers.
//! Suspension is plain data, never captured control flow, so any state can
//! be serialized, inspected, and resumed later.

pub mod messages;
pub mod orchestrator;
pub mod stages;
pub mod state;

pub use orchestrator::{Orchestrator, Turn, TurnStatus};
pub use state::{ConversationState, Pending, StageOutput};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;

/// Where the conversation is. Four terminal phases; the rest always lead
/// somewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    ChooseLocation,
    ChooseDoctorAndSlot,
    Confirm,
    Book,
    Done,
    NoLocations,
    NoDoctors,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::Done | Phase::NoLocations | Phase::NoDoctors | Phase::Cancelled
        )
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Unknown patient: {0}")]
    UnknownPatient(String),

    #[error("Unknown conversation thread: {0}")]
    UnknownThread(String),

    #[error("Conversation {0} is not awaiting input")]
    NotSuspended(String),

    #[error("Conversation {0} already finished")]
    Finished(String),
}
