//! The conversation driver. Owns the store, the assistant, and the
//! notifier; keeps one [`ConversationState`] checkpoint per thread and
//! routes between stages until the conversation suspends or finishes.
//!
//! `today` is injected at construction so every date computation in a
//! conversation is reproducible.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::stages::{self, StageContext};
use super::state::{ConversationState, Outcome, Pending, StageOutput};
use super::{FlowError, Phase};
use crate::db::Store;
use crate::llm::Assistant;
use crate::models::ChatMessage;
use crate::notify::{ConfirmationEmail, Notifier};

pub struct Orchestrator {
    store: Store,
    assistant: Assistant,
    notifier: Box<dyn Notifier>,
    checkpoints: HashMap<String, ConversationState>,
    today: NaiveDate,
}

/// What one exchange produced: the assistant's messages, and whether the
/// conversation wants more input.
pub struct Turn {
    pub messages: Vec<String>,
    pub status: TurnStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    AwaitingInput,
    Finished(Phase),
}

impl Orchestrator {
    pub fn new(store: Store, assistant: Assistant, notifier: Box<dyn Notifier>) -> Self {
        Self {
            store,
            assistant,
            notifier,
            checkpoints: HashMap::new(),
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Pin the reference date. Tests use this for determinism.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn state(&self, thread_id: &str) -> Option<&ConversationState> {
        self.checkpoints.get(thread_id)
    }

    /// Re-install a previously serialized conversation state, e.g. one
    /// restored from disk. Replaces any state under the same thread id.
    pub fn restore(&mut self, state: ConversationState) {
        self.checkpoints.insert(state.thread_id.clone(), state);
    }

    /// Begin a conversation for a patient. Runs until the first question.
    pub fn start(&mut self, thread_id: &str, patient_id: &str) -> Result<Turn, FlowError> {
        let patient = self
            .store
            .patient(patient_id)?
            .ok_or_else(|| FlowError::UnknownPatient(patient_id.to_string()))?;

        tracing::info!(thread = thread_id, patient = patient_id, "Starting conversation");
        let mut state = ConversationState::new(thread_id, patient);
        let ctx = self.ctx();
        let first = stages::enter_choose_location(&ctx, &state)?;
        let turn = self.drive(&mut state, first);
        self.checkpoints.insert(thread_id.to_string(), state);
        turn
    }

    /// Feed the patient's answer to the suspended question and run until
    /// the next suspension or a terminal phase.
    pub fn resume(&mut self, thread_id: &str, text: &str) -> Result<Turn, FlowError> {
        let mut state = self
            .checkpoints
            .remove(thread_id)
            .ok_or_else(|| FlowError::UnknownThread(thread_id.to_string()))?;

        if state.phase.is_terminal() {
            self.checkpoints.insert(thread_id.to_string(), state);
            return Err(FlowError::Finished(thread_id.to_string()));
        }
        let Some(pending) = state.pending.take() else {
            self.checkpoints.insert(thread_id.to_string(), state);
            return Err(FlowError::NotSuspended(thread_id.to_string()));
        };

        state.transcript.push(ChatMessage::patient(text));

        let result = match self.run_pending(&state, &pending, text) {
            Ok(output) => self.drive(&mut state, output),
            Err(e) => {
                state.pending = Some(pending);
                Err(e)
            }
        };
        self.checkpoints.insert(thread_id.to_string(), state);
        result
    }

    fn ctx(&self) -> StageContext<'_> {
        StageContext {
            store: &self.store,
            assistant: &self.assistant,
            today: self.today,
        }
    }

    fn run_pending(
        &self,
        state: &ConversationState,
        pending: &Pending,
        text: &str,
    ) -> Result<StageOutput, FlowError> {
        let ctx = self.ctx();
        match pending {
            Pending::LocationChoice => stages::resume_location_choice(&ctx, state, text),
            Pending::AlternativeLocation { offered } => {
                stages::resume_alternative_location(&ctx, state, text, offered)
            }
            Pending::NextWeekOffer { window } => {
                stages::resume_next_week_offer(&ctx, state, text, *window)
            }
            Pending::DoctorSlotChoice => stages::resume_doctor_slot_choice(&ctx, state, text),
            Pending::HourForDoctorDay { doctor_idx, date } => {
                stages::resume_hour_for_doctor_day(&ctx, state, text, *doctor_idx, *date)
            }
            Pending::SlotForDoctor { doctor_idx } => {
                stages::resume_slot_for_doctor(&ctx, state, text, *doctor_idx)
            }
            Pending::SlotForDay { date } => stages::resume_slot_for_day(&ctx, state, text, *date),
            Pending::Confirmation => Ok(stages::resume_confirmation(text)),
        }
    }

    /// Apply stage outputs and follow `Goto` edges until the conversation
    /// suspends or reaches a terminal phase.
    fn drive(
        &self,
        state: &mut ConversationState,
        mut output: StageOutput,
    ) -> Result<Turn, FlowError> {
        let mut collected = Vec::new();
        loop {
            let StageOutput {
                messages,
                update,
                outcome,
            } = output;
            for msg in messages {
                state.transcript.push(ChatMessage::assistant(msg.clone()));
                collected.push(msg);
            }
            state.apply(update);

            match outcome {
                Outcome::Ask(pending) => {
                    state.pending = Some(pending);
                    return Ok(Turn {
                        messages: collected,
                        status: TurnStatus::AwaitingInput,
                    });
                }
                Outcome::Goto(phase) => {
                    state.phase = phase;
                    if phase.is_terminal() {
                        if phase == Phase::Done {
                            self.notify_booked(state);
                        }
                        tracing::info!(thread = %state.thread_id, ?phase, "Conversation finished");
                        return Ok(Turn {
                            messages: collected,
                            status: TurnStatus::Finished(phase),
                        });
                    }
                    let ctx = self.ctx();
                    output = match phase {
                        Phase::ChooseLocation => stages::enter_choose_location(&ctx, state)?,
                        Phase::ChooseDoctorAndSlot => {
                            stages::enter_choose_doctor_slot(&ctx, state)?
                        }
                        Phase::Confirm => stages::enter_confirm(&ctx, state)?,
                        Phase::Book => stages::enter_book(&ctx, state)?,
                        _ => unreachable!("terminal phases return above"),
                    };
                }
            }
        }
    }

    /// Best-effort: the appointment is committed, an email failure only
    /// gets logged.
    fn notify_booked(&self, state: &ConversationState) {
        let (Some(appointment), Some((doctor, slot)), Some(location)) = (
            state.appointment.as_ref(),
            state.selected_slot(),
            state.chosen_location.as_ref(),
        ) else {
            return;
        };
        let specialty = match self.store.specialty_name(&state.patient.specialty_id) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Could not resolve specialty for email");
                return;
            }
        };
        let email = ConfirmationEmail::from_booking(
            appointment,
            &state.patient,
            doctor,
            location,
            slot,
            &specialty,
        );
        if let Err(e) = self.notifier.send_confirmation(&email) {
            tracing::warn!(error = %e, "Confirmation email failed, appointment stands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, seed};
    use crate::llm::MockLlmClient;
    use crate::models::MessageRole;
    use crate::notify::NotifyError;
    use rusqlite::params;
    use std::sync::{Arc, Mutex};

    struct RecordingMailer {
        sent: Arc<Mutex<Vec<ConfirmationEmail>>>,
    }

    impl Notifier for RecordingMailer {
        fn send_confirmation(&self, email: &ConfirmationEmail) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap() // a Monday
    }

    fn orchestrator_with(client: MockLlmClient) -> (Orchestrator, Arc<Mutex<Vec<ConfirmationEmail>>>) {
        let conn = open_memory_database().unwrap();
        seed::seed_demo_data(&conn, today()).unwrap();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let orch = Orchestrator::new(
            Store::new(conn),
            Assistant::new(Box::new(client), "llama3.1:8b", "llama3.2:1b"),
            Box::new(RecordingMailer { sent: sent.clone() }),
        )
        .with_today(today());
        (orch, sent)
    }

    /// Heuristics only: the failing client disables phrasing and the
    /// classifier, so everything resolves through tiers 1-3.
    fn orchestrator() -> (Orchestrator, Arc<Mutex<Vec<ConfirmationEmail>>>) {
        orchestrator_with(MockLlmClient::failing())
    }

    #[test]
    fn numbered_answers_walk_the_whole_flow() {
        let (mut orch, sent) = orchestrator();

        let turn = orch.start("t1", "pac-001").unwrap();
        assert_eq!(turn.status, TurnStatus::AwaitingInput);
        assert!(turn.messages[0].contains("1. 🏥 Clínica Miraflores"));

        let turn = orch.resume("t1", "1").unwrap();
        assert_eq!(turn.status, TurnStatus::AwaitingInput);
        assert!(turn.messages[0].contains("👨‍⚕️"));

        let turn = orch.resume("t1", "1").unwrap();
        assert_eq!(turn.status, TurnStatus::AwaitingInput);
        assert!(turn.messages[0].contains("📋 **Resumen de tu cita:**"));

        let turn = orch.resume("t1", "sí").unwrap();
        assert_eq!(turn.status, TurnStatus::Finished(Phase::Done));
        assert!(turn.messages[0].contains("✅ ¡Tu cita ha sido confirmada"));

        let count: i64 = orch
            .store()
            .connection()
            .query_row("SELECT COUNT(*) FROM appointments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "lucia.ramos@example.com");
        assert_eq!(sent[0].specialty, "Dermatología");
    }

    #[test]
    fn composite_reply_skips_straight_to_confirmation() {
        let (mut orch, _) = orchestrator();
        orch.start("t1", "pac-001").unwrap();
        orch.resume("t1", "1").unwrap();

        // Doctor, weekday and hour in one sentence resolve a single slot.
        let turn = orch.resume("t1", "con castro el martes a las 9").unwrap();
        assert_eq!(turn.status, TurnStatus::AwaitingInput);
        assert!(turn.messages[0].contains("Castro"));
        assert!(turn.messages[0].contains("09:00"));

        let turn = orch.resume("t1", "no").unwrap();
        assert_eq!(turn.status, TurnStatus::Finished(Phase::Cancelled));
        assert!(turn.messages[0].contains("no fue agendada"));

        // Nothing was booked.
        let count: i64 = orch
            .store()
            .connection()
            .query_row("SELECT COUNT(*) FROM appointments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn doctor_only_reply_asks_for_their_slots() {
        let (mut orch, _) = orchestrator();
        orch.start("t1", "pac-001").unwrap();
        orch.resume("t1", "1").unwrap();

        let turn = orch.resume("t1", "quisiera con la doctora palma").unwrap();
        assert_eq!(turn.status, TurnStatus::AwaitingInput);
        assert!(turn.messages[0].contains("Ríos Palma"));
        assert!(turn.messages[0].contains("  1. 📅"));
        assert!(matches!(
            orch.state("t1").unwrap().pending,
            Some(Pending::SlotForDoctor { .. })
        ));

        let turn = orch.resume("t1", "1").unwrap();
        assert!(turn.messages[0].contains("Ríos Palma"));
        assert!(turn.messages[0].contains("¿Confirmas esta cita?"));
    }

    #[test]
    fn doctor_and_day_reply_asks_only_for_the_hour() {
        let (mut orch, _) = orchestrator();
        orch.start("t1", "pac-001").unwrap();
        orch.resume("t1", "1").unwrap();

        let turn = orch.resume("t1", "con castro el miércoles").unwrap();
        assert_eq!(turn.status, TurnStatus::AwaitingInput);
        assert!(turn.messages[0].contains("¿A qué hora prefieres?"));
        assert!(matches!(
            orch.state("t1").unwrap().pending,
            Some(Pending::HourForDoctorDay { .. })
        ));

        // Exactly one further suspension: the hour settles it.
        let turn = orch.resume("t1", "a las 15").unwrap();
        assert!(turn.messages[0].contains("15:00"));
        assert!(turn.messages[0].contains("¿Confirmas esta cita?"));
    }

    #[test]
    fn day_only_reply_lists_that_days_options() {
        let (mut orch, _) = orchestrator();
        orch.start("t1", "pac-001").unwrap();
        orch.resume("t1", "1").unwrap();

        // Both doctors work Wednesday, so the day alone is ambiguous.
        let turn = orch.resume("t1", "el miércoles por favor").unwrap();
        assert_eq!(turn.status, TurnStatus::AwaitingInput);
        assert!(turn.messages[0].contains("Miércoles 4 de marzo"));
        assert!(matches!(
            orch.state("t1").unwrap().pending,
            Some(Pending::SlotForDay { .. })
        ));

        let turn = orch.resume("t1", "con castro a las 10").unwrap();
        assert!(turn.messages[0].contains("Castro"));
        assert!(turn.messages[0].contains("10:00"));
    }

    #[test]
    fn asking_for_more_options_pages_to_next_week() {
        let (mut orch, _) = orchestrator();
        orch.start("t1", "pac-001").unwrap();
        orch.resume("t1", "1").unwrap();

        let turn = orch.resume("t1", "¿tienes otros horarios?").unwrap();
        assert_eq!(turn.status, TurnStatus::AwaitingInput);

        let state = orch.state("t1").unwrap();
        let window = state.window.unwrap();
        assert_eq!(window.from, NaiveDate::from_ymd_opt(2026, 3, 8).unwrap());
        assert_eq!(window.to, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert!(state.doctors.iter().all(|d| d
            .slots
            .iter()
            .all(|s| window.contains(s.date))));
    }

    #[test]
    fn classifier_hint_resolves_free_form_location_choice() {
        let (mut orch, _) = orchestrator_with(MockLlmClient::new("2"));
        orch.start("t1", "pac-001").unwrap();

        // No number, no keyword: the classifier's "2" picks San Felipe.
        orch.resume("t1", "la que tenga mejor acceso").unwrap();
        let state = orch.state("t1").unwrap();
        assert_eq!(state.chosen_location.as_ref().unwrap().id, "sede-001");
    }

    #[test]
    fn unreadable_location_choice_defaults_to_first() {
        let (mut orch, _) = orchestrator();
        orch.start("t1", "pac-001").unwrap();

        orch.resume("t1", "mmm").unwrap();
        let state = orch.state("t1").unwrap();
        assert_eq!(state.chosen_location.as_ref().unwrap().id, "sede-002");
    }

    #[test]
    fn lost_slot_race_relists_and_lets_the_patient_pick_again() {
        let (mut orch, sent) = orchestrator();
        orch.start("t1", "pac-001").unwrap();
        orch.resume("t1", "1").unwrap();
        orch.resume("t1", "1").unwrap(); // at confirmation

        let slot_id = {
            let state = orch.state("t1").unwrap();
            state.selected_slot().unwrap().1.id.clone()
        };
        orch.store()
            .connection()
            .execute(
                "UPDATE slots SET status = 'booked' WHERE id = ?1",
                params![slot_id],
            )
            .unwrap();

        let turn = orch.resume("t1", "sí").unwrap();
        assert_eq!(turn.status, TurnStatus::AwaitingInput);
        assert!(turn.messages[0].contains("acaba de ser tomado"));
        assert!(turn.messages[1].contains("👨‍⚕️"));

        let state = orch.state("t1").unwrap();
        assert_eq!(state.phase, Phase::ChooseDoctorAndSlot);
        assert_eq!(state.selected, None);
        assert!(state
            .doctors
            .iter()
            .all(|d| d.slots.iter().all(|s| s.id != slot_id)));
        assert!(sent.lock().unwrap().is_empty());

        // The conversation completes on the refreshed listing.
        orch.resume("t1", "1").unwrap();
        let turn = orch.resume("t1", "sí").unwrap();
        assert_eq!(turn.status, TurnStatus::Finished(Phase::Done));
    }

    #[test]
    fn transcript_is_ordered_and_append_only() {
        let (mut orch, _) = orchestrator();
        orch.start("t1", "pac-001").unwrap();
        orch.resume("t1", "1").unwrap();
        orch.resume("t1", "1").unwrap();
        orch.resume("t1", "sí").unwrap();

        let transcript = &orch.state("t1").unwrap().transcript;
        assert_eq!(transcript[0].role, MessageRole::Assistant);
        let patient_turns: Vec<&str> = transcript
            .iter()
            .filter(|m| m.role == MessageRole::Patient)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(patient_turns, vec!["1", "1", "sí"]);
        assert!(transcript.last().unwrap().content.contains("✅"));
    }

    #[test]
    fn suspended_state_survives_serialization() {
        let (mut orch, _) = orchestrator();
        orch.start("t1", "pac-001").unwrap();
        orch.resume("t1", "1").unwrap(); // suspended on DoctorSlotChoice

        let json = serde_json::to_string(orch.state("t1").unwrap()).unwrap();

        // A fresh engine over an identically seeded database picks the
        // conversation up from the restored checkpoint.
        let (mut fresh, _) = orchestrator();
        fresh.restore(serde_json::from_str(&json).unwrap());
        let turn = fresh.resume("t1", "1").unwrap();
        assert!(turn.messages[0].contains("¿Confirmas esta cita?"));
    }

    #[test]
    fn finished_and_unknown_threads_are_rejected() {
        let (mut orch, _) = orchestrator();
        assert!(matches!(
            orch.resume("nope", "hola"),
            Err(FlowError::UnknownThread(_))
        ));
        assert!(matches!(
            orch.start("t1", "pac-999"),
            Err(FlowError::UnknownPatient(_))
        ));

        orch.start("t1", "pac-001").unwrap();
        orch.resume("t1", "1").unwrap();
        orch.resume("t1", "1").unwrap();
        orch.resume("t1", "no").unwrap(); // cancelled
        assert!(matches!(
            orch.resume("t1", "hola"),
            Err(FlowError::Finished(_))
        ));
    }
}
