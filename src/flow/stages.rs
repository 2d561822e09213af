//! Stage logic. Each `enter_*` function runs when the conversation reaches
//! a phase; each `resume_*` function interprets the patient's answer to a
//! [`Pending`] question. Stages are pure over `(context, state, input)`:
//! they return a [`StageOutput`] and never mutate the state themselves.
//!
//! Unresolvable answers never dead-end the conversation: every resume path
//! settles on the first listed option as a last resort, and the patient can
//! still reject it at the confirmation step.

use chrono::NaiveDate;

use super::messages;
use super::state::{ConversationState, Pending, StageOutput, StateUpdate};
use super::{FlowError, Phase};
use crate::calendar::DateWindow;
use crate::db::{DatabaseError, Store};
use crate::llm::Assistant;
use crate::models::{Doctor, DoctorSlots, Location, Slot};
use crate::parser::{self, SlotReply};

/// Shared capabilities handed to every stage. `today` is injected so the
/// whole flow is deterministic under test.
pub struct StageContext<'a> {
    pub store: &'a Store,
    pub assistant: &'a Assistant,
    pub today: NaiveDate,
}

impl StageContext<'_> {
    fn specialty(&self, state: &ConversationState) -> Result<String, FlowError> {
        Ok(self.store.specialty_name(&state.patient.specialty_id)?)
    }

    fn window(&self, state: &ConversationState) -> DateWindow {
        state
            .window
            .unwrap_or_else(|| DateWindow::current_week(self.today))
    }
}

fn phrase_or(assistant: &Assistant, prompt: &str, fallback: String) -> String {
    assistant.phrase(prompt).unwrap_or(fallback)
}

/// Every offered slot as (doctor_idx, slot_idx), in display order. The
/// literal-index tier and the classifier both number options this way.
fn flat_options(doctors: &[DoctorSlots]) -> Vec<(usize, usize)> {
    let mut options = Vec::new();
    for (d, entry) in doctors.iter().enumerate() {
        for s in 0..entry.slots.len() {
            options.push((d, s));
        }
    }
    options
}

fn day_options(doctors: &[DoctorSlots], date: NaiveDate) -> Vec<(usize, usize)> {
    let mut options = Vec::new();
    for (d, entry) in doctors.iter().enumerate() {
        for (s, slot) in entry.slots.iter().enumerate() {
            if slot.date == date {
                options.push((d, s));
            }
        }
    }
    options
}

fn select(selection: (usize, usize)) -> StageOutput {
    StageOutput::goto(
        Vec::new(),
        StateUpdate {
            selected: Some(selection),
            ..Default::default()
        },
        Phase::Confirm,
    )
}

// ── ChooseLocation ──────────────────────────────────────────

pub fn enter_choose_location(
    ctx: &StageContext,
    state: &ConversationState,
) -> Result<StageOutput, FlowError> {
    let specialty = ctx.specialty(state)?;
    let mut locations = ctx.store.find_locations_with_availability(
        &state.patient.district,
        &state.patient.specialty_id,
        ctx.today,
    )?;

    if locations.is_empty() {
        tracing::info!(
            patient = %state.patient.id,
            district = %state.patient.district,
            "No locations with availability"
        );
        return Ok(StageOutput::goto(
            vec![messages::no_locations(&state.patient, &specialty)],
            StateUpdate::default(),
            Phase::NoLocations,
        ));
    }

    // Home-district locations first; query order otherwise.
    locations.sort_by_key(|l| l.district != state.patient.district);

    let intro = phrase_or(
        ctx.assistant,
        &messages::location_intro_prompt(&state.patient, &specialty),
        messages::location_intro(&state.patient, &specialty),
    );
    let msg = format!(
        "{intro}\n\n{}\n\n{}",
        messages::location_list(&locations),
        messages::ask_location()
    );

    Ok(StageOutput::ask(
        vec![msg],
        StateUpdate {
            locations: Some(locations),
            ..Default::default()
        },
        Pending::LocationChoice,
    ))
}

pub fn resume_location_choice(
    ctx: &StageContext,
    state: &ConversationState,
    text: &str,
) -> Result<StageOutput, FlowError> {
    let idx = parser::resolve_location(text, &state.locations, ctx.assistant).unwrap_or(0);
    let chosen = match state.locations.get(idx) {
        Some(location) => location.clone(),
        None => {
            let specialty = ctx.specialty(state)?;
            return Ok(StageOutput::goto(
                vec![messages::no_locations(&state.patient, &specialty)],
                StateUpdate::default(),
                Phase::NoLocations,
            ));
        }
    };

    tracing::debug!(location = %chosen.id, "Location chosen");
    Ok(StageOutput::goto(
        Vec::new(),
        StateUpdate {
            chosen_location: Some(chosen),
            ..Default::default()
        },
        Phase::ChooseDoctorAndSlot,
    ))
}

// ── ChooseDoctorAndSlot ─────────────────────────────────────

pub fn enter_choose_doctor_slot(
    ctx: &StageContext,
    state: &ConversationState,
) -> Result<StageOutput, FlowError> {
    let Some(location) = state.chosen_location.clone() else {
        return enter_choose_location(ctx, state);
    };
    let specialty = ctx.specialty(state)?;
    let window = ctx.window(state);

    let doctors =
        ctx.store
            .find_doctors_with_slots(&location.id, &state.patient.specialty_id, window)?;

    if doctors.is_empty() {
        // The extended window was the one re-query; still nothing ends it.
        if state.window_extended {
            return Ok(StageOutput::goto(
                vec![messages::no_doctors(&location, &specialty)],
                StateUpdate::default(),
                Phase::NoDoctors,
            ));
        }
        let next = window.next_week();
        if ctx
            .store
            .has_future_availability(&location.id, &state.patient.specialty_id, next.from)?
        {
            return Ok(StageOutput::ask(
                vec![messages::next_week_offer(&location, &specialty, next)],
                StateUpdate {
                    window: Some(window),
                    ..Default::default()
                },
                Pending::NextWeekOffer { window: next },
            ));
        }
        return offer_alternatives_or_give_up(ctx, state, &location, &specialty);
    }

    let intro = phrase_or(
        ctx.assistant,
        &messages::doctor_intro_prompt(&location, &specialty),
        messages::doctor_intro(&location, &specialty, window),
    );
    let msg = format!(
        "{intro}\n{}\n{}",
        messages::doctor_listing(&doctors),
        messages::ask_doctor_slot()
    );

    Ok(StageOutput::ask(
        vec![msg],
        StateUpdate {
            doctors: Some(doctors),
            window: Some(window),
            ..Default::default()
        },
        Pending::DoctorSlotChoice,
    ))
}

/// The alternative-location offer is made at most once; after that the
/// conversation ends with a referral to the contact line.
fn offer_alternatives_or_give_up(
    ctx: &StageContext,
    state: &ConversationState,
    location: &Location,
    specialty: &str,
) -> Result<StageOutput, FlowError> {
    if !state.offered_alternatives {
        let offered: Vec<Location> = ctx
            .store
            .find_locations_with_availability(
                &state.patient.district,
                &state.patient.specialty_id,
                ctx.today,
            )?
            .into_iter()
            .filter(|l| l.id != location.id)
            .collect();

        if !offered.is_empty() {
            return Ok(StageOutput::ask(
                vec![messages::alternative_offer(location, specialty, &offered)],
                StateUpdate {
                    offered_alternatives: true,
                    ..Default::default()
                },
                Pending::AlternativeLocation { offered },
            ));
        }
    }

    Ok(StageOutput::goto(
        vec![messages::no_doctors(location, specialty)],
        StateUpdate::default(),
        Phase::NoDoctors,
    ))
}

pub fn resume_doctor_slot_choice(
    ctx: &StageContext,
    state: &ConversationState,
    text: &str,
) -> Result<StageOutput, FlowError> {
    // Alternative-seeking beats everything, including keyword matches.
    if parser::wants_next_week(text) {
        let next = ctx.window(state).next_week();
        return Ok(StageOutput::goto(
            Vec::new(),
            StateUpdate {
                window: Some(next),
                ..Default::default()
            },
            Phase::ChooseDoctorAndSlot,
        ));
    }

    let flat = flat_options(&state.doctors);
    if flat.is_empty() {
        return enter_choose_doctor_slot(ctx, state);
    }

    if let Some(i) = parser::parse_index(text, flat.len()) {
        return Ok(select(flat[i]));
    }

    match parser::classify_slot_reply(text, &state.doctors) {
        SlotReply::Full {
            doctor_idx,
            slot_idx,
        } => Ok(select((doctor_idx, slot_idx))),

        SlotReply::DoctorAndDay { doctor_idx, date } => {
            let entry = &state.doctors[doctor_idx];
            let candidates: Vec<usize> = entry
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.date == date)
                .map(|(i, _)| i)
                .collect();
            match candidates.as_slice() {
                [only] => Ok(select((doctor_idx, *only))),
                _ => {
                    let slots: Vec<&Slot> = candidates.iter().map(|&i| &entry.slots[i]).collect();
                    Ok(StageOutput::ask(
                        vec![messages::ask_hour(&entry.doctor, date, &slots)],
                        StateUpdate::default(),
                        Pending::HourForDoctorDay { doctor_idx, date },
                    ))
                }
            }
        }

        SlotReply::DoctorOnly { doctor_idx } => {
            let entry = &state.doctors[doctor_idx];
            if entry.slots.len() == 1 {
                return Ok(select((doctor_idx, 0)));
            }
            Ok(StageOutput::ask(
                vec![messages::ask_slot_for_doctor(&entry.doctor, &entry.slots)],
                StateUpdate::default(),
                Pending::SlotForDoctor { doctor_idx },
            ))
        }

        SlotReply::DayOnly { date } => {
            let options = day_options(&state.doctors, date);
            match options.as_slice() {
                [only] => Ok(select(*only)),
                options if options.iter().all(|(d, _)| *d == options[0].0) => {
                    // All of that day's slots belong to one doctor: only the
                    // hour is open.
                    let doctor_idx = options[0].0;
                    let entry = &state.doctors[doctor_idx];
                    let slots: Vec<&Slot> =
                        options.iter().map(|&(_, s)| &entry.slots[s]).collect();
                    Ok(StageOutput::ask(
                        vec![messages::ask_hour(&entry.doctor, date, &slots)],
                        StateUpdate::default(),
                        Pending::HourForDoctorDay { doctor_idx, date },
                    ))
                }
                _ => {
                    let pairs: Vec<(&Doctor, &Slot)> = options
                        .iter()
                        .map(|&(d, s)| (&state.doctors[d].doctor, &state.doctors[d].slots[s]))
                        .collect();
                    Ok(StageOutput::ask(
                        vec![messages::ask_slot_for_day(date, &pairs)],
                        StateUpdate::default(),
                        Pending::SlotForDay { date },
                    ))
                }
            }
        }

        SlotReply::Unrecognized => {
            let options_text = messages::flat_options_text(&state.doctors);
            if let Some(i) = ctx
                .assistant
                .classify_option(text, &options_text, flat.len())
            {
                return Ok(select(flat[i]));
            }
            tracing::debug!("Unrecognized slot reply, defaulting to first option");
            let mut output = select(flat[0]);
            output.messages.push(messages::defaulted_to_first());
            Ok(output)
        }
    }
}

pub fn resume_next_week_offer(
    ctx: &StageContext,
    state: &ConversationState,
    text: &str,
    window: DateWindow,
) -> Result<StageOutput, FlowError> {
    if parser::is_affirmative(text) {
        return Ok(StageOutput::goto(
            Vec::new(),
            StateUpdate {
                window: Some(window),
                window_extended: true,
                ..Default::default()
            },
            Phase::ChooseDoctorAndSlot,
        ));
    }
    // Declining the offer ends the conversation with the referral.
    let Some(location) = state.chosen_location.clone() else {
        return enter_choose_location(ctx, state);
    };
    let specialty = ctx.specialty(state)?;
    Ok(StageOutput::goto(
        vec![messages::no_doctors(&location, &specialty)],
        StateUpdate::default(),
        Phase::NoDoctors,
    ))
}

pub fn resume_alternative_location(
    ctx: &StageContext,
    state: &ConversationState,
    text: &str,
    offered: &[Location],
) -> Result<StageOutput, FlowError> {
    let declined = parser::normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .any(|t| t == "no");

    let idx = if parser::is_affirmative(text) && offered.len() == 1 {
        Some(0)
    } else {
        parser::resolve_location(text, offered, ctx.assistant)
    };

    let chosen = match idx {
        Some(i) => offered[i].clone(),
        None if declined => {
            let specialty = ctx.specialty(state)?;
            let location = state.chosen_location.clone().unwrap_or_else(|| offered[0].clone());
            return Ok(StageOutput::goto(
                vec![messages::no_doctors(&location, &specialty)],
                StateUpdate::default(),
                Phase::NoDoctors,
            ));
        }
        None => offered[0].clone(),
    };

    Ok(StageOutput::goto(
        Vec::new(),
        StateUpdate {
            chosen_location: Some(chosen),
            reset_window: true,
            ..Default::default()
        },
        Phase::ChooseDoctorAndSlot,
    ))
}

// ── Targeted follow-ups ─────────────────────────────────────
//
// These resolve in one turn: the remaining ambiguity is small and the
// options were just listed, so an unreadable answer takes the first one.

pub fn resume_hour_for_doctor_day(
    ctx: &StageContext,
    state: &ConversationState,
    text: &str,
    doctor_idx: usize,
    date: NaiveDate,
) -> Result<StageOutput, FlowError> {
    let Some(entry) = state.doctors.get(doctor_idx) else {
        return enter_choose_doctor_slot(ctx, state);
    };
    let candidates: Vec<usize> = entry
        .slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.date == date)
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return enter_choose_doctor_slot(ctx, state);
    }

    if let Some(t) = parser::find_time(text) {
        if let Some(&i) = candidates.iter().find(|&&i| entry.slots[i].start_time == t) {
            return Ok(select((doctor_idx, i)));
        }
    }
    if let Some(n) = parser::parse_index(text, candidates.len()) {
        return Ok(select((doctor_idx, candidates[n])));
    }
    let options_text = candidates
        .iter()
        .enumerate()
        .map(|(n, &i)| format!("{}. {}", n + 1, entry.slots[i].start_hhmm()))
        .collect::<Vec<_>>()
        .join("\n");
    if let Some(n) = ctx
        .assistant
        .classify_option(text, &options_text, candidates.len())
    {
        return Ok(select((doctor_idx, candidates[n])));
    }
    Ok(select((doctor_idx, candidates[0])))
}

pub fn resume_slot_for_doctor(
    ctx: &StageContext,
    state: &ConversationState,
    text: &str,
    doctor_idx: usize,
) -> Result<StageOutput, FlowError> {
    let Some(entry) = state.doctors.get(doctor_idx) else {
        return enter_choose_doctor_slot(ctx, state);
    };
    if entry.slots.is_empty() {
        return enter_choose_doctor_slot(ctx, state);
    }

    if let Some(n) = parser::parse_index(text, entry.slots.len()) {
        return Ok(select((doctor_idx, n)));
    }

    // A weekday narrows the day; an hour narrows within it.
    let day = parser::find_weekday(text).and_then(|wd| {
        entry
            .slots
            .iter()
            .map(|s| s.date)
            .find(|d| chrono::Datelike::weekday(d) == wd)
    });
    let time = parser::find_time(text);
    let matching: Vec<usize> = entry
        .slots
        .iter()
        .enumerate()
        .filter(|(_, s)| day.map_or(true, |d| s.date == d))
        .filter(|(_, s)| time.map_or(true, |t| s.start_time == t))
        .map(|(i, _)| i)
        .collect();
    if (day.is_some() || time.is_some()) && !matching.is_empty() {
        return Ok(select((doctor_idx, matching[0])));
    }

    let options_text = entry
        .slots
        .iter()
        .enumerate()
        .map(|(n, s)| format!("{}. {} {}", n + 1, s.date.format("%Y-%m-%d"), s.start_hhmm()))
        .collect::<Vec<_>>()
        .join("\n");
    if let Some(n) = ctx
        .assistant
        .classify_option(text, &options_text, entry.slots.len())
    {
        return Ok(select((doctor_idx, n)));
    }
    Ok(select((doctor_idx, 0)))
}

pub fn resume_slot_for_day(
    ctx: &StageContext,
    state: &ConversationState,
    text: &str,
    date: NaiveDate,
) -> Result<StageOutput, FlowError> {
    let options = day_options(&state.doctors, date);
    if options.is_empty() {
        return enter_choose_doctor_slot(ctx, state);
    }

    if let Some(n) = parser::parse_index(text, options.len()) {
        return Ok(select(options[n]));
    }

    let norm = parser::normalize(text);
    let time = parser::find_time(text);
    let matching: Vec<(usize, usize)> = options
        .iter()
        .copied()
        .filter(|&(d, _)| {
            state.doctors[d].doctor.last_names.split_whitespace().any(|surname| {
                let key = parser::normalize(surname);
                key.len() >= 3 && norm.contains(&key)
            })
        })
        .filter(|&(d, s)| time.map_or(true, |t| state.doctors[d].slots[s].start_time == t))
        .collect();
    if let Some(&first) = matching.first() {
        return Ok(select(first));
    }
    if let Some(t) = time {
        let by_time: Vec<(usize, usize)> = options
            .iter()
            .copied()
            .filter(|&(d, s)| state.doctors[d].slots[s].start_time == t)
            .collect();
        if let [only] = by_time.as_slice() {
            return Ok(select(*only));
        }
    }

    let options_text = options
        .iter()
        .enumerate()
        .map(|(n, &(d, s))| {
            format!(
                "{}. Dr(a). {} {}",
                n + 1,
                state.doctors[d].doctor.last_names,
                state.doctors[d].slots[s].start_hhmm()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    if let Some(n) = ctx
        .assistant
        .classify_option(text, &options_text, options.len())
    {
        return Ok(select(options[n]));
    }
    Ok(select(options[0]))
}

// ── Confirm / Book ──────────────────────────────────────────

pub fn enter_confirm(
    ctx: &StageContext,
    state: &ConversationState,
) -> Result<StageOutput, FlowError> {
    let (Some((doctor, slot)), Some(location)) =
        (state.selected_slot(), state.chosen_location.as_ref())
    else {
        return enter_choose_doctor_slot(ctx, state);
    };
    let specialty = ctx.specialty(state)?;
    let msg = messages::confirmation_summary(&state.patient, location, doctor, slot, &specialty);
    Ok(StageOutput::ask(
        vec![msg],
        StateUpdate::default(),
        Pending::Confirmation,
    ))
}

pub fn resume_confirmation(text: &str) -> StageOutput {
    if parser::is_affirmative(text) {
        StageOutput::goto(Vec::new(), StateUpdate::default(), Phase::Book)
    } else {
        StageOutput::goto(
            vec![messages::cancelled()],
            StateUpdate::default(),
            Phase::Cancelled,
        )
    }
}

pub fn enter_book(
    ctx: &StageContext,
    state: &ConversationState,
) -> Result<StageOutput, FlowError> {
    let (Some((doctor, slot)), Some(location)) =
        (state.selected_slot(), state.chosen_location.as_ref())
    else {
        return enter_choose_doctor_slot(ctx, state);
    };

    match ctx
        .store
        .book_slot(&state.patient.id, &doctor.id, &location.id, &slot.id)
    {
        Ok(appointment) => {
            tracing::info!(
                appointment = %appointment.id,
                slot = %slot.id,
                "Appointment booked"
            );
            let msg = messages::booked(&appointment, &state.patient, location, doctor, slot);
            Ok(StageOutput::goto(
                vec![msg],
                StateUpdate {
                    appointment: Some(appointment),
                    ..Default::default()
                },
                Phase::Done,
            ))
        }
        Err(DatabaseError::SlotUnavailable(slot_id)) => {
            tracing::warn!(slot = %slot_id, "Slot taken during booking, relisting");
            Ok(StageOutput::goto(
                vec![messages::slot_taken()],
                StateUpdate {
                    reset_selection: true,
                    ..Default::default()
                },
                Phase::ChooseDoctorAndSlot,
            ))
        }
        Err(e) => Err(e.into()),
    }
}
