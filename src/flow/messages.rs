//! Patient-facing message templates and the fact prompts handed to the
//! phrasing model. Templates are the source of truth: generated prose only
//! ever replaces the intro around a listing, never the listing itself, so
//! numbered options stay parseable.

use chrono::NaiveDate;

use crate::calendar::{self, DateWindow};
use crate::config;
use crate::models::{Appointment, Doctor, DoctorSlots, Location, Patient, Slot};

// ── ChooseLocation ──────────────────────────────────────────

pub fn no_locations(patient: &Patient, specialty: &str) -> String {
    format!(
        "Lo siento {}, en este momento no encontramos sedes cercanas a {} \
         con disponibilidad en {}. 😔\n\
         Te recomendamos llamar al {} para más opciones.",
        patient.first_names,
        patient.district,
        specialty,
        config::CONTACT_PHONE
    )
}

/// Numbered location listing, shown verbatim below the intro.
pub fn location_list(locations: &[Location]) -> String {
    locations
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "  {}. 🏥 {} — {} ({})",
                i + 1,
                s.name,
                s.address,
                s.district
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn location_intro(patient: &Patient, specialty: &str) -> String {
    format!(
        "¡Hola {}! 🏥 Veo que necesitas una consulta de {}. \
         Estas son las sedes cercanas a {} con disponibilidad:",
        patient.first_names, specialty, patient.district
    )
}

/// Facts prompt for the phrasing model; its output replaces the templated
/// intro only.
pub fn location_intro_prompt(patient: &Patient, specialty: &str) -> String {
    format!(
        "El paciente {} vive en {} y necesita una consulta de {}.\n\
         Genera un saludo breve (2 frases máximo) que lo salude por su nombre, \
         confirme que necesita {} y anuncie que a continuación van las sedes \
         disponibles numeradas. NO inventes sedes ni números.",
        patient.first_names, patient.district, specialty, specialty
    )
}

pub fn ask_location() -> String {
    "¿Cuál de estas sedes prefieres? 😊".to_string()
}

// ── ChooseDoctorAndSlot ─────────────────────────────────────

/// Doctor listing grouped by doctor and date, hours comma-joined.
pub fn doctor_listing(doctors: &[DoctorSlots]) -> String {
    let mut text = String::new();
    for entry in doctors {
        text.push_str(&format!(
            "\n👨‍⚕️ {} ({})\n",
            entry.doctor.display_name(),
            entry.doctor.license_number
        ));
        let mut current_date: Option<NaiveDate> = None;
        let mut hours: Vec<String> = Vec::new();
        for slot in &entry.slots {
            if current_date != Some(slot.date) {
                if let Some(date) = current_date {
                    text.push_str(&format!(
                        "   📅 {}: {}\n",
                        calendar::format_date(date),
                        hours.join(", ")
                    ));
                }
                current_date = Some(slot.date);
                hours.clear();
            }
            hours.push(slot.start_hhmm());
        }
        if let Some(date) = current_date {
            text.push_str(&format!(
                "   📅 {}: {}\n",
                calendar::format_date(date),
                hours.join(", ")
            ));
        }
    }
    text
}

pub fn doctor_intro(location: &Location, specialty: &str, window: DateWindow) -> String {
    format!(
        "Perfecto, {} 🏥. Estos son los doctores de {} con horarios \
         disponibles del {} al {}:",
        location.name,
        specialty,
        calendar::format_date(window.from),
        calendar::format_date(window.to)
    )
}

pub fn doctor_intro_prompt(location: &Location, specialty: &str) -> String {
    format!(
        "El paciente eligió la sede {}. Especialidad: {}.\n\
         Genera una frase breve que confirme la sede elegida y anuncie que \
         a continuación van los doctores con sus horarios. NO inventes \
         doctores ni horarios.",
        location.name, specialty
    )
}

pub fn ask_doctor_slot() -> String {
    "¿Con qué doctor y en qué horario te gustaría atenderte? 😊".to_string()
}

/// Flat numbered option lines for the classifier fallback.
pub fn flat_options_text(doctors: &[DoctorSlots]) -> String {
    let mut lines = Vec::new();
    let mut n = 0;
    for entry in doctors {
        for slot in &entry.slots {
            n += 1;
            lines.push(format!(
                "{}. Dr(a). {} - {} {}",
                n,
                entry.doctor.last_names,
                slot.date.format("%Y-%m-%d"),
                slot.start_hhmm()
            ));
        }
    }
    lines.join("\n")
}

pub fn next_week_offer(location: &Location, specialty: &str, window: DateWindow) -> String {
    format!(
        "Lo siento, no hay horarios de {} en {} esta semana. 😔\n\
         ¿Quieres ver los horarios del {} al {}? (sí/no)",
        specialty,
        location.name,
        calendar::format_date(window.from),
        calendar::format_date(window.to)
    )
}

pub fn alternative_offer(location: &Location, specialty: &str, offered: &[Location]) -> String {
    format!(
        "Lo siento, en este momento no hay disponibilidad en {} para {}. 😔\n\n\
         Pero tenemos disponibilidad en estas otras sedes cercanas:\n\n{}\n\n\
         ¿Cuál de estas sedes prefieres? 😊",
        location.name,
        specialty,
        location_list(offered)
    )
}

pub fn no_doctors(location: &Location, specialty: &str) -> String {
    format!(
        "Lo siento, no hay disponibilidad en {} para {} y tampoco hay otras \
         opciones cercanas. 😔\n\
         Te recomendamos llamar al {} para más opciones.",
        location.name,
        specialty,
        config::CONTACT_PHONE
    )
}

// ── Targeted follow-ups ─────────────────────────────────────

pub fn ask_hour(doctor: &Doctor, date: NaiveDate, slots: &[&Slot]) -> String {
    let hours = slots
        .iter()
        .map(|s| s.start_hhmm())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "El {} el {} tiene estos horarios: {} 🕐\n¿A qué hora prefieres?",
        calendar::format_date(date),
        doctor.display_name(),
        hours
    )
}

pub fn ask_slot_for_doctor(doctor: &Doctor, slots: &[Slot]) -> String {
    let options = slots
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "  {}. 📅 {} a las {}",
                i + 1,
                calendar::format_date(s.date),
                s.start_hhmm()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "El {} tiene estos horarios disponibles:\n{}\n¿Cuál prefieres? 😊",
        doctor.display_name(),
        options
    )
}

/// Options for a settled day, across doctors.
pub fn ask_slot_for_day(date: NaiveDate, options: &[(&Doctor, &Slot)]) -> String {
    let lines = options
        .iter()
        .enumerate()
        .map(|(i, (d, s))| format!("  {}. 👨‍⚕️ {} a las {}", i + 1, d.display_name(), s.start_hhmm()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Para el {} tenemos estas opciones:\n{}\n¿Cuál prefieres? 😊",
        calendar::format_date(date),
        lines
    )
}

pub fn defaulted_to_first() -> String {
    "No logré identificar tu elección, así que te propongo la primera opción. \
     Podrás confirmarla o rechazarla enseguida. 😊"
        .to_string()
}

// ── Confirm / Book ──────────────────────────────────────────

pub fn confirmation_summary(
    patient: &Patient,
    location: &Location,
    doctor: &Doctor,
    slot: &Slot,
    specialty: &str,
) -> String {
    format!(
        "📋 **Resumen de tu cita:**\n\n\
         🏥 **Sede:** {}\n\
         📍 **Dirección:** {}\n\
         👨‍⚕️ **Doctor:** {}\n\
         🩺 **Especialidad:** {}\n\
         📅 **Fecha:** {}\n\
         🕐 **Hora:** {} - {}\n\
         👤 **Paciente:** {}\n\n\
         ¿Confirmas esta cita? (sí/no)",
        location.name,
        location.address,
        doctor.display_name(),
        specialty,
        calendar::format_date(slot.date),
        slot.start_hhmm(),
        slot.end_hhmm(),
        patient.full_name()
    )
}

pub fn booked(
    appointment: &Appointment,
    patient: &Patient,
    location: &Location,
    doctor: &Doctor,
    slot: &Slot,
) -> String {
    format!(
        "✅ ¡Tu cita ha sido confirmada exitosamente!\n\n\
         📌 **Número de cita:** {}\n\
         🏥 {} — {}\n\
         👨‍⚕️ {}\n\
         📅 {} de {} a {}\n\n\
         📧 Te enviaremos un correo de confirmación a {}.\n\n\
         Recuerda llegar 15 minutos antes de tu cita. \
         ¿Hay algo más en lo que pueda ayudarte? 😊",
        appointment.id,
        location.name,
        location.address,
        doctor.display_name(),
        calendar::format_date(slot.date),
        slot.start_hhmm(),
        slot.end_hhmm(),
        patient.email
    )
}

pub fn slot_taken() -> String {
    "Lo siento, ese horario acaba de ser tomado por otro paciente. 😔 \
     Estos son los horarios actualizados:"
        .to_string()
}

pub fn cancelled() -> String {
    "Entendido, la cita no fue agendada. ¿Hay algo más en lo que pueda ayudarte? 😊".to_string()
}
