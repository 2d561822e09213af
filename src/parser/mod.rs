//! Tiered selection parser: maps one line of free-form patient text to a
//! structured choice, cheapest strategy first.
//!
//! 1. Literal index match (no LLM)
//! 2. Keyword match against canonical fields (no LLM)
//! 3. Composite doctor/date/time extraction (no LLM)
//! 4. External classifier fallback — advisory only, range-checked
//!
//! When every tier fails, callers apply an explicit default (the first
//! listed option) so the conversation always makes progress.

use chrono::{NaiveDate, NaiveTime, Weekday};
use regex::Regex;
use std::sync::OnceLock;

use crate::calendar;
use crate::llm::Assistant;
use crate::models::{DoctorSlots, Location};

// ── Normalization ───────────────────────────────────────────

/// Lowercase and fold Spanish diacritics so "Muñoz" matches "munoz".
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            'ñ' => 'n',
            _ => c,
        })
        .collect()
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
}

// ── Tier 1: literal index ───────────────────────────────────

/// Zero-based index if the whole trimmed text is an integer in `1..=len`.
pub fn parse_index(text: &str, len: usize) -> Option<usize> {
    let n: usize = text.trim().parse().ok()?;
    if (1..=len).contains(&n) {
        Some(n - 1)
    } else {
        None
    }
}

// ── Tier 2: keyword matches ─────────────────────────────────

/// Match a location by name, district, or the last token of its name.
pub fn match_location_keywords(text: &str, locations: &[Location]) -> Option<usize> {
    let norm = normalize(text);
    locations.iter().position(|loc| {
        let mut keywords = vec![normalize(&loc.name), normalize(&loc.district)];
        if let Some(last) = loc.name.split_whitespace().last() {
            keywords.push(normalize(last));
        }
        keywords.iter().any(|k| !k.is_empty() && norm.contains(k))
    })
}

/// Resolve a location choice through tiers 1 → 2 → 4.
pub fn resolve_location(
    text: &str,
    locations: &[Location],
    assistant: &Assistant,
) -> Option<usize> {
    if let Some(idx) = parse_index(text, locations.len()) {
        return Some(idx);
    }
    if let Some(idx) = match_location_keywords(text, locations) {
        return Some(idx);
    }
    let options_text = locations
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{}. {} ({})", i + 1, l.name, l.district))
        .collect::<Vec<_>>()
        .join("\n");
    assistant.classify_option(text, &options_text, locations.len())
}

/// Resolve a plain numbered choice through tiers 1 → 4.
pub fn resolve_option_number(
    text: &str,
    max: usize,
    options_text: &str,
    assistant: &Assistant,
) -> Option<usize> {
    if let Some(idx) = parse_index(text, max) {
        return Some(idx);
    }
    assistant.classify_option(text, options_text, max)
}

/// First `HH[:MM]` token inside plausible clinic hours (06–20).
pub fn find_time(text: &str) -> Option<NaiveTime> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\b(\d{1,2})(?::([0-5]\d))?\b").unwrap());

    for caps in re.captures_iter(text) {
        let hour: u32 = caps[1].parse().ok()?;
        if !(6..=20).contains(&hour) {
            continue;
        }
        let minute: u32 = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0);
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    None
}

/// First Spanish weekday name appearing as a token.
pub fn find_weekday(text: &str) -> Option<Weekday> {
    tokens(&normalize(text)).find_map(calendar::weekday_from_name)
}

// ── Tier 3: composite doctor/date/time extraction ───────────

/// Classification of a free-form doctor+slot reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotReply {
    /// Doctor, date, and time all resolved to one concrete slot.
    Full { doctor_idx: usize, slot_idx: usize },
    /// Doctor and date known, hour still ambiguous.
    DoctorAndDay { doctor_idx: usize, date: NaiveDate },
    /// Only a doctor mention was detected.
    DoctorOnly { doctor_idx: usize },
    /// Only a date mention was detected.
    DayOnly { date: NaiveDate },
    Unrecognized,
}

fn mentions_doctor(norm: &str, doctors: &[DoctorSlots]) -> Option<usize> {
    doctors.iter().position(|ds| {
        ds.doctor.last_names.split_whitespace().any(|surname| {
            let key = normalize(surname);
            key.len() >= 3 && norm.contains(&key)
        })
    })
}

/// A date counts as mentioned if its weekday name, its ISO form, or its
/// formatted Spanish form appears. Candidates come from the offered slots
/// only, so a bare weekday resolves to a real bookable date.
fn mentioned_date(norm: &str, candidates: &[NaiveDate]) -> Option<NaiveDate> {
    for date in candidates {
        let iso = date.format("%Y-%m-%d").to_string();
        let formatted = normalize(&calendar::format_date(*date));
        if norm.contains(&iso) || norm.contains(&formatted) {
            return Some(*date);
        }
    }
    let weekday = find_weekday(norm)?;
    candidates.iter().copied().find(|d| {
        chrono::Datelike::weekday(d) == weekday
    })
}

fn distinct_dates(doctors: &[DoctorSlots], doctor_idx: Option<usize>) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for (i, ds) in doctors.iter().enumerate() {
        if doctor_idx.is_some_and(|sel| sel != i) {
            continue;
        }
        for slot in &ds.slots {
            if !dates.contains(&slot.date) {
                dates.push(slot.date);
            }
        }
    }
    dates
}

/// Independently detect a doctor, a date, and a time in the utterance and
/// classify it into one of the five composite cases.
pub fn classify_slot_reply(text: &str, doctors: &[DoctorSlots]) -> SlotReply {
    let norm = normalize(text);

    let doctor_idx = mentions_doctor(&norm, doctors);
    let date = mentioned_date(&norm, &distinct_dates(doctors, doctor_idx));
    let time = find_time(&norm);

    match (doctor_idx, date, time) {
        (Some(doctor_idx), Some(date), Some(time)) => {
            let slots = &doctors[doctor_idx].slots;
            match slots
                .iter()
                .position(|s| s.date == date && s.start_time == time)
            {
                Some(slot_idx) => SlotReply::Full {
                    doctor_idx,
                    slot_idx,
                },
                // The stated hour doesn't exist that day — fall back to
                // resolving the hour in a targeted follow-up.
                None => SlotReply::DoctorAndDay { doctor_idx, date },
            }
        }
        (Some(doctor_idx), Some(date), None) => SlotReply::DoctorAndDay { doctor_idx, date },
        (Some(doctor_idx), None, Some(time)) => {
            let slots = &doctors[doctor_idx].slots;
            let matching: Vec<usize> = slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.start_time == time)
                .map(|(i, _)| i)
                .collect();
            match matching.as_slice() {
                [slot_idx] => SlotReply::Full {
                    doctor_idx,
                    slot_idx: *slot_idx,
                },
                _ => SlotReply::DoctorOnly { doctor_idx },
            }
        }
        (Some(doctor_idx), None, None) => SlotReply::DoctorOnly { doctor_idx },
        (None, Some(date), Some(time)) => {
            let mut matching = Vec::new();
            for (doctor_idx, ds) in doctors.iter().enumerate() {
                for (slot_idx, s) in ds.slots.iter().enumerate() {
                    if s.date == date && s.start_time == time {
                        matching.push((doctor_idx, slot_idx));
                    }
                }
            }
            match matching.as_slice() {
                [(doctor_idx, slot_idx)] => SlotReply::Full {
                    doctor_idx: *doctor_idx,
                    slot_idx: *slot_idx,
                },
                _ => SlotReply::DayOnly { date },
            }
        }
        (None, Some(date), None) => SlotReply::DayOnly { date },
        (None, None, _) => SlotReply::Unrecognized,
    }
}

// ── Intent keyword matches (no LLM, ever) ───────────────────

const AFFIRMATIVE_TOKENS: &[&str] = &["si", "s", "yes", "ok", "dale", "claro", "confirmo", "confirmar"];
const AFFIRMATIVE_PHRASES: &[&str] = &["por supuesto", "de acuerdo", "esta bien"];

/// Pure keyword/synonym match; absence of any affirmative means "no".
pub fn is_affirmative(text: &str) -> bool {
    let norm = normalize(text);
    if tokens(&norm).any(|t| AFFIRMATIVE_TOKENS.contains(&t)) {
        return true;
    }
    AFFIRMATIVE_PHRASES.iter().any(|p| norm.contains(p))
}

const NEXT_WEEK_PHRASES: &[&str] = &[
    "proxima semana",
    "otra semana",
    "siguiente semana",
    "semana que viene",
    "mas opciones",
    "otras opciones",
    "otros horarios",
    "otro horario",
    "mas adelante",
];

/// Alternative-seeking phrases that trigger a shifted date window.
pub fn wants_next_week(text: &str) -> bool {
    let norm = normalize(text);
    NEXT_WEEK_PHRASES.iter().any(|p| norm.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Assistant, MockLlmClient};
    use crate::models::{Doctor, Slot, SlotStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn location(id: &str, name: &str, district: &str) -> Location {
        Location {
            id: id.into(),
            name: name.into(),
            address: "Av. Principal 100".into(),
            district: district.into(),
            nearby_districts: vec![],
        }
    }

    fn doctor_slots(id: &str, last_names: &str, slots: &[(NaiveDate, NaiveTime)]) -> DoctorSlots {
        DoctorSlots {
            doctor: Doctor {
                id: id.into(),
                first_names: "Ana".into(),
                last_names: last_names.into(),
                license_number: "CMP-10001".into(),
                location_id: "sede-001".into(),
                specialty_id: "esp-002".into(),
            },
            slots: slots
                .iter()
                .enumerate()
                .map(|(i, (d, t))| Slot {
                    id: format!("hor-{:05}", i + 1),
                    doctor_id: id.into(),
                    date: *d,
                    start_time: *t,
                    end_time: *t + chrono::Duration::hours(1),
                    status: SlotStatus::Available,
                })
                .collect(),
        }
    }

    fn failing_assistant() -> Assistant {
        Assistant::new(Box::new(MockLlmClient::failing()), "chat", "parse")
    }

    // ── Tier 1 ──

    #[test]
    fn literal_index_in_range() {
        assert_eq!(parse_index("2", 3), Some(1));
        assert_eq!(parse_index(" 1 ", 3), Some(0));
        assert_eq!(parse_index("3", 3), Some(2));
    }

    #[test]
    fn literal_index_out_of_range_or_non_numeric() {
        assert_eq!(parse_index("0", 3), None);
        assert_eq!(parse_index("4", 3), None);
        assert_eq!(parse_index("la primera", 3), None);
    }

    #[test]
    fn literal_index_short_circuits_classifier() {
        // A failing classifier never gets consulted for a numeric reply.
        let locations = vec![
            location("sede-001", "Clínica San Felipe", "San Isidro"),
            location("sede-002", "Clínica Miraflores", "Miraflores"),
        ];
        let idx = resolve_location("2", &locations, &failing_assistant());
        assert_eq!(idx, Some(1));
    }

    // ── Tier 2 ──

    #[test]
    fn location_by_name_keyword() {
        let locations = vec![
            location("sede-001", "Clínica San Felipe", "San Isidro"),
            location("sede-002", "Clínica Miraflores", "Miraflores"),
        ];
        assert_eq!(
            match_location_keywords("la de san felipe por favor", &locations),
            Some(0)
        );
    }

    #[test]
    fn location_by_district_keyword() {
        let locations = vec![
            location("sede-001", "Clínica San Felipe", "San Isidro"),
            location("sede-002", "Clínica Monterrico", "Surco"),
        ];
        assert_eq!(match_location_keywords("prefiero surco", &locations), Some(1));
    }

    #[test]
    fn location_keyword_accent_insensitive() {
        let locations = vec![location("sede-003", "Clínica Monterrico", "Surco")];
        assert_eq!(match_location_keywords("monterrico", &locations), Some(0));
    }

    #[test]
    fn location_classifier_fallback() {
        let locations = vec![
            location("sede-001", "Clínica San Felipe", "San Isidro"),
            location("sede-002", "Clínica Miraflores", "Miraflores"),
        ];
        let assistant = Assistant::new(Box::new(MockLlmClient::new("2")), "chat", "parse");
        assert_eq!(
            resolve_location("la que me quede más cerca del mar", &locations, &assistant),
            Some(1)
        );
    }

    #[test]
    fn location_unresolvable_returns_none() {
        let locations = vec![location("sede-001", "Clínica San Felipe", "San Isidro")];
        assert_eq!(
            resolve_location("mmm no sé", &locations, &failing_assistant()),
            None
        );
    }

    #[test]
    fn time_token_plausible_hours_only() {
        assert_eq!(find_time("a las 9"), Some(time(9, 0)));
        assert_eq!(find_time("15:30 me va bien"), Some(time(15, 30)));
        assert_eq!(find_time("a las 23"), None);
        assert_eq!(find_time("opción 2"), None); // 2 is not a clinic hour
        assert_eq!(find_time("nada de números"), None);
    }

    #[test]
    fn weekday_token_detected() {
        assert_eq!(find_weekday("el martes puedo"), Some(Weekday::Tue));
        assert_eq!(find_weekday("el miércoles tal vez"), Some(Weekday::Wed));
        assert_eq!(find_weekday("cualquier día"), None);
    }

    // ── Tier 3: composite classification ──

    fn two_doctors() -> Vec<DoctorSlots> {
        vec![
            // Muñoz works Tuesday 2026-03-03 at 09:00 and 11:00
            doctor_slots(
                "doc-001",
                "Muñoz Vega",
                &[
                    (date(2026, 3, 3), time(9, 0)),
                    (date(2026, 3, 3), time(11, 0)),
                ],
            ),
            // Castro works Wednesday 2026-03-04 at 10:00
            doctor_slots("doc-002", "Castro Ríos", &[(date(2026, 3, 4), time(10, 0))]),
        ]
    }

    #[test]
    fn composite_fully_specified() {
        let doctors = two_doctors();
        let reply = classify_slot_reply("con muñoz el martes a las 9", &doctors);
        assert_eq!(
            reply,
            SlotReply::Full {
                doctor_idx: 0,
                slot_idx: 0
            }
        );
    }

    #[test]
    fn composite_doctor_and_day_missing_hour() {
        let doctors = two_doctors();
        let reply = classify_slot_reply("con la doctora muñoz el martes", &doctors);
        assert_eq!(
            reply,
            SlotReply::DoctorAndDay {
                doctor_idx: 0,
                date: date(2026, 3, 3)
            }
        );
    }

    #[test]
    fn composite_doctor_only() {
        let doctors = two_doctors();
        let reply = classify_slot_reply("quisiera atenderme con muñoz", &doctors);
        assert_eq!(reply, SlotReply::DoctorOnly { doctor_idx: 0 });
    }

    #[test]
    fn composite_day_only() {
        let doctors = two_doctors();
        let reply = classify_slot_reply("el martes por favor", &doctors);
        assert_eq!(
            reply,
            SlotReply::DayOnly {
                date: date(2026, 3, 3)
            }
        );
    }

    #[test]
    fn composite_unrecognized() {
        let doctors = two_doctors();
        let reply = classify_slot_reply("lo que sea está bien", &doctors);
        assert_eq!(reply, SlotReply::Unrecognized);
    }

    #[test]
    fn composite_doctor_with_unique_hour_resolves_fully() {
        let doctors = two_doctors();
        // Muñoz has exactly one 11:00 slot — no date needed
        let reply = classify_slot_reply("con muñoz a las 11", &doctors);
        assert_eq!(
            reply,
            SlotReply::Full {
                doctor_idx: 0,
                slot_idx: 1
            }
        );
    }

    #[test]
    fn composite_day_and_unique_time_resolves_fully() {
        let doctors = two_doctors();
        let reply = classify_slot_reply("el miércoles a las 10", &doctors);
        assert_eq!(
            reply,
            SlotReply::Full {
                doctor_idx: 1,
                slot_idx: 0
            }
        );
    }

    #[test]
    fn composite_nonexistent_hour_degrades_to_doctor_and_day() {
        let doctors = two_doctors();
        let reply = classify_slot_reply("con muñoz el martes a las 10", &doctors);
        assert_eq!(
            reply,
            SlotReply::DoctorAndDay {
                doctor_idx: 0,
                date: date(2026, 3, 3)
            }
        );
    }

    #[test]
    fn composite_surname_accent_insensitive() {
        let doctors = two_doctors();
        let reply = classify_slot_reply("con castro rios", &doctors);
        assert_eq!(reply, SlotReply::DoctorOnly { doctor_idx: 1 });
    }

    // ── Intent keywords ──

    #[test]
    fn affirmative_variants() {
        assert!(is_affirmative("sí"));
        assert!(is_affirmative("si, confirmo"));
        assert!(is_affirmative("Dale"));
        assert!(is_affirmative("claro que sí"));
        assert!(is_affirmative("por supuesto"));
        assert!(is_affirmative("s"));
    }

    #[test]
    fn non_affirmative_means_no() {
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("mejor no, gracias"));
        assert!(!is_affirmative("cancelar"));
        assert!(!is_affirmative(""));
        // "necesito" contains the letters "si" but is not a token match
        assert!(!is_affirmative("no lo necesito"));
    }

    #[test]
    fn next_week_phrases_detected() {
        assert!(wants_next_week("¿tienes otros horarios?"));
        assert!(wants_next_week("la próxima semana mejor"));
        assert!(wants_next_week("muéstrame más opciones"));
        assert!(!wants_next_week("el martes a las 9"));
        assert!(!wants_next_week("1"));
    }
}
