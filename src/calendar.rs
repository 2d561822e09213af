//! Spanish calendar helpers: date formatting, weekday lookup, and the
//! inclusive week windows used to page doctor availability.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

const WEEKDAY_NAMES: [&str; 7] = [
    "Lunes",
    "Martes",
    "Miércoles",
    "Jueves",
    "Viernes",
    "Sábado",
    "Domingo",
];

// Accent-less forms accepted on input alongside the display forms.
const WEEKDAY_TOKENS: [&str; 7] = [
    "lunes",
    "martes",
    "miercoles",
    "jueves",
    "viernes",
    "sabado",
    "domingo",
];

const MONTH_NAMES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// Format a date the way it is shown to the patient: "Martes 24 de febrero".
pub fn format_date(date: NaiveDate) -> String {
    let weekday = WEEKDAY_NAMES[date.weekday().num_days_from_monday() as usize];
    let month = MONTH_NAMES[date.month0() as usize];
    format!("{weekday} {} de {month}", date.day())
}

/// Look up a weekday by its Spanish name, accent-insensitive.
/// Expects a single lowercase token ("martes", "miercoles", "miércoles").
pub fn weekday_from_name(token: &str) -> Option<Weekday> {
    let weekdays = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];
    for (i, wd) in weekdays.iter().enumerate() {
        if token == WEEKDAY_TOKENS[i] || token == WEEKDAY_NAMES[i].to_lowercase() {
            return Some(*wd);
        }
    }
    None
}

/// An inclusive date range used to restrict slot queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    /// The window offered first: tomorrow through the following Saturday.
    /// If tomorrow is already a Saturday the window is that single day.
    pub fn current_week(today: NaiveDate) -> Self {
        let from = today + Duration::days(1);
        let days_to_saturday = (Weekday::Sat.num_days_from_monday() + 7
            - from.weekday().num_days_from_monday())
            % 7;
        let to = from + Duration::days(days_to_saturday as i64);
        Self { from, to }
    }

    /// The window after this one: Sunday through the next Saturday.
    pub fn next_week(&self) -> Self {
        Self {
            from: self.to + Duration::days(1),
            to: self.to + Duration::days(7),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}
