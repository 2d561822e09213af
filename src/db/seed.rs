//! Demo dataset generator. Slots are always generated relative to `today`
//! so a freshly seeded database has real future availability.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use rusqlite::{params, Connection};

use super::DatabaseError;

const SPECIALTIES: &[(&str, &str)] = &[
    ("esp-001", "Cardiología"),
    ("esp-002", "Dermatología"),
    ("esp-003", "Pediatría"),
];

// (id, name, address, district, nearby districts)
const LOCATIONS: &[(&str, &str, &str, &str, &[&str])] = &[
    (
        "sede-001",
        "Clínica San Felipe",
        "Av. Javier Prado Oeste 475",
        "San Isidro",
        &["Miraflores", "Lince", "Magdalena"],
    ),
    (
        "sede-002",
        "Clínica Miraflores",
        "Av. Benavides 1711",
        "Miraflores",
        &["Barranco", "Surco", "San Isidro"],
    ),
    (
        "sede-003",
        "Clínica Monterrico",
        "Av. Primavera 630",
        "Surco",
        &["La Molina", "San Borja"],
    ),
];

// Every location offers every specialty except Dermatología at Monterrico,
// which keeps one specialty concentrated in two locations for demo flows.
const LOCATION_SPECIALTIES: &[(&str, &str)] = &[
    ("sede-001", "esp-001"),
    ("sede-001", "esp-002"),
    ("sede-001", "esp-003"),
    ("sede-002", "esp-001"),
    ("sede-002", "esp-002"),
    ("sede-002", "esp-003"),
    ("sede-003", "esp-001"),
    ("sede-003", "esp-003"),
];

const FIRST_NAMES: &[&str] = &[
    "Marco", "Paola", "Rodrigo", "Carmen", "Pablo", "Elena", "César", "Natalia", "Bruno",
    "Daniela", "Sergio", "Fernanda", "Tomás", "Gisela", "Nicolás", "Ximena",
];

const LAST_NAMES: &[&str] = &[
    "Castro Ríos",
    "Ponce Vega",
    "Llanos Ruiz",
    "Salas Mora",
    "Tello Neyra",
    "Bravo Huanca",
    "Cano Soto",
    "Lagos Díaz",
    "Meza Fuentes",
    "Ríos Palma",
];

// (id, first names, last names, district, specialty, email, condition)
const PATIENTS: &[(&str, &str, &str, &str, &str, &str, &str)] = &[
    (
        "pac-001",
        "Lucía",
        "Ramos Torres",
        "Miraflores",
        "esp-002",
        "lucia.ramos@example.com",
        "dermatitis atópica",
    ),
    (
        "pac-002",
        "Jorge",
        "Quispe Mamani",
        "San Isidro",
        "esp-001",
        "jorge.quispe@example.com",
        "hipertensión",
    ),
    (
        "pac-003",
        "María",
        "Flores Campos",
        "Surco",
        "esp-003",
        "maria.flores@example.com",
        "control pediátrico",
    ),
    (
        "pac-004",
        "Andrés",
        "Villanueva Paz",
        "Barranco",
        "esp-002",
        "andres.villanueva@example.com",
        "acné severo",
    ),
    (
        "pac-005",
        "Rosa",
        "Gutiérrez León",
        "La Molina",
        "esp-001",
        "rosa.gutierrez@example.com",
        "arritmia",
    ),
];

// Standard hourly blocks, morning and afternoon.
const BLOCKS: &[(u32, u32)] = &[(9, 10), (10, 11), (11, 12), (15, 16), (16, 17), (17, 18)];

/// True when the database has no reference data yet.
pub fn is_empty(conn: &Connection) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?;
    Ok(count == 0)
}

/// Populate the demo dataset: two doctors per (location, specialty) pair
/// and slots for the next 14 working days (Mon–Sat, starting tomorrow).
/// Fully deterministic — the availability pattern replaces a seeded RNG.
pub fn seed_demo_data(conn: &Connection, today: NaiveDate) -> Result<(), DatabaseError> {
    for (id, name) in SPECIALTIES {
        conn.execute(
            "INSERT INTO specialties (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
    }

    for (id, name, address, district, nearby) in LOCATIONS {
        conn.execute(
            "INSERT INTO locations (id, name, address, district) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, address, district],
        )?;
        for d in *nearby {
            conn.execute(
                "INSERT INTO location_nearby_districts (location_id, district) VALUES (?1, ?2)",
                params![id, d],
            )?;
        }
    }

    for (location_id, specialty_id) in LOCATION_SPECIALTIES {
        conn.execute(
            "INSERT INTO location_specialties (location_id, specialty_id) VALUES (?1, ?2)",
            params![location_id, specialty_id],
        )?;
    }

    for (id, first, last, district, specialty, email, condition) in PATIENTS {
        conn.execute(
            "INSERT INTO patients (id, first_names, last_names, district, specialty_id,
                                   email, condition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, first, last, district, specialty, email, condition],
        )?;
    }

    // Two doctors per location+specialty pair
    let mut doctor_ids = Vec::new();
    let mut doc_num = 0usize;
    for (location_id, specialty_id) in LOCATION_SPECIALTIES {
        for _ in 0..2 {
            doc_num += 1;
            let id = format!("doc-{doc_num:03}");
            conn.execute(
                "INSERT INTO doctors (id, first_names, last_names, license_number,
                                      location_id, specialty_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    FIRST_NAMES[doc_num % FIRST_NAMES.len()],
                    LAST_NAMES[doc_num % LAST_NAMES.len()],
                    format!("CMP-{}", 50000 + doc_num),
                    location_id,
                    specialty_id,
                ],
            )?;
            doctor_ids.push(id);
        }
    }

    let working_days = next_working_days(today, 14);

    let mut slot_num = 0usize;
    for (doc_idx, doctor_id) in doctor_ids.iter().enumerate() {
        for (day_idx, day) in working_days.iter().enumerate() {
            for (block_idx, (start_h, end_h)) in BLOCKS.iter().enumerate() {
                slot_num += 1;
                // ~80% available, deterministic
                let status = if (doc_idx + day_idx + block_idx) % 5 == 0 {
                    "booked"
                } else {
                    "available"
                };
                conn.execute(
                    "INSERT INTO slots (id, doctor_id, date, start_time, end_time, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        format!("hor-{slot_num:05}"),
                        doctor_id,
                        day,
                        NaiveTime::from_hms_opt(*start_h, 0, 0).unwrap(),
                        NaiveTime::from_hms_opt(*end_h, 0, 0).unwrap(),
                        status,
                    ],
                )?;
            }
        }
    }

    tracing::info!(
        doctors = doctor_ids.len(),
        slots = slot_num,
        "Seeded demo dataset"
    );
    Ok(())
}

/// The next `count` working days (Mon–Sat), starting tomorrow.
fn next_working_days(today: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut d = today + Duration::days(1);
    while days.len() < count {
        if d.weekday() != Weekday::Sun {
            days.push(d);
        }
        d += Duration::days(1);
    }
    days
}
