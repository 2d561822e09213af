//! Read-only reference-data queries plus the one mutation of the system:
//! the atomic check-and-set booking of a slot.
//!
//! Zero-result queries return empty collections, never errors — absence of
//! options is a normal branch handled by the stage functions.

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::calendar::DateWindow;
use crate::models::{
    Appointment, AppointmentStatus, Doctor, DoctorSlots, Location, Patient, Slot, SlotStatus,
    Specialty,
};

use super::DatabaseError;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ── Reference lookups ───────────────────────────────────

    pub fn patient(&self, id: &str) -> Result<Option<Patient>, DatabaseError> {
        let patient = self
            .conn
            .query_row(
                "SELECT id, first_names, last_names, district, specialty_id, email, condition
                 FROM patients WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Patient {
                        id: row.get(0)?,
                        first_names: row.get(1)?,
                        last_names: row.get(2)?,
                        district: row.get(3)?,
                        specialty_id: row.get(4)?,
                        email: row.get(5)?,
                        condition: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(patient)
    }

    pub fn patient_ids(&self) -> Result<Vec<String>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT id FROM patients ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn specialty(&self, id: &str) -> Result<Option<Specialty>, DatabaseError> {
        let specialty = self
            .conn
            .query_row(
                "SELECT id, name FROM specialties WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Specialty {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(specialty)
    }

    /// Display name of a specialty. Missing ids resolve to "Desconocida"
    /// rather than failing — the name only ever feeds message text.
    pub fn specialty_name(&self, id: &str) -> Result<String, DatabaseError> {
        Ok(self
            .specialty(id)?
            .map(|s| s.name)
            .unwrap_or_else(|| "Desconocida".to_string()))
    }

    pub fn location(&self, id: &str) -> Result<Option<Location>, DatabaseError> {
        let base = self
            .conn
            .query_row(
                "SELECT id, name, address, district FROM locations WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match base {
            None => Ok(None),
            Some((id, name, address, district)) => {
                let nearby_districts = self.nearby_districts(&id)?;
                Ok(Some(Location {
                    id,
                    name,
                    address,
                    district,
                    nearby_districts,
                }))
            }
        }
    }

    pub fn doctor(&self, id: &str) -> Result<Option<Doctor>, DatabaseError> {
        let doctor = self
            .conn
            .query_row(
                "SELECT id, first_names, last_names, license_number, location_id, specialty_id
                 FROM doctors WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Doctor {
                        id: row.get(0)?,
                        first_names: row.get(1)?,
                        last_names: row.get(2)?,
                        license_number: row.get(3)?,
                        location_id: row.get(4)?,
                        specialty_id: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(doctor)
    }

    pub fn slot(&self, id: &str) -> Result<Option<Slot>, DatabaseError> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, doctor_id, date, start_time, end_time, status
                 FROM slots WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, NaiveDate>(2)?,
                        row.get::<_, chrono::NaiveTime>(3)?,
                        row.get::<_, chrono::NaiveTime>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            None => Ok(None),
            Some((id, doctor_id, date, start_time, end_time, status)) => Ok(Some(Slot {
                id,
                doctor_id,
                date,
                start_time,
                end_time,
                status: SlotStatus::from_str(&status)?,
            })),
        }
    }

    fn nearby_districts(&self, location_id: &str) -> Result<Vec<String>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT district FROM location_nearby_districts
             WHERE location_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![location_id], |row| row.get(0))?;
        let mut districts = Vec::new();
        for row in rows {
            districts.push(row?);
        }
        Ok(districts)
    }

    // ── Composite queries ───────────────────────────────────

    /// Locations that offer the specialty, serve the patient's district, and
    /// have at least one doctor of that specialty with an available slot
    /// dated `today` or later. The pre-filter exists so the conversation
    /// never offers a dead-end option. Stable source order.
    pub fn find_locations_with_availability(
        &self,
        district: &str,
        specialty_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<Location>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.name, l.address, l.district
             FROM locations l
             JOIN location_specialties ls
               ON ls.location_id = l.id AND ls.specialty_id = ?1
             WHERE (l.district = ?2
                    OR EXISTS (SELECT 1 FROM location_nearby_districts n
                               WHERE n.location_id = l.id AND n.district = ?2))
               AND EXISTS (SELECT 1 FROM doctors d
                           JOIN slots s ON s.doctor_id = d.id
                           WHERE d.location_id = l.id
                             AND d.specialty_id = ?1
                             AND s.status = 'available'
                             AND s.date >= ?3)
             ORDER BY l.rowid",
        )?;

        let rows = stmt.query_map(params![specialty_id, district, today], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut locations = Vec::new();
        for row in rows {
            let (id, name, address, district) = row?;
            let nearby_districts = self.nearby_districts(&id)?;
            locations.push(Location {
                id,
                name,
                address,
                district,
                nearby_districts,
            });
        }
        Ok(locations)
    }

    /// Whether any doctor of the specialty at this location has an available
    /// slot dated `from` or later, in any week.
    pub fn has_future_availability(
        &self,
        location_id: &str,
        specialty_id: &str,
        from: NaiveDate,
    ) -> Result<bool, DatabaseError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM doctors d
                            JOIN slots s ON s.doctor_id = d.id
                            WHERE d.location_id = ?1
                              AND d.specialty_id = ?2
                              AND s.status = 'available'
                              AND s.date >= ?3)",
            params![location_id, specialty_id, from],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Doctors of the specialty at this location together with their
    /// available slots inside the inclusive window, sorted by
    /// (date, start_time). Doctors without any slot in the window are
    /// omitted entirely.
    pub fn find_doctors_with_slots(
        &self,
        location_id: &str,
        specialty_id: &str,
        window: DateWindow,
    ) -> Result<Vec<DoctorSlots>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.first_names, d.last_names, d.license_number,
                    d.location_id, d.specialty_id,
                    s.id, s.date, s.start_time, s.end_time, s.status
             FROM doctors d
             JOIN slots s ON s.doctor_id = d.id
             WHERE d.location_id = ?1
               AND d.specialty_id = ?2
               AND s.status = 'available'
               AND s.date >= ?3
               AND s.date <= ?4
             ORDER BY d.last_names, d.id, s.date, s.start_time",
        )?;

        let rows = stmt.query_map(
            params![location_id, specialty_id, window.from, window.to],
            |row| {
                Ok((
                    Doctor {
                        id: row.get(0)?,
                        first_names: row.get(1)?,
                        last_names: row.get(2)?,
                        license_number: row.get(3)?,
                        location_id: row.get(4)?,
                        specialty_id: row.get(5)?,
                    },
                    (
                        row.get::<_, String>(6)?,
                        row.get::<_, NaiveDate>(7)?,
                        row.get::<_, chrono::NaiveTime>(8)?,
                        row.get::<_, chrono::NaiveTime>(9)?,
                        row.get::<_, String>(10)?,
                    ),
                ))
            },
        )?;

        let mut result: Vec<DoctorSlots> = Vec::new();
        for row in rows {
            let (doctor, (slot_id, date, start_time, end_time, status)) = row?;
            let slot = Slot {
                id: slot_id,
                doctor_id: doctor.id.clone(),
                date,
                start_time,
                end_time,
                status: SlotStatus::from_str(&status)?,
            };
            match result.last_mut() {
                Some(entry) if entry.doctor.id == doctor.id => entry.slots.push(slot),
                _ => result.push(DoctorSlots {
                    doctor,
                    slots: vec![slot],
                }),
            }
        }
        Ok(result)
    }

    // ── Mutation ────────────────────────────────────────────

    /// Create the appointment and flip the slot to booked as one logical
    /// unit. The UPDATE carries the availability check; zero rows affected
    /// means another booking won the race and nothing is persisted.
    pub fn book_slot(
        &self,
        patient_id: &str,
        doctor_id: &str,
        location_id: &str,
        slot_id: &str,
    ) -> Result<Appointment, DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;

        let updated = tx.execute(
            "UPDATE slots SET status = 'booked' WHERE id = ?1 AND status = 'available'",
            params![slot_id],
        )?;
        if updated == 0 {
            return Err(DatabaseError::SlotUnavailable(slot_id.to_string()));
        }

        let appointment = Appointment {
            id: format!("cita-{}", &Uuid::new_v4().to_string()[..8]),
            patient_id: patient_id.to_string(),
            doctor_id: doctor_id.to_string(),
            location_id: location_id.to_string(),
            slot_id: slot_id.to_string(),
            status: AppointmentStatus::Confirmed,
        };

        tx.execute(
            "INSERT INTO appointments (id, patient_id, doctor_id, location_id, slot_id, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                appointment.id,
                appointment.patient_id,
                appointment.doctor_id,
                appointment.location_id,
                appointment.slot_id,
                appointment.status.as_str(),
            ],
        )?;

        tx.commit()?;

        tracing::info!(
            appointment_id = %appointment.id,
            slot_id = %slot_id,
            patient_id = %patient_id,
            "Appointment booked"
        );

        Ok(appointment)
    }
}
