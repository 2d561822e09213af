//! Booking confirmation email, sent through the Resend HTTP API.
//!
//! Sending is best-effort: the appointment is already committed when the
//! email goes out, so a failure is logged and surfaced to the caller but
//! never unwinds the booking.

use serde::Serialize;
use thiserror::Error;

use crate::calendar;
use crate::config;
use crate::models::{Appointment, Doctor, Location, Patient, Slot};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const DEFAULT_FROM: &str = "MediAgent <onboarding@resend.dev>";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{} not configured", config::RESEND_API_KEY_ENV)]
    MissingApiKey,

    #[error("Patient has no email address")]
    NoRecipient,

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Resend returned status {status}: {body}")]
    Api { status: u16, body: String },
}

/// Denormalized facts for one confirmation email. Built from conversation
/// state at booking time so the notifier needs no database access.
#[derive(Debug, Clone)]
pub struct ConfirmationEmail {
    pub appointment_id: String,
    pub patient_first_names: String,
    pub recipient: String,
    pub doctor_name: String,
    pub specialty: String,
    pub location_name: String,
    pub location_address: String,
    pub date_formatted: String,
    pub start_hhmm: String,
    pub end_hhmm: String,
}

impl ConfirmationEmail {
    pub fn from_booking(
        appointment: &Appointment,
        patient: &Patient,
        doctor: &Doctor,
        location: &Location,
        slot: &Slot,
        specialty: &str,
    ) -> Self {
        Self {
            appointment_id: appointment.id.clone(),
            patient_first_names: patient.first_names.clone(),
            recipient: patient.email.clone(),
            doctor_name: doctor.display_name(),
            specialty: specialty.to_string(),
            location_name: location.name.clone(),
            location_address: location.address.clone(),
            date_formatted: calendar::format_date(slot.date),
            start_hhmm: slot.start_hhmm(),
            end_hhmm: slot.end_hhmm(),
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "✅ Cita Confirmada — {} | {}",
            self.specialty, self.date_formatted
        )
    }
}

/// Outbound notification seam. Injected into the orchestrator so tests can
/// record sends instead of hitting the network.
pub trait Notifier: Send + Sync {
    fn send_confirmation(&self, email: &ConfirmationEmail) -> Result<(), NotifyError>;
}

/// Resend API mailer. Needs only an API key; without a verified domain the
/// onboarding sender address still delivers to the account owner.
pub struct ResendMailer {
    api_key: String,
    from: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    html: String,
}

impl ResendMailer {
    pub fn new(api_key: &str, from: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            api_key: api_key.to_string(),
            from: from.to_string(),
            client,
        }
    }

    /// Build from RESEND_API_KEY / MEDIAGENT_EMAIL_FROM. `None` when no key
    /// is configured, in which case the caller runs without email.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(config::RESEND_API_KEY_ENV).ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let from = std::env::var(config::EMAIL_FROM_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FROM.to_string());
        Some(Self::new(api_key.trim(), &from))
    }
}

impl Notifier for ResendMailer {
    fn send_confirmation(&self, email: &ConfirmationEmail) -> Result<(), NotifyError> {
        if self.api_key.is_empty() {
            return Err(NotifyError::MissingApiKey);
        }
        if email.recipient.is_empty() {
            return Err(NotifyError::NoRecipient);
        }

        let body = SendEmailRequest {
            from: &self.from,
            to: [email.recipient.as_str()],
            subject: email.subject(),
            html: build_confirmation_html(email),
        };

        let response = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(recipient = %email.recipient, "Confirmation email sent");
        Ok(())
    }
}

/// No-network notifier for tests and for running without a configured key.
pub struct NoopMailer;

impl Notifier for NoopMailer {
    fn send_confirmation(&self, email: &ConfirmationEmail) -> Result<(), NotifyError> {
        tracing::debug!(
            recipient = %email.recipient,
            appointment = %email.appointment_id,
            "Email sending disabled, skipping confirmation"
        );
        Ok(())
    }
}

fn build_confirmation_html(email: &ConfirmationEmail) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="es">
<body style="margin:0; padding:0; background-color:#f4f7fa; font-family:'Segoe UI', Arial, sans-serif;">
  <table width="600" align="center" cellpadding="0" cellspacing="0" style="background-color:#ffffff; border-radius:12px; overflow:hidden;">
    <tr>
      <td style="background:linear-gradient(135deg, #0077B6 0%, #00B4D8 100%); padding:32px 40px; text-align:center;">
        <h1 style="color:#ffffff; margin:0; font-size:28px;">🏥 {app_name}</h1>
        <p style="color:#CAF0F8; margin:8px 0 0; font-size:14px;">Tu asistente de citas médicas</p>
      </td>
    </tr>
    <tr>
      <td style="padding:32px 40px 16px; text-align:center;">
        <div style="display:inline-block; background-color:#D4EDDA; color:#155724; padding:10px 24px; border-radius:24px; font-weight:600;">✅ Cita Confirmada</div>
      </td>
    </tr>
    <tr>
      <td style="padding:8px 40px 24px; text-align:center;">
        <p style="font-size:18px; color:#333; margin:0;">¡Hola <strong>{patient}</strong>! Tu cita ha sido agendada exitosamente.</p>
      </td>
    </tr>
    <tr>
      <td style="padding:0 40px 32px;">
        <table width="100%" cellpadding="0" cellspacing="0" style="background-color:#F8F9FA; border-radius:10px; border:1px solid #E9ECEF;">
          <tr><td style="padding:20px 24px 12px;">
            <p style="margin:0; font-size:12px; color:#6C757D; text-transform:uppercase;">Número de cita</p>
            <p style="margin:4px 0 0; font-size:18px; color:#0077B6; font-weight:700;">{appointment_id}</p>
          </td></tr>
          <tr><td style="padding:12px 24px;">
            <p style="margin:0; font-size:12px; color:#6C757D;">👨‍⚕️ Doctor</p>
            <p style="margin:2px 0 0; font-size:16px; color:#333; font-weight:600;">{doctor}</p>
          </td></tr>
          <tr><td style="padding:12px 24px;">
            <p style="margin:0; font-size:12px; color:#6C757D;">🩺 Especialidad</p>
            <p style="margin:2px 0 0; font-size:16px; color:#333; font-weight:600;">{specialty}</p>
          </td></tr>
          <tr><td style="padding:12px 24px;">
            <p style="margin:0; font-size:12px; color:#6C757D;">📅 Fecha y hora</p>
            <p style="margin:2px 0 0; font-size:16px; color:#333; font-weight:600;">{date}</p>
            <p style="margin:2px 0 0; font-size:16px; color:#0077B6; font-weight:700;">{start} - {end}</p>
          </td></tr>
          <tr><td style="padding:12px 24px 20px;">
            <p style="margin:0; font-size:12px; color:#6C757D;">🏥 Sede</p>
            <p style="margin:2px 0 0; font-size:16px; color:#333; font-weight:600;">{location}</p>
            <p style="margin:2px 0 0; font-size:14px; color:#6C757D;">📍 {address}</p>
          </td></tr>
        </table>
      </td>
    </tr>
    <tr>
      <td style="padding:0 40px 32px;">
        <p style="margin:0; font-size:14px; color:#856404; background-color:#FFF3CD; border:1px solid #FFEEBA; border-radius:8px; padding:16px 20px;">
          ⏰ <strong>Recuerda:</strong> Llegar 15 minutos antes de tu cita con tu DNI y cualquier examen previo.
        </p>
      </td>
    </tr>
    <tr>
      <td style="background-color:#F8F9FA; padding:24px 40px; text-align:center; border-top:1px solid #E9ECEF;">
        <p style="margin:0; font-size:13px; color:#6C757D;">
          Este correo fue enviado automáticamente por {app_name}.<br>
          Si no solicitaste esta cita, por favor contáctanos al <strong>{phone}</strong>.
        </p>
      </td>
    </tr>
  </table>
</body>
</html>"#,
        app_name = config::APP_NAME,
        patient = email.patient_first_names,
        appointment_id = email.appointment_id,
        doctor = email.doctor_name,
        specialty = email.specialty,
        date = email.date_formatted,
        start = email.start_hhmm,
        end = email.end_hhmm,
        location = email.location_name,
        address = email.location_address,
        phone = config::CONTACT_PHONE,
    )
}
