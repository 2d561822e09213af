pub mod appointment;
pub mod conversation;
pub mod doctor;
pub mod enums;
pub mod location;
pub mod patient;
pub mod slot;
pub mod specialty;

pub use appointment::Appointment;
pub use conversation::ChatMessage;
pub use doctor::Doctor;
pub use enums::{AppointmentStatus, MessageRole, SlotStatus};
pub use location::Location;
pub use patient::Patient;
pub use slot::{DoctorSlots, Slot};
pub use specialty::Specialty;
