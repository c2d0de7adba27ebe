pub mod appointment;
pub mod auth;
pub mod billing;
pub mod directory;
pub mod error;
pub mod time_format;

pub use appointment::{Appointment, AppointmentStatus};
pub use billing::{Invoice, InvoiceStatus, Payment, PaymentMethod, ServiceLine, Treatment};
pub use directory::{Doctor, Patient, Tenant};
