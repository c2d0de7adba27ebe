// libs/shared/database/src/store.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentStatus, Doctor, Invoice, Patient, Payment, ServiceLine, Treatment,
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness rule was violated (slot already held, treatment already recorded).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A conditional write found the row in a state it may not change from.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Conditional status change: applied only while the appointment is in one of `allowed_from`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub appointment_id: Uuid,
    pub allowed_from: Vec<AppointmentStatus>,
    pub to: AppointmentStatus,
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Moves an appointment to another slot of the same doctor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotMove {
    pub appointment_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "shared_models::time_format::hhmm")]
    pub time: NaiveTime,
    pub timestamp: i64,
    pub allowed_from: Vec<AppointmentStatus>,
    pub updated_at: DateTime<Utc>,
}

/// Invoice fields computed by the billing cascade; the store assigns the number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub organization_id: Uuid,
    pub location_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Everything written when a visit is completed. Applied as one unit: the treatment, the
/// invoice (numbered from the `invoice_period` counter), the treatment-invoice link, the
/// patient balance increment and the appointment completion either all land or none do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreatmentCommit {
    pub treatment: Treatment,
    pub invoice: InvoiceDraft,
    pub invoice_period: String,
    pub completable_from: Vec<AppointmentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTreatment {
    pub treatment: Treatment,
    pub invoice: Invoice,
    pub appointment: Appointment,
    pub patient_balance: Decimal,
}

/// Replacement service list for a treatment together with the re-derived amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCorrection {
    pub treatment_id: Uuid,
    pub services_used: Vec<ServiceLine>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub invoice: Invoice,
    pub patient_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledInvoice {
    pub invoice: Invoice,
    pub patient_balance: Decimal,
}

/// Repository over the clinic's scheduling and billing tables.
///
/// Every mutating method is a single atomic unit in the backing store; callers never
/// read-then-write to enforce an invariant themselves.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, StoreError>;

    async fn get_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// All appointments (any status) of a doctor whose timestamp lies in `[from_ms, to_ms]`,
    /// ordered by timestamp.
    async fn appointments_for_doctor_between(
        &self,
        doctor_id: Uuid,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// Inserts the appointment unless a non-cancelled appointment already holds the same
    /// (doctor, date, time); that case is `StoreError::Conflict`.
    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    /// Same uniqueness rule as `insert_appointment`, ignoring the appointment being moved.
    async fn move_appointment(&self, slot_move: SlotMove) -> Result<Appointment, StoreError>;

    async fn transition_appointment(&self, change: StatusChange) -> Result<Appointment, StoreError>;

    async fn get_treatment(&self, treatment_id: Uuid) -> Result<Option<Treatment>, StoreError>;

    async fn complete_treatment(&self, commit: TreatmentCommit) -> Result<CompletedTreatment, StoreError>;

    /// Rewrites a treatment's services and its invoice amounts in place, shifting the patient
    /// balance by the change in total. The invoice keeps its number and status.
    async fn correct_treatment_services(&self, correction: ServiceCorrection) -> Result<Invoice, StoreError>;

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError>;

    async fn invoice_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    /// Appends the payment, decrements the patient balance (clamped at zero) and marks the
    /// invoice paid once the sum of its payments reaches the total.
    async fn record_payment(&self, payment: Payment) -> Result<PaymentReceipt, StoreError>;

    /// Marks an unpaid invoice paid without an itemised payment and clears its outstanding
    /// amount from the patient balance (clamped at zero).
    async fn settle_invoice(&self, invoice_id: Uuid, paid_at: DateTime<Utc>) -> Result<SettledInvoice, StoreError>;
}
