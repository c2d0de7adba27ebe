// libs/shared/database/src/memory.rs
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::billing::{clamp_balance, invoice_number};
use shared_models::{
    Appointment, AppointmentStatus, Doctor, Invoice, InvoiceStatus, Patient, Payment, Treatment,
};

use crate::store::{
    ClinicStore, CompletedTreatment, PaymentReceipt, ServiceCorrection, SettledInvoice, SlotMove,
    StatusChange, StoreError, TreatmentCommit,
};

type SlotKey = (Uuid, NaiveDate, NaiveTime);

#[derive(Debug, Default)]
struct ClinicTables {
    doctors: HashMap<Uuid, Doctor>,
    patients: HashMap<Uuid, Patient>,
    appointments: HashMap<Uuid, Appointment>,
    /// Unique index over slot-holding appointments.
    held_slots: HashMap<SlotKey, Uuid>,
    treatments: HashMap<Uuid, Treatment>,
    treatment_by_appointment: HashMap<Uuid, Uuid>,
    invoices: HashMap<Uuid, Invoice>,
    payments: Vec<Payment>,
    invoice_counters: HashMap<String, u64>,
}

impl ClinicTables {
    fn appointment(&self, id: Uuid) -> Result<&Appointment, StoreError> {
        self.appointments
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Appointment {}", id)))
    }

    fn invoice(&self, id: Uuid) -> Result<&Invoice, StoreError> {
        self.invoices
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("Invoice {}", id)))
    }

    fn paid_towards(&self, invoice_id: Uuid) -> Decimal {
        self.payments
            .iter()
            .filter(|payment| payment.invoice_id == invoice_id)
            .map(|payment| payment.amount)
            .sum()
    }

    fn shift_balance(&mut self, patient_id: Uuid, delta: Decimal) -> Result<Decimal, StoreError> {
        let patient = self
            .patients
            .get_mut(&patient_id)
            .ok_or_else(|| StoreError::NotFound(format!("Patient {}", patient_id)))?;
        patient.balance = clamp_balance(patient.balance, delta);
        Ok(patient.balance)
    }

    fn check_allowed(appointment: &Appointment, allowed_from: &[AppointmentStatus]) -> Result<(), StoreError> {
        if allowed_from.contains(&appointment.status) {
            Ok(())
        } else {
            Err(StoreError::InvalidState(format!(
                "appointment {} is {}",
                appointment.id, appointment.status
            )))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    doctors: Vec<Doctor>,
    #[serde(default)]
    patients: Vec<Patient>,
}

/// Process-local clinic store. A single mutex serialises writers, so each trait method
/// observes and mutates a consistent snapshot; methods validate everything before their
/// first write, which keeps failed operations free of partial effects.
#[derive(Debug, Default)]
pub struct InMemoryClinicStore {
    tables: Mutex<ClinicTables>,
}

impl InMemoryClinicStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(doctors: Vec<Doctor>, patients: Vec<Patient>) -> Self {
        let tables = ClinicTables {
            doctors: doctors.into_iter().map(|d| (d.id, d)).collect(),
            patients: patients.into_iter().map(|p| (p.id, p)).collect(),
            ..ClinicTables::default()
        };

        Self { tables: Mutex::new(tables) }
    }

    /// Loads doctors and patients from a JSON file of the form
    /// `{"doctors": [...], "patients": [...]}`.
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading clinic seed file {}", path.display()))?;
        let seed: SeedFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing clinic seed file {}", path.display()))?;

        info!("Seeded in-memory clinic store with {} doctors and {} patients",
              seed.doctors.len(), seed.patients.len());
        Ok(Self::with_directory(seed.doctors, seed.patients))
    }

    pub async fn insert_doctor(&self, doctor: Doctor) {
        self.tables.lock().await.doctors.insert(doctor.id, doctor);
    }

    pub async fn insert_patient(&self, patient: Patient) {
        self.tables.lock().await.patients.insert(patient.id, patient);
    }
}

#[async_trait]
impl ClinicStore for InMemoryClinicStore {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, StoreError> {
        Ok(self.tables.lock().await.doctors.get(&doctor_id).cloned())
    }

    async fn get_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError> {
        Ok(self.tables.lock().await.patients.get(&patient_id).cloned())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.lock().await.appointments.get(&appointment_id).cloned())
    }

    async fn appointments_for_doctor_between(
        &self,
        doctor_id: Uuid,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.lock().await;
        let mut found: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.timestamp >= from_ms && a.timestamp <= to_ms)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.timestamp);
        Ok(found)
    }

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.lock().await;
        let key = (appointment.doctor_id, appointment.date, appointment.time);

        if appointment.occupies_slot() {
            if let Some(holder) = tables.held_slots.get(&key) {
                debug!("Slot {:?} already held by appointment {}", key, holder);
                return Err(StoreError::Conflict("slot already booked".to_string()));
            }
            tables.held_slots.insert(key, appointment.id);
        }

        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn move_appointment(&self, slot_move: SlotMove) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.lock().await;
        let current = tables.appointment(slot_move.appointment_id)?.clone();
        ClinicTables::check_allowed(&current, &slot_move.allowed_from)?;

        let old_key = (current.doctor_id, current.date, current.time);
        let new_key = (current.doctor_id, slot_move.date, slot_move.time);

        if let Some(holder) = tables.held_slots.get(&new_key) {
            if *holder != current.id {
                return Err(StoreError::Conflict("slot already booked".to_string()));
            }
        }

        if current.occupies_slot() {
            tables.held_slots.remove(&old_key);
            tables.held_slots.insert(new_key, current.id);
        }

        let moved = Appointment {
            date: slot_move.date,
            time: slot_move.time,
            timestamp: slot_move.timestamp,
            updated_at: slot_move.updated_at,
            ..current
        };
        tables.appointments.insert(moved.id, moved.clone());
        Ok(moved)
    }

    async fn transition_appointment(&self, change: StatusChange) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.lock().await;
        let current = tables.appointment(change.appointment_id)?.clone();
        ClinicTables::check_allowed(&current, &change.allowed_from)?;

        let mut updated = current;
        updated.status = change.to;
        updated.updated_at = change.updated_at;
        if let Some(note) = change.note {
            updated.notes = Some(match updated.notes.take() {
                Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
                _ => note,
            });
        }

        if !updated.occupies_slot() {
            let key = (updated.doctor_id, updated.date, updated.time);
            if tables.held_slots.get(&key) == Some(&updated.id) {
                tables.held_slots.remove(&key);
            }
        }

        tables.appointments.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn get_treatment(&self, treatment_id: Uuid) -> Result<Option<Treatment>, StoreError> {
        Ok(self.tables.lock().await.treatments.get(&treatment_id).cloned())
    }

    async fn complete_treatment(&self, commit: TreatmentCommit) -> Result<CompletedTreatment, StoreError> {
        let mut tables = self.tables.lock().await;
        let TreatmentCommit { mut treatment, invoice: draft, invoice_period, completable_from } = commit;

        let appointment = tables.appointment(treatment.appointment_id)?.clone();
        if tables.treatment_by_appointment.contains_key(&appointment.id) {
            return Err(StoreError::Conflict(format!(
                "appointment {} already has a treatment", appointment.id
            )));
        }
        ClinicTables::check_allowed(&appointment, &completable_from)?;
        if !tables.patients.contains_key(&draft.patient_id) {
            return Err(StoreError::NotFound(format!("Patient {}", draft.patient_id)));
        }

        // Validation is done; nothing below can fail.
        let sequence = {
            let counter = tables.invoice_counters.entry(invoice_period.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let invoice = Invoice {
            id: draft.id,
            invoice_number: invoice_number(&invoice_period, sequence),
            patient_id: draft.patient_id,
            treatment_id: treatment.id,
            subtotal: draft.subtotal,
            tax: draft.tax,
            total: draft.total,
            status: InvoiceStatus::Due,
            organization_id: draft.organization_id,
            location_id: draft.location_id,
            created_at: draft.created_at,
            paid_at: None,
        };
        treatment.invoice_id = Some(invoice.id);

        let patient_balance = tables.shift_balance(invoice.patient_id, invoice.total)?;

        let mut completed = appointment;
        completed.status = AppointmentStatus::Completed;
        completed.updated_at = draft.created_at;

        tables.treatment_by_appointment.insert(completed.id, treatment.id);
        tables.treatments.insert(treatment.id, treatment.clone());
        tables.invoices.insert(invoice.id, invoice.clone());
        tables.appointments.insert(completed.id, completed.clone());

        Ok(CompletedTreatment { treatment, invoice, appointment: completed, patient_balance })
    }

    async fn correct_treatment_services(&self, correction: ServiceCorrection) -> Result<Invoice, StoreError> {
        let mut tables = self.tables.lock().await;

        let treatment = tables
            .treatments
            .get(&correction.treatment_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Treatment {}", correction.treatment_id)))?;
        let invoice_id = treatment
            .invoice_id
            .ok_or_else(|| StoreError::NotFound(format!("Invoice for treatment {}", treatment.id)))?;
        let invoice = tables.invoice(invoice_id)?.clone();

        let delta = correction.total - invoice.total;
        tables.shift_balance(invoice.patient_id, delta)?;

        // Amounts only; number and status stay as issued.
        let mut corrected = invoice;
        corrected.subtotal = correction.subtotal;
        corrected.tax = correction.tax;
        corrected.total = correction.total;

        let mut treatment = treatment;
        treatment.services_used = correction.services_used;

        tables.treatments.insert(treatment.id, treatment);
        tables.invoices.insert(corrected.id, corrected.clone());
        Ok(corrected)
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(self.tables.lock().await.invoices.get(&invoice_id).cloned())
    }

    async fn invoice_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .filter(|payment| payment.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn record_payment(&self, payment: Payment) -> Result<PaymentReceipt, StoreError> {
        let mut tables = self.tables.lock().await;
        let invoice = tables.invoice(payment.invoice_id)?.clone();
        if !tables.patients.contains_key(&invoice.patient_id) {
            return Err(StoreError::NotFound(format!("Patient {}", invoice.patient_id)));
        }

        tables.payments.push(payment.clone());
        let patient_balance = tables.shift_balance(invoice.patient_id, -payment.amount)?;

        let mut invoice = invoice;
        if invoice.status.is_outstanding() && tables.paid_towards(invoice.id) >= invoice.total {
            invoice.status = InvoiceStatus::Paid;
            invoice.paid_at = Some(payment.processed_at);
            tables.invoices.insert(invoice.id, invoice.clone());
        }

        Ok(PaymentReceipt { payment, invoice, patient_balance })
    }

    async fn settle_invoice(&self, invoice_id: Uuid, paid_at: DateTime<Utc>) -> Result<SettledInvoice, StoreError> {
        let mut tables = self.tables.lock().await;
        let invoice = tables.invoice(invoice_id)?.clone();
        if invoice.status == InvoiceStatus::Paid {
            return Err(StoreError::InvalidState(format!("invoice {} is already paid", invoice.id)));
        }
        if !tables.patients.contains_key(&invoice.patient_id) {
            return Err(StoreError::NotFound(format!("Patient {}", invoice.patient_id)));
        }

        let outstanding = (invoice.total - tables.paid_towards(invoice.id)).max(Decimal::ZERO);
        let patient_balance = tables.shift_balance(invoice.patient_id, -outstanding)?;

        let mut invoice = invoice;
        invoice.status = InvoiceStatus::Paid;
        invoice.paid_at = Some(paid_at);
        tables.invoices.insert(invoice.id, invoice.clone());

        Ok(SettledInvoice { invoice, patient_balance })
    }
}
