// libs/shared/database/src/supabase_store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{Appointment, Doctor, Invoice, Patient, Payment, Treatment};

use crate::store::{
    ClinicStore, CompletedTreatment, PaymentReceipt, ServiceCorrection, SettledInvoice, SlotMove,
    StatusChange, StoreError, TreatmentCommit,
};
use crate::supabase::{SupabaseClient, SupabaseError};

impl From<SupabaseError> for StoreError {
    fn from(error: SupabaseError) -> Self {
        match error {
            // The RPC functions raise PT404 / PT409 / PT400 so PostgREST answers with
            // those statuses; 23505 unique violations arrive as 409 as well.
            SupabaseError::Api { status, message } => match status {
                StatusCode::NOT_FOUND => StoreError::NotFound(message),
                StatusCode::CONFLICT => StoreError::Conflict(message),
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StoreError::InvalidState(message),
                _ => StoreError::Backend(format!("{}: {}", status, message)),
            },
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// `ClinicStore` over Supabase. Reads go through the REST endpoints; every mutation is a
/// Postgres function (see `supabase/migrations`) so it commits or rolls back as a whole.
pub struct SupabaseClinicStore {
    supabase: SupabaseClient,
}

impl SupabaseClinicStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::with_service_role(config),
        }
    }

    async fn fetch_one<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let rows: Vec<Value> = self.supabase.request(Method::GET, path, None).await?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| StoreError::Backend(format!("Failed to parse row from {}: {}", path, e))),
            None => Ok(None),
        }
    }

    async fn fetch_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        let rows: Vec<Value> = self.supabase.request(Method::GET, path, None).await?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| StoreError::Backend(format!("Failed to parse row from {}: {}", path, e)))
            })
            .collect()
    }

    async fn call<T: DeserializeOwned>(&self, function: &str, args: Value) -> Result<T, StoreError> {
        debug!("Calling clinic function {}", function);
        let result: Value = self.supabase.rpc(function, args).await.map_err(|e| {
            warn!("Clinic function {} failed: {}", function, e);
            StoreError::from(e)
        })?;

        serde_json::from_value(result)
            .map_err(|e| StoreError::Backend(format!("Failed to parse {} result: {}", function, e)))
    }
}

fn to_args<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(format!("Failed to encode arguments: {}", e)))
}

#[async_trait]
impl ClinicStore for SupabaseClinicStore {
    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Option<Doctor>, StoreError> {
        self.fetch_one(&format!("/rest/v1/doctors?id=eq.{}", doctor_id)).await
    }

    async fn get_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError> {
        self.fetch_one(&format!("/rest/v1/patients?id=eq.{}", patient_id)).await
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.fetch_one(&format!("/rest/v1/appointments?id=eq.{}", appointment_id)).await
    }

    async fn appointments_for_doctor_between(
        &self,
        doctor_id: Uuid,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&and=(timestamp.gte.{},timestamp.lte.{})&order=timestamp.asc",
            doctor_id, from_ms, to_ms
        );
        self.fetch_all(&path).await
    }

    async fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        self.call("book_appointment", json!({ "p_appointment": to_args(&appointment)? })).await
    }

    async fn move_appointment(&self, slot_move: SlotMove) -> Result<Appointment, StoreError> {
        self.call("move_appointment", json!({ "p_move": to_args(&slot_move)? })).await
    }

    async fn transition_appointment(&self, change: StatusChange) -> Result<Appointment, StoreError> {
        self.call("transition_appointment", json!({ "p_change": to_args(&change)? })).await
    }

    async fn get_treatment(&self, treatment_id: Uuid) -> Result<Option<Treatment>, StoreError> {
        self.fetch_one(&format!("/rest/v1/treatments?id=eq.{}", treatment_id)).await
    }

    async fn complete_treatment(&self, commit: TreatmentCommit) -> Result<CompletedTreatment, StoreError> {
        self.call("complete_treatment", json!({ "p_commit": to_args(&commit)? })).await
    }

    async fn correct_treatment_services(&self, correction: ServiceCorrection) -> Result<Invoice, StoreError> {
        self.call("correct_treatment_services", json!({ "p_correction": to_args(&correction)? })).await
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        self.fetch_one(&format!("/rest/v1/invoices?id=eq.{}", invoice_id)).await
    }

    async fn invoice_payments(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        self.fetch_all(&format!("/rest/v1/payments?invoice_id=eq.{}&order=processed_at.asc", invoice_id)).await
    }

    async fn record_payment(&self, payment: Payment) -> Result<PaymentReceipt, StoreError> {
        self.call("record_payment", json!({ "p_payment": to_args(&payment)? })).await
    }

    async fn settle_invoice(&self, invoice_id: Uuid, paid_at: DateTime<Utc>) -> Result<SettledInvoice, StoreError> {
        self.call("settle_invoice", json!({
            "p_invoice_id": invoice_id,
            "p_paid_at": paid_at.to_rfc3339(),
        })).await
    }
}
