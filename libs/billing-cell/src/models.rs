// libs/billing-cell/src/models.rs
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::models::AppointmentError;
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::{Appointment, Invoice, PaymentMethod, Treatment};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// A service line as submitted. Entries are kept loose so that incomplete lines can be
/// dropped instead of failing the whole request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
}

impl ServiceEntry {
    pub fn new(id: &str, price: Decimal) -> Self {
        Self {
            id: Some(id.to_string()),
            price: Some(Value::String(price.to_string())),
        }
    }

    /// Price as a decimal, accepting JSON numbers and numeric strings.
    pub fn price_value(&self) -> Option<Decimal> {
        match self.price.as_ref()? {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    #[serde(default)]
    pub recommended: bool,
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTreatmentRequest {
    pub appointment_id: Uuid,
    pub diagnosis: String,
    #[serde(default)]
    pub services_used: Vec<ServiceEntry>,
    #[serde(default)]
    pub follow_up: Option<FollowUpRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateServicesRequest {
    #[serde(default)]
    pub services_used: Vec<ServiceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub method: PaymentMethod,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentCompletion {
    pub treatment: Treatment,
    pub invoice: Invoice,
    pub patient_balance: Decimal,
    /// Present when a follow-up was recommended and its slot could be booked.
    pub follow_up_appointment: Option<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientBalanceResponse {
    pub patient_id: Uuid,
    pub balance: Decimal,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum BillingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StoreError> for BillingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(what) => BillingError::NotFound(what),
            StoreError::Conflict(msg) => BillingError::Conflict(msg),
            StoreError::InvalidState(msg) => BillingError::InvalidState(msg),
            StoreError::Backend(msg) => BillingError::DatabaseError(msg),
        }
    }
}

impl From<AppointmentError> for BillingError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::ValidationError(msg) => BillingError::ValidationError(msg),
            AppointmentError::NotFound => BillingError::NotFound("Appointment".to_string()),
            AppointmentError::DoctorNotFound => BillingError::NotFound("Doctor".to_string()),
            AppointmentError::Forbidden(msg) => BillingError::Forbidden(msg),
            AppointmentError::Conflict(msg) => BillingError::Conflict(msg),
            AppointmentError::InvalidState(msg) => BillingError::InvalidState(msg),
            AppointmentError::InvalidStatusTransition(status) => {
                BillingError::InvalidState(format!("Appointment is {}", status))
            }
            AppointmentError::DatabaseError(msg) => BillingError::DatabaseError(msg),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(error: BillingError) -> Self {
        match error {
            BillingError::NotFound(_) => AppError::NotFound(error.to_string()),
            BillingError::Forbidden(msg) => AppError::Forbidden(msg),
            BillingError::ValidationError(msg) => AppError::ValidationError(msg),
            BillingError::Conflict(msg) => AppError::Conflict(msg),
            BillingError::InvalidState(msg) => AppError::BadRequest(msg),
            BillingError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn prices_accept_numbers_and_strings() {
        let entries: Vec<ServiceEntry> = serde_json::from_value(json!([
            { "id": "s1", "price": 500 },
            { "id": "s2", "price": "12.50" },
            { "id": "s3", "price": 19.99 },
            { "id": "s4", "price": "free" },
            { "id": "s5" }
        ]))
        .unwrap();

        let prices: Vec<Option<Decimal>> = entries.iter().map(ServiceEntry::price_value).collect();
        assert_eq!(prices, vec![Some(dec!(500)), Some(dec!(12.50)), Some(dec!(19.99)), None, None]);
    }

    #[test]
    fn invalid_state_is_a_bad_request() {
        let error = AppError::from(BillingError::InvalidState("invoice is already paid".into()));
        assert_eq!(error.status(), axum::http::StatusCode::BAD_REQUEST);
        let error = AppError::from(BillingError::NotFound("Invoice".into()));
        assert_eq!(error.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
