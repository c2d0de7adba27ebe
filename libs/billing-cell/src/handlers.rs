// libs/billing-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::AppState;

use crate::models::{CompleteTreatmentRequest, RecordPaymentRequest, UpdateServicesRequest};
use crate::services::cascade::BillingCascade;
use crate::services::ledger::PaymentLedger;

// ==============================================================================
// TREATMENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn complete_treatment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteTreatmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let cascade = BillingCascade::new(&state);

    let completion = cascade.complete_treatment(&user, request).await?;

    Ok((StatusCode::CREATED, Json(json!(completion))))
}

#[axum::debug_handler]
pub async fn get_treatment(
    State(state): State<Arc<AppState>>,
    Path(treatment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let cascade = BillingCascade::new(&state);

    let treatment = cascade.get_treatment(&user, treatment_id).await?;

    Ok(Json(json!(treatment)))
}

#[axum::debug_handler]
pub async fn update_treatment_services(
    State(state): State<Arc<AppState>>,
    Path(treatment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateServicesRequest>,
) -> Result<Json<Value>, AppError> {
    let cascade = BillingCascade::new(&state);

    let invoice = cascade
        .recompute_invoice(&user, treatment_id, request.services_used)
        .await?;

    Ok(Json(json!(invoice)))
}

// ==============================================================================
// INVOICES & PAYMENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ledger = PaymentLedger::new(&state);

    let invoice = ledger.get_invoice(&user, invoice_id).await?;

    Ok(Json(json!(invoice)))
}

#[axum::debug_handler]
pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let ledger = PaymentLedger::new(&state);

    let receipt = ledger
        .record_payment(&user, invoice_id, request.amount, request.method)
        .await?;

    Ok((StatusCode::CREATED, Json(json!(receipt))))
}

#[axum::debug_handler]
pub async fn get_invoice_payments(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ledger = PaymentLedger::new(&state);

    let payments = ledger.invoice_payments(&user, invoice_id).await?;

    Ok(Json(json!({
        "payments": payments,
        "total": payments.len()
    })))
}

#[axum::debug_handler]
pub async fn mark_invoice_paid(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ledger = PaymentLedger::new(&state);

    let settled = ledger.mark_invoice_paid(&user, invoice_id).await?;

    Ok(Json(json!(settled)))
}

#[axum::debug_handler]
pub async fn get_patient_balance(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let ledger = PaymentLedger::new(&state);

    let balance = ledger.patient_balance(&user, patient_id).await?;

    Ok(Json(json!(balance)))
}
