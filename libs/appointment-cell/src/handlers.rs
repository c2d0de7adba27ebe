// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::AppState;

use crate::models::{
    BookAppointmentRequest, CancelAppointmentRequest, DateQuery, RescheduleAppointmentRequest,
};
use crate::services::booking::AppointmentBookingGuard;
use crate::services::slots::{parse_date, SlotAvailabilityEngine};

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let date = parse_date(&query.date)?;
    let engine = SlotAvailabilityEngine::new(&state);

    let slots = engine.available_slots(doctor_id, date, &user).await?;

    Ok(Json(json!(slots)))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let date = parse_date(&query.date)?;
    let guard = AppointmentBookingGuard::new(&state);

    let appointments = guard.list_doctor_appointments(doctor_id, date, &user).await?;

    Ok(Json(json!({
        "date": query.date,
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let guard = AppointmentBookingGuard::new(&state);

    let appointment = guard.book(&user, request).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let guard = AppointmentBookingGuard::new(&state);

    let appointment = guard.get_appointment(appointment_id, &user).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let guard = AppointmentBookingGuard::new(&state);

    let appointment = guard.confirm(appointment_id, &user).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    request: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let reason = request.and_then(|Json(body)| body.reason);
    let guard = AppointmentBookingGuard::new(&state);

    let appointment = guard.cancel(appointment_id, &user, reason).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let guard = AppointmentBookingGuard::new(&state);

    let appointment = guard
        .reschedule(
            appointment_id,
            &user,
            request.date.as_deref(),
            request.time.as_deref(),
        )
        .await?;

    Ok(Json(json!(appointment)))
}
