// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::ClinicSettings;
use shared_database::{ClinicStore, SlotMove, StatusChange};
use shared_models::auth::User;
use shared_models::{Appointment, AppointmentStatus, Tenant};
use shared_utils::{AppState, Clock};

use crate::models::{AppointmentError, BookAppointmentRequest};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::slots::{day_bounds, parse_date, parse_time, slot_timestamp};

/// A validated booking, ready to be committed against the slot index.
#[derive(Debug, Clone)]
pub struct SlotBooking {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reason: Option<String>,
    pub fee: Decimal,
    pub follow_up_for_id: Option<Uuid>,
    pub tenant: Tenant,
}

/// Owns appointment creation and status changes. Slot exclusivity is enforced by the
/// store's atomic insert/move, never by a prior read.
#[derive(Clone)]
pub struct AppointmentBookingGuard {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    settings: ClinicSettings,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentBookingGuard {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            clock: state.clock.clone(),
            settings: state.settings().clone(),
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    pub async fn book(
        &self,
        actor: &User,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Booking request from {} for doctor {} at {} {}",
               actor.id, request.doctor_id, request.date, request.time);

        let tenant = actor
            .tenant()
            .ok_or_else(|| AppointmentError::Forbidden("Actor is not scoped to a clinic".to_string()))?;

        let date = parse_date(&request.date)?;
        let time = parse_time(&request.time)?;

        let doctor = self
            .store
            .get_doctor(request.doctor_id)
            .await?
            .ok_or_else(|| AppointmentError::ValidationError("Doctor not found".to_string()))?;
        ensure_tenant(tenant, doctor.tenant())?;

        let patient = self
            .store
            .get_patient(request.patient_id)
            .await?
            .ok_or_else(|| AppointmentError::ValidationError("Patient not found".to_string()))?;
        ensure_tenant(tenant, patient.tenant())?;

        let fee = request
            .fee
            .or(doctor.consultation_fee)
            .unwrap_or(Decimal::ZERO);
        if fee < Decimal::ZERO {
            return Err(AppointmentError::ValidationError("Fee cannot be negative".to_string()));
        }

        self.book_slot(SlotBooking {
            doctor_id: doctor.id,
            patient_id: patient.id,
            date,
            time,
            reason: request.reason,
            fee,
            follow_up_for_id: None,
            tenant,
        })
        .await
    }

    /// Commits a pending appointment. A live appointment already holding the same
    /// (doctor, date, time) yields `Conflict`.
    pub async fn book_slot(&self, booking: SlotBooking) -> Result<Appointment, AppointmentError> {
        let now = self.clock.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: booking.doctor_id,
            patient_id: booking.patient_id,
            date: booking.date,
            time: booking.time,
            timestamp: slot_timestamp(booking.date, booking.time, self.settings.offset()),
            status: AppointmentStatus::Pending,
            fee: booking.fee,
            reason: booking.reason,
            notes: None,
            follow_up_for_id: booking.follow_up_for_id,
            organization_id: booking.tenant.organization_id,
            location_id: booking.tenant.location_id,
            created_at: now,
            updated_at: now,
        };

        let created = self.store.insert_appointment(appointment).await.map_err(|e| {
            let error = AppointmentError::from(e);
            if let AppointmentError::Conflict(_) = error {
                warn!("Slot {} {} of doctor {} is already booked",
                      booking.date, booking.time, booking.doctor_id);
                return AppointmentError::Conflict("slot already booked".to_string());
            }
            error
        })?;

        info!("Appointment {} booked for doctor {} at {} {}",
              created.id, created.doctor_id, created.date, created.time);
        Ok(created)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid, actor: &User) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        ensure_actor_tenant(actor, appointment.tenant())?;
        Ok(appointment)
    }

    /// All appointments of a doctor's day, cancelled ones included, in time order.
    pub async fn list_doctor_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        actor: &User,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let doctor = self
            .store
            .get_doctor(doctor_id)
            .await?
            .ok_or(AppointmentError::DoctorNotFound)?;
        ensure_actor_tenant(actor, doctor.tenant())?;

        let (from_ms, to_ms) = day_bounds(date, self.settings.offset());
        let appointments = self
            .store
            .appointments_for_doctor_between(doctor_id, from_ms, to_ms)
            .await?;

        Ok(appointments)
    }

    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        actor: &User,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let note = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .map(|r| format!("Cancellation reason: {}", r));

        self.transition(appointment_id, actor, AppointmentStatus::Cancelled, note).await
    }

    pub async fn confirm(&self, appointment_id: Uuid, actor: &User) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, actor, AppointmentStatus::Confirmed, None).await
    }

    /// Moves an appointment to a new date and/or time, re-deriving its timestamp. The
    /// appointment's own slot does not count as a conflict.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        actor: &User,
        new_date: Option<&str>,
        new_time: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        if new_date.is_none() && new_time.is_none() {
            return Err(AppointmentError::ValidationError(
                "A new date or time is required".to_string(),
            ));
        }

        let date = new_date.map(parse_date).transpose()?;
        let time = new_time.map(parse_time).transpose()?;

        let appointment = self.load(appointment_id).await?;
        ensure_actor_tenant(actor, appointment.tenant())?;
        if appointment.status.is_terminal() {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }
        ensure_owner(&appointment, actor)?;

        let date = date.unwrap_or(appointment.date);
        let time = time.unwrap_or(appointment.time);

        let moved = self
            .store
            .move_appointment(SlotMove {
                appointment_id,
                date,
                time,
                timestamp: slot_timestamp(date, time, self.settings.offset()),
                allowed_from: self.lifecycle.reschedulable_from(),
                updated_at: self.clock.now(),
            })
            .await
            .map_err(|e| match AppointmentError::from(e) {
                AppointmentError::Conflict(_) => {
                    warn!("Reschedule of {} rejected: {} {} is taken", appointment_id, date, time);
                    AppointmentError::Conflict("slot already booked".to_string())
                }
                other => other,
            })?;

        info!("Appointment {} rescheduled to {} {}", moved.id, moved.date, moved.time);
        Ok(moved)
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        actor: &User,
        target: AppointmentStatus,
        note: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        ensure_actor_tenant(actor, appointment.tenant())?;
        self.lifecycle.validate_status_transition(appointment.status, target)?;
        ensure_owner(&appointment, actor)?;

        let updated = self
            .store
            .transition_appointment(StatusChange {
                appointment_id,
                allowed_from: self.lifecycle.sources_for(target),
                to: target,
                note,
                updated_at: self.clock.now(),
            })
            .await?;

        info!("Appointment {} is now {}", updated.id, updated.status);
        Ok(updated)
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

}

/// A doctor may only touch their own appointments.
fn ensure_owner(appointment: &Appointment, actor: &User) -> Result<(), AppointmentError> {
    if actor.is_doctor() && !actor.is(appointment.doctor_id) {
        warn!("Doctor {} attempted to modify appointment {} of doctor {}",
              actor.id, appointment.id, appointment.doctor_id);
        return Err(AppointmentError::Forbidden(
            "Doctors can only modify their own appointments".to_string(),
        ));
    }

    Ok(())
}

fn ensure_tenant(actor_tenant: Tenant, owner: Tenant) -> Result<(), AppointmentError> {
    if actor_tenant == owner {
        Ok(())
    } else {
        Err(AppointmentError::Forbidden("Record belongs to another clinic".to_string()))
    }
}

fn ensure_actor_tenant(actor: &User, owner: Tenant) -> Result<(), AppointmentError> {
    if actor.belongs_to(owner) {
        Ok(())
    } else {
        Err(AppointmentError::Forbidden("Record belongs to another clinic".to_string()))
    }
}
