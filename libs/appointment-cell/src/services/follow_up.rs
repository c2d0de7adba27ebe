// libs/appointment-cell/src/services/follow_up.rs
use tracing::{debug, info, warn};

use rust_decimal::Decimal;
use shared_models::{Appointment, Treatment};
use shared_utils::AppState;

use crate::services::booking::{AppointmentBookingGuard, SlotBooking};

pub const FOLLOW_UP_REASON: &str = "Follow-up appointment";

/// Books the follow-up visit a treatment recommends. Never fails its caller: a taken slot
/// or a storage error is logged and the follow-up is skipped.
#[derive(Clone)]
pub struct FollowUpScheduler {
    guard: AppointmentBookingGuard,
}

impl FollowUpScheduler {
    pub fn new(state: &AppState) -> Self {
        Self {
            guard: AppointmentBookingGuard::new(state),
        }
    }

    /// `origin` is the appointment the treatment was recorded for; the follow-up inherits
    /// its clinic and, when the treatment gives no time, its time of day.
    pub async fn schedule_follow_up(&self, treatment: &Treatment, origin: &Appointment) -> Option<Appointment> {
        if !treatment.follow_up_recommended {
            return None;
        }
        let Some(date) = treatment.follow_up_date else {
            debug!("Treatment {} recommends a follow-up without a date, skipping", treatment.id);
            return None;
        };
        let time = treatment.follow_up_time.unwrap_or(origin.time);

        let booking = SlotBooking {
            doctor_id: treatment.doctor_id,
            patient_id: treatment.patient_id,
            date,
            time,
            reason: Some(FOLLOW_UP_REASON.to_string()),
            fee: Decimal::ZERO,
            follow_up_for_id: Some(origin.id),
            tenant: origin.tenant(),
        };

        match self.guard.book_slot(booking).await {
            Ok(appointment) => {
                info!("Follow-up {} scheduled from appointment {}", appointment.id, origin.id);
                Some(appointment)
            }
            Err(e) => {
                warn!("Could not schedule follow-up for treatment {} at {} {}: {}",
                      treatment.id, date, time, e);
                None
            }
        }
    }
}
