// libs/appointment-cell/src/services/slots.rs
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime};
use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::ClinicSettings;
use shared_database::ClinicStore;
use shared_models::auth::User;
use shared_models::time_format::{format_slot, SLOT_FORMAT};
use shared_utils::AppState;

use crate::models::{AppointmentError, AvailableSlotsResponse, DoctorSummary};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn hhmm_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").ok())
        .as_ref()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, AppointmentError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppointmentError::ValidationError(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

/// Strict 24-hour `HH:MM`; `9:00` and `09:00:00` are rejected.
pub fn parse_time(raw: &str) -> Result<NaiveTime, AppointmentError> {
    let invalid = || AppointmentError::ValidationError(format!("Invalid time '{}', expected HH:MM", raw));

    let well_formed = match hhmm_pattern() {
        Some(pattern) => pattern.is_match(raw),
        None => raw.len() == 5,
    };
    if !well_formed {
        return Err(invalid());
    }

    NaiveTime::parse_from_str(raw, SLOT_FORMAT).map_err(|_| invalid())
}

/// Epoch milliseconds of `date` + `time` read on the clinic's wall clock.
pub fn slot_timestamp(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> i64 {
    let local = date.and_time(time);
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    utc.and_utc().timestamp_millis()
}

/// `[startOfDay, endOfDay]` in epoch milliseconds, both inclusive.
pub fn day_bounds(date: NaiveDate, offset: FixedOffset) -> (i64, i64) {
    let start = slot_timestamp(date, NaiveTime::MIN, offset);
    (start, start + DAY_MS - 1)
}

/// Candidate slots from the working-hours start (inclusive) to its end (exclusive).
pub fn candidate_slots(settings: &ClinicSettings) -> Vec<NaiveTime> {
    let step = Duration::minutes(i64::from(settings.slot_interval_minutes.max(1)));
    let mut slots = Vec::new();
    let mut current = settings.working_hours_start;

    while current < settings.working_hours_end {
        slots.push(current);
        let (next, wrapped) = current.overflowing_add_signed(step);
        if wrapped != 0 {
            break;
        }
        current = next;
    }

    slots
}

/// Offers the free slots of a doctor's day. Advisory only: nothing is reserved.
#[derive(Clone)]
pub struct SlotAvailabilityEngine {
    store: Arc<dyn ClinicStore>,
    settings: ClinicSettings,
}

impl SlotAvailabilityEngine {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            settings: state.settings().clone(),
        }
    }

    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        actor: &User,
    ) -> Result<AvailableSlotsResponse, AppointmentError> {
        debug!("Computing available slots for doctor {} on {}", doctor_id, date);

        let doctor = self
            .store
            .get_doctor(doctor_id)
            .await?
            .ok_or(AppointmentError::DoctorNotFound)?;

        if !actor.belongs_to(doctor.tenant()) {
            warn!("Actor {} requested slots of doctor {} from another clinic", actor.id, doctor_id);
            return Err(AppointmentError::Forbidden("Record belongs to another clinic".to_string()));
        }

        let (from_ms, to_ms) = day_bounds(date, self.settings.offset());
        let taken: HashSet<String> = self
            .store
            .appointments_for_doctor_between(doctor_id, from_ms, to_ms)
            .await?
            .iter()
            .filter(|appointment| appointment.occupies_slot())
            .map(|appointment| format_slot(&appointment.time))
            .collect();

        let available_slots: Vec<String> = candidate_slots(&self.settings)
            .iter()
            .map(format_slot)
            .filter(|slot| !taken.contains(slot))
            .collect();

        debug!("Doctor {} has {} free slots on {}", doctor_id, available_slots.len(), date);

        Ok(AvailableSlotsResponse {
            date: date.format("%Y-%m-%d").to_string(),
            doctor: DoctorSummary::from(&doctor),
            available_slots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn default_day_has_sixteen_half_hour_slots() {
        let slots: Vec<String> = candidate_slots(&ClinicSettings::default()).iter().map(format_slot).collect();
        assert_eq!(slots.len(), 16);
        assert_eq!(slots.first().map(String::as_str), Some("09:00"));
        assert_eq!(slots.last().map(String::as_str), Some("16:30"));
    }

    #[test]
    fn late_window_does_not_wrap_past_midnight() {
        let settings = ClinicSettings {
            working_hours_start: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            working_hours_end: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            slot_interval_minutes: 45,
            ..ClinicSettings::default()
        };
        let slots: Vec<String> = candidate_slots(&settings).iter().map(format_slot).collect();
        assert_eq!(slots, vec!["23:00", "23:45"]);
    }

    #[test]
    fn time_must_be_strict_hhmm() {
        assert!(parse_time("09:00").is_ok());
        assert!(parse_time("23:59").is_ok());
        for raw in ["9:00", "24:00", "09:60", "09:00:00", "0900", "", "ab:cd"] {
            assert_matches!(parse_time(raw), Err(AppointmentError::ValidationError(_)), "{}", raw);
        }
    }

    #[test]
    fn date_must_be_a_calendar_date() {
        assert!(parse_date("2024-02-29").is_ok());
        assert_matches!(parse_date("2023-02-29"), Err(AppointmentError::ValidationError(_)));
        assert_matches!(parse_date("10/01/2024"), Err(AppointmentError::ValidationError(_)));
    }

    #[test]
    fn timestamp_follows_clinic_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(slot_timestamp(date, time, utc), 1_704_877_200_000);

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(slot_timestamp(date, time, plus_two), 1_704_877_200_000 - 2 * 3_600_000);

        let (start, end) = day_bounds(date, utc);
        assert_eq!(start, 1_704_844_800_000);
        assert_eq!(end - start, DAY_MS - 1);
    }
}
