use std::collections::HashSet;
use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use appointment_cell::models::BookAppointmentRequest;
use appointment_cell::{AppointmentBookingGuard, FOLLOW_UP_REASON};
use billing_cell::models::{BillingError, CompleteTreatmentRequest, FollowUpRequest, ServiceEntry};
use billing_cell::BillingCascade;
use shared_database::ClinicStore;
use shared_models::{Appointment, AppointmentStatus, InvoiceStatus};
use shared_utils::test_utils::{ClinicFixture, TestUser};

async fn book(fixture: &ClinicFixture, date: &str, time: &str, fee: Decimal) -> Appointment {
    AppointmentBookingGuard::new(&fixture.state())
        .book(
            &fixture.staff(),
            BookAppointmentRequest {
                doctor_id: fixture.doctor.id,
                patient_id: fixture.patient.id,
                date: date.to_string(),
                time: time.to_string(),
                reason: Some("Consultation".to_string()),
                fee: Some(fee),
            },
        )
        .await
        .unwrap()
}

fn completion(appointment_id: Uuid, services: Vec<ServiceEntry>) -> CompleteTreatmentRequest {
    CompleteTreatmentRequest {
        appointment_id,
        diagnosis: "Lumbar strain".to_string(),
        services_used: services,
        follow_up: None,
    }
}

#[tokio::test]
async fn completing_a_visit_issues_invoice_and_charges_patient() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let appointment = book(&fixture, "2024-01-10", "09:00", dec!(1000)).await;
    let cascade = BillingCascade::new(&state);

    let result = cascade
        .complete_treatment(
            &fixture.doctor_user(),
            completion(appointment.id, vec![ServiceEntry::new("s1", dec!(500))]),
        )
        .await
        .unwrap();

    assert_eq!(result.invoice.subtotal, dec!(1500));
    assert_eq!(result.invoice.tax, dec!(150));
    assert_eq!(result.invoice.total, dec!(1650));
    assert_eq!(result.invoice.status, InvoiceStatus::Due);
    assert_eq!(result.invoice.invoice_number, "INV-202401-0001");
    assert_eq!(result.invoice.treatment_id, result.treatment.id);
    assert_eq!(result.treatment.invoice_id, Some(result.invoice.id));
    assert_eq!(result.patient_balance, dec!(1650));
    assert!(result.follow_up_appointment.is_none());

    let stored = state.store.get_appointment(appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Completed);
    let patient = state.store.get_patient(fixture.patient.id).await.unwrap().unwrap();
    assert_eq!(patient.balance, dec!(1650));
}

#[tokio::test]
async fn incomplete_service_lines_do_not_count() {
    let fixture = ClinicFixture::new();
    let appointment = book(&fixture, "2024-01-10", "09:00", dec!(200)).await;
    let services: Vec<ServiceEntry> = serde_json::from_value(json!([
        { "id": "dressing", "price": "35.50" },
        { "id": "discount", "price": -100 },
        { "price": 80 },
        { "id": "consult" }
    ]))
    .unwrap();

    let result = BillingCascade::new(&fixture.state())
        .complete_treatment(&fixture.doctor_user(), completion(appointment.id, services))
        .await
        .unwrap();

    assert_eq!(result.treatment.services_used.len(), 2);
    assert_eq!(result.invoice.subtotal, dec!(235.50));
    assert_eq!(result.invoice.tax, dec!(23.55));
    assert_eq!(result.invoice.total, dec!(259.05));
}

#[tokio::test]
async fn follow_up_is_booked_at_the_recommended_slot() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let appointment = book(&fixture, "2024-01-10", "09:00", dec!(1000)).await;

    let mut request = completion(appointment.id, vec![]);
    request.follow_up = Some(FollowUpRequest {
        recommended: true,
        date: Some("2024-02-01".to_string()),
        time: Some("10:00".to_string()),
    });

    let result = BillingCascade::new(&state)
        .complete_treatment(&fixture.doctor_user(), request)
        .await
        .unwrap();

    let follow_up = result.follow_up_appointment.expect("follow-up booked");
    assert_eq!(follow_up.status, AppointmentStatus::Pending);
    assert_eq!(follow_up.doctor_id, fixture.doctor.id);
    assert_eq!(follow_up.patient_id, fixture.patient.id);
    assert_eq!(follow_up.date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    assert_eq!(follow_up.time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    assert_eq!(follow_up.follow_up_for_id, Some(appointment.id));
    assert_eq!(follow_up.fee, Decimal::ZERO);
    assert_eq!(follow_up.reason.as_deref(), Some(FOLLOW_UP_REASON));
    assert_eq!(follow_up.tenant(), appointment.tenant());

    let stored = state.store.get_appointment(follow_up.id).await.unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn follow_up_without_time_keeps_the_original_time() {
    let fixture = ClinicFixture::new();
    let appointment = book(&fixture, "2024-01-10", "14:30", dec!(100)).await;

    let mut request = completion(appointment.id, vec![]);
    request.follow_up = Some(FollowUpRequest {
        recommended: true,
        date: Some("2024-01-24".to_string()),
        time: None,
    });

    let result = BillingCascade::new(&fixture.state())
        .complete_treatment(&fixture.doctor_user(), request)
        .await
        .unwrap();

    let follow_up = result.follow_up_appointment.unwrap();
    assert_eq!(follow_up.time, appointment.time);
}

#[tokio::test]
async fn taken_follow_up_slot_does_not_abort_the_cascade() {
    let fixture = ClinicFixture::new();
    let appointment = book(&fixture, "2024-01-10", "09:00", dec!(1000)).await;
    book(&fixture, "2024-02-01", "10:00", dec!(1000)).await;

    let mut request = completion(appointment.id, vec![ServiceEntry::new("s1", dec!(500))]);
    request.follow_up = Some(FollowUpRequest {
        recommended: true,
        date: Some("2024-02-01".to_string()),
        time: Some("10:00".to_string()),
    });

    let result = BillingCascade::new(&fixture.state())
        .complete_treatment(&fixture.doctor_user(), request)
        .await
        .unwrap();

    assert!(result.follow_up_appointment.is_none());
    assert_eq!(result.invoice.total, dec!(1650));
    assert!(result.treatment.follow_up_recommended);
}

#[tokio::test]
async fn follow_up_needs_recommendation_and_date() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let first = book(&fixture, "2024-01-10", "09:00", dec!(100)).await;
    let second = book(&fixture, "2024-01-10", "09:30", dec!(100)).await;
    let cascade = BillingCascade::new(&state);

    let mut not_recommended = completion(first.id, vec![]);
    not_recommended.follow_up = Some(FollowUpRequest {
        recommended: false,
        date: Some("2024-02-01".to_string()),
        time: Some("10:00".to_string()),
    });
    let result = cascade.complete_treatment(&fixture.doctor_user(), not_recommended).await.unwrap();
    assert!(result.follow_up_appointment.is_none());

    let mut no_date = completion(second.id, vec![]);
    no_date.follow_up = Some(FollowUpRequest {
        recommended: true,
        date: Some(String::new()),
        time: Some("10:00".to_string()),
    });
    let result = cascade.complete_treatment(&fixture.doctor_user(), no_date).await.unwrap();
    assert!(result.follow_up_appointment.is_none());
}

#[tokio::test]
async fn only_the_appointments_doctor_may_complete_it() {
    let fixture = ClinicFixture::new();
    let appointment = book(&fixture, "2024-01-10", "09:00", dec!(1000)).await;
    let cascade = BillingCascade::new(&fixture.state());

    let colleague = TestUser::new("colleague@clinic.test", "doctor", fixture.tenant).to_user();
    assert_matches!(
        cascade.complete_treatment(&colleague, completion(appointment.id, vec![])).await,
        Err(BillingError::Forbidden(_))
    );
    assert_matches!(
        cascade.complete_treatment(&fixture.staff(), completion(appointment.id, vec![])).await,
        Err(BillingError::Forbidden(_))
    );
    assert_matches!(
        cascade.complete_treatment(&fixture.doctor_user(), completion(Uuid::new_v4(), vec![])).await,
        Err(BillingError::NotFound(_))
    );
}

#[tokio::test]
async fn a_visit_is_billed_once() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let appointment = book(&fixture, "2024-01-10", "09:00", dec!(1000)).await;
    let cascade = BillingCascade::new(&state);

    cascade
        .complete_treatment(&fixture.doctor_user(), completion(appointment.id, vec![]))
        .await
        .unwrap();
    assert_matches!(
        cascade.complete_treatment(&fixture.doctor_user(), completion(appointment.id, vec![])).await,
        Err(BillingError::Conflict(_))
    );

    let patient = state.store.get_patient(fixture.patient.id).await.unwrap().unwrap();
    assert_eq!(patient.balance, dec!(1100));
}

#[tokio::test]
async fn cancelled_visit_cannot_be_completed() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let appointment = book(&fixture, "2024-01-10", "09:00", dec!(1000)).await;
    AppointmentBookingGuard::new(&state)
        .cancel(appointment.id, &fixture.staff(), None)
        .await
        .unwrap();

    assert_matches!(
        BillingCascade::new(&state)
            .complete_treatment(&fixture.doctor_user(), completion(appointment.id, vec![]))
            .await,
        Err(BillingError::InvalidState(_))
    );
}

#[tokio::test]
async fn invalid_follow_up_is_rejected_before_any_write() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let appointment = book(&fixture, "2024-01-10", "09:00", dec!(1000)).await;

    let mut request = completion(appointment.id, vec![]);
    request.follow_up = Some(FollowUpRequest {
        recommended: true,
        date: Some("2024-02-30".to_string()),
        time: None,
    });

    assert_matches!(
        BillingCascade::new(&state).complete_treatment(&fixture.doctor_user(), request).await,
        Err(BillingError::ValidationError(_))
    );
    let stored = state.store.get_appointment(appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn concurrent_completions_get_distinct_invoice_numbers() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let cascade = Arc::new(BillingCascade::new(&state));

    let mut appointments = Vec::new();
    for hour in 9..17 {
        appointments.push(book(&fixture, "2024-01-10", &format!("{:02}:00", hour), dec!(100)).await);
    }

    let doctor = fixture.doctor_user();
    let runs = appointments.iter().map(|appointment| {
        let cascade = cascade.clone();
        let doctor = doctor.clone();
        let request = completion(appointment.id, vec![]);
        tokio::spawn(async move { cascade.complete_treatment(&doctor, request).await })
    });

    let numbers: HashSet<String> = join_all(runs)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().invoice.invoice_number)
        .collect();

    assert_eq!(numbers.len(), 8);
    assert!(numbers.contains("INV-202401-0001"));
    assert!(numbers.contains("INV-202401-0008"));

    let patient = state.store.get_patient(fixture.patient.id).await.unwrap().unwrap();
    assert_eq!(patient.balance, dec!(880));
}

#[tokio::test]
async fn recompute_rewrites_amounts_and_shifts_balance() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let appointment = book(&fixture, "2024-01-10", "09:00", dec!(1000)).await;
    let cascade = BillingCascade::new(&state);

    let result = cascade
        .complete_treatment(
            &fixture.doctor_user(),
            completion(appointment.id, vec![ServiceEntry::new("s1", dec!(500))]),
        )
        .await
        .unwrap();

    let invoice = cascade
        .recompute_invoice(
            &fixture.doctor_user(),
            result.treatment.id,
            vec![ServiceEntry::new("s1", dec!(500)), ServiceEntry::new("s2", dec!(200))],
        )
        .await
        .unwrap();

    assert_eq!(invoice.id, result.invoice.id);
    assert_eq!(invoice.invoice_number, result.invoice.invoice_number);
    assert_eq!(invoice.status, InvoiceStatus::Due);
    assert_eq!(invoice.subtotal, dec!(1700));
    assert_eq!(invoice.total, dec!(1870));

    let treatment = cascade.get_treatment(&fixture.staff(), result.treatment.id).await.unwrap();
    assert_eq!(treatment.services_used.len(), 2);
    let patient = state.store.get_patient(fixture.patient.id).await.unwrap().unwrap();
    assert_eq!(patient.balance, dec!(1870));
}
