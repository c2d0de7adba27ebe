use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use appointment_cell::models::BookAppointmentRequest;
use appointment_cell::AppointmentBookingGuard;
use billing_cell::models::{BillingError, CompleteTreatmentRequest, ServiceEntry};
use billing_cell::{BillingCascade, PaymentLedger};
use shared_models::{Invoice, InvoiceStatus, PaymentMethod};
use shared_utils::test_utils::{ClinicFixture, TestUser};

/// Books and completes a visit, returning its invoice.
async fn invoiced_visit(fixture: &ClinicFixture, time: &str, fee: Decimal, services: Vec<ServiceEntry>) -> Invoice {
    let state = fixture.state();
    let appointment = AppointmentBookingGuard::new(&state)
        .book(
            &fixture.staff(),
            BookAppointmentRequest {
                doctor_id: fixture.doctor.id,
                patient_id: fixture.patient.id,
                date: "2024-01-10".to_string(),
                time: time.to_string(),
                reason: None,
                fee: Some(fee),
            },
        )
        .await
        .unwrap();

    BillingCascade::new(&state)
        .complete_treatment(
            &fixture.doctor_user(),
            CompleteTreatmentRequest {
                appointment_id: appointment.id,
                diagnosis: "Seasonal influenza".to_string(),
                services_used: services,
                follow_up: None,
            },
        )
        .await
        .unwrap()
        .invoice
}

#[tokio::test]
async fn full_payment_settles_invoice_and_restores_balance() {
    let fixture = ClinicFixture::new();
    let invoice = invoiced_visit(&fixture, "09:00", dec!(1000), vec![ServiceEntry::new("s1", dec!(500))]).await;
    let ledger = PaymentLedger::new(&fixture.state());

    let receipt = ledger
        .record_payment(&fixture.staff(), invoice.id, dec!(1650), PaymentMethod::Cash)
        .await
        .unwrap();

    assert_eq!(receipt.payment.amount, dec!(1650));
    assert_eq!(receipt.payment.patient_id, fixture.patient.id);
    assert_eq!(receipt.invoice.status, InvoiceStatus::Paid);
    assert!(receipt.invoice.paid_at.is_some());
    assert_eq!(receipt.patient_balance, Decimal::ZERO);
}

#[tokio::test]
async fn partial_payments_accumulate_until_paid() {
    let fixture = ClinicFixture::new();
    let invoice = invoiced_visit(&fixture, "09:00", dec!(1000), vec![]).await;
    let ledger = PaymentLedger::new(&fixture.state());
    let staff = fixture.staff();

    let first = ledger.record_payment(&staff, invoice.id, dec!(600), PaymentMethod::Card).await.unwrap();
    assert_eq!(first.invoice.status, InvoiceStatus::Due);
    assert_eq!(first.patient_balance, dec!(500));

    let second = ledger.record_payment(&staff, invoice.id, dec!(500), PaymentMethod::Cash).await.unwrap();
    assert_eq!(second.invoice.status, InvoiceStatus::Paid);
    assert_eq!(second.patient_balance, dec!(0));

    let payments = ledger.invoice_payments(&staff, invoice.id).await.unwrap();
    assert_eq!(payments.len(), 2);
    assert_eq!(payments.iter().map(|p| p.amount).sum::<Decimal>(), dec!(1100));
}

#[tokio::test]
async fn overpayment_clamps_balance_at_zero() {
    let fixture = ClinicFixture::new();
    let invoice = invoiced_visit(&fixture, "09:00", dec!(100), vec![]).await;
    let ledger = PaymentLedger::new(&fixture.state());

    let receipt = ledger
        .record_payment(&fixture.staff(), invoice.id, dec!(5000), PaymentMethod::BankTransfer)
        .await
        .unwrap();

    assert_eq!(receipt.patient_balance, Decimal::ZERO);
    assert_eq!(receipt.invoice.status, InvoiceStatus::Paid);
}

#[derive(Debug, Clone, Copy)]
enum LedgerStep {
    VisitA,
    VisitB,
    PayA(Decimal),
    PayB(Decimal),
}

async fn balance_after(steps: &[LedgerStep]) -> Decimal {
    let fixture = ClinicFixture::new();
    let ledger = PaymentLedger::new(&fixture.state());
    let staff = fixture.staff();
    let (mut a, mut b) = (None, None);

    for step in steps {
        match *step {
            LedgerStep::VisitA => a = Some(invoiced_visit(&fixture, "09:00", dec!(1000), vec![]).await),
            LedgerStep::VisitB => {
                b = Some(invoiced_visit(&fixture, "10:00", dec!(200), vec![ServiceEntry::new("lab", dec!(50))]).await)
            }
            LedgerStep::PayA(amount) => {
                let id = a.as_ref().unwrap().id;
                ledger.record_payment(&staff, id, amount, PaymentMethod::Cash).await.unwrap();
            }
            LedgerStep::PayB(amount) => {
                let id = b.as_ref().unwrap().id;
                ledger.record_payment(&staff, id, amount, PaymentMethod::Card).await.unwrap();
            }
        }
    }

    ledger.patient_balance(&staff, fixture.patient.id).await.unwrap().balance
}

#[tokio::test]
async fn balance_is_totals_minus_payments_regardless_of_order() {
    use LedgerStep::*;

    // Invoice A totals 1100, invoice B 275; 675 is paid in three payments.
    let orderings: [&[LedgerStep]; 3] = [
        &[VisitA, PayA(dec!(300)), VisitB, PayB(dec!(275)), PayA(dec!(100))],
        &[VisitA, VisitB, PayA(dec!(100)), PayB(dec!(275)), PayA(dec!(300))],
        &[VisitB, PayB(dec!(275)), VisitA, PayA(dec!(100)), PayA(dec!(300))],
    ];

    for steps in orderings {
        assert_eq!(balance_after(steps).await, dec!(1100) + dec!(275) - dec!(675), "{:?}", steps);
    }
}

#[tokio::test]
async fn non_positive_amount_and_unknown_invoice_are_rejected() {
    let fixture = ClinicFixture::new();
    let invoice = invoiced_visit(&fixture, "09:00", dec!(100), vec![]).await;
    let ledger = PaymentLedger::new(&fixture.state());
    let staff = fixture.staff();

    assert_matches!(
        ledger.record_payment(&staff, invoice.id, dec!(0), PaymentMethod::Cash).await,
        Err(BillingError::ValidationError(_))
    );
    assert_matches!(
        ledger.record_payment(&staff, invoice.id, dec!(-10), PaymentMethod::Cash).await,
        Err(BillingError::ValidationError(_))
    );
    assert_matches!(
        ledger.record_payment(&staff, Uuid::new_v4(), dec!(10), PaymentMethod::Cash).await,
        Err(BillingError::NotFound(_))
    );
}

#[tokio::test]
async fn mark_paid_clears_the_outstanding_amount_once() {
    let fixture = ClinicFixture::new();
    let invoice = invoiced_visit(&fixture, "09:00", dec!(1000), vec![]).await; // 1100
    let other = invoiced_visit(&fixture, "10:00", dec!(100), vec![]).await; // 110
    let ledger = PaymentLedger::new(&fixture.state());
    let staff = fixture.staff();

    let settled = ledger.mark_invoice_paid(&staff, invoice.id).await.unwrap();
    assert_eq!(settled.invoice.status, InvoiceStatus::Paid);
    assert_eq!(settled.patient_balance, dec!(110));

    assert_matches!(
        ledger.mark_invoice_paid(&staff, invoice.id).await,
        Err(BillingError::InvalidState(_))
    );

    // Settling after a partial payment only clears what is still owed
    ledger.record_payment(&staff, other.id, dec!(10), PaymentMethod::Cash).await.unwrap();
    let settled = ledger.mark_invoice_paid(&staff, other.id).await.unwrap();
    assert_eq!(settled.patient_balance, Decimal::ZERO);
}

#[tokio::test]
async fn recompute_of_a_paid_invoice_keeps_its_status() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let invoice = invoiced_visit(&fixture, "09:00", dec!(1000), vec![]).await; // 1100
    let ledger = PaymentLedger::new(&state);
    ledger.mark_invoice_paid(&fixture.staff(), invoice.id).await.unwrap();

    let corrected = BillingCascade::new(&state)
        .recompute_invoice(&fixture.doctor_user(), invoice.treatment_id, vec![ServiceEntry::new("xray", dec!(500))])
        .await
        .unwrap();

    assert_eq!(corrected.subtotal, dec!(1500));
    assert_eq!(corrected.total, dec!(1650));
    assert_eq!(corrected.status, InvoiceStatus::Paid);
    assert_eq!(corrected.invoice_number, invoice.invoice_number);
    let balance = ledger.patient_balance(&fixture.staff(), fixture.patient.id).await.unwrap();
    assert_eq!(balance.balance, dec!(550));
}

#[tokio::test]
async fn recompute_below_payments_leaves_invoice_due() {
    let fixture = ClinicFixture::new();
    let state = fixture.state();
    let invoice = invoiced_visit(&fixture, "09:00", dec!(100), vec![ServiceEntry::new("scan", dec!(900))]).await; // 1100
    let ledger = PaymentLedger::new(&state);
    ledger.record_payment(&fixture.staff(), invoice.id, dec!(200), PaymentMethod::Cash).await.unwrap();

    let corrected = BillingCascade::new(&state)
        .recompute_invoice(&fixture.doctor_user(), invoice.treatment_id, vec![])
        .await
        .unwrap();

    assert_eq!(corrected.total, dec!(110));
    assert_eq!(corrected.status, InvoiceStatus::Due);
    assert!(corrected.paid_at.is_none());
    assert_eq!(corrected.invoice_number, invoice.invoice_number);
    let balance = ledger.patient_balance(&fixture.staff(), fixture.patient.id).await.unwrap();
    assert_eq!(balance.balance, Decimal::ZERO);
}

#[tokio::test]
async fn other_clinics_cannot_touch_the_ledger() {
    let fixture = ClinicFixture::new();
    let invoice = invoiced_visit(&fixture, "09:00", dec!(100), vec![]).await;
    let ledger = PaymentLedger::new(&fixture.state());
    let outsider = TestUser::default().to_user();

    assert_matches!(
        ledger.record_payment(&outsider, invoice.id, dec!(10), PaymentMethod::Cash).await,
        Err(BillingError::Forbidden(_))
    );
    assert_matches!(
        ledger.patient_balance(&outsider, fixture.patient.id).await,
        Err(BillingError::Forbidden(_))
    );
}
