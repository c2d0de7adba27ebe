// libs/billing-cell/src/services/cascade.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use appointment_cell::services::slots::{parse_date, parse_time};
use appointment_cell::FollowUpScheduler;
use shared_config::ClinicSettings;
use shared_database::{ClinicStore, InvoiceDraft, ServiceCorrection, TreatmentCommit};
use shared_models::auth::User;
use shared_models::{AppointmentStatus, Invoice, Treatment};
use shared_utils::{AppState, Clock};

use crate::models::{BillingError, CompleteTreatmentRequest, FollowUpRequest, ServiceEntry, TreatmentCompletion};
use crate::services::amounts::{billable_services, compute_amounts, invoice_period};

/// Follow-up recommendation after input validation.
#[derive(Debug, Clone, Copy, Default)]
struct FollowUpPlan {
    recommended: bool,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
}

impl FollowUpPlan {
    fn parse(request: Option<&FollowUpRequest>) -> Result<Self, BillingError> {
        let Some(request) = request else {
            return Ok(Self::default());
        };

        let non_blank = |raw: &Option<String>| {
            raw.as_deref().map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
        };

        Ok(Self {
            recommended: request.recommended,
            date: non_blank(&request.date).map(|raw| parse_date(&raw)).transpose()?,
            time: non_blank(&request.time).map(|raw| parse_time(&raw)).transpose()?,
        })
    }
}

/// Turns a finished visit into its financial records. The treatment, its invoice, the
/// balance increment and the appointment completion are committed by the store as one
/// unit; the follow-up booking runs afterwards and cannot undo them.
#[derive(Clone)]
pub struct BillingCascade {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    settings: ClinicSettings,
    lifecycle: AppointmentLifecycleService,
    follow_ups: FollowUpScheduler,
}

impl BillingCascade {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            clock: state.clock.clone(),
            settings: state.settings().clone(),
            lifecycle: AppointmentLifecycleService::new(),
            follow_ups: FollowUpScheduler::new(state),
        }
    }

    #[instrument(skip(self, actor, request), fields(appointment_id = %request.appointment_id, actor = %actor.id))]
    pub async fn complete_treatment(
        &self,
        actor: &User,
        request: CompleteTreatmentRequest,
    ) -> Result<TreatmentCompletion, BillingError> {
        debug!("Completing treatment");

        let diagnosis = request.diagnosis.trim().to_string();
        if diagnosis.is_empty() {
            return Err(BillingError::ValidationError("Diagnosis is required".to_string()));
        }
        let follow_up = FollowUpPlan::parse(request.follow_up.as_ref())?;

        let appointment = self
            .store
            .get_appointment(request.appointment_id)
            .await?
            .ok_or_else(|| BillingError::NotFound("Appointment".to_string()))?;

        if !actor.is(appointment.doctor_id) || !actor.belongs_to(appointment.tenant()) {
            warn!("Actor {} is not the doctor of appointment {}", actor.id, appointment.id);
            return Err(BillingError::Forbidden(
                "Only the appointment's doctor can record its treatment".to_string(),
            ));
        }
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(BillingError::InvalidState("Appointment is cancelled".to_string()));
        }

        let services = billable_services(&request.services_used);
        let amounts = compute_amounts(appointment.fee, &services, self.settings.tax_rate);
        let now = self.clock.now();

        let treatment = Treatment {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            diagnosis,
            services_used: services,
            follow_up_recommended: follow_up.recommended,
            follow_up_date: follow_up.date,
            follow_up_time: follow_up.time,
            invoice_id: None,
            organization_id: appointment.organization_id,
            location_id: appointment.location_id,
            created_at: now,
        };

        let commit = TreatmentCommit {
            invoice: InvoiceDraft {
                id: Uuid::new_v4(),
                patient_id: appointment.patient_id,
                subtotal: amounts.subtotal,
                tax: amounts.tax,
                total: amounts.total,
                organization_id: appointment.organization_id,
                location_id: appointment.location_id,
                created_at: now,
            },
            invoice_period: invoice_period(now, self.settings.offset()),
            completable_from: self.lifecycle.sources_for(AppointmentStatus::Completed),
            treatment,
        };

        let completed = self.store.complete_treatment(commit).await.map_err(|e| {
            warn!("Treatment for appointment {} was not recorded: {}", appointment.id, e);
            BillingError::from(e)
        })?;

        info!("Invoice {} ({}) issued for treatment {}, total {}",
              completed.invoice.invoice_number, completed.invoice.id,
              completed.treatment.id, completed.invoice.total);

        let follow_up_appointment = self
            .follow_ups
            .schedule_follow_up(&completed.treatment, &completed.appointment)
            .await;

        Ok(TreatmentCompletion {
            treatment: completed.treatment,
            invoice: completed.invoice,
            patient_balance: completed.patient_balance,
            follow_up_appointment,
        })
    }

    /// Replaces a treatment's services and re-derives its invoice amounts. The invoice keeps
    /// its number and status.
    #[instrument(skip(self, actor, services_used), fields(actor = %actor.id))]
    pub async fn recompute_invoice(
        &self,
        actor: &User,
        treatment_id: Uuid,
        services_used: Vec<ServiceEntry>,
    ) -> Result<Invoice, BillingError> {
        let treatment = self.get_treatment(actor, treatment_id).await?;
        if actor.is_doctor() && !actor.is(treatment.doctor_id) {
            return Err(BillingError::Forbidden(
                "Doctors can only correct their own treatments".to_string(),
            ));
        }

        let appointment = self
            .store
            .get_appointment(treatment.appointment_id)
            .await?
            .ok_or_else(|| BillingError::NotFound("Appointment".to_string()))?;

        let services = billable_services(&services_used);
        let amounts = compute_amounts(appointment.fee, &services, self.settings.tax_rate);

        let invoice = self
            .store
            .correct_treatment_services(ServiceCorrection {
                treatment_id,
                services_used: services,
                subtotal: amounts.subtotal,
                tax: amounts.tax,
                total: amounts.total,
            })
            .await?;

        info!("Invoice {} recomputed for treatment {}, total {}",
              invoice.invoice_number, treatment_id, invoice.total);
        Ok(invoice)
    }

    pub async fn get_treatment(&self, actor: &User, treatment_id: Uuid) -> Result<Treatment, BillingError> {
        let treatment = self
            .store
            .get_treatment(treatment_id)
            .await?
            .ok_or_else(|| BillingError::NotFound("Treatment".to_string()))?;

        if !actor.belongs_to(treatment.tenant()) {
            return Err(BillingError::Forbidden("Record belongs to another clinic".to_string()));
        }

        Ok(treatment)
    }
}
