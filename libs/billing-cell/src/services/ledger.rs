// libs/billing-cell/src/services/ledger.rs
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_database::{ClinicStore, PaymentReceipt, SettledInvoice};
use shared_models::auth::User;
use shared_models::{Invoice, InvoiceStatus, Payment, PaymentMethod};
use shared_utils::{AppState, Clock};

use crate::models::{BillingError, PatientBalanceResponse};
use crate::services::amounts::round_cents;

/// Applies payments to invoices and keeps the patient balance in step. Balance changes are
/// relative adjustments made by the store, clamped at zero.
#[derive(Clone)]
pub struct PaymentLedger {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
}

impl PaymentLedger {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            clock: state.clock.clone(),
        }
    }

    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn record_payment(
        &self,
        actor: &User,
        invoice_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<PaymentReceipt, BillingError> {
        let amount = round_cents(amount);
        if amount <= Decimal::ZERO {
            return Err(BillingError::ValidationError("Payment amount must be positive".to_string()));
        }

        let invoice = self.get_invoice(actor, invoice_id).await?;

        let payment = Payment {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            patient_id: invoice.patient_id,
            amount,
            method,
            processed_at: self.clock.now(),
        };

        let receipt = self.store.record_payment(payment).await?;

        info!("Payment {} of {} recorded against invoice {}; invoice {}, patient balance {}",
              receipt.payment.id, receipt.payment.amount, receipt.invoice.invoice_number,
              receipt.invoice.status, receipt.patient_balance);
        Ok(receipt)
    }

    /// Full manual settlement without an itemised payment.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn mark_invoice_paid(&self, actor: &User, invoice_id: Uuid) -> Result<SettledInvoice, BillingError> {
        let invoice = self.get_invoice(actor, invoice_id).await?;
        if invoice.status == InvoiceStatus::Paid {
            warn!("Invoice {} is already paid", invoice.invoice_number);
            return Err(BillingError::InvalidState("Invoice is already paid".to_string()));
        }

        let settled = self.store.settle_invoice(invoice_id, self.clock.now()).await?;

        info!("Invoice {} settled manually; patient balance {}",
              settled.invoice.invoice_number, settled.patient_balance);
        Ok(settled)
    }

    pub async fn get_invoice(&self, actor: &User, invoice_id: Uuid) -> Result<Invoice, BillingError> {
        debug!("Fetching invoice {}", invoice_id);

        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| BillingError::NotFound("Invoice".to_string()))?;

        if !actor.belongs_to(invoice.tenant()) {
            return Err(BillingError::Forbidden("Record belongs to another clinic".to_string()));
        }

        Ok(invoice)
    }

    pub async fn invoice_payments(&self, actor: &User, invoice_id: Uuid) -> Result<Vec<Payment>, BillingError> {
        let invoice = self.get_invoice(actor, invoice_id).await?;
        Ok(self.store.invoice_payments(invoice.id).await?)
    }

    pub async fn patient_balance(&self, actor: &User, patient_id: Uuid) -> Result<PatientBalanceResponse, BillingError> {
        let patient = self
            .store
            .get_patient(patient_id)
            .await?
            .ok_or_else(|| BillingError::NotFound("Patient".to_string()))?;

        if !actor.belongs_to(patient.tenant()) {
            return Err(BillingError::Forbidden("Record belongs to another clinic".to_string()));
        }

        Ok(PatientBalanceResponse {
            patient_id: patient.id,
            balance: patient.balance,
        })
    }
}
