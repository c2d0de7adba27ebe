use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::Tenant;
use crate::time_format::hhmm_option;

/// A billable service line as recorded on a treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub id: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub diagnosis: String,
    pub services_used: Vec<ServiceLine>,
    pub follow_up_recommended: bool,
    pub follow_up_date: Option<NaiveDate>,
    #[serde(with = "hhmm_option", default)]
    pub follow_up_time: Option<NaiveTime>,
    pub invoice_id: Option<Uuid>,
    pub organization_id: Uuid,
    pub location_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Treatment {
    pub fn tenant(&self) -> Tenant {
        Tenant { organization_id: self.organization_id, location_id: self.location_id }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Due,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    /// Due and overdue invoices count towards the patient balance.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, InvoiceStatus::Due | InvoiceStatus::Overdue)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Due => write!(f, "due"),
            InvoiceStatus::Paid => write!(f, "paid"),
            InvoiceStatus::Overdue => write!(f, "overdue"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub patient_id: Uuid,
    pub treatment_id: Uuid,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub status: InvoiceStatus,
    pub organization_id: Uuid,
    pub location_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn tenant(&self) -> Tenant {
        Tenant { organization_id: self.organization_id, location_id: self.location_id }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Insurance,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub patient_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub processed_at: DateTime<Utc>,
}

/// Renders `INV-YYYYMM-NNNN` from a billing period (`YYYYMM`) and its sequence value.
pub fn invoice_number(period: &str, sequence: u64) -> String {
    format!("INV-{}-{:04}", period, sequence)
}

/// Applies `delta` to a running balance, never letting it drop below zero.
pub fn clamp_balance(current: Decimal, delta: Decimal) -> Decimal {
    (current + delta).max(Decimal::ZERO)
}
