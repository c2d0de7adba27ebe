// libs/billing-cell/src/services/amounts.rs
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use shared_models::ServiceLine;

use crate::models::ServiceEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceAmounts {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Keeps entries carrying both an id and a readable price. Negative prices count as zero.
pub fn billable_services(entries: &[ServiceEntry]) -> Vec<ServiceLine> {
    entries
        .iter()
        .filter_map(|entry| {
            let id = entry.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;
            let price = entry.price_value()?;
            Some(ServiceLine {
                id: id.to_string(),
                price: price.max(Decimal::ZERO),
            })
        })
        .collect()
}

/// `subtotal = fee + Σ prices`, `tax = subtotal × rate`, `total = subtotal + tax`, each in cents.
pub fn compute_amounts(fee: Decimal, services: &[ServiceLine], tax_rate: Decimal) -> InvoiceAmounts {
    let services_total: Decimal = services.iter().map(|service| service.price).sum();
    let subtotal = round_cents(fee.max(Decimal::ZERO) + services_total);
    let tax = round_cents(subtotal * tax_rate);

    InvoiceAmounts {
        subtotal,
        tax,
        total: subtotal + tax,
    }
}

/// Invoice numbering period (`YYYYMM`) on the clinic's calendar.
pub fn invoice_period(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).format("%Y%m").to_string()
}
