// libs/billing-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn billing_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        // Treatment completion and corrections
        .route("/treatments", post(handlers::complete_treatment))
        .route("/treatments/{treatment_id}", get(handlers::get_treatment))
        .route("/treatments/{treatment_id}/services", put(handlers::update_treatment_services))

        // Invoices and payments
        .route("/invoices/{invoice_id}", get(handlers::get_invoice))
        .route("/invoices/{invoice_id}/payments", post(handlers::record_payment).get(handlers::get_invoice_payments))
        .route("/invoices/{invoice_id}/mark-paid", post(handlers::mark_invoice_paid))

        .route("/patients/{patient_id}/balance", get(handlers::get_patient_balance))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
