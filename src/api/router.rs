use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, activate_loan_request, cancel_loan_request, check_in, create_loan_request,
    get_loan_request, get_loan_request_history, list_loan_requests, return_loan_request,
    verify_loan_request,
};

/// Creates the API router with all loan request endpoints
///
/// Command endpoints (Write operations):
/// - POST /loan-requests - Create a loan request
/// - POST /loan-requests/:id/verify - Approve or reject
/// - POST /loan-requests/:id/activate - Hand the resources out
/// - POST /loan-requests/:id/return - Take the resources back
/// - POST /loan-requests/:id/cancel - Cancel a booking
/// - POST /check-in - Scan a confirmation code
///
/// Query endpoints (Read operations):
/// - GET /loan-requests - List requests visible to the actor
/// - GET /loan-requests/:id - Get request details
/// - GET /loan-requests/:id/history - Audit trail
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Command endpoints (Write operations)
        .route(
            "/loan-requests",
            post(create_loan_request).get(list_loan_requests),
        )
        .route("/loan-requests/:id", get(get_loan_request))
        .route("/loan-requests/:id/history", get(get_loan_request_history))
        .route("/loan-requests/:id/verify", post(verify_loan_request))
        .route("/loan-requests/:id/activate", post(activate_loan_request))
        .route("/loan-requests/:id/return", post(return_loan_request))
        .route("/loan-requests/:id/cancel", post(cancel_loan_request))
        .route("/check-in", post(check_in))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
