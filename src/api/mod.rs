//! HTTP surface over the audit ledger

pub mod handlers;

use axum::{
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::LedgerError;
use crate::ledger::AuditLedger;

pub type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn router(ledger: AuditLedger) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::status))
        .route("/tenants/:tenant_id/events", post(handlers::record_event))
        .route(
            "/tenants/:tenant_id/security-events",
            post(handlers::record_security_event),
        )
        .route("/tenants/:tenant_id/data-access", post(handlers::record_data_access))
        .route("/tenants/:tenant_id/entries", get(handlers::list_entries))
        .route("/tenants/:tenant_id/integrity", get(handlers::verify_integrity))
        .route("/tenants/:tenant_id/tampering", get(handlers::detect_tampering))
        .route("/tenants/:tenant_id/compliance", get(handlers::compliance_report))
        .route("/retention/archive", post(handlers::archive_expired))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).into_inner())
        .with_state(ledger)
}

pub(crate) fn error_response(err: LedgerError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::Conflict { .. } => StatusCode::CONFLICT,
        _ => {
            error!("Ledger request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}
