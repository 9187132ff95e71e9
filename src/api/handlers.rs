use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::api::{error_response, ApiResult};
use crate::database::models::EntryFilter;
use crate::ledger::{AuditLedger, DataClassification, NewEvent, RiskLevel};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    pub actor_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub description: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub ip_address: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEventRequest {
    pub actor_id: Uuid,
    pub event_type: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataAccessRequest {
    pub actor_id: Uuid,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub action: String,
    pub classification: DataClassification,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl WindowQuery {
    fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            self.to.unwrap_or_else(Utc::now),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ComplianceQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub tag: String,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub cutoff: DateTime<Utc>,
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "audit-ledger",
        "timestamp": Utc::now()
    }))
}

pub async fn status(State(ledger): State<AuditLedger>) -> Json<Value> {
    let settings = ledger.settings();
    let mut status = json!({
        "status": "healthy",
        "service": "audit-ledger",
        "timestamp": Utc::now(),
        "ledger": {
            "retention_days": settings.retention_days,
            "hash_scheme": settings.hash_scheme.as_str(),
            "routine_failure_policy": settings.routine_failure_policy.as_str(),
            "security_failure_policy": settings.security_failure_policy.as_str(),
        }
    });

    status["database"] = match ledger.entry_count().await {
        Ok(count) => json!({ "status": "healthy", "entries": count }),
        Err(_) => json!({ "status": "error" }),
    };

    Json(status)
}

pub async fn record_event(
    State(ledger): State<AuditLedger>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<RecordEventRequest>,
) -> ApiResult {
    let mut event = NewEvent::new(request.action, request.resource_type)
        .change(request.old_value, request.new_value)
        .provenance(request.ip_address, request.session_id);
    event.resource_id = request.resource_id;
    event.description = request.description;

    let entry = ledger
        .record_event(tenant_id, request.actor_id, event)
        .await
        .map_err(error_response)?;

    Ok(Json(json!(entry)))
}

pub async fn record_security_event(
    State(ledger): State<AuditLedger>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<SecurityEventRequest>,
) -> ApiResult {
    let entry = ledger
        .record_security_event(
            tenant_id,
            request.actor_id,
            &request.event_type,
            request.risk_level,
            &request.metadata,
        )
        .await
        .map_err(error_response)?;

    Ok(Json(json!(entry)))
}

pub async fn record_data_access(
    State(ledger): State<AuditLedger>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<DataAccessRequest>,
) -> ApiResult {
    let entry = ledger
        .record_data_access(
            tenant_id,
            request.actor_id,
            &request.resource_type,
            request.resource_id,
            &request.action,
            request.classification,
        )
        .await
        .map_err(error_response)?;

    Ok(Json(json!(entry)))
}

pub async fn list_entries(
    State(ledger): State<AuditLedger>,
    Path(tenant_id): Path<Uuid>,
    Query(filter): Query<EntryFilter>,
) -> ApiResult {
    let entries = ledger
        .get_entries(tenant_id, &filter)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({ "count": entries.len(), "entries": entries })))
}

pub async fn verify_integrity(
    State(ledger): State<AuditLedger>,
    Path(tenant_id): Path<Uuid>,
    Query(window): Query<WindowQuery>,
) -> ApiResult {
    let (from, to) = window.bounds();
    let report = ledger
        .verify_integrity_report(tenant_id, from, to)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({
        "valid": report.is_valid(),
        "summary": report.summary(),
        "report": report
    })))
}

pub async fn detect_tampering(
    State(ledger): State<AuditLedger>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult {
    let findings = ledger
        .detect_tampering(tenant_id)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({ "count": findings.len(), "findings": findings })))
}

pub async fn compliance_report(
    State(ledger): State<AuditLedger>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<ComplianceQuery>,
) -> ApiResult {
    let from = query.from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let to = query.to.unwrap_or_else(Utc::now);
    let counters = ledger
        .generate_compliance_report(tenant_id, from, to, &query.tag)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({ "tag": query.tag, "counters": counters })))
}

pub async fn archive_expired(
    State(ledger): State<AuditLedger>,
    Json(request): Json<ArchiveRequest>,
) -> ApiResult {
    let archived = ledger
        .archive_expired(request.cutoff)
        .await
        .map_err(error_response)?;

    info!("Manual archival run archived {} entries", archived);
    Ok(Json(json!({ "archived": archived })))
}
