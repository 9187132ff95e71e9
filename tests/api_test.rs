//! HTTP API tests against the router with an in-memory ledger

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use audit_ledger::api;
use audit_ledger::ledger::AuditLedger;

mod common;
use common::*;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn setup_app() -> (AuditLedger, Router) {
    let ledger = setup_ledger().await;
    let app = api::router(ledger.clone());
    (ledger, app)
}

#[tokio::test]
async fn test_health_and_status() {
    let (ledger, app) = setup_app().await;
    record_actions(&ledger, Uuid::new_v4(), "Patient", &["View"]).await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"]["entries"], 1);
    assert_eq!(body["ledger"]["hash_scheme"], "delimited");
    assert_eq!(body["ledger"]["routine_failure_policy"], "fail_open");
}

#[tokio::test]
async fn test_record_event_returns_chained_entry() {
    let (_ledger, app) = setup_app().await;
    let tenant = Uuid::new_v4();
    let uri = format!("/tenants/{}/events", tenant);

    let (status, first) = send(
        &app,
        post(
            &uri,
            json!({
                "actorId": Uuid::new_v4(),
                "action": "Create",
                "resourceType": "Patient",
                "resourceId": Uuid::new_v4(),
                "newValue": "{\"name\":\"redacted\"}",
                "ipAddress": "10.0.0.7"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["sequenceNumber"], 1);
    assert_eq!(first["dataClassification"], "PHI");
    assert_eq!(first["riskLevel"], "Medium");
    assert!(first["previousEventHash"].is_null());

    let (status, second) = send(
        &app,
        post(
            &uri,
            json!({
                "actorId": Uuid::new_v4(),
                "action": "View",
                "resourceType": "Patient"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["sequenceNumber"], 2);
    assert_eq!(second["previousEventHash"], first["eventHash"]);
    assert_eq!(second["riskLevel"], "High");
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let (_ledger, app) = setup_app().await;

    let (status, body) = send(
        &app,
        post(
            &format!("/tenants/{}/events", Uuid::nil()),
            json!({ "actorId": Uuid::new_v4(), "action": "View", "resourceType": "Patient" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        post(
            &format!("/tenants/{}/events", Uuid::new_v4()),
            json!({ "actorId": Uuid::new_v4(), "action": "", "resourceType": "Patient" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get(&format!("/tenants/{}/tampering", Uuid::nil()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_security_and_data_access_routes() {
    let (_ledger, app) = setup_app().await;
    let tenant = Uuid::new_v4();

    let (status, entry) = send(
        &app,
        post(
            &format!("/tenants/{}/security-events", tenant),
            json!({
                "actorId": Uuid::new_v4(),
                "eventType": "EmergencyAccessApproved",
                "riskLevel": "Critical",
                "metadata": { "reason": "cardiac arrest" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["resourceType"], "SecurityEvent");
    assert_eq!(entry["riskLevel"], "Critical");

    let (status, entry) = send(
        &app,
        post(
            &format!("/tenants/{}/data-access", tenant),
            json!({
                "actorId": Uuid::new_v4(),
                "resourceType": "Appointment",
                "resourceId": Uuid::new_v4(),
                "action": "View",
                "classification": "PHI"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["sequenceNumber"], 2);
    assert_eq!(entry["dataClassification"], "PHI");

    let (status, body) = send(&app, get(&format!("/tenants/{}/entries", tenant))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (_, body) = send(&app, get(&format!("/tenants/{}/entries?action=View", tenant))).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_integrity_and_tampering_routes() {
    let (ledger, app) = setup_app().await;
    let tenant = Uuid::new_v4();
    record_actions(&ledger, tenant, "Diagnosis", &["Create", "View", "Update"]).await;

    let (status, body) = send(&app, get(&format!("/tenants/{}/integrity", tenant))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["report"]["entries_checked"], 3);

    drop_append_only_guards(ledger.database()).await;
    execute(
        ledger.database(),
        "UPDATE ledger_entries SET actor_id = 'aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa' \
         WHERE tenant_id = ? AND sequence_number = ?",
        tenant,
        2,
    )
    .await;

    let (_, body) = send(&app, get(&format!("/tenants/{}/integrity", tenant))).await;
    assert_eq!(body["valid"], false);

    let (status, body) = send(&app, get(&format!("/tenants/{}/tampering", tenant))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["findings"][0]["entry"]["sequenceNumber"], 2);
}

#[tokio::test]
async fn test_compliance_and_archive_routes() {
    let (ledger, app) = setup_app().await;
    let tenant = Uuid::new_v4();
    record_actions(&ledger, tenant, "Patient", &["View", "Update"]).await;
    record_actions(&ledger, tenant, "Branch", &["Create"]).await;

    let (status, body) = send(
        &app,
        get(&format!("/tenants/{}/compliance?tag=HIPAA", tenant)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tag"], "HIPAA");
    assert_eq!(body["counters"]["TotalEvents"], 2);
    assert_eq!(body["counters"]["PHIAccess"], 2);

    let (_, body) = send(
        &app,
        get(&format!("/tenants/{}/compliance?tag=GDPR", tenant)),
    )
    .await;
    assert_eq!(body["counters"]["TotalEvents"], 0);

    // Default retention keeps everything active
    let (status, body) = send(
        &app,
        post(
            "/retention/archive",
            json!({ "cutoff": chrono::Utc::now() + chrono::Duration::days(1) }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["archived"], 0);
}
