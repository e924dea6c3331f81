//! API-level tests: routing, status codes, and error bodies.

mod common;

use std::sync::Arc;

use axum_test::TestServer;
use serde_json::{json, Value};

use agrifund_ledger::api::{self, ApiState};
use common::{notifier, pool, seed_evidence};

async fn server() -> (TestServer, sqlx::SqlitePool) {
    let pool = pool().await;
    let state = Arc::new(ApiState {
        pool: pool.clone(),
        notifier: notifier(),
    });
    let server = TestServer::new(api::router(state)).expect("test server");
    (server, pool)
}

fn request_body(farmer_id: &str, evidence_cid: &str, requested_amount: i64) -> Value {
    json!({
        "farmer_id": farmer_id,
        "title": "Maize expansion",
        "crop": "maize",
        "acreage": 3.5,
        "requested_amount": requested_amount,
        "method": "organic",
        "evidence_cid": evidence_cid,
        "description": "Two new fields behind the river",
        "timeline_months": 6,
        "roi_percent": 10,
        "investor_share_percent": 40
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let (server, _pool) = server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_request_is_404() {
    let (server, _pool) = server().await;
    let response = server.get("/requests/no-such-id").await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn create_and_fetch_round_trip() {
    let (server, pool) = server().await;
    let cid = seed_evidence(&pool, "farmer-1").await;

    let created = server
        .post("/requests")
        .json(&request_body("farmer-1", &cid, 50))
        .await;
    created.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = created.json();
    let id = body["id"].as_str().expect("id").to_string();
    assert_eq!(body["status"], "pending");

    let fetched = server.get(&format!("/requests/{id}")).await;
    fetched.assert_status_ok();
    let detail: Value = fetched.json();
    assert_eq!(detail["requested_amount"], 50);
    assert_eq!(detail["contributions"], json!([]));
}

#[tokio::test]
async fn create_with_unregistered_evidence_is_404() {
    let (server, _pool) = server().await;
    let response = server
        .post("/requests")
        .json(&request_body("farmer-1", "missing-cid", 50))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn evidence_registration_conflicts_on_reuse() {
    let (server, _pool) = server().await;
    let body = json!({
        "cid": "cid-1",
        "storage_hash": "sha256-deadbeef",
        "owner_id": "farmer-1"
    });

    let first = server.post("/evidence").json(&body).await;
    first.assert_status(axum::http::StatusCode::CREATED);

    let second = server.post("/evidence").json(&body).await;
    second.assert_status(axum::http::StatusCode::CONFLICT);
    let error: Value = second.json();
    assert_eq!(error["code"], "CONFLICT");
}

#[tokio::test]
async fn invest_flow_and_overfunding_code() {
    let (server, pool) = server().await;
    let cid = seed_evidence(&pool, "farmer-1").await;
    let created = server
        .post("/requests")
        .json(&request_body("farmer-1", &cid, 50))
        .await;
    let project_id = created.json::<Value>()["id"].as_str().unwrap().to_string();

    let invested = server
        .post("/investments")
        .json(&json!({
            "project_id": project_id,
            "investor_id": "investor-a",
            "amount": 30
        }))
        .await;
    invested.assert_status(axum::http::StatusCode::CREATED);
    let record: Value = invested.json();
    assert_eq!(record["status"], "active");
    assert_eq!(record["progress"], 0);

    let refused = server
        .post("/investments")
        .json(&json!({
            "project_id": project_id,
            "investor_id": "investor-b",
            "amount": 30
        }))
        .await;
    refused.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let error: Value = refused.json();
    assert_eq!(error["code"], "OVERFUNDING");
}

#[tokio::test]
async fn progress_endpoint_updates_and_validates() {
    let (server, pool) = server().await;
    let cid = seed_evidence(&pool, "farmer-1").await;
    let created = server
        .post("/requests")
        .json(&request_body("farmer-1", &cid, 50))
        .await;
    let project_id = created.json::<Value>()["id"].as_str().unwrap().to_string();
    let invested = server
        .post("/investments")
        .json(&json!({
            "project_id": project_id,
            "investor_id": "investor-a",
            "amount": 30
        }))
        .await;
    let record_id = invested.json::<Value>()["id"].as_str().unwrap().to_string();

    let advanced = server
        .post(&format!("/investments/{record_id}/progress"))
        .json(&json!({ "caller_id": "investor-a", "progress": 40 }))
        .await;
    advanced.assert_status_ok();
    assert_eq!(advanced.json::<Value>()["status"], "growing");

    let invalid = server
        .post(&format!("/investments/{record_id}/progress"))
        .json(&json!({ "caller_id": "investor-a", "progress": 120 }))
        .await;
    invalid.assert_status(axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(invalid.json::<Value>()["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn cancel_by_non_owner_is_403() {
    let (server, pool) = server().await;
    let cid = seed_evidence(&pool, "farmer-1").await;
    let created = server
        .post("/requests")
        .json(&request_body("farmer-1", &cid, 50))
        .await;
    let project_id = created.json::<Value>()["id"].as_str().unwrap().to_string();

    let refused = server
        .post(&format!("/requests/{project_id}/cancel"))
        .json(&json!({ "farmer_id": "farmer-2" }))
        .await;
    refused.assert_status(axum::http::StatusCode::FORBIDDEN);
    assert_eq!(refused.json::<Value>()["code"], "FORBIDDEN");
}

#[tokio::test]
async fn browse_hides_terminal_requests() {
    let (server, pool) = server().await;
    let cid_a = seed_evidence(&pool, "farmer-1").await;
    let cid_b = seed_evidence(&pool, "farmer-1").await;

    let open = server
        .post("/requests")
        .json(&request_body("farmer-1", &cid_a, 50))
        .await;
    let open_id = open.json::<Value>()["id"].as_str().unwrap().to_string();

    let done = server
        .post("/requests")
        .json(&request_body("farmer-1", &cid_b, 80))
        .await;
    let done_id = done.json::<Value>()["id"].as_str().unwrap().to_string();
    server
        .post(&format!("/requests/{done_id}/status"))
        .json(&json!({ "farmer_id": "farmer-1", "status": "completed" }))
        .await
        .assert_status_ok();

    let browse: Value = server.get("/requests").await.json();
    assert_eq!(browse["count"], 1);
    assert_eq!(browse["requests"][0]["id"], open_id.as_str());

    let own: Value = server
        .get("/requests")
        .add_query_param("farmer_id", "farmer-1")
        .await
        .json();
    assert_eq!(own["count"], 2);
}

#[tokio::test]
async fn ledger_query_requires_a_subject() {
    let (server, _pool) = server().await;
    let response = server.get("/ledger").await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);

    let empty: Value = server
        .get("/ledger")
        .add_query_param("user_id", "investor-a")
        .await
        .json();
    assert_eq!(empty["count"], 0);
}
