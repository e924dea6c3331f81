//! Shared test fixtures: in-memory database and a seeded funding request.

#![allow(dead_code)]

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use agrifund_ledger::db;
use agrifund_ledger::funding::{self, NewFundingRequest};
use agrifund_ledger::notify::Notifier;
use agrifund_ledger::types::{new_id, FundingRequest, GrowingMethod};

/// Fresh in-memory database with migrations applied. A single connection
/// keeps the in-memory store alive and shared across tasks.
pub async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

/// Sink with no webhook endpoint; events are only logged.
pub fn notifier() -> Notifier {
    Notifier::disabled()
}

/// Register a fresh evidence record for `owner` and return its cid.
pub async fn seed_evidence(pool: &SqlitePool, owner: &str) -> String {
    let cid = format!("cid-{}", new_id());
    db::register_evidence(pool, &cid, "sha256-deadbeef", owner)
        .await
        .expect("evidence registered");
    cid
}

/// Default terms for a new request owned by `farmer_id`.
pub fn terms(farmer_id: &str, evidence_cid: &str, requested_amount: i64) -> NewFundingRequest {
    NewFundingRequest {
        farmer_id: farmer_id.to_string(),
        title: "Maize expansion".to_string(),
        crop: "maize".to_string(),
        acreage: 3.5,
        requested_amount,
        method: GrowingMethod::Organic,
        evidence_cid: evidence_cid.to_string(),
        description: "Two new fields behind the river".to_string(),
        timeline_months: 6,
        roi_percent: 10,
        investor_share_percent: 40,
    }
}

/// Evidence + request in one step.
pub async fn open_request(pool: &SqlitePool, farmer_id: &str, requested: i64) -> FundingRequest {
    let cid = seed_evidence(pool, farmer_id).await;
    funding::create(pool, &notifier(), terms(farmer_id, &cid, requested))
        .await
        .expect("request created")
}
