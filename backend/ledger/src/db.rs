//! Database layer: pool initialisation, migrations, and the video evidence
//! lookup consumed by the funding store.

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{LedgerError, Result};
use crate::types::VideoEvidence;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Video evidence (external media-subsystem seam)
// ─────────────────────────────────────────────────────────

/// Resolve a video evidence reference by content id.
///
/// The ledger only reads these rows; they are registered by the media
/// subsystem after an upload is accepted.
pub async fn resolve_evidence(pool: &SqlitePool, cid: &str) -> Result<Option<VideoEvidence>> {
    let row = sqlx::query_as::<_, VideoEvidence>(
        "SELECT cid, storage_hash, owner_id, created_at FROM video_evidence WHERE cid = ?1",
    )
    .bind(cid)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Ingestion seam for the media subsystem: record an uploaded video's
/// immutable `(cid, storage_hash, owner_id)` reference.
pub async fn register_evidence(
    pool: &SqlitePool,
    cid: &str,
    storage_hash: &str,
    owner_id: &str,
) -> Result<VideoEvidence> {
    if cid.is_empty() || storage_hash.is_empty() || owner_id.is_empty() {
        return Err(LedgerError::Validation(
            "cid, storage_hash and owner_id must be non-empty".to_string(),
        ));
    }

    let created_at = Utc::now().timestamp();
    let result = sqlx::query(
        "INSERT INTO video_evidence (cid, storage_hash, owner_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(cid)
    .bind(storage_hash)
    .bind(owner_id)
    .bind(created_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(VideoEvidence {
            cid: cid.to_string(),
            storage_hash: storage_hash.to_string(),
            owner_id: owner_id.to_string(),
            created_at,
        }),
        Err(e) if is_unique_violation(&e) => Err(LedgerError::Conflict(format!(
            "evidence {cid} is already registered"
        ))),
        Err(e) => Err(e.into()),
    }
}

/// True when the underlying driver reports a UNIQUE constraint violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
