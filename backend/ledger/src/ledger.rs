//! Append-only store of monetary events.
//!
//! Entries are never mutated or deleted; correlation ids are unique across
//! the table, which is the only write-write conflict handling the store
//! needs.

use sqlx::{SqliteConnection, SqlitePool};

use crate::db::is_unique_violation;
use crate::errors::{LedgerError, Result};
use crate::types::{LedgerEntry, LedgerEntryKind};

/// A ledger entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub correlation_id: String,
    pub kind: LedgerEntryKind,
    pub amount: i64,
    pub project_id: Option<String>,
    pub listing_id: Option<String>,
    pub created_at: i64,
}

/// Append one entry. Fails with `Conflict` if the correlation id was
/// already used.
///
/// Takes a bare connection so callers can append inside their own
/// transaction scope.
pub async fn append(conn: &mut SqliteConnection, entry: &NewLedgerEntry) -> Result<()> {
    if entry.amount < 0 {
        return Err(LedgerError::Validation(
            "ledger entry amount must be non-negative".to_string(),
        ));
    }

    let result = sqlx::query(
        "INSERT INTO ledger_entries
             (user_id, correlation_id, kind, amount, project_id, listing_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&entry.user_id)
    .bind(&entry.correlation_id)
    .bind(entry.kind)
    .bind(entry.amount)
    .bind(&entry.project_id)
    .bind(&entry.listing_id)
    .bind(entry.created_at)
    .execute(conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(LedgerError::Conflict(format!(
            "correlation id {} already recorded",
            entry.correlation_id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Append one entry, treating a correlation-id collision as already
/// appended. Used by the payout resume path, where the entry may exist
/// from an earlier interrupted attempt.
pub async fn append_if_absent(conn: &mut SqliteConnection, entry: &NewLedgerEntry) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO ledger_entries
             (user_id, correlation_id, kind, amount, project_id, listing_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&entry.user_id)
    .bind(&entry.correlation_id)
    .bind(entry.kind)
    .bind(entry.amount)
    .bind(&entry.project_id)
    .bind(&entry.listing_id)
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// All entries for a user, oldest first. Portfolio/audit query.
pub async fn for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<LedgerEntry>> {
    let rows = sqlx::query_as::<_, LedgerEntry>(
        "SELECT id, user_id, correlation_id, kind, amount, project_id, listing_id, created_at
         FROM   ledger_entries
         WHERE  user_id = ?1
         ORDER  BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// All entries for a project, oldest first.
pub async fn for_project(pool: &SqlitePool, project_id: &str) -> Result<Vec<LedgerEntry>> {
    let rows = sqlx::query_as::<_, LedgerEntry>(
        "SELECT id, user_id, correlation_id, kind, amount, project_id, listing_id, created_at
         FROM   ledger_entries
         WHERE  project_id = ?1
         ORDER  BY created_at ASC, id ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
