//! Investment record store and the Invest operation.
//!
//! One durable record per investor contribution, denormalized with a
//! snapshot of the project terms captured at creation time. The records
//! are a materialized read-view of the aggregate's contribution list and
//! are written by the same transaction that mutates the aggregate.

use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{LedgerError, Result};
use crate::funding;
use crate::ledger::{self, NewLedgerEntry};
use crate::notify::{Notifier, NotifyKind, Recipients, RelatedEntity};
use crate::types::{
    new_correlation_id, new_id, FundingRequest, InvestmentRecord, InvestmentStatus,
    LedgerEntryKind,
};

/// Invest `amount` into a project.
///
/// Everything between the validation and the commit happens in one
/// transaction: the aggregate increment-and-append, the record insert, and
/// the `investment` ledger entry. Either all of it becomes visible or the
/// call fails before any mutation. The farmer notification is emitted only
/// after the commit and never rolls it back.
pub async fn invest(
    pool: &SqlitePool,
    notifier: &Notifier,
    project_id: &str,
    investor_id: &str,
    amount: i64,
) -> Result<InvestmentRecord> {
    if amount <= 0 {
        return Err(LedgerError::Validation(
            "investment amount must be positive".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    // Explicit population: fetch the project here, both to validate the
    // preconditions with precise errors and to snapshot its terms.
    let project = sqlx::query_as::<_, FundingRequest>(
        "SELECT id, farmer_id, title, crop, acreage, requested_amount, method,
                evidence_cid, evidence_storage_hash, evidence_owner_id, description,
                timeline_months, roi_percent, investor_share_percent,
                funded_amount, status, created_at
         FROM   funding_requests WHERE id = ?1",
    )
    .bind(project_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(LedgerError::NotFound("funding request"))?;

    if project.status.is_terminal() {
        return Err(LedgerError::InvalidState(format!(
            "request is {} and accepts no further investment",
            project.status.as_str()
        )));
    }
    if project.farmer_id == investor_id {
        return Err(LedgerError::InvalidState(
            "farmers cannot invest in their own request".to_string(),
        ));
    }

    let correlation_id = new_correlation_id();
    let now = chrono::Utc::now().timestamp();

    // The aggregate compare-and-swap; re-validates every precondition under
    // the write lock and classifies refusals (Overfunding among them).
    funding::apply_contribution(&mut *tx, project_id, investor_id, amount, &correlation_id, now)
        .await?;

    let record = InvestmentRecord {
        id: new_id(),
        investor_id: investor_id.to_string(),
        project_id: project_id.to_string(),
        amount,
        project_title: project.title.clone(),
        project_crop: project.crop.clone(),
        roi_percent: project.roi_percent,
        investor_share_percent: project.investor_share_percent,
        evidence_cid: project.evidence_cid.clone(),
        status: InvestmentStatus::Active,
        progress: 0,
        correlation_id: correlation_id.clone(),
        created_at: now,
        payout_amount: None,
        payout_at: None,
        payout_correlation_id: None,
        payout_notified: false,
    };

    sqlx::query(
        "INSERT INTO investment_records
             (id, investor_id, project_id, amount, project_title, project_crop,
              roi_percent, investor_share_percent, evidence_cid, status, progress,
              correlation_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )
    .bind(&record.id)
    .bind(&record.investor_id)
    .bind(&record.project_id)
    .bind(record.amount)
    .bind(&record.project_title)
    .bind(&record.project_crop)
    .bind(record.roi_percent)
    .bind(record.investor_share_percent)
    .bind(&record.evidence_cid)
    .bind(record.status)
    .bind(record.progress)
    .bind(&record.correlation_id)
    .bind(record.created_at)
    .execute(&mut *tx)
    .await?;

    ledger::append(
        &mut *tx,
        &NewLedgerEntry {
            user_id: investor_id.to_string(),
            correlation_id,
            kind: LedgerEntryKind::Investment,
            amount,
            project_id: Some(project_id.to_string()),
            listing_id: None,
            created_at: now,
        },
    )
    .await?;

    tx.commit().await?;

    info!(
        record = %record.id,
        project = %project_id,
        investor = %investor_id,
        amount,
        "investment recorded"
    );
    notifier.notify(
        Recipients::one(&project.farmer_id),
        NotifyKind::InvestmentReceived,
        format!("{investor_id} invested {amount} units in {}", project.title),
        Some(RelatedEntity::funding_request(project_id)),
    );

    Ok(record)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

const SELECT_RECORD: &str =
    "SELECT id, investor_id, project_id, amount, project_title, project_crop,
            roi_percent, investor_share_percent, evidence_cid, status, progress,
            correlation_id, created_at, payout_amount, payout_at,
            payout_correlation_id, payout_notified
     FROM   investment_records";

/// Fetch one record by id.
pub async fn get(pool: &SqlitePool, id: &str) -> Result<InvestmentRecord> {
    let query = format!("{SELECT_RECORD} WHERE id = ?1");
    sqlx::query_as::<_, InvestmentRecord>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(LedgerError::NotFound("investment record"))
}

/// Portfolio and project-detail queries, newest first.
pub async fn list(
    pool: &SqlitePool,
    investor_id: Option<&str>,
    project_id: Option<&str>,
) -> Result<Vec<InvestmentRecord>> {
    let query = format!(
        "{SELECT_RECORD}
         WHERE (?1 IS NULL OR investor_id = ?1)
           AND (?2 IS NULL OR project_id = ?2)
         ORDER BY created_at DESC, id ASC"
    );
    let rows = sqlx::query_as::<_, InvestmentRecord>(&query)
        .bind(investor_id)
        .bind(project_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Record cancellation
// ─────────────────────────────────────────────────────────

/// Mark a record `cancelled`. Reachable only before harvest; the record is
/// kept (audit trail), it just stops progressing.
pub async fn cancel(pool: &SqlitePool, id: &str) -> Result<InvestmentRecord> {
    let rows = sqlx::query(
        "UPDATE investment_records SET status = 'cancelled'
         WHERE  id = ?1 AND status IN ('active', 'growing')",
    )
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        let record = get(pool, id).await?;
        return Err(LedgerError::InvalidState(format!(
            "record is {} and cannot be cancelled",
            record.status.as_str()
        )));
    }

    info!(record = %id, "investment record cancelled");
    get(pool, id).await
}
