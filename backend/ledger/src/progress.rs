//! Progress engine: per-investment progress, payout simulation, and
//! project-completion detection.
//!
//! ## Payout ordering
//!
//! The harvest sequence is ordered so that a crash at any point is safe to
//! retry without a double payout:
//!
//! 1. guarded transition to `harvested`, computing the payout fields once;
//! 2. `payout` ledger entry (same transaction as the transition);
//! 3. investor and farmer notifications (best-effort);
//! 4. `payout_notified = true`, the last write.
//!
//! A record found `harvested` with the flag still false resumes from step
//! 2; the entry insert is idempotent on the payout correlation id.

use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{LedgerError, Result};
use crate::funding;
use crate::investments;
use crate::ledger::{self, NewLedgerEntry};
use crate::notify::{Notifier, NotifyKind, Recipients, RelatedEntity};
use crate::types::{new_correlation_id, InvestmentRecord, InvestmentStatus, LedgerEntryKind};

/// Simulated payout: `amount * roi / 100`, truncating. Computed exactly
/// once per record, at the harvest transition.
fn payout_for(amount: i64, roi_percent: i64) -> i64 {
    (i128::from(amount) * i128::from(roi_percent) / 100) as i64
}

/// Drive a record's progress to `new_progress`.
///
/// `caller_id` is carried for audit logging only; the REST surface does
/// not gate this operation on ownership. A present `note` is routed to the
/// project's update list, not stored on the record.
pub async fn update_progress(
    pool: &SqlitePool,
    notifier: &Notifier,
    record_id: &str,
    caller_id: &str,
    new_progress: i64,
    note: Option<&str>,
) -> Result<InvestmentRecord> {
    if !(0..=100).contains(&new_progress) {
        return Err(LedgerError::Validation(
            "progress must be between 0 and 100".to_string(),
        ));
    }

    let record = investments::get(pool, record_id).await?;
    info!(
        record = %record_id,
        caller = %caller_id,
        from = record.progress,
        to = new_progress,
        "progress update"
    );

    let updated = match record.status {
        InvestmentStatus::Cancelled => {
            return Err(LedgerError::InvalidState(
                "record is cancelled and no longer progresses".to_string(),
            ));
        }
        InvestmentStatus::Harvested => {
            if new_progress != 100 {
                return Err(LedgerError::InvalidState(
                    "record is already harvested".to_string(),
                ));
            }
            if record.payout_notified {
                // Idempotent re-submission of 100: nothing left to do.
                return Ok(record);
            }
            // An earlier attempt crashed between the transition and the
            // flag; resume the payout tail.
            let updated = finish_payout(pool, notifier, &record).await?;
            check_project_completion(pool, notifier, &record.project_id).await?;
            updated
        }
        InvestmentStatus::Active | InvestmentStatus::Growing => {
            if new_progress < record.progress {
                return Err(LedgerError::Validation(format!(
                    "progress cannot decrease (currently {})",
                    record.progress
                )));
            }
            if new_progress == 100 {
                let updated = harvest(pool, notifier, &record).await?;
                check_project_completion(pool, notifier, &record.project_id).await?;
                updated
            } else {
                advance(pool, record_id, new_progress).await?
            }
        }
    };

    if let Some(text) = note {
        funding::append_update_internal(pool, notifier, &record.project_id, text).await?;
    }

    Ok(updated)
}

/// Plain progress advance below 100. The first progress above zero flips
/// `active` to `growing`.
async fn advance(pool: &SqlitePool, record_id: &str, new_progress: i64) -> Result<InvestmentRecord> {
    // State re-checked under the write lock; a racing harvest or cancel
    // makes this a zero-row update and the call fails closed.
    let rows = sqlx::query(
        "UPDATE investment_records
         SET    progress = ?1,
                status = CASE WHEN ?1 > 0 THEN 'growing' ELSE status END
         WHERE  id = ?2 AND status IN ('active', 'growing') AND progress <= ?1",
    )
    .bind(new_progress)
    .bind(record_id)
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        let current = investments::get(pool, record_id).await?;
        return Err(LedgerError::InvalidState(format!(
            "record is {} at progress {}; update refused",
            current.status.as_str(),
            current.progress
        )));
    }

    investments::get(pool, record_id).await
}

/// Transition a record to `harvested` and run the payout sequence.
async fn harvest(
    pool: &SqlitePool,
    notifier: &Notifier,
    record: &InvestmentRecord,
) -> Result<InvestmentRecord> {
    let payout_amount = payout_for(record.amount, record.roi_percent);
    let payout_correlation_id = new_correlation_id();
    let payout_at = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    let rows = sqlx::query(
        "UPDATE investment_records
         SET    status = 'harvested', progress = 100,
                payout_amount = ?1, payout_at = ?2, payout_correlation_id = ?3
         WHERE  id = ?4 AND status IN ('active', 'growing')",
    )
    .bind(payout_amount)
    .bind(payout_at)
    .bind(&payout_correlation_id)
    .bind(&record.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if rows == 0 {
        // Lost the race to another harvest or a cancel. Drop this attempt
        // and let the stored state decide what remains to be done.
        drop(tx);
        let current = investments::get(pool, &record.id).await?;
        return match current.status {
            InvestmentStatus::Harvested if !current.payout_notified => {
                finish_payout(pool, notifier, &current).await
            }
            InvestmentStatus::Harvested => Ok(current),
            other => Err(LedgerError::InvalidState(format!(
                "record is {} and cannot be harvested",
                other.as_str()
            ))),
        };
    }

    // The payout entry commits together with the transition, so the flag
    // can never be the only evidence a payout happened.
    ledger::append(
        &mut *tx,
        &NewLedgerEntry {
            user_id: record.investor_id.clone(),
            correlation_id: payout_correlation_id,
            kind: LedgerEntryKind::Payout,
            amount: payout_amount,
            project_id: Some(record.project_id.clone()),
            listing_id: None,
            created_at: payout_at,
        },
    )
    .await?;

    tx.commit().await?;

    info!(
        record = %record.id,
        investor = %record.investor_id,
        payout = payout_amount,
        "investment harvested"
    );

    let current = investments::get(pool, &record.id).await?;
    finish_payout(pool, notifier, &current).await
}

/// The payout tail: make sure the ledger entry exists, notify both
/// parties, then set the idempotency flag as the final write.
async fn finish_payout(
    pool: &SqlitePool,
    notifier: &Notifier,
    record: &InvestmentRecord,
) -> Result<InvestmentRecord> {
    let (payout_amount, payout_correlation_id, payout_at) = match (
        record.payout_amount,
        record.payout_correlation_id.as_deref(),
        record.payout_at,
    ) {
        (Some(amount), Some(correlation), Some(at)) => (amount, correlation, at),
        _ => {
            return Err(LedgerError::InvalidState(
                "harvested record is missing its payout fields".to_string(),
            ));
        }
    };

    {
        let mut conn = pool.acquire().await?;
        ledger::append_if_absent(
            &mut *conn,
            &NewLedgerEntry {
                user_id: record.investor_id.clone(),
                correlation_id: payout_correlation_id.to_string(),
                kind: LedgerEntryKind::Payout,
                amount: payout_amount,
                project_id: Some(record.project_id.clone()),
                listing_id: None,
                created_at: payout_at,
            },
        )
        .await?;
    }

    let farmer: Option<(String,)> =
        sqlx::query_as("SELECT farmer_id FROM funding_requests WHERE id = ?1")
            .bind(&record.project_id)
            .fetch_optional(pool)
            .await?;

    let mut recipients = vec![record.investor_id.clone()];
    if let Some((farmer_id,)) = farmer {
        recipients.push(farmer_id);
    }
    notifier.notify(
        Recipients::Ids(recipients),
        NotifyKind::PayoutSent,
        format!(
            "Harvest complete: {} units paid out for {}",
            payout_amount, record.project_title
        ),
        Some(RelatedEntity::investment_record(&record.id)),
    );

    sqlx::query(
        "UPDATE investment_records SET payout_notified = 1
         WHERE  id = ?1 AND payout_notified = 0",
    )
    .bind(&record.id)
    .execute(pool)
    .await?;

    investments::get(pool, &record.id).await
}

/// One-way project completion: once no record of the project remains
/// non-terminal, flip the funding request to `completed`.
async fn check_project_completion(
    pool: &SqlitePool,
    notifier: &Notifier,
    project_id: &str,
) -> Result<()> {
    let (open,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM investment_records
         WHERE  project_id = ?1 AND status IN ('active', 'growing')",
    )
    .bind(project_id)
    .fetch_one(pool)
    .await?;
    if open > 0 {
        return Ok(());
    }

    let rows = sqlx::query(
        "UPDATE funding_requests SET status = 'completed'
         WHERE  id = ?1 AND status NOT IN ('completed', 'cancelled')",
    )
    .bind(project_id)
    .execute(pool)
    .await?
    .rows_affected();

    if rows > 0 {
        let farmer: Option<(String,)> =
            sqlx::query_as("SELECT farmer_id FROM funding_requests WHERE id = ?1")
                .bind(project_id)
                .fetch_optional(pool)
                .await?;
        if let Some((farmer_id,)) = farmer {
            info!(project = %project_id, "project completed");
            notifier.notify(
                Recipients::one(farmer_id),
                NotifyKind::ProjectCompleted,
                "All investments harvested; project completed".to_string(),
                Some(RelatedEntity::funding_request(project_id)),
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::payout_for;

    #[test]
    fn payout_truncates_toward_zero() {
        assert_eq!(payout_for(30, 10), 3);
        assert_eq!(payout_for(33, 10), 3);
        assert_eq!(payout_for(50, 0), 0);
        assert_eq!(payout_for(50, 100), 50);
    }

    #[test]
    fn payout_survives_large_amounts() {
        assert_eq!(payout_for(i64::MAX / 2, 100), i64::MAX / 2);
    }
}
