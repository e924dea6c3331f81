//! Funding request store.
//!
//! Owns the project aggregate: requested and funded amounts, the embedded
//! contribution and update lists, and the status lifecycle. The funded
//! amount is only ever changed through [`apply_contribution`], a single
//! guarded UPDATE that doubles as the concurrency boundary for concurrent
//! investors.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::db;
use crate::errors::{LedgerError, Result};
use crate::notify::{Notifier, NotifyKind, Recipients, RelatedEntity};
use crate::types::{
    new_id, Contribution, FarmerUpdate, FundingRequest, FundingStatus, GrowingMethod,
};

/// Client-supplied terms for a new funding request.
#[derive(Debug, Clone)]
pub struct NewFundingRequest {
    pub farmer_id: String,
    pub title: String,
    pub crop: String,
    pub acreage: f64,
    pub requested_amount: i64,
    pub method: GrowingMethod,
    pub evidence_cid: String,
    pub description: String,
    pub timeline_months: i64,
    pub roi_percent: i64,
    pub investor_share_percent: i64,
}

/// Browse filters for [`list`].
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub crop: Option<String>,
    pub method: Option<GrowingMethod>,
    pub min_roi: Option<i64>,
    pub max_amount: Option<i64>,
    /// When present, returns all of this farmer's requests regardless of
    /// status instead of the investor-browsable subset.
    pub farmer_id: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Create
// ─────────────────────────────────────────────────────────

/// Create a funding request against one piece of video evidence.
///
/// The evidence reference is fetched and validated here, before the
/// aggregate is constructed, so the cross-store population is part of this
/// operation's contract.
pub async fn create(
    pool: &SqlitePool,
    notifier: &Notifier,
    req: NewFundingRequest,
) -> Result<FundingRequest> {
    validate_terms(&req)?;

    let evidence = db::resolve_evidence(pool, &req.evidence_cid)
        .await?
        .filter(|e| e.owner_id == req.farmer_id)
        .ok_or(LedgerError::NotFound("video evidence"))?;

    let mut tx = pool.begin().await?;

    // One non-terminal request per evidence record.
    let pledged: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM funding_requests
         WHERE  evidence_cid = ?1 AND status NOT IN ('completed', 'cancelled')",
    )
    .bind(&req.evidence_cid)
    .fetch_optional(&mut *tx)
    .await?;
    if pledged.is_some() {
        return Err(LedgerError::Conflict(format!(
            "evidence {} is already pledged to an open funding request",
            req.evidence_cid
        )));
    }

    let request = FundingRequest {
        id: new_id(),
        farmer_id: req.farmer_id,
        title: req.title,
        crop: req.crop,
        acreage: req.acreage,
        requested_amount: req.requested_amount,
        method: req.method,
        evidence_cid: evidence.cid,
        evidence_storage_hash: evidence.storage_hash,
        evidence_owner_id: evidence.owner_id,
        description: req.description,
        timeline_months: req.timeline_months,
        roi_percent: req.roi_percent,
        investor_share_percent: req.investor_share_percent,
        funded_amount: 0,
        status: FundingStatus::Pending,
        created_at: chrono::Utc::now().timestamp(),
        contributions: Vec::new(),
        updates: Vec::new(),
    };

    sqlx::query(
        "INSERT INTO funding_requests
             (id, farmer_id, title, crop, acreage, requested_amount, method,
              evidence_cid, evidence_storage_hash, evidence_owner_id, description,
              timeline_months, roi_percent, investor_share_percent,
              funded_amount, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )
    .bind(&request.id)
    .bind(&request.farmer_id)
    .bind(&request.title)
    .bind(&request.crop)
    .bind(request.acreage)
    .bind(request.requested_amount)
    .bind(request.method)
    .bind(&request.evidence_cid)
    .bind(&request.evidence_storage_hash)
    .bind(&request.evidence_owner_id)
    .bind(&request.description)
    .bind(request.timeline_months)
    .bind(request.roi_percent)
    .bind(request.investor_share_percent)
    .bind(request.funded_amount)
    .bind(request.status)
    .bind(request.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(request = %request.id, farmer = %request.farmer_id, "funding request created");
    notifier.notify(
        Recipients::Global,
        NotifyKind::NewOpportunity,
        format!(
            "New funding opportunity: {} ({} units requested)",
            request.title, request.requested_amount
        ),
        Some(RelatedEntity::funding_request(&request.id)),
    );

    Ok(request)
}

fn validate_terms(req: &NewFundingRequest) -> Result<()> {
    if req.title.trim().is_empty() {
        return Err(LedgerError::Validation("title must be non-empty".to_string()));
    }
    if req.crop.trim().is_empty() {
        return Err(LedgerError::Validation("crop must be non-empty".to_string()));
    }
    if req.requested_amount <= 0 {
        return Err(LedgerError::Validation(
            "requested amount must be positive".to_string(),
        ));
    }
    if req.acreage <= 0.0 {
        return Err(LedgerError::Validation("acreage must be positive".to_string()));
    }
    if req.timeline_months <= 0 {
        return Err(LedgerError::Validation(
            "timeline must be a positive number of months".to_string(),
        ));
    }
    if !(0..=100).contains(&req.roi_percent) {
        return Err(LedgerError::Validation(
            "roi percent must be between 0 and 100".to_string(),
        ));
    }
    if !(0..=100).contains(&req.investor_share_percent) {
        return Err(LedgerError::Validation(
            "investor share percent must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

const SELECT_REQUEST: &str =
    "SELECT id, farmer_id, title, crop, acreage, requested_amount, method,
            evidence_cid, evidence_storage_hash, evidence_owner_id, description,
            timeline_months, roi_percent, investor_share_percent,
            funded_amount, status, created_at
     FROM   funding_requests";

/// Browse funding requests.
///
/// Without `farmer_id`, only investor-browsable requests are returned
/// (`pending`, `partially_funded`). The embedded lists are left empty;
/// [`get`] populates them.
pub async fn list(pool: &SqlitePool, filter: &RequestFilter) -> Result<Vec<FundingRequest>> {
    let query = format!(
        "{SELECT_REQUEST}
         WHERE (?1 IS NULL OR crop = ?1)
           AND (?2 IS NULL OR method = ?2)
           AND (?3 IS NULL OR roi_percent >= ?3)
           AND (?4 IS NULL OR requested_amount <= ?4)
           AND (CASE WHEN ?5 IS NULL
                     THEN status IN ('pending', 'partially_funded')
                     ELSE farmer_id = ?5 END)
         ORDER BY created_at DESC, id ASC"
    );

    let rows = sqlx::query_as::<_, FundingRequest>(&query)
        .bind(&filter.crop)
        .bind(filter.method)
        .bind(filter.min_roi)
        .bind(filter.max_amount)
        .bind(&filter.farmer_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Full detail for one request, including the embedded contribution and
/// update lists.
pub async fn get(pool: &SqlitePool, id: &str) -> Result<FundingRequest> {
    let query = format!("{SELECT_REQUEST} WHERE id = ?1");
    let mut request = sqlx::query_as::<_, FundingRequest>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(LedgerError::NotFound("funding request"))?;

    request.contributions = sqlx::query_as::<_, Contribution>(
        "SELECT investor_id, amount, correlation_id, created_at
         FROM   contributions
         WHERE  project_id = ?1
         ORDER  BY id ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    request.updates = sqlx::query_as::<_, FarmerUpdate>(
        "SELECT body, created_at
         FROM   farmer_updates
         WHERE  project_id = ?1
         ORDER  BY id ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(request)
}

// ─────────────────────────────────────────────────────────
// Farmer updates
// ─────────────────────────────────────────────────────────

/// Append a farmer-authored update. The caller must own the request.
///
/// Every distinct investor currently holding a record against the project
/// is notified.
pub async fn append_update(
    pool: &SqlitePool,
    notifier: &Notifier,
    project_id: &str,
    farmer_id: &str,
    body: &str,
) -> Result<FarmerUpdate> {
    let owner: Option<(String,)> =
        sqlx::query_as("SELECT farmer_id FROM funding_requests WHERE id = ?1")
            .bind(project_id)
            .fetch_optional(pool)
            .await?;
    let owner = owner.ok_or(LedgerError::NotFound("funding request"))?.0;
    if owner != farmer_id {
        return Err(LedgerError::Forbidden(
            "only the owning farmer may post updates".to_string(),
        ));
    }

    append_update_internal(pool, notifier, project_id, body).await
}

/// Append an update without an ownership gate. Used by the progress engine
/// to route farmer notes carried on progress calls; attribution is always
/// the owning farmer.
pub(crate) async fn append_update_internal(
    pool: &SqlitePool,
    notifier: &Notifier,
    project_id: &str,
    body: &str,
) -> Result<FarmerUpdate> {
    if body.trim().is_empty() {
        return Err(LedgerError::Validation("update text must be non-empty".to_string()));
    }

    let update = FarmerUpdate {
        body: body.to_string(),
        created_at: chrono::Utc::now().timestamp(),
    };

    sqlx::query("INSERT INTO farmer_updates (project_id, body, created_at) VALUES (?1, ?2, ?3)")
        .bind(project_id)
        .bind(&update.body)
        .bind(update.created_at)
        .execute(pool)
        .await?;

    let investors: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT investor_id FROM investment_records WHERE project_id = ?1",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    if !investors.is_empty() {
        notifier.notify(
            Recipients::Ids(investors.into_iter().map(|(id,)| id).collect()),
            NotifyKind::ProjectUpdate,
            format!("Project update: {}", update.body),
            Some(RelatedEntity::funding_request(project_id)),
        );
    }

    Ok(update)
}

// ─────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────

/// Cancel a request. Only the owning farmer may cancel, and only while no
/// funding has arrived (no refund semantics are modeled). The row is
/// tombstoned, not deleted, to keep the audit trail.
pub async fn cancel(pool: &SqlitePool, project_id: &str, farmer_id: &str) -> Result<()> {
    let request = get(pool, project_id).await?;
    if request.farmer_id != farmer_id {
        return Err(LedgerError::Forbidden(
            "only the owning farmer may cancel".to_string(),
        ));
    }
    if request.status.is_terminal() {
        return Err(LedgerError::InvalidState(format!(
            "request is already {}",
            request.status.as_str()
        )));
    }
    if request.funded_amount > 0 {
        return Err(LedgerError::InvalidState(
            "cannot cancel a request that has received funding".to_string(),
        ));
    }

    // Re-checked guard: the request may have received funding since the
    // read above; fail closed rather than overwrite.
    let rows = sqlx::query(
        "UPDATE funding_requests SET status = 'cancelled'
         WHERE  id = ?1 AND farmer_id = ?2 AND status = 'pending' AND funded_amount = 0",
    )
    .bind(project_id)
    .bind(farmer_id)
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(LedgerError::InvalidState(
            "request state changed; cancellation refused".to_string(),
        ));
    }

    info!(request = %project_id, "funding request cancelled");
    Ok(())
}

/// Farmer-driven status change. Only the terminal targets are accepted:
/// non-terminal statuses are derived from funding arithmetic and must not
/// be set by hand. Transitions out of a terminal state are rejected.
pub async fn set_status(
    pool: &SqlitePool,
    project_id: &str,
    farmer_id: &str,
    new_status: FundingStatus,
) -> Result<FundingRequest> {
    let request = get(pool, project_id).await?;
    if request.farmer_id != farmer_id {
        return Err(LedgerError::Forbidden(
            "only the owning farmer may change status".to_string(),
        ));
    }
    if request.status.is_terminal() {
        return Err(LedgerError::InvalidState(format!(
            "request is already {} and cannot transition further",
            request.status.as_str()
        )));
    }

    match new_status {
        FundingStatus::Completed => {
            let rows = sqlx::query(
                "UPDATE funding_requests SET status = 'completed'
                 WHERE  id = ?1 AND status NOT IN ('completed', 'cancelled')",
            )
            .bind(project_id)
            .execute(pool)
            .await?
            .rows_affected();
            if rows == 0 {
                return Err(LedgerError::InvalidState(
                    "request state changed; transition refused".to_string(),
                ));
            }
        }
        FundingStatus::Cancelled => {
            // Same rule as cancel: no tombstoning once funding arrived.
            cancel(pool, project_id, farmer_id).await?;
        }
        other => {
            return Err(LedgerError::Validation(format!(
                "status {} is derived from funding and cannot be set directly",
                other.as_str()
            )));
        }
    }

    get(pool, project_id).await
}

// ─────────────────────────────────────────────────────────
// The Invest compare-and-swap
// ─────────────────────────────────────────────────────────

/// Atomically add a contribution to the aggregate.
///
/// The funded-amount increment, the derived-status recompute, and every
/// precondition (non-terminal status, no self-investment, no overfunding)
/// are one guarded UPDATE, so two concurrent investors can never lose an
/// update; the contribution row is appended in the same transaction. On a
/// zero-row result the current state is re-read to classify the failure.
pub(crate) async fn apply_contribution(
    conn: &mut SqliteConnection,
    project_id: &str,
    investor_id: &str,
    amount: i64,
    correlation_id: &str,
    now: i64,
) -> Result<()> {
    let rows = sqlx::query(
        "UPDATE funding_requests
         SET    funded_amount = funded_amount + ?1,
                status = CASE WHEN funded_amount + ?1 = requested_amount
                              THEN 'funded' ELSE 'partially_funded' END
         WHERE  id = ?2
           AND  farmer_id <> ?3
           AND  status IN ('pending', 'partially_funded')
           AND  funded_amount + ?1 <= requested_amount",
    )
    .bind(amount)
    .bind(project_id)
    .bind(investor_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(classify_rejected_contribution(conn, project_id, investor_id, amount).await?);
    }

    sqlx::query(
        "INSERT INTO contributions (project_id, investor_id, amount, correlation_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(project_id)
    .bind(investor_id)
    .bind(amount)
    .bind(correlation_id)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(())
}

/// Re-read the aggregate after a refused contribution and name the reason.
async fn classify_rejected_contribution(
    conn: &mut SqliteConnection,
    project_id: &str,
    investor_id: &str,
    amount: i64,
) -> Result<LedgerError> {
    let row: Option<(String, i64, i64, FundingStatus)> = sqlx::query_as(
        "SELECT farmer_id, funded_amount, requested_amount, status
         FROM   funding_requests WHERE id = ?1",
    )
    .bind(project_id)
    .fetch_optional(conn)
    .await?;

    let Some((farmer_id, funded_amount, requested_amount, status)) = row else {
        return Ok(LedgerError::NotFound("funding request"));
    };

    if status.is_terminal() {
        return Ok(LedgerError::InvalidState(format!(
            "request is {} and accepts no further investment",
            status.as_str()
        )));
    }
    if farmer_id == investor_id {
        return Ok(LedgerError::InvalidState(
            "farmers cannot invest in their own request".to_string(),
        ));
    }
    if funded_amount + amount > requested_amount {
        return Ok(LedgerError::Overfunding {
            requested_amount,
            funded_amount,
            amount,
        });
    }

    // The guard refused for a reason that no longer shows; report the
    // conservative state error.
    Ok(LedgerError::InvalidState(
        "investment refused by concurrent state change".to_string(),
    ))
}
