//! Domain model of the funding ledger.
//!
//! ## Status machines
//!
//! [`FundingStatus`] is derived from funding arithmetic except for its
//! terminal states, which are one-way:
//!
//! ```text
//! pending ──► partially_funded ──► funded ──► completed
//!    │               │                │
//!    └── cancelled ◄─┘ (only while funded_amount == 0)
//! ```
//!
//! [`InvestmentStatus`] is a strict forward-only lifecycle per record:
//!
//! ```text
//! active ──► growing ──► harvested
//!    │          │
//!    └──────────┴──► cancelled
//! ```
//!
//! Transitions out of `harvested` and `cancelled` are rejected by the
//! progress engine.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a funding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FundingStatus {
    /// No contributions yet.
    Pending,
    /// Some contributions, below the requested total.
    PartiallyFunded,
    /// Contributions equal the requested total.
    Funded,
    /// Every investment against the request is terminal (one-way).
    Completed,
    /// Withdrawn by the farmer before any funding arrived (one-way).
    Cancelled,
}

impl FundingStatus {
    /// Terminal statuses admit no further transition and no new investments.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Status implied by the funding arithmetic for a non-terminal request.
    pub fn derived(funded_amount: i64, requested_amount: i64) -> Self {
        if funded_amount >= requested_amount {
            Self::Funded
        } else if funded_amount > 0 {
            Self::PartiallyFunded
        } else {
            Self::Pending
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PartiallyFunded => "partially_funded",
            Self::Funded => "funded",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle status of a single investment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InvestmentStatus {
    /// Created by an invest call; no progress yet.
    Active,
    /// Progress above zero.
    Growing,
    /// Progress reached 100; payout issued (one-way).
    Harvested,
    /// Abandoned before harvest (one-way).
    Cancelled,
}

impl InvestmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Harvested | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Growing => "growing",
            Self::Harvested => "harvested",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Allowed growing methods for a funding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum GrowingMethod {
    Organic,
    Conventional,
    Hydroponic,
    Greenhouse,
}

impl GrowingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organic => "organic",
            Self::Conventional => "conventional",
            Self::Hydroponic => "hydroponic",
            Self::Greenhouse => "greenhouse",
        }
    }
}

/// Kind of a monetary ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    Investment,
    Payout,
    Purchase,
    Sale,
}

impl LedgerEntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Investment => "investment",
            Self::Payout => "payout",
            Self::Purchase => "purchase",
            Self::Sale => "sale",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Aggregates and records
// ─────────────────────────────────────────────────────────

/// A farmer's crowdfunding campaign against one piece of video evidence.
///
/// The embedded `contributions` list is the source of truth for the
/// aggregate invariant `funded_amount == Σ contributions.amount`; the
/// standalone [`InvestmentRecord`] collection is a materialized read-view
/// kept in sync by the same transaction that mutates this row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FundingRequest {
    pub id: String,
    pub farmer_id: String,
    pub title: String,
    pub crop: String,
    pub acreage: f64,
    pub requested_amount: i64,
    pub method: GrowingMethod,
    /// Snapshot of the external video evidence reference.
    pub evidence_cid: String,
    pub evidence_storage_hash: String,
    pub evidence_owner_id: String,
    pub description: String,
    pub timeline_months: i64,
    pub roi_percent: i64,
    pub investor_share_percent: i64,
    pub funded_amount: i64,
    pub status: FundingStatus,
    pub created_at: i64,
    /// Ordered append-only contribution list (populated on detail reads).
    #[sqlx(skip)]
    pub contributions: Vec<Contribution>,
    /// Ordered append-only farmer update list (populated on detail reads).
    #[sqlx(skip)]
    pub updates: Vec<FarmerUpdate>,
}

/// One investor contribution embedded in a funding request.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contribution {
    pub investor_id: String,
    pub amount: i64,
    pub correlation_id: String,
    pub created_at: i64,
}

/// One timestamped free-text update authored by the owning farmer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FarmerUpdate {
    pub body: String,
    pub created_at: i64,
}

/// One investor's stake in one project, with its own harvest/payout state.
///
/// Project terms are denormalized at creation time so portfolio queries
/// never join back to the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvestmentRecord {
    pub id: String,
    pub investor_id: String,
    pub project_id: String,
    pub amount: i64,
    pub project_title: String,
    pub project_crop: String,
    pub roi_percent: i64,
    pub investor_share_percent: i64,
    pub evidence_cid: String,
    pub status: InvestmentStatus,
    pub progress: i64,
    pub correlation_id: String,
    pub created_at: i64,
    pub payout_amount: Option<i64>,
    pub payout_at: Option<i64>,
    pub payout_correlation_id: Option<String>,
    /// Set to true only after the payout entry exists and the parties were
    /// notified; the last write of the payout sequence.
    pub payout_notified: bool,
}

/// Immutable monetary event tied to a user and, optionally, a project or
/// marketplace listing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub correlation_id: String,
    pub kind: LedgerEntryKind,
    pub amount: i64,
    pub project_id: Option<String>,
    pub listing_id: Option<String>,
    pub created_at: i64,
}

/// External video evidence reference owned by the media subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VideoEvidence {
    pub cid: String,
    pub storage_hash: String,
    pub owner_id: String,
    pub created_at: i64,
}

// ─────────────────────────────────────────────────────────
// Id helpers
// ─────────────────────────────────────────────────────────

/// Store-generated entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Opaque correlation identifier tying a ledger entry to the operation that
/// produced it. Stands in for a transaction hash, hence the bare-hex form.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_status_tracks_funding_arithmetic() {
        assert_eq!(FundingStatus::derived(0, 50), FundingStatus::Pending);
        assert_eq!(FundingStatus::derived(30, 50), FundingStatus::PartiallyFunded);
        assert_eq!(FundingStatus::derived(50, 50), FundingStatus::Funded);
    }

    #[test]
    fn terminal_statuses() {
        assert!(FundingStatus::Completed.is_terminal());
        assert!(FundingStatus::Cancelled.is_terminal());
        assert!(!FundingStatus::Funded.is_terminal());
        assert!(InvestmentStatus::Harvested.is_terminal());
        assert!(InvestmentStatus::Cancelled.is_terminal());
        assert!(!InvestmentStatus::Growing.is_terminal());
    }

    #[test]
    fn correlation_ids_are_unique_hex() {
        let a = new_correlation_id();
        let b = new_correlation_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
