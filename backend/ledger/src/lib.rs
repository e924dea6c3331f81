//! AgriFund funding-request and investment ledger.
//!
//! Farmers post crowdfunding requests against documented farm projects;
//! investors fund them incrementally. This crate owns the funding state
//! machine, the per-investor ledger, and the progress/payout simulation,
//! and exposes them over a small Axum REST API.
//!
//! | Component              | Module        |
//! |------------------------|---------------|
//! | FundingRequestStore    | [`funding`]   |
//! | InvestmentRecordStore  | [`investments`] |
//! | LedgerEntryStore       | [`ledger`]    |
//! | ProgressEngine         | [`progress`]  |
//! | EventSink              | [`notify`]    |

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod funding;
pub mod investments;
pub mod ledger;
pub mod notify;
pub mod progress;
pub mod types;
