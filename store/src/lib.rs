//! Durable storage for stakevote governance
//!
//! This crate provides:
//! - The Proposal Store (creation, lookup, status compare-and-swap)
//! - The append-only Vote Ledger (one vote per voter per proposal)
//! - The cached tally and its reconciliation against the ledger
//! - Busy/locked retry with exponential backoff
//!
//! # Architecture
//!
//! ```text
//! GovernanceStore (one SQLite connection)
//! ├── proposals: status, window, cached tally
//! │   └── triggers: legal edges only, terminal rows frozen
//! ├── votes: PRIMARY KEY (proposal_id, voter_id), append-only
//! └── write(): BEGIN IMMEDIATE + RetryPolicy
//! ```
//!
//! Several stores may share one database file; every state change is a
//! conditional `UPDATE` inside an immediate transaction.

#![allow(clippy::missing_errors_doc)]

mod error;
mod ledger;
mod proposals;
mod retry;
mod secure_path;
mod store;
mod tally;
mod time;

pub use error::StoreError;
pub use ledger::{CastOutcome, NewVote};
pub use proposals::{NewProposal, ResolveOutcome, TransitionOutcome};
pub use retry::RetryPolicy;
pub use store::{GovernanceStore, StoreOptions};
pub use tally::{RepairOutcome, TallyReport};
