//! Governance engine for stakevote - resolution state machine and execution gate.
//!
//! This crate wires the store to the external collaborators (weights, roles,
//! notifications, clock) and exposes [`GovernanceService`].
//!
//! ```text
//! GovernanceService
//! ├── store: GovernanceStore (proposals, vote ledger, cached tally)
//! ├── resolution: decide() + conditional Active -> Passed/Failed
//! ├── gate: Passed -> Executed, Active -> Cancelled
//! └── collaborators: WeightProvider, RoleDirectory, NotificationSink, Clock
//! ```

// Re-export from crates for public API
pub use stakevote_store::{RetryPolicy, StoreError, StoreOptions, TallyReport};
pub use stakevote_types::{
    BasisPoints, NonEmptyString, PropertyId, Proposal, ProposalFilter, ProposalId, ProposalStatus,
    Role, TallyTotals, UserId, Vote, VoteChoice, Weight,
};

mod clock;
mod collaborators;
mod config;
mod error;
mod events;
mod gate;
mod resolution;
mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    CollaboratorError, NotificationSink, RoleDirectory, TracingNotifier, WeightProvider,
};
pub use config::{
    ConfigError, GovernanceConfig, QuorumConfig, StorageConfig, VotingConfig, config_path,
};
pub use error::{ErrorKind, GovernanceError};
pub use events::GovernanceEvent;
pub use resolution::{Decision, FailureReason, Resolution, decide, is_closed};
pub use service::{Collaborators, GovernanceService, ProposalDraft, ProposalView};
