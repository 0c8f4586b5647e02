use chrono::{DateTime, Utc};
use serde::Serialize;
use stakevote_store::StoreError;
use stakevote_types::{ProposalId, ProposalStatus, UserId, Weight};
use thiserror::Error;

use crate::collaborators::CollaboratorError;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("proposal {0} not found")]
    NotFound(ProposalId),

    #[error("{user_id} is not authorized to {action}")]
    Unauthorized {
        user_id: UserId,
        action: &'static str,
    },

    #[error("{voter_id} has already voted on proposal {proposal_id}")]
    AlreadyVoted {
        proposal_id: ProposalId,
        voter_id: UserId,
    },

    #[error("voting on proposal {proposal_id} is closed (status {status})")]
    VotingClosed {
        proposal_id: ProposalId,
        status: ProposalStatus,
    },

    #[error("voting on proposal {proposal_id} is open until {ends_at}")]
    VotingOpen {
        proposal_id: ProposalId,
        ends_at: DateTime<Utc>,
    },

    #[error("proposal {proposal_id} cannot move from {from} to {to}")]
    InvalidTransition {
        proposal_id: ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
    },

    /// The proposal is Failed; the status has been persisted.
    #[error("proposal {proposal_id} failed: quorum {required} not met ({achieved} cast)")]
    QuorumNotMet {
        proposal_id: ProposalId,
        required: Weight,
        achieved: Weight,
    },

    /// The proposal changed under the caller; re-read before retrying.
    #[error("proposal {0} was modified concurrently")]
    ConcurrentModification(ProposalId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for GovernanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrentWrite { proposal_id, .. } => {
                Self::ConcurrentModification(ProposalId::new(proposal_id))
            }
            other => Self::Storage(other),
        }
    }
}

/// Transport-agnostic tag for a [`GovernanceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    AlreadyVoted,
    VotingClosed,
    VotingOpen,
    InvalidTransition,
    QuorumNotMet,
    ConcurrentModification,
    InvalidInput,
    Collaborator,
    Storage,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::AlreadyVoted => "already_voted",
            Self::VotingClosed => "voting_closed",
            Self::VotingOpen => "voting_open",
            Self::InvalidTransition => "invalid_transition",
            Self::QuorumNotMet => "quorum_not_met",
            Self::ConcurrentModification => "concurrent_modification",
            Self::InvalidInput => "invalid_input",
            Self::Collaborator => "collaborator",
            Self::Storage => "storage",
        }
    }
}

impl GovernanceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::AlreadyVoted { .. } => ErrorKind::AlreadyVoted,
            Self::VotingClosed { .. } => ErrorKind::VotingClosed,
            Self::VotingOpen { .. } => ErrorKind::VotingOpen,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::QuorumNotMet { .. } => ErrorKind::QuorumNotMet,
            Self::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Collaborator(_) => ErrorKind::Collaborator,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// A business outcome, as opposed to an infrastructure fault.
    #[must_use]
    pub fn is_business(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Collaborator | ErrorKind::Storage)
    }
}
