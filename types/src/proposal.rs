//! Proposal record and its lifecycle status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{NonEmptyString, PropertyId, ProposalId, UserId, Weight};

// ── Status ───────────────────────────────────────────────────

/// Lifecycle status of a proposal.
///
/// ```text
/// Active ──┬──> Passed ──> Executed
///          ├──> Failed
///          └──> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Active,
    Passed,
    Failed,
    Executed,
    Cancelled,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 5] = [
        ProposalStatus::Active,
        ProposalStatus::Passed,
        ProposalStatus::Failed,
        ProposalStatus::Executed,
        ProposalStatus::Cancelled,
    ];

    /// Stable lowercase tag, also the persisted column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Executed => "executed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Failed, Executed and Cancelled admit no further writes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Executed | Self::Cancelled)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: ProposalStatus) -> bool {
        matches!(
            (self, next),
            (
                Self::Active,
                Self::Passed | Self::Failed | Self::Cancelled
            ) | (Self::Passed, Self::Executed)
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown proposal status '{0}'")]
pub struct StatusParseError(pub String);

impl FromStr for ProposalStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == lower)
            .ok_or_else(|| StatusParseError(s.to_string()))
    }
}

// ── Tally ────────────────────────────────────────────────────

/// For/against totals of a proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyTotals {
    pub for_weight: Weight,
    pub against_weight: Weight,
}

impl TallyTotals {
    #[must_use]
    pub fn new(for_weight: Weight, against_weight: Weight) -> Self {
        Self {
            for_weight,
            against_weight,
        }
    }

    /// Total participating weight.
    #[must_use]
    pub fn cast(&self) -> Weight {
        self.for_weight.saturating_add(self.against_weight)
    }
}

// ── Proposal ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub property_id: PropertyId,
    pub proposer_id: UserId,
    pub title: NonEmptyString,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub voting_ends_at: DateTime<Utc>,
    /// Property-wide eligible weight when the proposal was created.
    pub total_eligible_weight: Weight,
    pub quorum_weight: Weight,
    pub status: ProposalStatus,
    pub for_weight: Weight,
    pub against_weight: Weight,
    pub resolved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub executed_by: Option<UserId>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<UserId>,
}

impl Proposal {
    #[must_use]
    pub fn tally(&self) -> TallyTotals {
        TallyTotals::new(self.for_weight, self.against_weight)
    }

    #[must_use]
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.voting_ends_at
    }

    /// Every unit of eligible weight has been cast.
    #[must_use]
    pub fn fully_voted(&self) -> bool {
        self.tally().cast() >= self.total_eligible_weight
    }
}

/// Optional filters for listing proposals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalFilter {
    pub property_id: Option<PropertyId>,
    pub status: Option<ProposalStatus>,
}

impl ProposalFilter {
    #[must_use]
    pub fn property(property_id: PropertyId) -> Self {
        Self {
            property_id: Some(property_id),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ProposalStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.property_id
            .as_ref()
            .is_none_or(|property| *property == proposal.property_id)
            && self.status.is_none_or(|status| status == proposal.status)
    }
}
