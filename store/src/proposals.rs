//! Proposal Store: creation, lookup and the status compare-and-swap writes.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use stakevote_types::{
    NonEmptyString, PropertyId, Proposal, ProposalFilter, ProposalId, ProposalStatus, UserId,
    Weight,
};

use crate::StoreError;
use crate::store::GovernanceStore;
use crate::time::{from_millis, from_optional_millis, to_millis};

macro_rules! select_proposals {
    ($tail:literal) => {
        concat!(
            "SELECT id, property_id, proposer_id, title, description, created_at, ",
            "voting_ends_at, total_eligible_weight, quorum_weight, status, for_weight, ",
            "against_weight, resolved_at, executed_at, executed_by, cancelled_at, cancelled_by ",
            "FROM proposals ",
            $tail
        )
    };
}

/// Everything fixed when a proposal is born.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub property_id: PropertyId,
    pub proposer_id: UserId,
    pub title: NonEmptyString,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub voting_ends_at: DateTime<Utc>,
    pub total_eligible_weight: Weight,
    pub quorum_weight: Weight,
}

/// Result of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Missing,
    /// Voting has not closed; nothing was written.
    Open(Proposal),
    /// This call won the conditional write and set the terminal status.
    Resolved(Proposal),
    /// The proposal had already left Active; nothing was written.
    Settled(Proposal),
}

/// Result of an execute or cancel attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Missing,
    Applied(Proposal),
    /// The guard did not match; carries the proposal as it is now.
    Rejected(Proposal),
}

pub(crate) fn weight_to_sql(weight: Weight) -> Result<i64, StoreError> {
    i64::try_from(weight.units()).map_err(|_| StoreError::WeightOutOfRange(weight.units()))
}

pub(crate) fn weight_from_sql(column: &'static str, value: i64) -> Result<Weight, StoreError> {
    u64::try_from(value)
        .map(Weight::new)
        .map_err(|_| StoreError::corrupt(column, value))
}

struct ProposalRow {
    id: i64,
    property_id: String,
    proposer_id: String,
    title: String,
    description: String,
    created_at: i64,
    voting_ends_at: i64,
    total_eligible_weight: i64,
    quorum_weight: i64,
    status: String,
    for_weight: i64,
    against_weight: i64,
    resolved_at: Option<i64>,
    executed_at: Option<i64>,
    executed_by: Option<String>,
    cancelled_at: Option<i64>,
    cancelled_by: Option<String>,
}

impl ProposalRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            property_id: row.get(1)?,
            proposer_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            created_at: row.get(5)?,
            voting_ends_at: row.get(6)?,
            total_eligible_weight: row.get(7)?,
            quorum_weight: row.get(8)?,
            status: row.get(9)?,
            for_weight: row.get(10)?,
            against_weight: row.get(11)?,
            resolved_at: row.get(12)?,
            executed_at: row.get(13)?,
            executed_by: row.get(14)?,
            cancelled_at: row.get(15)?,
            cancelled_by: row.get(16)?,
        })
    }

    fn into_proposal(self) -> Result<Proposal, StoreError> {
        let title =
            NonEmptyString::new(self.title).map_err(|_| StoreError::corrupt("title", "<empty>"))?;
        let status = self
            .status
            .parse::<ProposalStatus>()
            .map_err(|_| StoreError::corrupt("status", &self.status))?;

        Ok(Proposal {
            id: ProposalId::new(self.id),
            property_id: PropertyId::new(self.property_id),
            proposer_id: UserId::new(self.proposer_id),
            title,
            description: self.description,
            created_at: from_millis("created_at", self.created_at)?,
            voting_ends_at: from_millis("voting_ends_at", self.voting_ends_at)?,
            total_eligible_weight: weight_from_sql(
                "total_eligible_weight",
                self.total_eligible_weight,
            )?,
            quorum_weight: weight_from_sql("quorum_weight", self.quorum_weight)?,
            status,
            for_weight: weight_from_sql("for_weight", self.for_weight)?,
            against_weight: weight_from_sql("against_weight", self.against_weight)?,
            resolved_at: from_optional_millis("resolved_at", self.resolved_at)?,
            executed_at: from_optional_millis("executed_at", self.executed_at)?,
            executed_by: self.executed_by.map(UserId::new),
            cancelled_at: from_optional_millis("cancelled_at", self.cancelled_at)?,
            cancelled_by: self.cancelled_by.map(UserId::new),
        })
    }
}

/// Load one proposal through any connection or open transaction.
pub(crate) fn load_proposal(db: &Connection, id: ProposalId) -> Result<Option<Proposal>, StoreError> {
    let row = db
        .query_row(
            select_proposals!("WHERE id = ?1"),
            params![id.value()],
            ProposalRow::from_row,
        )
        .optional()?;
    row.map(ProposalRow::into_proposal).transpose()
}

fn require_loaded(db: &Connection, op: &'static str, id: ProposalId) -> Result<Proposal, StoreError> {
    load_proposal(db, id)?.ok_or(StoreError::ConcurrentWrite {
        op,
        proposal_id: id.value(),
    })
}

impl GovernanceStore {
    /// Insert a new Active proposal and return it as stored.
    pub fn insert_proposal(&mut self, new: &NewProposal) -> Result<Proposal, StoreError> {
        let total = weight_to_sql(new.total_eligible_weight)?;
        let quorum = weight_to_sql(new.quorum_weight)?;
        let created_at = to_millis(new.created_at);
        let voting_ends_at = to_millis(new.voting_ends_at);

        let proposal = self.write("insert proposal", |tx| {
            tx.execute(
                "INSERT INTO proposals (
                    property_id, proposer_id, title, description, created_at,
                    voting_ends_at, total_eligible_weight, quorum_weight, status
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active')",
                params![
                    new.property_id.as_str(),
                    new.proposer_id.as_str(),
                    new.title.as_str(),
                    &new.description,
                    created_at,
                    voting_ends_at,
                    total,
                    quorum,
                ],
            )?;
            let id = ProposalId::new(tx.last_insert_rowid());
            require_loaded(tx, "insert proposal", id)
        })?;

        tracing::info!(
            proposal_id = %proposal.id,
            property_id = %proposal.property_id,
            quorum_weight = %proposal.quorum_weight,
            "Proposal created"
        );
        Ok(proposal)
    }

    pub fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>, StoreError> {
        load_proposal(self.conn(), id)
    }

    /// Proposals matching `filter`, ordered by id.
    pub fn list_proposals(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, StoreError> {
        let mut stmt = self.conn().prepare(select_proposals!(
            "WHERE (?1 IS NULL OR property_id = ?1) AND (?2 IS NULL OR status = ?2) ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(
            params![
                filter.property_id.as_ref().map(PropertyId::as_str),
                filter.status.map(ProposalStatus::as_str),
            ],
            ProposalRow::from_row,
        )?;

        let mut proposals = Vec::new();
        for row in rows {
            proposals.push(row?.into_proposal()?);
        }
        Ok(proposals)
    }

    /// Active proposals whose voting window has elapsed at `now`.
    pub fn due_active(&self, now: DateTime<Utc>) -> Result<Vec<ProposalId>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT id FROM proposals
             WHERE status = 'active' AND voting_ends_at <= ?1
             ORDER BY voting_ends_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![to_millis(now)], |row| row.get::<_, i64>(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(ProposalId::new(id?));
        }
        Ok(ids)
    }

    /// Write the terminal status chosen by `decide`, only if still Active.
    ///
    /// `decide` sees the proposal as read inside the write transaction and
    /// returns `None` while voting is still open.
    pub fn resolve_if_active<F>(
        &mut self,
        id: ProposalId,
        now: DateTime<Utc>,
        mut decide: F,
    ) -> Result<ResolveOutcome, StoreError>
    where
        F: FnMut(&Proposal) -> Option<ProposalStatus>,
    {
        let resolved_at = to_millis(now);
        let outcome = self.write("resolve proposal", |tx| {
            let Some(current) = load_proposal(tx, id)? else {
                return Ok(ResolveOutcome::Missing);
            };
            if current.status != ProposalStatus::Active {
                return Ok(ResolveOutcome::Settled(current));
            }
            let Some(status) = decide(&current) else {
                return Ok(ResolveOutcome::Open(current));
            };

            let changed = tx.execute(
                "UPDATE proposals SET status = ?1, resolved_at = ?2
                 WHERE id = ?3 AND status = 'active'",
                params![status.as_str(), resolved_at, id.value()],
            )?;
            if changed == 0 {
                return Err(StoreError::ConcurrentWrite {
                    op: "resolve proposal",
                    proposal_id: id.value(),
                });
            }
            require_loaded(tx, "resolve proposal", id).map(ResolveOutcome::Resolved)
        })?;

        if let ResolveOutcome::Resolved(proposal) = &outcome {
            tracing::info!(
                proposal_id = %proposal.id,
                status = %proposal.status,
                for_weight = %proposal.for_weight,
                against_weight = %proposal.against_weight,
                quorum_weight = %proposal.quorum_weight,
                "Proposal resolved"
            );
        }
        Ok(outcome)
    }

    /// Passed -> Executed, as `UPDATE ... WHERE status = 'passed'`.
    pub fn execute_if_passed(
        &mut self,
        id: ProposalId,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError> {
        let executed_at = to_millis(now);
        self.write("execute proposal", |tx| {
            let changed = tx.execute(
                "UPDATE proposals SET status = 'executed', executed_at = ?1, executed_by = ?2
                 WHERE id = ?3 AND status = 'passed'",
                params![executed_at, actor.as_str(), id.value()],
            )?;
            settle_transition(tx, id, changed)
        })
    }

    /// Active -> Cancelled, only while voting is still open.
    ///
    /// With `early_resolution`, full turnout closes voting as well, so a vote
    /// that completes turnout first makes this a no-op.
    pub fn cancel_if_open(
        &mut self,
        id: ProposalId,
        actor: &UserId,
        now: DateTime<Utc>,
        early_resolution: bool,
    ) -> Result<TransitionOutcome, StoreError> {
        let cancelled_at = to_millis(now);
        self.write("cancel proposal", |tx| {
            let changed = tx.execute(
                "UPDATE proposals SET status = 'cancelled', cancelled_at = ?1, cancelled_by = ?2
                 WHERE id = ?3 AND status = 'active' AND voting_ends_at > ?1
                   AND (?4 = 0 OR for_weight + against_weight < total_eligible_weight)",
                params![cancelled_at, actor.as_str(), id.value(), early_resolution],
            )?;
            settle_transition(tx, id, changed)
        })
    }
}

fn settle_transition(
    db: &Connection,
    id: ProposalId,
    changed: usize,
) -> Result<TransitionOutcome, StoreError> {
    let current = load_proposal(db, id)?;
    Ok(match (current, changed) {
        (None, _) => TransitionOutcome::Missing,
        (Some(proposal), 0) => TransitionOutcome::Rejected(proposal),
        (Some(proposal), _) => TransitionOutcome::Applied(proposal),
    })
}
