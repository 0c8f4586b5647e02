//! Vote Ledger: append-only votes, unique per `(proposal_id, voter_id)`.
//!
//! A vote insert and the matching increment of the proposal's cached total
//! happen in one transaction, so the cache cannot diverge from the ledger.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use stakevote_types::{ProposalId, ProposalStatus, UserId, Vote, VoteChoice, Weight};

use crate::StoreError;
use crate::error::is_primary_key_violation;
use crate::proposals::{weight_from_sql, weight_to_sql};
use crate::store::GovernanceStore;
use crate::time::{from_millis, to_millis};

#[derive(Debug, Clone)]
pub struct NewVote {
    pub proposal_id: ProposalId,
    pub voter_id: UserId,
    pub choice: VoteChoice,
    pub weight: Weight,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastOutcome {
    Recorded(Vote),
    /// The voter already has a ledger entry for this proposal.
    Duplicate,
    Missing,
    /// Not accepting votes at `cast_at`, as read inside the write transaction.
    Closed {
        status: ProposalStatus,
        voting_ends_at: DateTime<Utc>,
    },
}

fn vote_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, i64, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_vote(raw: (i64, String, String, i64, i64)) -> Result<Vote, StoreError> {
    let (proposal_id, voter_id, choice, weight, cast_at) = raw;
    let choice = choice
        .parse::<VoteChoice>()
        .map_err(|_| StoreError::corrupt("choice", &choice))?;
    Ok(Vote {
        proposal_id: ProposalId::new(proposal_id),
        voter_id: UserId::new(voter_id),
        choice,
        weight: weight_from_sql("weight", weight)?,
        cast_at: from_millis("cast_at", cast_at)?,
    })
}

impl GovernanceStore {
    /// Append a vote and bump the cached total in the same transaction.
    pub fn record_vote(&mut self, vote: &NewVote) -> Result<CastOutcome, StoreError> {
        let weight = weight_to_sql(vote.weight)?;
        let cast_at = to_millis(vote.cast_at);
        let proposal_id = vote.proposal_id.value();

        let outcome = self.write("record vote", |tx| {
            let current: Option<(String, i64, i64, i64)> = tx
                .query_row(
                    "SELECT status, voting_ends_at, for_weight, against_weight
                     FROM proposals WHERE id = ?1",
                    params![proposal_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            let Some((status, voting_ends_at, for_weight, against_weight)) = current else {
                return Ok(CastOutcome::Missing);
            };
            let status = status
                .parse::<ProposalStatus>()
                .map_err(|_| StoreError::corrupt("status", &status))?;
            if status != ProposalStatus::Active || voting_ends_at <= cast_at {
                return Ok(CastOutcome::Closed {
                    status,
                    voting_ends_at: from_millis("voting_ends_at", voting_ends_at)?,
                });
            }

            // The primary key is the uniqueness guarantee; a failed insert
            // leaves the transaction untouched.
            let inserted = tx.execute(
                "INSERT INTO votes (proposal_id, voter_id, choice, weight, cast_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    proposal_id,
                    vote.voter_id.as_str(),
                    vote.choice.as_str(),
                    weight,
                    cast_at
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(err) if is_primary_key_violation(&err) => return Ok(CastOutcome::Duplicate),
                Err(err) => return Err(err.into()),
            }

            // Rolls back the insert above when the running total would not fit.
            let running = match vote.choice {
                VoteChoice::For => weight_from_sql("for_weight", for_weight)?,
                VoteChoice::Against => weight_from_sql("against_weight", against_weight)?,
            };
            let bumped = running.checked_add(vote.weight);
            if !bumped.is_some_and(|total| total <= Weight::MAX_STORABLE) {
                return Err(StoreError::WeightOutOfRange(
                    running.saturating_add(vote.weight).units(),
                ));
            }

            let increment = match vote.choice {
                VoteChoice::For => {
                    "UPDATE proposals SET for_weight = for_weight + ?1
                     WHERE id = ?2 AND status = 'active' AND voting_ends_at > ?3"
                }
                VoteChoice::Against => {
                    "UPDATE proposals SET against_weight = against_weight + ?1
                     WHERE id = ?2 AND status = 'active' AND voting_ends_at > ?3"
                }
            };
            let changed = tx.execute(increment, params![weight, proposal_id, cast_at])?;
            if changed == 0 {
                return Err(StoreError::ConcurrentWrite {
                    op: "record vote",
                    proposal_id,
                });
            }

            Ok(CastOutcome::Recorded(Vote {
                proposal_id: vote.proposal_id,
                voter_id: vote.voter_id.clone(),
                choice: vote.choice,
                weight: vote.weight,
                cast_at: from_millis("cast_at", cast_at)?,
            }))
        })?;

        match &outcome {
            CastOutcome::Recorded(recorded) => tracing::info!(
                proposal_id = %recorded.proposal_id,
                voter_id = %recorded.voter_id,
                choice = %recorded.choice,
                weight = %recorded.weight,
                "Vote recorded"
            ),
            CastOutcome::Duplicate => tracing::debug!(
                proposal_id = %vote.proposal_id,
                voter_id = %vote.voter_id,
                "Duplicate vote rejected"
            ),
            CastOutcome::Missing | CastOutcome::Closed { .. } => {}
        }
        Ok(outcome)
    }

    pub fn vote_of(
        &self,
        proposal_id: ProposalId,
        voter_id: &UserId,
    ) -> Result<Option<Vote>, StoreError> {
        let raw = self
            .conn()
            .query_row(
                "SELECT proposal_id, voter_id, choice, weight, cast_at
                 FROM votes WHERE proposal_id = ?1 AND voter_id = ?2",
                params![proposal_id.value(), voter_id.as_str()],
                vote_from_row,
            )
            .optional()?;
        raw.map(into_vote).transpose()
    }

    /// The full ledger for one proposal, in cast order.
    pub fn votes(&self, proposal_id: ProposalId) -> Result<Vec<Vote>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT proposal_id, voter_id, choice, weight, cast_at
             FROM votes WHERE proposal_id = ?1
             ORDER BY cast_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![proposal_id.value()], vote_from_row)?;

        let mut votes = Vec::new();
        for row in rows {
            votes.push(into_vote(row?)?);
        }
        Ok(votes)
    }
}
