//! Tally Engine: the cached totals on `proposals` against the ledger sums.

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use stakevote_types::{ProposalId, ProposalStatus, TallyTotals};

use crate::StoreError;
use crate::proposals::{load_proposal, weight_from_sql, weight_to_sql};
use crate::store::GovernanceStore;

/// Cached totals next to the totals recomputed from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TallyReport {
    pub proposal_id: ProposalId,
    pub cached: TallyTotals,
    pub ledger: TallyTotals,
}

impl TallyReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.cached == self.ledger
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    Missing,
    /// `report` describes the state before the repair.
    Repaired(TallyReport),
    /// Voting has closed; the cached tally is read-only.
    Frozen(ProposalStatus),
}

fn ledger_totals(db: &Connection, id: ProposalId) -> Result<TallyTotals, StoreError> {
    let (for_weight, against_weight): (i64, i64) = db.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN choice = 'for' THEN weight ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN choice = 'against' THEN weight ELSE 0 END), 0)
         FROM votes WHERE proposal_id = ?1",
        params![id.value()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(TallyTotals::new(
        weight_from_sql("for_weight", for_weight)?,
        weight_from_sql("against_weight", against_weight)?,
    ))
}

fn report(db: &Connection, id: ProposalId) -> Result<Option<(TallyReport, ProposalStatus)>, StoreError> {
    let Some(proposal) = load_proposal(db, id)? else {
        return Ok(None);
    };
    let ledger = ledger_totals(db, id)?;
    Ok(Some((
        TallyReport {
            proposal_id: id,
            cached: proposal.tally(),
            ledger,
        },
        proposal.status,
    )))
}

impl GovernanceStore {
    /// Totals summed from the ledger alone, ignoring the cached columns.
    pub fn recompute_from_ledger(&self, id: ProposalId) -> Result<Option<TallyTotals>, StoreError> {
        let exists = self
            .conn()
            .query_row(
                "SELECT 1 FROM proposals WHERE id = ?1",
                params![id.value()],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }
        ledger_totals(self.conn(), id).map(Some)
    }

    /// Compare cached and ledger totals from one read snapshot.
    pub fn verify_tally(&self, id: ProposalId) -> Result<Option<TallyReport>, StoreError> {
        let snapshot = self.conn().unchecked_transaction()?;
        let found = report(&snapshot, id)?;
        snapshot.finish()?;

        if let Some((report, _)) = &found
            && !report.is_consistent()
        {
            tracing::warn!(
                proposal_id = %id,
                cached_for = %report.cached.for_weight,
                ledger_for = %report.ledger.for_weight,
                cached_against = %report.cached.against_weight,
                ledger_against = %report.ledger.against_weight,
                "Cached tally diverges from ledger"
            );
        }
        Ok(found.map(|(report, _)| report))
    }

    /// Overwrite the cached totals with the ledger sums while still Active.
    pub fn repair_tally(&mut self, id: ProposalId) -> Result<RepairOutcome, StoreError> {
        let outcome = self.write("repair tally", |tx| {
            let Some((report, status)) = report(tx, id)? else {
                return Ok(RepairOutcome::Missing);
            };
            if status != ProposalStatus::Active {
                return Ok(RepairOutcome::Frozen(status));
            }
            if report.is_consistent() {
                return Ok(RepairOutcome::Repaired(report));
            }
            tx.execute(
                "UPDATE proposals SET for_weight = ?1, against_weight = ?2
                 WHERE id = ?3 AND status = 'active'",
                params![
                    weight_to_sql(report.ledger.for_weight)?,
                    weight_to_sql(report.ledger.against_weight)?,
                    id.value()
                ],
            )?;
            Ok(RepairOutcome::Repaired(report))
        })?;

        if let RepairOutcome::Repaired(report) = &outcome
            && !report.is_consistent()
        {
            tracing::info!(proposal_id = %id, "Cached tally rebuilt from ledger");
        }
        Ok(outcome)
    }
}
