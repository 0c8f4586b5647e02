use std::path::Path;
use std::thread;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::StoreError;
use crate::retry::RetryPolicy;
use crate::secure_path::prepare_db_path;

/// Connection-level settings.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long SQLite itself waits on a locked database before reporting BUSY.
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Durable home of proposals and the vote ledger.
///
/// One `GovernanceStore` owns one connection. Independent stores opened on
/// the same file coordinate only through SQLite transactions: every write is a
/// `BEGIN IMMEDIATE` transaction and every state change is a conditional
/// `UPDATE` guarded by the current status.
pub struct GovernanceStore {
    db: Connection,
    retry: RetryPolicy,
}

impl GovernanceStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS proposals (
            id INTEGER PRIMARY KEY,
            property_id TEXT NOT NULL,
            proposer_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            voting_ends_at INTEGER NOT NULL,
            total_eligible_weight INTEGER NOT NULL CHECK (total_eligible_weight > 0),
            quorum_weight INTEGER NOT NULL CHECK (quorum_weight > 0),
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'passed', 'failed', 'executed', 'cancelled')),
            for_weight INTEGER NOT NULL DEFAULT 0 CHECK (for_weight >= 0),
            against_weight INTEGER NOT NULL DEFAULT 0 CHECK (against_weight >= 0),
            resolved_at INTEGER,
            executed_at INTEGER,
            executed_by TEXT,
            cancelled_at INTEGER,
            cancelled_by TEXT,
            CHECK (voting_ends_at > created_at),
            CHECK (typeof(for_weight) = 'integer' AND typeof(against_weight) = 'integer')
        );

        CREATE TABLE IF NOT EXISTS votes (
            proposal_id INTEGER NOT NULL REFERENCES proposals(id),
            voter_id TEXT NOT NULL,
            choice TEXT NOT NULL CHECK (choice IN ('for', 'against')),
            weight INTEGER NOT NULL CHECK (weight > 0),
            cast_at INTEGER NOT NULL,
            PRIMARY KEY (proposal_id, voter_id)
        );

        CREATE INDEX IF NOT EXISTS idx_proposals_property_status
        ON proposals(property_id, status);

        CREATE INDEX IF NOT EXISTS idx_proposals_due
        ON proposals(voting_ends_at) WHERE status = 'active';

        -- The ledger is append-only.
        CREATE TRIGGER IF NOT EXISTS votes_no_update
        BEFORE UPDATE ON votes
        BEGIN
            SELECT RAISE(ABORT, 'votes are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS votes_no_delete
        BEFORE DELETE ON votes
        BEGIN
            SELECT RAISE(ABORT, 'votes are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS votes_require_active
        BEFORE INSERT ON votes
        WHEN (SELECT status FROM proposals WHERE id = NEW.proposal_id) IS NOT 'active'
        BEGIN
            SELECT RAISE(ABORT, 'proposal is not accepting votes');
        END;

        CREATE TRIGGER IF NOT EXISTS proposals_legal_transition
        BEFORE UPDATE OF status ON proposals
        WHEN NOT (
            (OLD.status = 'active' AND NEW.status IN ('passed', 'failed', 'cancelled'))
            OR (OLD.status = 'passed' AND NEW.status = 'executed')
        )
        BEGIN
            SELECT RAISE(ABORT, 'illegal proposal status transition');
        END;

        CREATE TRIGGER IF NOT EXISTS proposals_terminal_frozen
        BEFORE UPDATE ON proposals
        WHEN OLD.status IN ('failed', 'executed', 'cancelled')
        BEGIN
            SELECT RAISE(ABORT, 'proposal is in a terminal state');
        END;

        CREATE TRIGGER IF NOT EXISTS proposals_tally_frozen
        BEFORE UPDATE OF for_weight, against_weight ON proposals
        WHEN OLD.status <> 'active'
        BEGIN
            SELECT RAISE(ABORT, 'tally is frozen once voting closes');
        END;

        CREATE TRIGGER IF NOT EXISTS proposals_no_delete
        BEFORE DELETE ON proposals
        BEGIN
            SELECT RAISE(ABORT, 'proposals are never deleted');
        END;
    ";

    /// Open or create the governance database at the given path.
    pub fn open(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        prepare_db_path(path)?;

        let db = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened governance database");
        Self::initialize(db, options)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Connection::open_in_memory()?;
        Self::initialize(db, &StoreOptions::default())
    }

    fn initialize(db: Connection, options: &StoreOptions) -> Result<Self, StoreError> {
        db.busy_timeout(options.busy_timeout)?;
        db.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;",
        )?;
        let mut store = Self {
            db,
            retry: options.retry.clone(),
        };
        // Schema creation contends for the write lock like any other writer.
        store.write("initialize schema", |tx| {
            tx.execute_batch(Self::SCHEMA)?;
            Ok(())
        })?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.db
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on `Ok`.
    ///
    /// Busy/locked failures restart the whole transaction after a backoff, so
    /// `f` re-reads every precondition on each attempt. An `Err` from `f`
    /// rolls back.
    pub(crate) fn write<T, F>(&mut self, op: &'static str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut attempt: u32 = 0;
        loop {
            match run_immediate(&mut self.db, &mut f) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if attempt >= self.retry.max_retries {
                        tracing::warn!(op, attempts = attempt + 1, "Giving up on busy database");
                        return Err(StoreError::Busy {
                            op,
                            attempts: attempt + 1,
                        });
                    }
                    let delay = self.retry.delay(attempt);
                    tracing::debug!(op, attempt, ?delay, "Database busy, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn run_immediate<T, F>(db: &mut Connection, f: &mut F) -> Result<T, StoreError>
where
    F: FnMut(&Transaction<'_>) -> Result<T, StoreError>,
{
    let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}
