//! The persistent vote store: the only code allowed to mutate vote state.
//!
//! Everything before the commit is free to fail or be abandoned; the ledger
//! is where the one durable, irreversible write happens. `commit` re-checks
//! the has-voted flag as part of the same atomic unit as its writes, so the
//! flag cannot change between a session's eligibility check and its commit
//! without the commit noticing.

pub mod db;
#[cfg(test)]
pub mod memory;

use thiserror::Error;

use crate::model::party::{Party, PartyId};
use crate::model::voter::{Voter, VoterId, VoterSummary};

/// Result of attempting the durable write of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The voter was marked and the party tally incremented, atomically.
    Applied,
    /// The voter had already voted; nothing was changed. A normal outcome,
    /// not an error — this is how a commit race resolves on the losing side.
    AlreadyVoted,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Unknown voter id. A configuration or integrity problem, not a normal
    /// runtime path.
    #[error("no voter with id {0}")]
    VoterNotFound(VoterId),
    /// Unknown party id, same caveat as above.
    #[error("no party with id {0}")]
    PartyNotFound(PartyId),
    /// The store could not be reached or the transaction did not go through.
    /// Transient: the operator may retry the session.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    /// The stored data does not match the expected schema. Fatal to the
    /// session and surfaced distinctly so it cannot be mistaken for a
    /// legitimate rejection.
    #[error("ledger integrity error: {0}")]
    Integrity(String),
}

#[rocket::async_trait]
pub trait VoteLedger: Send + Sync {
    /// Look up a single voter, reference sample included.
    async fn voter(&self, id: VoterId) -> Result<Option<Voter>, LedgerError>;

    /// The voter roll, optionally filtered by a case-insensitive name
    /// substring, ordered by id.
    async fn voters(&self, search: Option<&str>) -> Result<Vec<VoterSummary>, LedgerError>;

    /// All parties with their current tallies, ordered by id.
    async fn parties(&self) -> Result<Vec<Party>, LedgerError>;

    /// Atomically set `voter`'s has-voted flag and increment `party`'s tally.
    ///
    /// The flag check, flag write and tally increment are one atomic unit:
    /// either both writes land or neither does, even if the process dies in
    /// between. On [`CommitOutcome::AlreadyVoted`] nothing is mutated.
    async fn commit(&self, voter: VoterId, party: PartyId) -> Result<CommitOutcome, LedgerError>;

    /// Administrative rewind: clear every has-voted flag and every tally.
    /// Only valid between election runs; the caller must ensure no session
    /// is active.
    async fn reset(&self) -> Result<(), LedgerError>;
}
