//! In-memory ledger used by the test suite.
//!
//! Behaves like the real store, including the all-or-nothing commit, and can
//! inject a failure between the flag write and the tally write to prove
//! nothing observable leaks out of a broken transaction.

use std::collections::BTreeMap;
use std::sync::Mutex;

use mongodb::bson::{spec::BinarySubtype, Binary};

use super::{CommitOutcome, LedgerError, VoteLedger};
use crate::model::party::{Party, PartyId};
use crate::model::voter::{Voter, VoterId, VoterSummary};

pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

struct Inner {
    voters: BTreeMap<VoterId, Voter>,
    parties: BTreeMap<PartyId, Party>,
    fail_next_commit: bool,
}

pub fn voter(id: i32, name: &str, has_voted: bool) -> Voter {
    Voter {
        id: VoterId(id),
        name: name.into(),
        reference_sample: Binary {
            subtype: BinarySubtype::Generic,
            bytes: format!("photo-of-{name}").into_bytes(),
        },
        has_voted,
    }
}

pub fn party(id: i32, name: &str) -> Party {
    Party {
        id: PartyId(id),
        name: name.into(),
        vote_count: 0,
    }
}

impl MemoryLedger {
    pub fn new(voters: Vec<Voter>, parties: Vec<Party>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                voters: voters.into_iter().map(|v| (v.id, v)).collect(),
                parties: parties.into_iter().map(|p| (p.id, p)).collect(),
                fail_next_commit: false,
            }),
        }
    }

    /// Three eligible voters, one who has voted, three parties.
    pub fn seeded() -> Self {
        Self::new(
            vec![
                voter(1, "Alice", false),
                voter(2, "Bob", true),
                voter(3, "Carol", false),
                voter(4, "Dan", false),
            ],
            vec![party(1, "Red"), party(2, "Green"), party(3, "Blue")],
        )
    }

    /// Make the next commit die between its two writes.
    pub fn fail_next_commit(&self) {
        self.inner.lock().unwrap().fail_next_commit = true;
    }

    /// Full copy of the stored state, for byte-for-byte comparisons.
    pub fn snapshot(&self) -> (Vec<Voter>, Vec<Party>) {
        let inner = self.inner.lock().unwrap();
        (
            inner.voters.values().cloned().collect(),
            inner.parties.values().cloned().collect(),
        )
    }

    /// Sum of all party tallies.
    pub fn total_votes(&self) -> i64 {
        self.inner
            .lock()
            .unwrap()
            .parties
            .values()
            .map(|p| p.vote_count)
            .sum()
    }

    /// Number of voters marked as having voted.
    pub fn voted_count(&self) -> i64 {
        self.inner
            .lock()
            .unwrap()
            .voters
            .values()
            .filter(|v| v.has_voted)
            .count() as i64
    }
}

#[rocket::async_trait]
impl VoteLedger for MemoryLedger {
    async fn voter(&self, id: VoterId) -> Result<Option<Voter>, LedgerError> {
        Ok(self.inner.lock().unwrap().voters.get(&id).cloned())
    }

    async fn voters(&self, search: Option<&str>) -> Result<Vec<VoterSummary>, LedgerError> {
        let needle = search.map(str::to_lowercase);
        Ok(self
            .inner
            .lock()
            .unwrap()
            .voters
            .values()
            .filter(|v| match &needle {
                Some(needle) => v.name.to_lowercase().contains(needle),
                None => true,
            })
            .map(VoterSummary::from)
            .collect())
    }

    async fn parties(&self) -> Result<Vec<Party>, LedgerError> {
        Ok(self.inner.lock().unwrap().parties.values().cloned().collect())
    }

    async fn commit(&self, voter: VoterId, party: PartyId) -> Result<CommitOutcome, LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.parties.contains_key(&party) {
            return Err(LedgerError::PartyNotFound(party));
        }
        {
            let row = inner
                .voters
                .get_mut(&voter)
                .ok_or(LedgerError::VoterNotFound(voter))?;
            if row.has_voted {
                return Ok(CommitOutcome::AlreadyVoted);
            }
            row.has_voted = true;
        }
        if inner.fail_next_commit {
            inner.fail_next_commit = false;
            // The real transaction rolls back; mirror that exactly.
            inner.voters.get_mut(&voter).unwrap().has_voted = false;
            return Err(LedgerError::Unavailable("injected fault between writes".into()));
        }
        inner.parties.get_mut(&party).unwrap().vote_count += 1;
        Ok(CommitOutcome::Applied)
    }

    async fn reset(&self) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().unwrap();
        for voter in inner.voters.values_mut() {
            voter.has_voted = false;
        }
        for party in inner.parties.values_mut() {
            party.vote_count = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[rocket::async_test]
    async fn commit_is_at_most_once() {
        let ledger = MemoryLedger::seeded();
        assert_eq!(
            ledger.commit(VoterId(1), PartyId(2)).await.unwrap(),
            CommitOutcome::Applied
        );
        // Every subsequent attempt reports AlreadyVoted and changes nothing.
        for _ in 0..3 {
            assert_eq!(
                ledger.commit(VoterId(1), PartyId(3)).await.unwrap(),
                CommitOutcome::AlreadyVoted
            );
        }
        assert_eq!(ledger.total_votes(), 1);
    }

    #[rocket::async_test]
    async fn tally_total_always_matches_voted_count() {
        let ledger = MemoryLedger::seeded();
        assert_eq!(ledger.total_votes(), 0);
        // Bob is pre-marked as voted with no matching tally entry in the
        // seed; conservation is asserted over deltas from here.
        let before = ledger.voted_count();

        ledger.commit(VoterId(1), PartyId(1)).await.unwrap();
        ledger.commit(VoterId(2), PartyId(1)).await.unwrap_or(CommitOutcome::AlreadyVoted);
        ledger.commit(VoterId(3), PartyId(2)).await.unwrap();
        ledger.commit(VoterId(4), PartyId(2)).await.unwrap();

        assert_eq!(ledger.total_votes(), ledger.voted_count() - before);
    }

    #[rocket::async_test]
    async fn injected_fault_leaves_no_split_state() {
        let ledger = MemoryLedger::seeded();
        let before = ledger.snapshot();

        ledger.fail_next_commit();
        let err = ledger.commit(VoterId(1), PartyId(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));

        // Neither the flag nor the tally may have moved.
        assert_eq!(ledger.snapshot(), before);

        // The store still works afterwards.
        assert_eq!(
            ledger.commit(VoterId(1), PartyId(1)).await.unwrap(),
            CommitOutcome::Applied
        );
    }

    #[rocket::async_test]
    async fn concurrent_commits_race_to_exactly_one_success() {
        let ledger = Arc::new(MemoryLedger::seeded());
        let a = rocket::tokio::spawn({
            let ledger = Arc::clone(&ledger);
            async move { ledger.commit(VoterId(1), PartyId(1)).await }
        });
        let b = rocket::tokio::spawn({
            let ledger = Arc::clone(&ledger);
            async move { ledger.commit(VoterId(1), PartyId(2)).await }
        });
        let outcomes = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

        assert!(matches!(
            outcomes,
            (CommitOutcome::Applied, CommitOutcome::AlreadyVoted)
                | (CommitOutcome::AlreadyVoted, CommitOutcome::Applied)
        ));
        assert_eq!(ledger.total_votes(), 1);
    }

    #[rocket::async_test]
    async fn unknown_ids_are_structural_errors() {
        let ledger = MemoryLedger::seeded();
        assert!(matches!(
            ledger.commit(VoterId(99), PartyId(1)).await,
            Err(LedgerError::VoterNotFound(VoterId(99)))
        ));
        assert!(matches!(
            ledger.commit(VoterId(1), PartyId(99)).await,
            Err(LedgerError::PartyNotFound(PartyId(99)))
        ));
        // Failed commits must not mark the voter.
        assert_eq!(ledger.voted_count(), 1);
    }

    #[rocket::async_test]
    async fn reset_clears_flags_and_tallies() {
        let ledger = MemoryLedger::seeded();
        ledger.commit(VoterId(1), PartyId(1)).await.unwrap();

        ledger.reset().await.unwrap();

        assert_eq!(ledger.total_votes(), 0);
        assert_eq!(ledger.voted_count(), 0);
    }

    #[rocket::async_test]
    async fn search_is_case_insensitive() {
        let ledger = MemoryLedger::seeded();
        let hits = ledger.voters(Some("aLiC")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Alice");
    }
}
