use log::{debug, warn};
use mongodb::bson::doc;
use mongodb::error::{Error as DbError, ErrorKind};
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database};
use rocket::futures::TryStreamExt;

use super::{CommitOutcome, LedgerError, VoteLedger};
use crate::model::party::{Party, PartyId};
use crate::model::voter::{Voter, VoterId, VoterSummary};

const VOTERS: &str = "voters";
const PARTIES: &str = "parties";

/// The production ledger, backed by MongoDB.
///
/// Connections are pooled by the client; each commit runs inside its own
/// multi-document transaction, acquired for the duration of the call and
/// released on every exit path. Nothing here is held across a
/// user-interaction suspension point.
pub struct MongoLedger {
    client: Client,
    voters: Collection<Voter>,
    parties: Collection<Party>,
}

impl MongoLedger {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            voters: db.collection(VOTERS),
            parties: db.collection(PARTIES),
        }
    }
}

/// Split driver errors into the transient and structural halves of the
/// error taxonomy.
fn classify(err: DbError) -> LedgerError {
    match *err.kind {
        ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
            LedgerError::Integrity(err.to_string())
        }
        _ => LedgerError::Unavailable(err.to_string()),
    }
}

#[rocket::async_trait]
impl VoteLedger for MongoLedger {
    async fn voter(&self, id: VoterId) -> Result<Option<Voter>, LedgerError> {
        self.voters
            .find_one(doc! { "_id": id.0 }, None)
            .await
            .map_err(classify)
    }

    async fn voters(&self, search: Option<&str>) -> Result<Vec<VoterSummary>, LedgerError> {
        let filter = search.map(|term| {
            doc! { "name": { "$regex": regex_escape(term), "$options": "i" } }
        });
        let options = FindOptions::builder()
            .projection(doc! { "reference_sample": 0 })
            .sort(doc! { "_id": 1 })
            .build();
        let mut cursor = self
            .voters
            .clone_with_type::<VoterSummary>()
            .find(filter, options)
            .await
            .map_err(classify)?;

        let mut summaries = Vec::new();
        while let Some(summary) = cursor.try_next().await.map_err(classify)? {
            summaries.push(summary);
        }
        Ok(summaries)
    }

    async fn parties(&self) -> Result<Vec<Party>, LedgerError> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let mut cursor = self
            .parties
            .find(None, options)
            .await
            .map_err(classify)?;

        let mut parties = Vec::new();
        while let Some(party) = cursor.try_next().await.map_err(classify)? {
            parties.push(party);
        }
        Ok(parties)
    }

    async fn commit(&self, voter: VoterId, party: PartyId) -> Result<CommitOutcome, LedgerError> {
        let mut session = self.client.start_session(None).await.map_err(classify)?;
        session.start_transaction(None).await.map_err(classify)?;

        // Compare-and-swap on the flag: matches only a voter who exists and
        // has not yet voted. This is the at-most-once gate, re-checked here
        // regardless of what the session observed earlier.
        let marked = self
            .voters
            .update_one_with_session(
                doc! { "_id": voter.0, "has_voted": false },
                doc! { "$set": { "has_voted": true } },
                None,
                &mut session,
            )
            .await
            .map_err(classify)?;

        if marked.matched_count == 0 {
            session.abort_transaction().await.map_err(classify)?;
            // Distinguish a missing voter from one who has already voted.
            return match self
                .voters
                .find_one(doc! { "_id": voter.0 }, None)
                .await
                .map_err(classify)?
            {
                Some(_) => {
                    warn!("commit refused: voter {voter} has already voted");
                    Ok(CommitOutcome::AlreadyVoted)
                }
                None => Err(LedgerError::VoterNotFound(voter)),
            };
        }

        let tallied = self
            .parties
            .update_one_with_session(
                doc! { "_id": party.0 },
                doc! { "$inc": { "vote_count": 1_i64 } },
                None,
                &mut session,
            )
            .await
            .map_err(classify)?;

        if tallied.matched_count == 0 {
            session.abort_transaction().await.map_err(classify)?;
            return Err(LedgerError::PartyNotFound(party));
        }

        session.commit_transaction().await.map_err(classify)?;
        debug!("committed vote for party {party} by voter {voter}");
        Ok(CommitOutcome::Applied)
    }

    async fn reset(&self) -> Result<(), LedgerError> {
        // Both halves in one transaction, so a crash mid-reset cannot leave
        // cleared flags against uncleared tallies.
        let mut session = self.client.start_session(None).await.map_err(classify)?;
        session.start_transaction(None).await.map_err(classify)?;

        self.voters
            .update_many_with_session(
                doc! {},
                doc! { "$set": { "has_voted": false } },
                None,
                &mut session,
            )
            .await
            .map_err(classify)?;
        self.parties
            .update_many_with_session(
                doc! {},
                doc! { "$set": { "vote_count": 0_i64 } },
                None,
                &mut session,
            )
            .await
            .map_err(classify)?;

        session.commit_transaction().await.map_err(classify)?;
        Ok(())
    }
}

/// Escape regex metacharacters so a search term is matched literally.
fn regex_escape(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if r".^$*+?()[]{}|\".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
