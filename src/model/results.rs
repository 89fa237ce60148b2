use serde::Serialize;

use crate::model::party::{Party, PartyId};

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub party: PartyId,
    pub name: String,
    pub votes: i64,
    /// Share of the total vote, 0 when nothing has been cast yet.
    pub percentage: f64,
}

/// The full results view: a read-only projection over the party tallies,
/// computed on demand and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Results {
    pub total_votes: i64,
    pub rows: Vec<ResultRow>,
    /// The leading party, absent only when no parties are configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<ResultRow>,
}

/// Rank the given tallies: votes descending, ties broken by ascending party
/// id so that equal tallies always come back in the same order.
pub fn aggregate(mut parties: Vec<Party>) -> Results {
    parties.sort_by(|a, b| b.vote_count.cmp(&a.vote_count).then(a.id.cmp(&b.id)));
    let total_votes: i64 = parties.iter().map(|p| p.vote_count).sum();

    let rows: Vec<ResultRow> = parties
        .into_iter()
        .map(|party| {
            let percentage = if total_votes == 0 {
                0.0
            } else {
                party.vote_count as f64 / total_votes as f64 * 100.0
            };
            ResultRow {
                party: party.id,
                name: party.name,
                votes: party.vote_count,
                percentage,
            }
        })
        .collect();

    let winner = rows.first().cloned();
    Results {
        total_votes,
        rows,
        winner,
    }
}
