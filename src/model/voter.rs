use std::fmt::{self, Display, Formatter};

use mongodb::bson::Binary;
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};

/// Stable voter identifier, issued at registration.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(pub i32);

impl Display for VoterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'a> FromParam<'a> for VoterId {
    type Error = std::num::ParseIntError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse::<i32>().map(VoterId)
    }
}

/// A registered voter, as stored in the `voters` collection.
///
/// `has_voted` starts false at registration and is flipped true exactly once,
/// by [`VoteLedger::commit`](crate::ledger::VoteLedger::commit). Nothing else
/// in this crate writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: VoterId,
    pub name: String,
    /// Reference image captured at registration, compared against the live
    /// sample during verification.
    pub reference_sample: Binary,
    pub has_voted: bool,
}

/// A voter as shown in the operator's roll: everything except the reference
/// sample, which is too large to ship with every listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterSummary {
    #[serde(rename = "_id")]
    pub id: VoterId,
    pub name: String,
    pub has_voted: bool,
}

impl From<&Voter> for VoterSummary {
    fn from(voter: &Voter) -> Self {
        Self {
            id: voter.id,
            name: voter.name.clone(),
            has_voted: voter.has_voted,
        }
    }
}
