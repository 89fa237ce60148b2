use log::{error, warn};
use rocket::http::Status;
use rocket::response::Responder;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::model::session::StateError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// An operation arrived while the terminal holds no session.
    pub fn no_session() -> Self {
        Self::Conflict("no session in progress".to_string())
    }

    /// The session was cancelled out from under an in-flight operation.
    pub fn cancelled() -> Self {
        Self::Conflict("session was cancelled".to_string())
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = match &self {
            Self::Ledger(LedgerError::VoterNotFound(_) | LedgerError::PartyNotFound(_)) => {
                Status::NotFound
            }
            Self::Ledger(LedgerError::Unavailable(_)) => Status::ServiceUnavailable,
            Self::Ledger(LedgerError::Integrity(_)) => Status::InternalServerError,
            Self::State(_) | Self::Conflict(_) => Status::Conflict,
            Self::BadRequest(_) => Status::BadRequest,
            Self::NotFound(_) => Status::NotFound,
        };
        if status.code >= 500 {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        Err(status)
    }
}
