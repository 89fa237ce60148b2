use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::party::PartyId;
use crate::model::voter::{Voter, VoterId};

/// Why a session ended in [`SessionState::Rejected`].
///
/// Rejections are normal outcomes, not faults: the operator may start a fresh
/// session for the same voter afterwards (except for `AlreadyVoted`, which
/// will reject again).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The voter's has-voted flag was set, either at selection or detected
    /// again at commit time.
    AlreadyVoted,
    /// The matcher ran and the live sample did not match the reference.
    VerificationRejected,
    /// The live sample was unusable (camera fault, no face found).
    CaptureFailed,
    /// The external matcher could not be reached or fell over.
    VerifierUnavailable,
}

/// Why a session ended in [`SessionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// No valid vote code arrived within the configured window.
    HardwareTimeout,
    /// The ledger was unreachable when the commit ran. The tally is
    /// untouched; the operator may retry the whole session.
    PersistenceError,
}

/// The lifecycle of one voter's attempt to cast a vote.
///
/// Idle has no variant: an idle terminal simply holds no session. Everything
/// up to `Committing` touches no durable state, which is what makes
/// cancellation unconditionally safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    VoterSelected,
    Verifying,
    Verified,
    AwaitingInput,
    Committing,
    Completed,
    Rejected { reason: RejectReason },
    Failed { reason: FailReason },
}

/// An operation was applied in a state that does not permit it.
#[derive(Debug, Clone, Error)]
#[error("cannot {operation} from state {state:?}")]
pub struct StateError {
    pub state: SessionState,
    pub operation: &'static str,
}

/// Distinguishes successive sessions, so a driver resuming after an await can
/// tell whether its session was cancelled (and possibly replaced) meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(u64);

impl SessionId {
    /// Atomically get the next ID.
    fn next() -> SessionId {
        static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
        SessionId(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Snapshot of a session, as reported to the operator UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionReport {
    pub voter: VoterId,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub state: SessionState,
}

/// One voter's end-to-end voting attempt. In-memory only, owned by the
/// terminal controller, destroyed on reaching a terminal state.
///
/// The session only sequences states; it performs no I/O itself. The
/// controller drives it and is responsible for ever touching the ledger.
#[derive(Debug)]
pub struct VotingSession {
    id: SessionId,
    voter: VoterId,
    state: SessionState,
    confidence: Option<f64>,
    vote_code: Option<PartyId>,
    started_at: DateTime<Utc>,
}

impl VotingSession {
    /// Start a session for the given voter. A voter whose has-voted flag is
    /// already set arrives directly in `Rejected { AlreadyVoted }` and never
    /// enters verification.
    pub fn select(voter: &Voter) -> Self {
        let state = if voter.has_voted {
            SessionState::Rejected {
                reason: RejectReason::AlreadyVoted,
            }
        } else {
            SessionState::VoterSelected
        };
        Self {
            id: SessionId::next(),
            voter: voter.id,
            state,
            confidence: None,
            vote_code: None,
            started_at: Utc::now(),
        }
    }

    fn expect(&self, wanted: SessionState, operation: &'static str) -> Result<(), StateError> {
        if self.state == wanted {
            Ok(())
        } else {
            Err(StateError {
                state: self.state,
                operation,
            })
        }
    }

    /// `VoterSelected → Verifying`.
    pub fn begin_verification(&mut self) -> Result<(), StateError> {
        self.expect(SessionState::VoterSelected, "begin verification")?;
        self.state = SessionState::Verifying;
        Ok(())
    }

    /// `Verifying → Verified`, recording the matcher's confidence.
    pub fn verified(&mut self, confidence: f64) -> Result<(), StateError> {
        self.expect(SessionState::Verifying, "accept verification")?;
        self.confidence = Some(confidence);
        self.state = SessionState::Verified;
        Ok(())
    }

    /// `Verified → AwaitingInput`.
    pub fn begin_input_wait(&mut self) -> Result<(), StateError> {
        self.expect(SessionState::Verified, "await hardware input")?;
        self.state = SessionState::AwaitingInput;
        Ok(())
    }

    /// `AwaitingInput → Committing`, recording the chosen code.
    pub fn code_received(&mut self, code: PartyId) -> Result<(), StateError> {
        self.expect(SessionState::AwaitingInput, "accept a vote code")?;
        self.vote_code = Some(code);
        self.state = SessionState::Committing;
        Ok(())
    }

    /// `Committing → Completed`, after the ledger reports the commit applied.
    pub fn committed(&mut self) -> Result<(), StateError> {
        self.expect(SessionState::Committing, "complete")?;
        self.state = SessionState::Completed;
        Ok(())
    }

    /// Move to `Rejected`. Permitted from any non-terminal state.
    pub fn reject(&mut self, reason: RejectReason) {
        if !self.is_terminal() {
            self.state = SessionState::Rejected { reason };
        }
    }

    /// Move to `Failed`. Permitted from any non-terminal state.
    pub fn fail(&mut self, reason: FailReason) {
        if !self.is_terminal() {
            self.state = SessionState::Failed { reason };
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SessionState::Completed | SessionState::Rejected { .. } | SessionState::Failed { .. }
        )
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn voter_id(&self) -> VoterId {
        self.voter
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn vote_code(&self) -> Option<PartyId> {
        self.vote_code
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            voter: self.voter,
            started_at: self.started_at,
            confidence: self.confidence,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{spec::BinarySubtype, Binary};

    fn voter(has_voted: bool) -> Voter {
        Voter {
            id: VoterId(7),
            name: "Ada".into(),
            reference_sample: Binary {
                subtype: BinarySubtype::Generic,
                bytes: vec![1, 2, 3],
            },
            has_voted,
        }
    }

    #[test]
    fn happy_path_walks_every_state() {
        let mut session = VotingSession::select(&voter(false));
        assert_eq!(session.state(), SessionState::VoterSelected);
        session.begin_verification().unwrap();
        assert_eq!(session.state(), SessionState::Verifying);
        session.verified(0.93).unwrap();
        assert_eq!(session.state(), SessionState::Verified);
        session.begin_input_wait().unwrap();
        assert_eq!(session.state(), SessionState::AwaitingInput);
        session.code_received(PartyId(2)).unwrap();
        assert_eq!(session.state(), SessionState::Committing);
        session.committed().unwrap();
        assert_eq!(session.state(), SessionState::Completed);
        assert!(session.is_terminal());
        assert_eq!(session.vote_code(), Some(PartyId(2)));
        assert_eq!(session.report().confidence, Some(0.93));
    }

    #[test]
    fn voted_voter_is_rejected_at_selection() {
        let mut session = VotingSession::select(&voter(true));
        assert_eq!(
            session.state(),
            SessionState::Rejected {
                reason: RejectReason::AlreadyVoted
            }
        );
        // Verification must be unreachable.
        assert!(session.begin_verification().is_err());
    }

    #[test]
    fn out_of_order_operations_are_refused() {
        let mut session = VotingSession::select(&voter(false));
        assert!(session.verified(0.9).is_err());
        assert!(session.begin_input_wait().is_err());
        assert!(session.code_received(PartyId(1)).is_err());
        assert!(session.committed().is_err());
        // The failed attempts must not have moved the state.
        assert_eq!(session.state(), SessionState::VoterSelected);
    }

    #[test]
    fn rejection_is_allowed_from_any_non_terminal_state() {
        let mut session = VotingSession::select(&voter(false));
        session.begin_verification().unwrap();
        session.verified(0.8).unwrap();
        session.begin_input_wait().unwrap();
        session.reject(RejectReason::AlreadyVoted);
        assert_eq!(
            session.state(),
            SessionState::Rejected {
                reason: RejectReason::AlreadyVoted
            }
        );
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut session = VotingSession::select(&voter(true));
        session.fail(FailReason::HardwareTimeout);
        session.reject(RejectReason::VerificationRejected);
        // Still the original rejection.
        assert_eq!(
            session.state(),
            SessionState::Rejected {
                reason: RejectReason::AlreadyVoted
            }
        );
    }

    #[test]
    fn session_ids_are_unique() {
        let a = VotingSession::select(&voter(false));
        let b = VotingSession::select(&voter(false));
        assert_ne!(a.id(), b.id());
    }
}
