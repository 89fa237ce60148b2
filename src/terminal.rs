//! The per-terminal session controller.
//!
//! Owns the single active [`VotingSession`] and drives identity verification,
//! hardware vote-code acquisition and the atomic ledger commit in sequence.
//! Only one session exists at a time; a second `select` while one is in
//! progress is refused rather than queued.
//!
//! The two suspension points — the external matcher call and the bounded
//! wait on the ballot device — hold no lock and are raced against the cancel
//! signal, so the operator can always abort. Nothing durable happens before
//! the commit, which is why cancellation never needs to undo anything.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rocket::tokio::select;
use rocket::tokio::sync::{Mutex, Notify};
use rocket::tokio::time::{interval, Instant};

use crate::error::{Error, Result};
use crate::hardware::HardwareInputSource;
use crate::ledger::{CommitOutcome, LedgerError, VoteLedger};
use crate::model::party::PartyId;
use crate::model::results::{aggregate, Results};
use crate::model::session::{
    FailReason, RejectReason, SessionId, SessionReport, VotingSession,
};
use crate::model::voter::{Voter, VoterId, VoterSummary};
use crate::verifier::{IdentityVerifier, VerifierError};

/// Timing and matching knobs, from configuration.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    pub match_threshold: f64,
    pub input_timeout: Duration,
    pub poll_interval: Duration,
}

pub struct Terminal {
    ledger: Arc<dyn VoteLedger>,
    verifier: Arc<dyn IdentityVerifier>,
    hardware: Mutex<Box<dyn HardwareInputSource>>,
    /// The one session slot. `None` is the idle terminal.
    session: Mutex<Option<VotingSession>>,
    cancel: Notify,
    tuning: Tuning,
}

impl Terminal {
    pub fn new(
        ledger: Arc<dyn VoteLedger>,
        verifier: Arc<dyn IdentityVerifier>,
        hardware: Box<dyn HardwareInputSource>,
        tuning: Tuning,
    ) -> Self {
        Self {
            ledger,
            verifier,
            hardware: Mutex::new(hardware),
            session: Mutex::new(None),
            cancel: Notify::new(),
            tuning,
        }
    }

    /// Snapshot of the active session, if any.
    pub async fn status(&self) -> Option<SessionReport> {
        self.session.lock().await.as_ref().map(VotingSession::report)
    }

    /// Begin a session for the given voter. A voter who has already voted is
    /// rejected immediately and the terminal stays idle.
    pub async fn select(&self, voter_id: VoterId) -> Result<SessionReport> {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            return Err(Error::Conflict("a session is already in progress".into()));
        }

        let voter = self
            .ledger
            .voter(voter_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter with id {voter_id}")))?;

        let session = VotingSession::select(&voter);
        let report = session.report();
        if session.is_terminal() {
            info!("refused session for voter {voter_id}: already voted");
        } else {
            info!("session opened for voter {voter_id} ({})", voter.name);
            *slot = Some(session);
        }
        Ok(report)
    }

    /// Verify the freshly captured sample against the stored reference.
    ///
    /// A non-match, capture problem or matcher outage each end the session
    /// with the corresponding rejection; none of them touch the ledger.
    pub async fn verify(&self, sample: &[u8]) -> Result<SessionReport> {
        let (sid, voter_id) = {
            let mut slot = self.session.lock().await;
            let session = slot.as_mut().ok_or_else(Error::no_session)?;
            session.begin_verification()?;
            (session.id(), session.voter_id())
        };

        // An empty capture cannot be matched; reject without calling out.
        if sample.is_empty() {
            warn!("empty capture for voter {voter_id}");
            return self.finish_rejected(sid, RejectReason::CaptureFailed).await;
        }

        let voter = match self.ledger.voter(voter_id).await {
            Ok(Some(voter)) => voter,
            Ok(None) => {
                // The roll changed under us; structural, not a rejection.
                self.clear(sid).await;
                return Err(Error::not_found(format!("Voter with id {voter_id}")));
            }
            Err(err) => {
                warn!("ledger unreadable during verification: {err}");
                return self.finish_failed(sid, FailReason::PersistenceError).await;
            }
        };

        let verification = select! {
            v = self.verifier.verify(
                &voter.reference_sample.bytes,
                sample,
                self.tuning.match_threshold,
            ) => v,
            _ = self.cancel.notified() => return Err(Error::cancelled()),
        };

        let mut slot = self.session.lock().await;
        let report = match slot.as_mut() {
            Some(session) if session.id() == sid => match verification {
                Ok(v) if v.matched => {
                    session.verified(v.confidence)?;
                    info!(
                        "voter {voter_id} verified (confidence {:.3})",
                        v.confidence
                    );
                    return Ok(session.report());
                }
                Ok(v) => {
                    info!(
                        "voter {voter_id} failed verification (confidence {:.3})",
                        v.confidence
                    );
                    session.reject(RejectReason::VerificationRejected);
                    session.report()
                }
                Err(VerifierError::Capture(reason)) => {
                    warn!("capture rejected for voter {voter_id}: {reason}");
                    session.reject(RejectReason::CaptureFailed);
                    session.report()
                }
                Err(VerifierError::Unavailable(reason)) => {
                    warn!("matcher unavailable: {reason}");
                    session.reject(RejectReason::VerifierUnavailable);
                    session.report()
                }
            },
            _ => return Err(Error::cancelled()),
        };
        *slot = None;
        Ok(report)
    }

    /// Bounded wait for a valid vote code, then the atomic commit.
    ///
    /// The device is polled on a fixed tick so the wait stays cancellable.
    /// Codes outside the configured party set are discarded silently, per
    /// the hardware protocol.
    pub async fn cast(&self) -> Result<SessionReport> {
        let (sid, voter_id) = {
            let mut slot = self.session.lock().await;
            let session = slot.as_mut().ok_or_else(Error::no_session)?;
            session.begin_input_wait()?;
            (session.id(), session.voter_id())
        };

        let valid: HashSet<PartyId> = match self.ledger.parties().await {
            Ok(parties) => parties.into_iter().map(|p| p.id).collect(),
            Err(err) => {
                warn!("ledger unreadable before input wait: {err}");
                return self.finish_failed(sid, FailReason::PersistenceError).await;
            }
        };

        let deadline = Instant::now() + self.tuning.input_timeout;
        let mut tick = interval(self.tuning.poll_interval);
        let code = loop {
            select! {
                _ = tick.tick() => {}
                _ = self.cancel.notified() => return Err(Error::cancelled()),
            }
            // Re-check ownership each tick: a cancel that landed while this
            // task was off the Notify (mid-poll) must still end the wait.
            if !self.owns(sid).await {
                return Err(Error::cancelled());
            }
            if Instant::now() >= deadline {
                break None;
            }
            match self.hardware.lock().await.poll() {
                Ok(Some(code)) if valid.contains(&code) => break Some(code),
                Ok(Some(code)) => debug!("ignoring unknown vote code {code}"),
                Ok(None) => {}
                // A flaky read is not fatal; the timeout bounds the wait.
                Err(err) => warn!("ballot device read failed: {err}"),
            }
        };

        // Take the session out of the slot; every path below is terminal.
        // The slot lock is held across the commit on purpose: the commit is
        // the one step that must not interleave with cancellation or a new
        // selection.
        let mut slot = self.session.lock().await;
        let mut session = match slot.take() {
            Some(session) if session.id() == sid => session,
            other => {
                *slot = other;
                return Err(Error::cancelled());
            }
        };

        let Some(code) = code else {
            warn!(
                "no vote code from voter {voter_id} within {:?}",
                self.tuning.input_timeout
            );
            session.fail(FailReason::HardwareTimeout);
            return Ok(session.report());
        };

        session.code_received(code)?;
        match self.ledger.commit(voter_id, code).await {
            Ok(CommitOutcome::Applied) => {
                session.committed()?;
                info!("vote committed for voter {voter_id}");
                Ok(session.report())
            }
            Ok(CommitOutcome::AlreadyVoted) => {
                // Lost the race: the flag changed since selection.
                warn!("commit found voter {voter_id} already voted");
                session.reject(RejectReason::AlreadyVoted);
                Ok(session.report())
            }
            Err(LedgerError::Unavailable(reason)) => {
                warn!("commit failed, ledger unavailable: {reason}");
                session.fail(FailReason::PersistenceError);
                Ok(session.report())
            }
            // Structural: surface distinctly, never as a rejection the
            // operator could mistake for policy.
            Err(err) => Err(err.into()),
        }
    }

    /// Whether the slot still holds the session with the given id.
    async fn owns(&self, sid: SessionId) -> bool {
        matches!(
            self.session.lock().await.as_ref(),
            Some(session) if session.id() == sid
        )
    }

    /// Operator abort. Always safe before `Committing`: no ledger write has
    /// happened yet, so dropping the session is the whole undo.
    pub async fn cancel(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        let session = slot.take().ok_or_else(Error::no_session)?;
        info!(
            "session for voter {} cancelled from {:?}",
            session.voter_id(),
            session.state()
        );
        // Wake any driver parked at a suspension point; it will observe the
        // vacated slot and finish without touching the ledger.
        self.cancel.notify_waiters();
        Ok(())
    }

    /// The voter roll for the operator's list, optionally filtered by name.
    pub async fn voters(&self, search: Option<&str>) -> Result<Vec<VoterSummary>> {
        Ok(self.ledger.voters(search).await?)
    }

    /// Look up a single voter, reference photo included.
    pub async fn voter(&self, id: VoterId) -> Result<Voter> {
        self.ledger
            .voter(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter with id {id}")))
    }

    /// Ranked results over the current tallies. Reads a plain snapshot and
    /// may run while a session is active.
    pub async fn results(&self) -> Result<Results> {
        Ok(aggregate(self.ledger.parties().await?))
    }

    /// Administrative rewind between election runs. Refused while a session
    /// is active, so the at-most-once invariant cannot be broken mid-flight.
    pub async fn reset(&self) -> Result<()> {
        let slot = self.session.lock().await;
        if slot.is_some() {
            return Err(Error::Conflict(
                "cannot reset while a session is in progress".into(),
            ));
        }
        // The slot lock is held for the duration, blocking new selections.
        self.ledger.reset().await?;
        info!("ledger reset: all voters eligible again, tallies cleared");
        Ok(())
    }

    /// Apply a terminal rejection and vacate the slot.
    async fn finish_rejected(&self, sid: SessionId, reason: RejectReason) -> Result<SessionReport> {
        let mut slot = self.session.lock().await;
        let report = match slot.as_mut() {
            Some(session) if session.id() == sid => {
                session.reject(reason);
                session.report()
            }
            _ => return Err(Error::cancelled()),
        };
        *slot = None;
        Ok(report)
    }

    /// Apply a terminal failure and vacate the slot.
    async fn finish_failed(&self, sid: SessionId, reason: FailReason) -> Result<SessionReport> {
        let mut slot = self.session.lock().await;
        let report = match slot.as_mut() {
            Some(session) if session.id() == sid => {
                session.fail(reason);
                session.report()
            }
            _ => return Err(Error::cancelled()),
        };
        *slot = None;
        Ok(report)
    }

    /// Vacate the slot if it still holds the given session.
    async fn clear(&self, sid: SessionId) {
        let mut slot = self.session.lock().await;
        if matches!(slot.as_ref(), Some(session) if session.id() == sid) {
            *slot = None;
        }
    }
}
