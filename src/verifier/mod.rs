//! Boundary to the external face-match capability.
//!
//! The matching algorithm itself is someone else's problem; the controller
//! only needs a yes/no plus a confidence score. A non-match is a successful
//! call with `matched: false`, never an error, and the controller does not
//! retry on its own — a rejection ends the session and the operator starts
//! over.

mod http;

pub use http::HttpVerifier;

use serde::Deserialize;
use thiserror::Error;

/// Outcome of comparing a live capture against the stored reference.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Verification {
    pub matched: bool,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum VerifierError {
    /// The live sample was unusable (no face detected, corrupt image).
    #[error("capture failed: {0}")]
    Capture(String),
    /// The matcher could not be reached or returned garbage.
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

#[rocket::async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Compare `candidate` against `reference` at the given match threshold.
    async fn verify(
        &self,
        reference: &[u8],
        candidate: &[u8],
        threshold: f64,
    ) -> Result<Verification, VerifierError>;
}
