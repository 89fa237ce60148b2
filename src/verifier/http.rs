use std::time::Duration;

use data_encoding::BASE64;
use log::debug;
use reqwest::StatusCode;
use serde::Serialize;

use super::{IdentityVerifier, Verification, VerifierError};

/// Client for the face-match service sitting next to the terminal.
///
/// The service wraps the actual model; we only speak JSON to it. It answers
/// 200 with a verdict, or 422 when the submitted capture is unusable — that
/// distinction is what separates `CaptureFailed` from `VerifierUnavailable`
/// in the session outcome.
pub struct HttpVerifier {
    client: reqwest::Client,
    url: String,
}

impl HttpVerifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, VerifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| VerifierError::Unavailable(err.to_string()))?;
        Ok(Self { client, url })
    }
}

#[derive(Serialize)]
struct MatchRequest {
    /// Base64-encoded registration image.
    reference: String,
    /// Base64-encoded live capture.
    candidate: String,
    threshold: f64,
}

#[rocket::async_trait]
impl IdentityVerifier for HttpVerifier {
    async fn verify(
        &self,
        reference: &[u8],
        candidate: &[u8],
        threshold: f64,
    ) -> Result<Verification, VerifierError> {
        let request = MatchRequest {
            reference: BASE64.encode(reference),
            candidate: BASE64.encode(candidate),
            threshold,
        };

        debug!("submitting samples to matcher at {}", self.url);
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|err| VerifierError::Unavailable(err.to_string()))?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let reason = response.text().await.unwrap_or_default();
            return Err(VerifierError::Capture(reason));
        }
        let response = response
            .error_for_status()
            .map_err(|err| VerifierError::Unavailable(err.to_string()))?;

        response
            .json::<Verification>()
            .await
            .map_err(|err| VerifierError::Unavailable(err.to_string()))
    }
}
