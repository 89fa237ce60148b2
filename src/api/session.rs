use data_encoding::BASE64;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::session::SessionReport;
use crate::model::voter::VoterId;
use crate::terminal::Terminal;

pub fn routes() -> Vec<Route> {
    routes![status, select, verify, cast, cancel]
}

/// Current session snapshot, if any; the GUI polls this.
#[get("/session")]
async fn status(terminal: &State<Terminal>) -> Json<Option<SessionReport>> {
    Json(terminal.status().await)
}

#[derive(Deserialize)]
struct SelectRequest {
    voter: VoterId,
}

/// Open a session for a voter. A voter who has already voted comes straight
/// back rejected and the terminal stays idle.
#[post("/session/select", data = "<request>", format = "json")]
async fn select(
    terminal: &State<Terminal>,
    request: Json<SelectRequest>,
) -> Result<Json<SessionReport>> {
    Ok(Json(terminal.select(request.voter).await?))
}

#[derive(Deserialize)]
struct VerifyRequest {
    /// Base64-encoded live capture from the GUI's camera.
    sample: String,
}

/// Submit the captured sample for identity verification.
#[post("/session/verify", data = "<request>", format = "json")]
async fn verify(
    terminal: &State<Terminal>,
    request: Json<VerifyRequest>,
) -> Result<Json<SessionReport>> {
    let sample = BASE64
        .decode(request.sample.as_bytes())
        .map_err(|err| Error::BadRequest(format!("sample is not valid base64: {err}")))?;
    Ok(Json(terminal.verify(&sample).await?))
}

/// Wait for the voter's code from the ballot device, then commit it. Returns
/// once the session reaches a terminal state or the wait times out.
#[post("/session/cast")]
async fn cast(terminal: &State<Terminal>) -> Result<Json<SessionReport>> {
    Ok(Json(terminal.cast().await?))
}

/// Operator abort; safe in any pre-commit state.
#[post("/session/cancel")]
async fn cancel(terminal: &State<Terminal>) -> Result<()> {
    terminal.cancel().await
}
