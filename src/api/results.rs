use rocket::serde::json::Json;
use rocket::{Route, State};

use crate::error::Result;
use crate::model::results::Results;
use crate::terminal::Terminal;

pub fn routes() -> Vec<Route> {
    routes![results, reset]
}

/// Ranked results over the current tallies. A lock-free snapshot: may run
/// while a session is in flight, in which case it can trail by the one vote
/// being cast.
#[get("/results")]
async fn results(terminal: &State<Terminal>) -> Result<Json<Results>> {
    Ok(Json(terminal.results().await?))
}

/// Administrative rewind between election runs: clears every has-voted flag
/// and every tally. Refused while a session is active.
#[post("/reset")]
async fn reset(terminal: &State<Terminal>) -> Result<()> {
    terminal.reset().await
}
