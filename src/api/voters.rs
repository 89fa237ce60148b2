use data_encoding::BASE64;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Serialize;

use crate::error::Result;
use crate::model::voter::{VoterId, VoterSummary};
use crate::terminal::Terminal;

pub fn routes() -> Vec<Route> {
    routes![list, detail]
}

/// The voter roll for the operator's list, with optional name search.
#[get("/voters?<search>")]
async fn list(terminal: &State<Terminal>, search: Option<&str>) -> Result<Json<Vec<VoterSummary>>> {
    Ok(Json(terminal.voters(search).await?))
}

/// One voter with their reference photo, for the GUI's photo panel.
#[derive(Debug, Serialize)]
struct VoterDetail {
    id: VoterId,
    name: String,
    has_voted: bool,
    /// Base64-encoded registration image.
    reference_sample: String,
}

#[get("/voters/<id>")]
async fn detail(terminal: &State<Terminal>, id: VoterId) -> Result<Json<VoterDetail>> {
    let voter = terminal.voter(id).await?;
    Ok(Json(VoterDetail {
        id: voter.id,
        name: voter.name,
        has_voted: voter.has_voted,
        reference_sample: BASE64.encode(&voter.reference_sample.bytes),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rocket::http::Status;
    use rocket::local::asynchronous::Client;
    use rocket::serde::json::Value;

    use crate::hardware::scripted::ScriptedInput;
    use crate::ledger::memory::MemoryLedger;
    use crate::ledger::VoteLedger;
    use crate::terminal::{Terminal, Tuning};
    use crate::verifier::stub::{Script, StubVerifier};

    async fn client(ledger: &Arc<MemoryLedger>) -> Client {
        let shared: Arc<dyn VoteLedger> = ledger.clone();
        let terminal = Terminal::new(
            shared,
            Arc::new(StubVerifier(Script::Match(0.9))),
            Box::new(ScriptedInput::silent()),
            Tuning {
                match_threshold: 0.6,
                input_timeout: Duration::from_millis(100),
                poll_interval: Duration::from_millis(5),
            },
        );
        crate::test_client(terminal).await
    }

    #[rocket::async_test]
    async fn roll_lists_all_voters_without_photos() {
        let ledger = Arc::new(MemoryLedger::seeded());
        let client = client(&ledger).await;

        let response = client.get("/voters").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[0].get("reference_sample").is_none());
    }

    #[rocket::async_test]
    async fn search_filters_by_name() {
        let ledger = Arc::new(MemoryLedger::seeded());
        let client = client(&ledger).await;

        let response = client.get("/voters?search=bob").dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Bob");
        assert_eq!(rows[0]["has_voted"], true);
    }

    #[rocket::async_test]
    async fn detail_includes_the_reference_photo() {
        let ledger = Arc::new(MemoryLedger::seeded());
        let client = client(&ledger).await;

        let response = client.get("/voters/1").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["name"], "Alice");
        assert!(!body["reference_sample"].as_str().unwrap().is_empty());

        let response = client.get("/voters/404").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }
}
