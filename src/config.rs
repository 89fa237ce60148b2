use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use mongodb::Client as MongoClient;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Build, Rocket};
use serde::Deserialize;

use crate::hardware::SerialInput;
use crate::ledger::db::MongoLedger;
use crate::terminal::{Terminal, Tuning};
use crate::verifier::HttpVerifier;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // identity verification
    verifier_url: String,
    verifier_timeout: u32,
    match_threshold: f64,
    // ballot device
    serial_port: String,
    baud_rate: u32,
    input_timeout: u32,
    poll_interval_ms: u64,
}

impl Config {
    /// Endpoint of the external face-match service.
    pub fn verifier_url(&self) -> &str {
        &self.verifier_url
    }

    /// Upper bound on one verification call, in seconds.
    pub fn verifier_timeout(&self) -> Duration {
        Duration::from_secs(self.verifier_timeout.into())
    }

    /// Serial device path of the ballot input hardware.
    pub fn serial_port(&self) -> &str {
        &self.serial_port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Session timing and matching knobs, bundled for the controller.
    pub fn tuning(&self) -> Tuning {
        Tuning {
            match_threshold: self.match_threshold,
            input_timeout: Duration::from_secs(self.input_timeout.into()),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        Ok(rocket.manage(config))
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// Name of the database holding the voter roll and tallies.
const DATABASE: &str = "evm";

/// A fairing that connects every external collaborator — ledger, matcher,
/// ballot device — and places the assembled [`Terminal`] into managed state.
/// Must be attached after [`ConfigFairing`].
pub struct TerminalFairing;

#[rocket::async_trait]
impl Fairing for TerminalFairing {
    fn info(&self) -> Info {
        Info {
            name: "Terminal",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = rocket.state::<Config>() else {
            error!("TerminalFairing requires ConfigFairing");
            return Err(rocket);
        };

        let db_config = match rocket.figment().extract::<DbConfig>() {
            Ok(db_config) => db_config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(&db_config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let ledger = MongoLedger::new(client.clone(), &client.database(DATABASE));
        info!("...database connection online!");

        let verifier = match HttpVerifier::new(
            config.verifier_url().to_string(),
            config.verifier_timeout(),
        ) {
            Ok(verifier) => verifier,
            Err(e) => {
                error!("Failed to set up identity verifier: {e}");
                return Err(rocket);
            }
        };

        let hardware = match SerialInput::open(config.serial_port(), config.baud_rate()) {
            Ok(hardware) => hardware,
            Err(e) => {
                error!("Failed to open ballot device: {e}");
                return Err(rocket);
            }
        };

        let terminal = Terminal::new(
            Arc::new(ledger),
            Arc::new(verifier),
            Box::new(hardware),
            config.tuning(),
        );
        Ok(rocket.manage(terminal))
    }
}
