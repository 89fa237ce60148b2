#[macro_use]
extern crate rocket;

pub mod api;
pub mod config;
pub mod error;
pub mod hardware;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod terminal;
pub mod verifier;

use rocket::{Build, Rocket};

use config::{ConfigFairing, TerminalFairing};
use logging::LoggerFairing;

/// Assemble the terminal backend: routes plus the fairings that load config
/// and connect the ledger, matcher and ballot device.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(TerminalFairing)
        .attach(LoggerFairing)
}

/// A local client over a rocket with the given (usually stubbed) terminal,
/// skipping the fairings that would reach for real collaborators.
#[cfg(test)]
pub(crate) async fn test_client(
    terminal: terminal::Terminal,
) -> rocket::local::asynchronous::Client {
    let rocket = rocket::build().mount("/", api::routes()).manage(terminal);
    rocket::local::asynchronous::Client::tracked(rocket)
        .await
        .expect("valid test rocket")
}
