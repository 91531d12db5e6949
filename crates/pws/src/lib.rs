//! Personal weather station report service.
//!
//! At startup the service proves its Cloud Foundry instance identity to a
//! Vault-compatible secret broker, trades the proof for a client token, and
//! reads the station settings (provider endpoint, station id, units, API key,
//! timezone). Each `GET /` then fetches the station's current observation and
//! renders it with paired °F/°C values, a feels-like temperature, a compass
//! wind direction and the local observation time.

pub mod bootstrap;
pub mod broker;
pub mod config;
pub mod error;
pub mod identity;
pub mod render;
pub mod report;
pub mod server;
pub mod station;
pub mod weather;

#[cfg(test)]
mod testutil;

pub use bootstrap::{bootstrap, Credentials};
pub use broker::{AccessToken, BrokerClient};
pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use identity::{IdentityAssertion, IdentityProofSigner};
pub use render::{render, ReportFormat};
pub use report::{normalize, to_celsius, NormalizedReport};
pub use server::{create_router, run_http_server};
pub use station::StationConfig;
pub use weather::{ObservationSource, RawObservation, WeatherClient};
