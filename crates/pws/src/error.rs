//! Error types for the weather report service.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while bootstrapping credentials or serving a report.
///
/// `Config`, `Io` and `Auth` come out of the startup sequence and are fatal.
/// The rest are per-request and surface as HTTP 5xx responses.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration, secrets, or key material
    #[error("Config error: {0}")]
    Config(String),

    /// Certificate or key file could not be read
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Secret broker rejected or failed the login exchange
    #[error("Auth error: {0}")]
    Auth(String),

    /// Transport failure or unexpected HTTP status from the provider
    #[error("Network error: {0}")]
    Network(String),

    /// Provider did not answer within the client deadline
    #[error("Timed out waiting for weather provider")]
    Timeout,

    /// Provider body was not the expected JSON shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Provider answered with an empty `observations` array
    #[error("Weather provider returned no observations")]
    EmptyObservation,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error belongs to the startup phase (never served).
    pub fn is_startup(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Io { .. } | Error::Auth(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}
