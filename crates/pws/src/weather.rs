//! Weather Company PWS "observations/current" client.
//!
//! Provides the typed observation model and a client that owns its HTTP
//! transport. The report server depends on [`ObservationSource`] rather than
//! the concrete client so it can run against a stub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::station::StationConfig;

/// Deadline for one provider request, body included.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// ── Model ───────────────────────────────────────────────────────────

/// Top-level provider response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CurrentConditions {
    pub observations: Vec<RawObservation>,
}

/// One station observation as the provider sends it.
///
/// `realtimeFrequency` is deliberately not modelled; nothing reads it.
/// Idle sensors come back as `null`, which decodes to zero / empty.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    #[serde(rename = "stationID", default, deserialize_with = "nullable")]
    pub station_id: String,
    pub obs_time_utc: DateTime<Utc>,
    #[serde(default, deserialize_with = "nullable")]
    pub obs_time_local: String,
    #[serde(default, deserialize_with = "nullable")]
    pub neighborhood: String,
    #[serde(default, deserialize_with = "nullable")]
    pub software_type: String,
    #[serde(default, deserialize_with = "nullable")]
    pub country: String,
    #[serde(default, deserialize_with = "nullable")]
    pub solar_radiation: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub lon: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub epoch: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub lat: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub uv: f64,
    #[serde(rename = "winddir", default, deserialize_with = "nullable")]
    pub wind_dir: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub humidity: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub qc_status: i32,
    pub imperial: Imperial,
}

/// Imperial unit block (`units=e`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Imperial {
    #[serde(default, deserialize_with = "nullable")]
    pub temp: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub heat_index: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub dewpt: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub wind_chill: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub wind_speed: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub wind_gust: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub pressure: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub precip_rate: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub precip_total: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub elev: i32,
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode a provider body and take its first observation.
pub fn decode_current(body: &str) -> Result<RawObservation> {
    let conditions: CurrentConditions =
        serde_json::from_str(body).map_err(|e| Error::Decode(e.to_string()))?;
    conditions
        .observations
        .into_iter()
        .next()
        .ok_or(Error::EmptyObservation)
}

// ── Source abstraction ──────────────────────────────────────────────

/// Anything that can produce the latest observation for a station.
pub trait ObservationSource: Send + Sync + 'static {
    fn fetch_current(
        &self,
        config: &StationConfig,
    ) -> impl Future<Output = Result<RawObservation>> + Send;
}

// ── Client ──────────────────────────────────────────────────────────

/// Provider client with its own connection pool and fixed deadline.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
}

impl WeatherClient {
    /// Client with the standard [`FETCH_TIMEOUT`].
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build weather HTTP client: {}", e)))?;
        Ok(Self::with_client(http))
    }

    /// Client over a caller-built transport.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else {
        // Strip the URL: it carries the API key as a query parameter.
        Error::Network(err.without_url().to_string())
    }
}

impl ObservationSource for WeatherClient {
    async fn fetch_current(&self, config: &StationConfig) -> Result<RawObservation> {
        log::debug!("Fetching current conditions for {}", config.station_id);

        let response = self
            .http
            .get(&config.api_base_url)
            .query(&[
                ("stationId", config.station_id.as_str()),
                ("format", "json"),
                ("units", config.units.as_str()),
                ("apiKey", config.api_key.as_str()),
            ])
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        // The provider answers 204 when the station has not reported recently.
        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(Error::EmptyObservation);
        }
        if !status.is_success() {
            return Err(Error::Network(format!(
                "weather provider returned status {}",
                status.as_u16()
            )));
        }

        let body = response.text().await.map_err(transport_error)?;
        decode_current(&body)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
