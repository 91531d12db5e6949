//! Observation normalization.
//!
//! Turns a [`RawObservation`] into the fields a person reads: paired
//! Fahrenheit/Celsius values, the feels-like temperature that applies at the
//! current temperature, a compass label for the wind bearing, and the
//! observation time on the station's local clock.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::Result;
use crate::station::StationConfig;
use crate::weather::{Imperial, RawObservation};

/// Above this (strictly), feels-like is the heat index; at or below, wind chill.
pub const HEAT_INDEX_THRESHOLD_F: i32 = 70;

/// Layout of the localized observation time.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Sixteen points, with north repeated at the end for bearings of 352..=359.
pub const COMPASS_POINTS: [&str; 17] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW", "N",
];

/// Width of one compass bucket in whole degrees.
const COMPASS_BUCKET_DEGREES: i32 = 22;

// ── Conversions ─────────────────────────────────────────────────────

/// Fahrenheit to Celsius, truncating toward zero.
///
/// `to_celsius(71) == 21`, `to_celsius(-4) == -20`. The truncation shows in
/// the rendered report, so do not switch this to rounding.
pub fn to_celsius(fahrenheit: i32) -> i32 {
    // i64 so extreme inputs cannot overflow the multiplication.
    (((fahrenheit as i64 - 32) * 5) / 9) as i32
}

/// Compass label for a bearing in degrees.
pub fn compass_point(degrees: i32) -> &'static str {
    let index = degrees.rem_euclid(360) / COMPASS_BUCKET_DEGREES;
    COMPASS_POINTS[index as usize]
}

/// Render `time` on the wall clock of `tz`.
pub fn localize(time: DateTime<Utc>, tz: Tz) -> String {
    time.with_timezone(&tz).format(TIME_FORMAT).to_string()
}

// ── Report model ────────────────────────────────────────────────────

/// A temperature in both scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Temperature {
    pub fahrenheit: i32,
    pub celsius: i32,
}

impl Temperature {
    pub fn from_fahrenheit(fahrenheit: i32) -> Self {
        Self {
            fahrenheit,
            celsius: to_celsius(fahrenheit),
        }
    }
}

/// Which provider reading the feels-like value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeelsLikeSource {
    HeatIndex,
    WindChill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeelsLike {
    pub source: FeelsLikeSource,
    pub temperature: Temperature,
}

/// Pick heat index or wind chill based on the air temperature.
pub fn feels_like(imperial: &Imperial) -> FeelsLike {
    if imperial.temp > HEAT_INDEX_THRESHOLD_F {
        FeelsLike {
            source: FeelsLikeSource::HeatIndex,
            temperature: Temperature::from_fahrenheit(imperial.heat_index),
        }
    } else {
        FeelsLike {
            source: FeelsLikeSource::WindChill,
            temperature: Temperature::from_fahrenheit(imperial.wind_chill),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wind {
    pub compass: &'static str,
    pub degrees: i32,
    pub speed_mph: i32,
    pub gust_mph: i32,
}

/// Current conditions ready to render. Built per request, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedReport {
    pub station_id: String,
    pub neighborhood: String,
    /// Observation time on the station's clock, `HH:MM:SS`
    pub observed_at: String,
    pub temperature: Temperature,
    pub feels_like: FeelsLike,
    pub dew_point: Temperature,
    /// Relative humidity, percent
    pub humidity: i32,
    pub wind: Wind,
    pub pressure_inhg: f64,
    pub precip_rate_in: f64,
    pub precip_total_in: f64,
    pub uv: f64,
    pub solar_radiation: f64,
    pub elevation_ft: i32,
}

/// Derive the report for one observation.
///
/// Fails only when the configured timezone is not a known IANA zone.
pub fn normalize(obs: &RawObservation, config: &StationConfig) -> Result<NormalizedReport> {
    let tz = config.tz()?;
    let imperial = &obs.imperial;

    Ok(NormalizedReport {
        station_id: obs.station_id.clone(),
        neighborhood: obs.neighborhood.clone(),
        observed_at: localize(obs.obs_time_utc, tz),
        temperature: Temperature::from_fahrenheit(imperial.temp),
        feels_like: feels_like(imperial),
        dew_point: Temperature::from_fahrenheit(imperial.dewpt),
        humidity: obs.humidity,
        wind: Wind {
            compass: compass_point(obs.wind_dir),
            degrees: obs.wind_dir,
            speed_mph: imperial.wind_speed,
            gust_mph: imperial.wind_gust,
        },
        pressure_inhg: imperial.pressure,
        precip_rate_in: imperial.precip_rate,
        precip_total_in: imperial.precip_total,
        uv: obs.uv,
        solar_radiation: obs.solar_radiation,
        elevation_ft: imperial.elev,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
