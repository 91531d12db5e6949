//! Station configuration stored in the secret broker.

use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Settings for the one station this process reports on.
///
/// Read once at startup and shared read-only across requests.
#[derive(Clone, PartialEq, Eq)]
pub struct StationConfig {
    /// Provider endpoint, e.g. `https://api.weather.com/v2/pws/observations/current`
    pub api_base_url: String,
    /// Provider station id (`sid`)
    pub station_id: String,
    /// Provider unit system code, `e` for imperial
    pub units: String,
    /// Provider API key
    pub api_key: String,
    /// IANA timezone the report time is shown in
    pub timezone: String,
}

impl std::fmt::Debug for StationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationConfig")
            .field("api_base_url", &self.api_base_url)
            .field("station_id", &self.station_id)
            .field("units", &self.units)
            .field("api_key", &"[redacted]")
            .field("timezone", &self.timezone)
            .finish()
    }
}

impl StationConfig {
    /// Build from the key/value map stored at the secret path.
    ///
    /// Expects string fields `api`, `sid`, `units`, `key` and `tz`.
    pub fn from_secret(data: &Map<String, Value>) -> Result<Self> {
        let config = Self {
            api_base_url: required_field(data, "api")?,
            station_id: required_field(data, "sid")?,
            units: required_field(data, "units")?,
            api_key: required_field(data, "key")?,
            timezone: required_field(data, "tz")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Every field non-empty and the timezone known.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("api", &self.api_base_url),
            ("sid", &self.station_id),
            ("units", &self.units),
            ("key", &self.api_key),
            ("tz", &self.timezone),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("station field '{}' is empty", name)));
            }
        }
        self.tz()?;
        Ok(())
    }

    /// Parse the configured IANA timezone.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| Error::Config(format!("unknown timezone '{}'", self.timezone)))
    }
}

fn required_field(data: &Map<String, Value>, name: &str) -> Result<String> {
    match data.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(Error::Config(format!(
            "secret is missing required field '{}'",
            name
        ))),
        Some(_) => Err(Error::Config(format!("field '{}' must be a string", name))),
    }
}
