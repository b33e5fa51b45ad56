use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Measurement system requested from the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    /// Value of the `units` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Self::Metric => "°C",
            Self::Imperial => "°F",
        }
    }

    pub fn speed_unit(&self) -> &'static str {
        match self {
            Self::Metric => "m/s",
            Self::Imperial => "mph",
        }
    }
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown unit system: {0} (expected metric or imperial)")]
pub struct UnknownUnitSystem(pub String);

impl FromStr for UnitSystem {
    type Err = UnknownUnitSystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "metric" => Ok(Self::Metric),
            "imperial" => Ok(Self::Imperial),
            other => Err(UnknownUnitSystem(other.to_string())),
        }
    }
}

/// Current conditions for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: u8,
    pub wind_speed: f64,
    pub condition: String,
    pub icon: String,
    /// Canonical name as returned by the API
    pub city_name: String,
    /// Unit system the readings were requested in
    #[serde(default)]
    pub units: UnitSystem,
}

/// One time bucket of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// Source timestamp, `YYYY-MM-DD HH:MM:SS`
    pub timestamp_label: String,
    pub temperature: f64,
    pub condition: String,
    pub icon: String,
}

impl ForecastEntry {
    /// Short label such as `Jan 5, 09:00`; the raw label when it does not parse.
    pub fn display_time(&self) -> String {
        NaiveDateTime::parse_from_str(&self.timestamp_label, "%Y-%m-%d %H:%M:%S")
            .map(|dt| dt.format("%b %-d, %H:%M").to_string())
            .unwrap_or_else(|_| self.timestamp_label.clone())
    }
}

/// Forecast entries in the chronological order the source returned them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Forecast {
    pub entries: Vec<ForecastEntry>,
}

impl Forecast {
    pub fn new(entries: Vec<ForecastEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ForecastEntry> {
        self.entries.iter()
    }
}

/// Where a published report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    Cache,
    Network,
}

/// Snapshot and forecast from the same fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub snapshot: WeatherSnapshot,
    pub forecast: Forecast,
    pub source: ReportSource,
    /// When the data was fetched from the network
    pub fetched_at: DateTime<Utc>,
}

impl WeatherReport {
    pub fn city_name(&self) -> &str {
        &self.snapshot.city_name
    }
}
