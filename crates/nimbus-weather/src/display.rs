//! Presentation mapping for OpenWeatherMap icon codes.
//! See: https://openweathermap.org/weather-conditions#Icon-list

use serde::{Deserialize, Serialize};

/// Illustration shown next to a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherIcon {
    #[default]
    Sun,
    Moon,
    SunCloud,
    MoonCloud,
    Cloud,
    Rain,
    Storm,
    Snow,
    Mist,
}

impl WeatherIcon {
    /// Map an API icon code (`01d`, `10n`, ...) to an illustration.
    pub fn from_code(code: &str) -> Self {
        match code {
            "01d" => Self::Sun,
            "01n" => Self::Moon,
            "02d" => Self::SunCloud,
            "02n" => Self::MoonCloud,
            "03d" | "03n" | "04d" | "04n" => Self::Cloud,
            "09d" | "09n" | "10d" | "10n" => Self::Rain,
            "11d" | "11n" => Self::Storm,
            "13d" | "13n" => Self::Snow,
            "50d" | "50n" => Self::Mist,
            _ => Self::Sun, // Unknown codes default to sun
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sun => "sun",
            Self::Moon => "moon",
            Self::SunCloud => "sun_cloud",
            Self::MoonCloud => "moon_cloud",
            Self::Cloud => "cloud",
            Self::Rain => "rain",
            Self::Storm => "storm",
            Self::Snow => "snow",
            Self::Mist => "mist",
        }
    }

    /// Single-glyph rendering for terminals
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Sun => "☀",
            Self::Moon => "☾",
            Self::SunCloud => "⛅",
            Self::MoonCloud => "☁",
            Self::Cloud => "☁",
            Self::Rain => "☂",
            Self::Storm => "⚡",
            Self::Snow => "❄",
            Self::Mist => "≋",
        }
    }
}

/// Screen background chosen from the current conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backdrop {
    #[default]
    Default,
    Sunny,
    Cloudy,
    Night,
}

impl Backdrop {
    pub fn from_code(code: &str) -> Self {
        match code {
            "01d" | "02d" => Self::Sunny,
            "01n" | "02n" => Self::Night,
            "03d" | "04d" | "09d" | "10d" | "11d" | "13d" | "50d" => Self::Cloudy,
            "03n" | "04n" | "09n" | "10n" | "11n" | "13n" | "50n" => Self::Night,
            _ => Self::Default,
        }
    }
}
