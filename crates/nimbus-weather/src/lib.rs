//! Weather lookup for Nimbus
//!
//! Fetches current conditions and a forecast from an OpenWeatherMap-compatible
//! API, caches the last response per city in SQLite and publishes state
//! transitions to subscribers.

pub mod cache;
pub mod client;
pub mod coordinator;
pub mod display;
pub mod error;
pub mod prefs;
pub mod types;

pub use cache::{CacheRecord, SqliteWeatherCache, WeatherCacheStore};
pub use client::{Location, OpenWeatherClient};
pub use coordinator::{
    FetchCoordinator, FetchResult, FetchStatus, WeatherEvent, CACHE_TTL, DEFAULT_CITY,
};
pub use display::{Backdrop, WeatherIcon};
pub use error::{ErrorKind, WeatherError};
pub use prefs::{PreferenceStore, SqlitePreferences};
pub use types::*;
