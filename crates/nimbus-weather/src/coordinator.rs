//! Cache-augmented fetch coordinator.
//!
//! A city lookup is served from the structured cache while the stored record
//! is at most [`CACHE_TTL`] old; otherwise current conditions and the forecast
//! are fetched together, persisted under the canonical city name returned by
//! the API, and the city is remembered as the last successful query.
//!
//! Every call publishes [`WeatherEvent::Loading`] followed by exactly one
//! terminal event. Fetches of the same city are not de-duplicated or
//! serialized; concurrent writers race and the last `put` wins.

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cache::{CacheRecord, WeatherCacheStore};
use crate::client::{Location, OpenWeatherClient};
use crate::error::{ErrorKind, WeatherError};
use crate::prefs::PreferenceStore;
use crate::types::{ReportSource, UnitSystem, WeatherReport};

/// Maximum age of a cached record that is still served without a network call.
pub const CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(15 * 60);

/// City looked up when no previous lookup succeeded.
pub const DEFAULT_CITY: &str = "London";

const EVENT_CAPACITY: usize = 32;

/// Tri-state status derived from [`WeatherEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Loading,
    Success,
    Error,
}

/// Notification pushed to subscribers on every state transition.
#[derive(Debug, Clone)]
pub enum WeatherEvent {
    Loading,
    Success(Arc<WeatherReport>),
    Error(ErrorKind),
}

impl WeatherEvent {
    pub fn status(&self) -> FetchStatus {
        match self {
            Self::Loading => FetchStatus::Loading,
            Self::Success(_) => FetchStatus::Success,
            Self::Error(_) => FetchStatus::Error,
        }
    }
}

pub type FetchResult = Result<Arc<WeatherReport>, WeatherError>;

pub struct FetchCoordinator {
    client: Arc<OpenWeatherClient>,
    cache: Arc<dyn WeatherCacheStore>,
    prefs: Arc<dyn PreferenceStore>,
    events: broadcast::Sender<WeatherEvent>,
    latest: RwLock<Option<Arc<WeatherReport>>>,
    ttl: Duration,
}

impl FetchCoordinator {
    pub fn new(
        client: Arc<OpenWeatherClient>,
        cache: Arc<dyn WeatherCacheStore>,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let ttl = Duration::from_std(CACHE_TTL).unwrap_or_else(|_| Duration::minutes(15));

        Self {
            client,
            cache,
            prefs,
            events,
            latest: RwLock::new(None),
            ttl,
        }
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WeatherEvent> {
        self.events.subscribe()
    }

    /// Most recent successful report, if any.
    pub fn latest(&self) -> Option<Arc<WeatherReport>> {
        self.latest.read().clone()
    }

    /// Look up a city, serving a fresh cached record when one exists.
    pub async fn fetch_by_city(&self, city_key: &str) -> FetchResult {
        self.publish(WeatherEvent::Loading);

        if let Some(report) = self.cached_report(city_key) {
            tracing::info!("Serving cached weather for {}", city_key);
            return Ok(self.succeed(report));
        }

        self.fetch_from_network(Location::City(city_key.to_string()))
            .await
    }

    /// Look up a coordinate pair. Always goes to the network.
    pub async fn fetch_by_coordinates(&self, latitude: f64, longitude: f64) -> FetchResult {
        self.publish(WeatherEvent::Loading);

        self.fetch_from_network(Location::Coordinates {
            latitude,
            longitude,
        })
        .await
    }

    /// Look up the last successful city, or [`DEFAULT_CITY`] on first run.
    pub async fn load_last_city_or_default(&self) -> FetchResult {
        let city = match self.prefs.last_city() {
            Ok(city) => city,
            Err(e) => {
                tracing::warn!("Failed to read last city: {}", e);
                None
            }
        }
        .unwrap_or_else(|| DEFAULT_CITY.to_string());

        self.fetch_by_city(&city).await
    }

    /// Run [`fetch_by_city`](Self::fetch_by_city) as a background task.
    ///
    /// The task runs to completion even if the handle is dropped.
    pub fn request_fetch_by_city(
        self: &Arc<Self>,
        city_key: impl Into<String>,
    ) -> JoinHandle<FetchResult> {
        let this = Arc::clone(self);
        let city_key = city_key.into();
        tokio::spawn(async move { this.fetch_by_city(&city_key).await })
    }

    /// Run [`fetch_by_coordinates`](Self::fetch_by_coordinates) as a background task.
    pub fn request_fetch_by_coordinates(
        self: &Arc<Self>,
        latitude: f64,
        longitude: f64,
    ) -> JoinHandle<FetchResult> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.fetch_by_coordinates(latitude, longitude).await })
    }

    /// Run [`load_last_city_or_default`](Self::load_last_city_or_default) as a background task.
    pub fn request_last_city_or_default(self: &Arc<Self>) -> JoinHandle<FetchResult> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.load_last_city_or_default().await })
    }

    /// A fresh, decodable cached report. Misses, stale rows, unreadable rows,
    /// bad timestamps and corrupt payloads all return `None`.
    fn cached_report(&self, city_key: &str) -> Option<WeatherReport> {
        let record = match self.cache.get(city_key) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!("No cached weather for {}", city_key);
                return None;
            }
            Err(e) => {
                tracing::warn!("Weather cache read failed for {}: {}", city_key, e);
                return None;
            }
        };

        let now = Utc::now();
        let Some(age) = record.age(now) else {
            tracing::warn!(
                "Discarding cached weather for {} with invalid timestamp {}",
                city_key,
                record.written_at_ms()
            );
            return None;
        };
        if !record.is_fresh(now, self.ttl) {
            tracing::debug!(
                "Cached weather for {} is stale ({}s old)",
                city_key,
                age.num_seconds()
            );
            return None;
        }

        match record.decode() {
            Ok((snapshot, forecast)) => Some(WeatherReport {
                snapshot,
                forecast,
                source: ReportSource::Cache,
                fetched_at: record.written_at(),
            }),
            Err(e) => {
                tracing::warn!("Discarding corrupt cached weather for {}: {}", city_key, e);
                None
            }
        }
    }

    async fn fetch_from_network(&self, location: Location) -> FetchResult {
        let units = self.units();

        let fetched = tokio::try_join!(
            self.client.current(&location, units),
            self.client.forecast(&location, units),
        );

        let (snapshot, forecast) = match fetched {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("Weather fetch for {} failed: {}", location, e);
                self.publish(WeatherEvent::Error(e.kind()));
                return Err(e);
            }
        };

        tracing::info!(
            "Fetched weather for {} (canonical name {})",
            location,
            snapshot.city_name
        );

        let report = WeatherReport {
            snapshot,
            forecast,
            source: ReportSource::Network,
            fetched_at: Utc::now(),
        };
        self.persist(&report);

        Ok(self.succeed(report))
    }

    /// Write the cache record and last city. Failures are logged only: the
    /// fetched data is still good.
    fn persist(&self, report: &WeatherReport) {
        match CacheRecord::from_fetch(&report.snapshot, &report.forecast, report.fetched_at) {
            Ok(record) => {
                if let Err(e) = self.cache.put(&record) {
                    tracing::warn!("Failed to cache weather for {}: {}", record.city_key(), e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize weather for caching: {}", e),
        }

        if let Err(e) = self.prefs.set_last_city(report.city_name()) {
            tracing::warn!("Failed to save last city: {}", e);
        }
    }

    fn units(&self) -> UnitSystem {
        self.prefs.units().unwrap_or_else(|e| {
            tracing::warn!("Failed to read units preference, using metric: {}", e);
            UnitSystem::default()
        })
    }

    fn succeed(&self, report: WeatherReport) -> Arc<WeatherReport> {
        let report = Arc::new(report);
        *self.latest.write() = Some(Arc::clone(&report));
        self.publish(WeatherEvent::Success(Arc::clone(&report)));
        report
    }

    fn publish(&self, event: WeatherEvent) {
        // Err only means nobody is listening.
        if self.events.send(event).is_err() {
            tracing::trace!("No weather subscribers");
        }
    }
}
