//! SQLite-backed response cache, one row per canonical city name.
//!
//! The store keeps whatever it is given: freshness is decided by the caller
//! from the stored write timestamp.

use chrono::{DateTime, Duration, Utc};
use nimbus_core::{DatabaseError, RusqliteErrorExt};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::WeatherError;
use crate::types::{Forecast, WeatherSnapshot};

/// Serialized snapshot and forecast from a single fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    city_key: String,
    snapshot_json: String,
    forecast_json: String,
    written_at_ms: i64,
}

impl CacheRecord {
    /// Serialize both payloads of one fetch, keyed by the snapshot's city name.
    pub fn from_fetch(
        snapshot: &WeatherSnapshot,
        forecast: &Forecast,
        written_at: DateTime<Utc>,
    ) -> Result<Self, WeatherError> {
        Ok(Self {
            city_key: snapshot.city_name.clone(),
            snapshot_json: serde_json::to_string(snapshot)?,
            forecast_json: serde_json::to_string(forecast)?,
            written_at_ms: written_at.timestamp_millis(),
        })
    }

    /// Rebuild a record from stored columns. Payloads are not validated here.
    pub fn from_raw(
        city_key: impl Into<String>,
        snapshot_json: impl Into<String>,
        forecast_json: impl Into<String>,
        written_at_ms: i64,
    ) -> Self {
        Self {
            city_key: city_key.into(),
            snapshot_json: snapshot_json.into(),
            forecast_json: forecast_json.into(),
            written_at_ms,
        }
    }

    pub fn city_key(&self) -> &str {
        &self.city_key
    }

    pub fn snapshot_json(&self) -> &str {
        &self.snapshot_json
    }

    pub fn forecast_json(&self) -> &str {
        &self.forecast_json
    }

    pub fn written_at_ms(&self) -> i64 {
        self.written_at_ms
    }

    pub fn written_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.written_at_ms).unwrap_or_default()
    }

    /// Time since the write. `None` when the stored timestamp is out of range.
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        now.timestamp_millis()
            .checked_sub(self.written_at_ms)
            .and_then(Duration::try_milliseconds)
    }

    /// True while `age <= ttl`. A record with an unusable timestamp is never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now).is_some_and(|age| age <= ttl)
    }

    /// Deserialize both payloads.
    pub fn decode(&self) -> Result<(WeatherSnapshot, Forecast), WeatherError> {
        let snapshot = serde_json::from_str(&self.snapshot_json)?;
        let forecast = serde_json::from_str(&self.forecast_json)?;
        Ok((snapshot, forecast))
    }
}

/// Structured cache: upsert and lookup by city key.
pub trait WeatherCacheStore: Send + Sync {
    /// Record for `city_key` (exact, case-sensitive match).
    fn get(&self, city_key: &str) -> Result<Option<CacheRecord>, DatabaseError>;

    /// Insert or fully replace the record for `record.city_key()`.
    fn put(&self, record: &CacheRecord) -> Result<(), DatabaseError>;

    /// Returns whether a record was removed.
    fn remove(&self, city_key: &str) -> Result<bool, DatabaseError>;

    /// Cached city keys, alphabetically.
    fn cities(&self) -> Result<Vec<String>, DatabaseError>;

    fn clear(&self) -> Result<(), DatabaseError>;
}

/// SQLite cache for weather responses.
pub struct SqliteWeatherCache {
    conn: Mutex<Connection>,
}

impl SqliteWeatherCache {
    /// Open (or create) the cache database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(RusqliteErrorExt::into_database_error)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(RusqliteErrorExt::into_database_error)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (for testing).
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(RusqliteErrorExt::into_database_error)?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS weather_cache (
                    city_name TEXT PRIMARY KEY,
                    weather_json TEXT NOT NULL,
                    forecast_json TEXT NOT NULL,
                    written_at INTEGER NOT NULL
                );
                "#,
            )
            .map_err(RusqliteErrorExt::into_database_error)
    }
}

impl WeatherCacheStore for SqliteWeatherCache {
    fn get(&self, city_key: &str) -> Result<Option<CacheRecord>, DatabaseError> {
        self.conn
            .lock()
            .query_row(
                "SELECT city_name, weather_json, forecast_json, written_at FROM weather_cache WHERE city_name = ?1",
                params![city_key],
                |row| {
                    Ok(CacheRecord::from_raw(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(RusqliteErrorExt::into_database_error)
    }

    fn put(&self, record: &CacheRecord) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute(
                r#"
                INSERT OR REPLACE INTO weather_cache
                (city_name, weather_json, forecast_json, written_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    record.city_key,
                    record.snapshot_json,
                    record.forecast_json,
                    record.written_at_ms,
                ],
            )
            .map_err(RusqliteErrorExt::into_database_error)?;

        tracing::debug!("Cached weather for {}", record.city_key);
        Ok(())
    }

    fn remove(&self, city_key: &str) -> Result<bool, DatabaseError> {
        let removed = self
            .conn
            .lock()
            .execute(
                "DELETE FROM weather_cache WHERE city_name = ?1",
                params![city_key],
            )
            .map_err(RusqliteErrorExt::into_database_error)?;
        Ok(removed > 0)
    }

    fn cities(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT city_name FROM weather_cache ORDER BY city_name ASC")
            .map_err(RusqliteErrorExt::into_database_error)?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(RusqliteErrorExt::into_database_error)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(RusqliteErrorExt::into_database_error)
    }

    fn clear(&self) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute_batch("DELETE FROM weather_cache;")
            .map_err(RusqliteErrorExt::into_database_error)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::{ForecastEntry, UnitSystem};

    fn snapshot(city: &str, temperature: f64) -> WeatherSnapshot {
        WeatherSnapshot {
            temperature,
            humidity: 70,
            wind_speed: 3.5,
            condition: "Clouds".to_string(),
            icon: "03d".to_string(),
            city_name: city.to_string(),
            units: UnitSystem::Metric,
        }
    }

    fn forecast() -> Forecast {
        Forecast::new(vec![ForecastEntry {
            timestamp_label: "2026-10-19 12:00:00".to_string(),
            temperature: 11.0,
            condition: "Rain".to_string(),
            icon: "10d".to_string(),
        }])
    }

    fn create_test_cache() -> SqliteWeatherCache {
        SqliteWeatherCache::in_memory().expect("Failed to create in-memory cache")
    }

    #[test]
    fn test_put_and_get_preserves_payload_bytes() {
        let cache = create_test_cache();
        let record = CacheRecord::from_raw(
            "Paris",
            r#"{"temperature": 1.50,  "odd":"spacing"}"#,
            "[ ]",
            1_700_000_000_000,
        );

        cache.put(&record).unwrap();
        let read = cache.get("Paris").unwrap().unwrap();

        assert_eq!(read, record);
        assert_eq!(read.snapshot_json(), r#"{"temperature": 1.50,  "odd":"spacing"}"#);
        assert_eq!(read.forecast_json(), "[ ]");
    }

    #[test]
    fn test_get_missing_city() {
        let cache = create_test_cache();
        assert!(cache.get("Nowhere").unwrap().is_none());
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let cache = create_test_cache();
        let record = CacheRecord::from_fetch(&snapshot("London", 9.0), &forecast(), Utc::now())
            .unwrap();
        cache.put(&record).unwrap();

        assert!(cache.get("London").unwrap().is_some());
        assert!(cache.get("london").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_existing_record() {
        let cache = create_test_cache();
        let first = CacheRecord::from_fetch(&snapshot("Oslo", 1.0), &forecast(), Utc::now())
            .unwrap();
        let second = CacheRecord::from_fetch(
            &snapshot("Oslo", 5.0),
            &Forecast::default(),
            Utc::now() + Duration::minutes(1),
        )
        .unwrap();

        cache.put(&first).unwrap();
        cache.put(&second).unwrap();

        let read = cache.get("Oslo").unwrap().unwrap();
        assert_eq!(read, second);
        let (snap, fc) = read.decode().unwrap();
        assert_eq!(snap.temperature, 5.0);
        assert!(fc.is_empty());
        assert_eq!(cache.cities().unwrap(), vec!["Oslo".to_string()]);
    }

    #[test]
    fn test_from_fetch_round_trips_through_decode() {
        let snap = snapshot("Rome", 22.0);
        let fc = forecast();
        let record = CacheRecord::from_fetch(&snap, &fc, Utc::now()).unwrap();

        assert_eq!(record.city_key(), "Rome");
        let (decoded_snap, decoded_fc) = record.decode().unwrap();
        assert_eq!(decoded_snap, snap);
        assert_eq!(decoded_fc, fc);
    }

    #[test]
    fn test_decode_corrupt_payload_fails() {
        let record = CacheRecord::from_raw("Rome", "not json", "[]", 0);
        assert!(matches!(
            record.decode(),
            Err(WeatherError::Deserialization(_))
        ));
    }

    #[test]
    fn test_freshness_boundary() {
        let now = Utc::now();
        let ttl = Duration::minutes(15);
        let at_ttl = CacheRecord::from_raw("A", "{}", "{}", (now - ttl).timestamp_millis());
        let past_ttl = CacheRecord::from_raw(
            "A",
            "{}",
            "{}",
            (now - ttl - Duration::milliseconds(1)).timestamp_millis(),
        );

        assert!(at_ttl.is_fresh(now, ttl));
        assert!(!past_ttl.is_fresh(now, ttl));
        assert_eq!(at_ttl.age(now), Some(ttl));
    }

    #[test]
    fn test_out_of_range_timestamp_has_no_age() {
        let now = Utc::now();
        let ttl = Duration::minutes(15);

        for written_at_ms in [i64::MIN, i64::MAX] {
            let record = CacheRecord::from_raw("A", "{}", "{}", written_at_ms);
            assert_eq!(record.age(now), None);
            assert!(!record.is_fresh(now, ttl));
        }
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = create_test_cache();
        for city in ["Berlin", "Athens", "Cairo"] {
            let record =
                CacheRecord::from_fetch(&snapshot(city, 10.0), &forecast(), Utc::now()).unwrap();
            cache.put(&record).unwrap();
        }

        assert_eq!(
            cache.cities().unwrap(),
            vec!["Athens".to_string(), "Berlin".to_string(), "Cairo".to_string()]
        );
        assert!(cache.remove("Berlin").unwrap());
        assert!(!cache.remove("Berlin").unwrap());

        cache.clear().unwrap();
        assert!(cache.cities().unwrap().is_empty());
    }

    #[test]
    fn test_open_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.db");
        let record =
            CacheRecord::from_fetch(&snapshot("Lima", 19.0), &forecast(), Utc::now()).unwrap();

        SqliteWeatherCache::open(&path).unwrap().put(&record).unwrap();
        let reopened = SqliteWeatherCache::open(&path).unwrap();

        assert_eq!(reopened.get("Lima").unwrap(), Some(record));
    }
}
