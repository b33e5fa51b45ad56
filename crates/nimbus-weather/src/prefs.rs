//! Small durable settings: last successful city and unit system.

use nimbus_core::{DatabaseError, RusqliteErrorExt};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::types::UnitSystem;

const KEY_LAST_CITY: &str = "last_city";
const KEY_UNITS: &str = "units";

/// Last-write-wins key/value settings.
pub trait PreferenceStore: Send + Sync {
    fn last_city(&self) -> Result<Option<String>, DatabaseError>;

    fn set_last_city(&self, city: &str) -> Result<(), DatabaseError>;

    /// Stored unit system; `Metric` when unset or unrecognised.
    fn units(&self) -> Result<UnitSystem, DatabaseError>;

    fn set_units(&self, units: UnitSystem) -> Result<(), DatabaseError>;
}

pub struct SqlitePreferences {
    conn: Mutex<Connection>,
}

impl SqlitePreferences {
    /// Open (or create) the preferences table in the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(RusqliteErrorExt::into_database_error)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(RusqliteErrorExt::into_database_error)?;
        let prefs = Self {
            conn: Mutex::new(conn),
        };
        prefs.init_schema()?;
        Ok(prefs)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(RusqliteErrorExt::into_database_error)?;
        let prefs = Self {
            conn: Mutex::new(conn),
        };
        prefs.init_schema()?;
        Ok(prefs)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS preferences (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                "#,
            )
            .map_err(RusqliteErrorExt::into_database_error)
    }

    fn get_value(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        self.conn
            .lock()
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(RusqliteErrorExt::into_database_error)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(RusqliteErrorExt::into_database_error)?;
        Ok(())
    }
}

impl PreferenceStore for SqlitePreferences {
    fn last_city(&self) -> Result<Option<String>, DatabaseError> {
        self.get_value(KEY_LAST_CITY)
    }

    fn set_last_city(&self, city: &str) -> Result<(), DatabaseError> {
        self.set_value(KEY_LAST_CITY, city)
    }

    fn units(&self) -> Result<UnitSystem, DatabaseError> {
        let Some(raw) = self.get_value(KEY_UNITS)? else {
            return Ok(UnitSystem::default());
        };

        Ok(raw.parse().unwrap_or_else(|e| {
            tracing::warn!("Ignoring stored units preference: {}", e);
            UnitSystem::default()
        }))
    }

    fn set_units(&self, units: UnitSystem) -> Result<(), DatabaseError> {
        self.set_value(KEY_UNITS, units.as_str())
    }
}
