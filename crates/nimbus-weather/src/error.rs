//! Weather fetch errors.

use nimbus_core::{AppError, NetworkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherError {
    /// Transport failure or a non-2xx answer from the API.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// A remote or cached payload did not match the expected shape.
    #[error("Failed to decode weather payload: {0}")]
    Deserialization(String),
}

/// Coarse failure category published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Deserialization,
}

impl WeatherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Deserialization(_) => ErrorKind::Deserialization,
        }
    }
}

impl From<serde_json::Error> for WeatherError {
    fn from(e: serde_json::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        match e {
            WeatherError::Network(n) => AppError::Network(n),
            WeatherError::Deserialization(s) => AppError::Data(s),
        }
    }
}
