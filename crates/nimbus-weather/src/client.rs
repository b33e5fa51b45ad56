//! OpenWeatherMap API client.
//!
//! Four read operations: current conditions and the 5-day/3-hour forecast,
//! each by city name or by coordinate pair. No retries, no rate limiting.

use std::time::Duration;

use nimbus_core::{NetworkError, ReqwestErrorExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::instrument;

use crate::error::WeatherError;
use crate::types::{Forecast, ForecastEntry, UnitSystem, WeatherSnapshot};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
const CURRENT_PATH: &str = "data/2.5/weather";
const FORECAST_PATH: &str = "data/2.5/forecast";
const USER_AGENT: &str = concat!("nimbus/", env!("CARGO_PKG_VERSION"));

/// What to look up.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    City(String),
    Coordinates { latitude: f64, longitude: f64 },
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::City(name) => f.write_str(name),
            Location::Coordinates {
                latitude,
                longitude,
            } => write!(f, "{:.4}, {:.4}", latitude, longitude),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiCurrentResponse {
    name: String,
    main: ApiMain,
    wind: ApiWind,
    #[serde(default)]
    weather: Vec<ApiCondition>,
}

#[derive(Debug, Deserialize)]
struct ApiMain {
    temp: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct ApiWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    main: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct ApiForecastResponse {
    list: Vec<ApiForecastItem>,
}

#[derive(Debug, Deserialize)]
struct ApiForecastItem {
    dt_txt: String,
    main: ApiForecastMain,
    #[serde(default)]
    weather: Vec<ApiCondition>,
}

#[derive(Debug, Deserialize)]
struct ApiForecastMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// Label and icon of the first reported condition.
fn primary_condition(conditions: Vec<ApiCondition>) -> (String, String) {
    conditions
        .into_iter()
        .next()
        .map(|c| (c.main, c.icon))
        .unwrap_or_else(|| ("Unknown".to_string(), String::new()))
}

impl From<ApiCurrentResponse> for WeatherSnapshot {
    fn from(resp: ApiCurrentResponse) -> Self {
        let (condition, icon) = primary_condition(resp.weather);
        Self {
            temperature: resp.main.temp,
            humidity: resp.main.humidity,
            wind_speed: resp.wind.speed,
            condition,
            icon,
            city_name: resp.name,
            units: UnitSystem::default(),
        }
    }
}

impl From<ApiForecastResponse> for Forecast {
    fn from(resp: ApiForecastResponse) -> Self {
        let entries = resp
            .list
            .into_iter()
            .map(|item| {
                let (condition, icon) = primary_condition(item.weather);
                ForecastEntry {
                    timestamp_label: item.dt_txt,
                    temperature: item.main.temp,
                    condition,
                    icon,
                }
            })
            .collect();
        Forecast::new(entries)
    }
}

/// HTTP client for an OpenWeatherMap-compatible endpoint.
///
/// Construct one per process and share it behind `Arc`.
#[derive(Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenWeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ReqwestErrorExt::into_network_error)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current conditions for a city name.
    #[instrument(skip(self), level = "debug")]
    pub async fn current_by_city(
        &self,
        city: &str,
        units: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError> {
        self.current(&Location::City(city.to_string()), units).await
    }

    /// Forecast for a city name.
    #[instrument(skip(self), level = "debug")]
    pub async fn forecast_by_city(
        &self,
        city: &str,
        units: UnitSystem,
    ) -> Result<Forecast, WeatherError> {
        self.forecast(&Location::City(city.to_string()), units).await
    }

    /// Current conditions for a coordinate pair.
    #[instrument(skip(self), level = "debug")]
    pub async fn current_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        units: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError> {
        self.current(
            &Location::Coordinates {
                latitude,
                longitude,
            },
            units,
        )
        .await
    }

    /// Forecast for a coordinate pair.
    #[instrument(skip(self), level = "debug")]
    pub async fn forecast_by_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        units: UnitSystem,
    ) -> Result<Forecast, WeatherError> {
        self.forecast(
            &Location::Coordinates {
                latitude,
                longitude,
            },
            units,
        )
        .await
    }

    pub async fn current(
        &self,
        location: &Location,
        units: UnitSystem,
    ) -> Result<WeatherSnapshot, WeatherError> {
        let resp: ApiCurrentResponse = self.get(CURRENT_PATH, location, units).await?;
        Ok(WeatherSnapshot {
            units,
            ..WeatherSnapshot::from(resp)
        })
    }

    pub async fn forecast(
        &self,
        location: &Location,
        units: UnitSystem,
    ) -> Result<Forecast, WeatherError> {
        let resp: ApiForecastResponse = self.get(FORECAST_PATH, location, units).await?;
        Ok(resp.into())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        location: &Location,
        units: UnitSystem,
    ) -> Result<T, WeatherError> {
        let url = format!("{}/{}", self.base_url, path);

        let mut params: Vec<(&str, String)> = match location {
            Location::City(name) => vec![("q", name.clone())],
            Location::Coordinates {
                latitude,
                longitude,
            } => vec![("lat", latitude.to_string()), ("lon", longitude.to_string())],
        };
        params.push(("units", units.as_str().to_string()));
        params.push(("appid", self.api_key.clone()));

        tracing::debug!("GET {} for {} ({})", path, location, units);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, WeatherError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(WeatherError::from);
        }

        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);

        Err(WeatherError::Network(NetworkError::ServerError {
            status: status.as_u16(),
            message,
        }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenWeatherClient {
        OpenWeatherClient::new(&server.uri(), "test-key", Duration::from_secs(5)).unwrap()
    }

    fn current_body() -> serde_json::Value {
        serde_json::json!({
            "name": "Paris",
            "main": { "temp": 18.4, "humidity": 62, "pressure": 1012 },
            "wind": { "speed": 4.1, "deg": 200 },
            "weather": [
                { "id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d" },
                { "id": 500, "main": "Rain", "description": "light rain", "icon": "10d" }
            ]
        })
    }

    #[tokio::test]
    async fn test_current_by_city_sends_query_and_maps_fields() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "paris"))
            .and(query_param("units", "imperial"))
            .and(query_param("appid", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client(&server)
            .current_by_city("paris", UnitSystem::Imperial)
            .await
            .unwrap();

        assert_eq!(snapshot.city_name, "Paris");
        assert_eq!(snapshot.temperature, 18.4);
        assert_eq!(snapshot.humidity, 62);
        assert_eq!(snapshot.wind_speed, 4.1);
        assert_eq!(snapshot.condition, "Clouds");
        assert_eq!(snapshot.icon, "04d");
        assert_eq!(snapshot.units, UnitSystem::Imperial);
    }

    #[tokio::test]
    async fn test_forecast_by_coordinates_keeps_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .and(query_param("lat", "51.5"))
            .and(query_param("lon", "-0.12"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cod": "200",
                "list": [
                    { "dt_txt": "2026-10-19 12:00:00", "main": { "temp": 14.0 },
                      "weather": [{ "main": "Clear", "icon": "01d" }] },
                    { "dt_txt": "2026-10-19 15:00:00", "main": { "temp": 15.5 },
                      "weather": [{ "main": "Rain", "icon": "10d" }] },
                    { "dt_txt": "2026-10-19 18:00:00", "main": { "temp": 12.0 },
                      "weather": [] }
                ]
            })))
            .mount(&server)
            .await;

        let forecast = client(&server)
            .forecast_by_coordinates(51.5, -0.12, UnitSystem::Metric)
            .await
            .unwrap();

        assert_eq!(forecast.len(), 3);
        assert_eq!(forecast.entries[0].timestamp_label, "2026-10-19 12:00:00");
        assert_eq!(forecast.entries[1].condition, "Rain");
        assert_eq!(forecast.entries[2].condition, "Unknown");
        assert_eq!(forecast.entries[2].icon, "");
    }

    #[tokio::test]
    async fn test_non_success_status_is_network_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "cod": "404",
                "message": "city not found"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .current_by_city("Atlantis", UnitSystem::Metric)
            .await
            .unwrap_err();

        match err {
            WeatherError::Network(NetworkError::ServerError { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "city not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_deserialization_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"name\": 42}"))
            .mount(&server)
            .await;

        let err = client(&server)
            .current_by_city("Paris", UnitSystem::Metric)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client =
            OpenWeatherClient::new("http://127.0.0.1:9", "test-key", Duration::from_secs(2))
                .unwrap();

        let err = client
            .current_by_city("Paris", UnitSystem::Metric)
            .await
            .unwrap_err();

        assert!(matches!(err, WeatherError::Network(_)));
        assert!(!err.to_string().contains("test-key"));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client =
            OpenWeatherClient::new("https://example.test/", "secret", Duration::from_secs(1))
                .unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret"));
        assert_eq!(client.base_url(), "https://example.test");
    }
}
