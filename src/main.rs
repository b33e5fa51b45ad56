mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use nimbus_core::{AppError, Config, ConfigError, API_KEY_ENV};
use nimbus_weather::{
    FetchCoordinator, FetchResult, OpenWeatherClient, PreferenceStore, SqlitePreferences,
    SqliteWeatherCache, UnitSystem, WeatherCacheStore, WeatherEvent,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(name = "nimbus", version, about = "Current weather and forecast with a local cache")]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Look up a city by name
    City { name: String },
    /// Look up a latitude/longitude pair
    Coords {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },
    /// Look up the last successful city (the default)
    Last,
    /// Set the unit system used for future lookups
    Units { system: UnitSystem },
    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached cities and their age
    List,
    /// Remove every cached response
    Clear,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    nimbus_core::init()?;

    let (config, _) = Config::load_validated(cli.config.as_deref())?;

    std::fs::create_dir_all(&config.config_dir).context("Failed to create config directory")?;
    let db_path = config.database_path();
    let cache = Arc::new(SqliteWeatherCache::open(&db_path)?);
    let prefs = Arc::new(SqlitePreferences::open(&db_path)?);

    match cli.command.unwrap_or(Command::Last) {
        Command::Units { system } => {
            prefs.set_units(system)?;
            println!("Units set to {}", system);
            Ok(ExitCode::SUCCESS)
        }
        Command::Cache { action } => {
            run_cache_action(cache.as_ref(), action)?;
            Ok(ExitCode::SUCCESS)
        }
        lookup => {
            let api_key = config.weather.resolved_api_key().ok_or_else(|| {
                AppError::Config(ConfigError::MissingSetting(format!(
                    "weather.api_key (or {API_KEY_ENV})"
                )))
            })?;
            let client = OpenWeatherClient::new(
                &config.weather.api_base_url,
                &api_key,
                Duration::from_secs(config.weather.request_timeout_secs),
            )?;
            let coordinator = Arc::new(FetchCoordinator::new(Arc::new(client), cache, prefs));

            let events = coordinator.subscribe();
            let handle = match lookup {
                Command::City { name } => coordinator.request_fetch_by_city(name),
                Command::Coords { lat, lon } => coordinator.request_fetch_by_coordinates(lat, lon),
                _ => coordinator.request_last_city_or_default(),
            };

            run_lookup(events, handle).await
        }
    }
}

fn run_cache_action(cache: &dyn WeatherCacheStore, action: CacheAction) -> Result<()> {
    match action {
        CacheAction::List => {
            let now = Utc::now();
            let cities = cache.cities()?;
            if cities.is_empty() {
                println!("Cache is empty");
            }
            for city in cities {
                match cache.get(&city)?.and_then(|record| record.age(now)) {
                    Some(age) => println!("{:<24} {} min old", city, age.num_minutes()),
                    None => println!("{:<24} unknown age", city),
                }
            }
        }
        CacheAction::Clear => {
            cache.clear()?;
            println!("Cache cleared");
        }
    }
    Ok(())
}

/// Render events until the fetch reaches a terminal state.
async fn run_lookup(
    mut events: broadcast::Receiver<WeatherEvent>,
    handle: JoinHandle<FetchResult>,
) -> Result<ExitCode> {
    loop {
        match events.recv().await {
            Ok(WeatherEvent::Loading) => eprintln!("Loading..."),
            Ok(WeatherEvent::Success(report)) => {
                tracing::debug!("Backdrop: {}", render::backdrop_name(&report));
                print!("{}", render::render_report(&report, Utc::now()));
                break;
            }
            Ok(WeatherEvent::Error(kind)) => {
                tracing::debug!("Lookup ended with {:?}", kind);
                break;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} weather events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    match handle.await.context("Weather task panicked")? {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            let err: AppError = e.into();
            tracing::error!("{}", err);
            eprintln!("{}", err.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}
