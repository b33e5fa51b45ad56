//! Plain-text rendering of weather reports.

use chrono::{DateTime, Utc};
use nimbus_weather::{Backdrop, ReportSource, WeatherIcon, WeatherReport};

/// Multi-line summary: header, current conditions, then one line per forecast entry.
///
/// Units follow the snapshot, so a cached report keeps the labels it was fetched with.
pub fn render_report(report: &WeatherReport, now: DateTime<Utc>) -> String {
    let snapshot = &report.snapshot;
    let units = snapshot.units;
    let icon = WeatherIcon::from_code(&snapshot.icon);
    let mut out = String::new();

    let origin = match report.source {
        ReportSource::Network => "live".to_string(),
        ReportSource::Cache => format!(
            "cached, {} min old",
            (now - report.fetched_at).num_minutes().max(0)
        ),
    };
    out.push_str(&format!(
        "{}  {} {}  ({})\n",
        snapshot.city_name,
        icon.glyph(),
        snapshot.condition,
        origin
    ));
    out.push_str(&format!(
        "  {:.0}{}   humidity {}%   wind {:.0} {}\n",
        snapshot.temperature,
        units.temperature_symbol(),
        snapshot.humidity,
        snapshot.wind_speed,
        units.speed_unit()
    ));

    if !report.forecast.is_empty() {
        out.push_str("Forecast\n");
        for entry in report.forecast.iter() {
            out.push_str(&format!(
                "  {:<14} {} {:>4.0}{}  {}\n",
                entry.display_time(),
                WeatherIcon::from_code(&entry.icon).glyph(),
                entry.temperature,
                units.temperature_symbol(),
                entry.condition
            ));
        }
    }

    out
}

/// Short name of the background a graphical front end would pick.
pub fn backdrop_name(report: &WeatherReport) -> &'static str {
    match Backdrop::from_code(&report.snapshot.icon) {
        Backdrop::Sunny => "sunny",
        Backdrop::Cloudy => "cloudy",
        Backdrop::Night => "night",
        Backdrop::Default => "default",
    }
}
