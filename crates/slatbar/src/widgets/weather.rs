//! Timed-poll weather widget.
//!
//! Resolves a location once at startup - from configuration, or via a
//! GeoIP lookup when none is configured - then polls the weather
//! service at the configured cadence. A cycle that fails is logged and
//! skipped; the cadence never changes. Missing location with a failed
//! lookup is the one fatal case: this widget stops, the rest of the
//! bar is unaffected.

use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::{error, warn};

use slatbar_core::{Snapshot, WidgetEntry, WidgetKind};

use crate::delivery::DeliverySender;
use crate::errors::WidgetError;
use crate::http::HttpFetch;
use crate::worker::{ShutdownToken, run_polling};

/// GeoIP endpoint used when no location is configured.
const GEOIP_URI: &str = "https://freegeoip.app/json/";

/// Weather query endpoint.
const WEATHER_URI: &str = "https://query.yahooapis.com/v1/public/yql";

/// Weather widget configuration.
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    /// Location query, e.g. "Amsterdam". Empty means GeoIP lookup.
    pub location: String,
    /// Temperature unit tag passed through to the surface.
    pub unit: String,
    /// Poll cadence in seconds.
    pub refresh_interval: u64,
}

impl WeatherConfig {
    pub fn from_entry(entry: &WidgetEntry) -> Self {
        entry.warn_unknown_options(&["location", "unit", "refresh_interval"]);
        Self {
            location: entry.option_str("location", ""),
            unit: entry.option_str("unit", "c"),
            refresh_interval: entry.refresh_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Location {
    city: String,
    country_code: String,
}

/// Current conditions as reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Weather {
    code: i64,
    temp: i64,
}

fn geoip_location(http: &dyn HttpFetch) -> Result<Location, WidgetError> {
    let raw = http.get(GEOIP_URI)?;
    let data: Value = serde_json::from_str(&raw)
        .map_err(|e| WidgetError::Parse(format!("GeoIP response: {e}")))?;

    let city = data
        .get("city")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WidgetError::Parse("GeoIP city is not a string".into()))?;
    let country_code = data
        .get("country_code")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WidgetError::Parse("GeoIP country code is not a string".into()))?;

    Ok(Location {
        city: city.to_string(),
        country_code: country_code.to_string(),
    })
}

/// Location from config, else GeoIP. No location and a failed lookup
/// leaves this widget with nothing to ever query, so that case is a
/// configuration error.
fn resolve_location(config: &WeatherConfig, http: &dyn HttpFetch) -> Result<Location, WidgetError> {
    if !config.location.is_empty() {
        return Ok(Location {
            city: config.location.clone(),
            country_code: String::new(),
        });
    }

    geoip_location(http).map_err(|err| {
        WidgetError::Configuration(format!(
            "no location configured and GeoIP lookup failed ({err}); set one in the config"
        ))
    })
}

fn weather_query_url(location: &Location) -> Result<String, WidgetError> {
    let query = format!(
        "select item.condition.code, item.condition.temp from weather.forecast \
         where u = 'c' and woeid in (select woeid from geo.places where text = '{} {}' limit 1) limit 1;",
        location.city, location.country_code
    );
    let url = reqwest::Url::parse_with_params(WEATHER_URI, &[("q", query.as_str()), ("format", "json")])
        .map_err(|e| WidgetError::Parse(format!("weather query url: {e}")))?;
    Ok(url.into())
}

/// Parse the service response.
///
/// The condition object is required; `code` and `temp` arrive as
/// strings holding integers. A non-integer value there is logged and
/// left at zero rather than failing the cycle.
fn parse_weather(raw: &str) -> Result<Weather, WidgetError> {
    let data: Value = serde_json::from_str(raw)
        .map_err(|e| WidgetError::Parse(format!("weather response: {e}")))?;

    let condition = data
        .pointer("/query/results/channel/item/condition")
        .filter(|v| v.is_object())
        .ok_or_else(|| WidgetError::Parse("invalid weather data object received".into()))?;

    let code = condition.get("code").and_then(|v| v.as_str());
    let temp = condition.get("temp").and_then(|v| v.as_str());
    let (Some(code), Some(temp)) = (code, temp) else {
        return Err(WidgetError::Parse(
            "weather code or temp missing from query result".into(),
        ));
    };

    let mut weather = Weather::default();
    match code.parse() {
        Ok(v) => weather.code = v,
        Err(_) => warn!("received weather code is not an integer"),
    }
    match temp.parse() {
        Ok(v) => weather.temp = v,
        Err(_) => warn!("received temperature is not an integer"),
    }

    Ok(weather)
}

fn build_snapshot(weather: Weather, unit: &str) -> Snapshot {
    let mut data = Map::new();
    data.insert("code".into(), json!(weather.code));
    data.insert("temp".into(), json!(weather.temp));
    data.insert("unit".into(), json!(unit));
    Snapshot::new(WidgetKind::Weather, data)
}

/// Run the weather poll loop until shutdown.
pub fn run(
    config: WeatherConfig,
    http: Box<dyn HttpFetch>,
    sender: DeliverySender,
    shutdown: ShutdownToken,
) {
    let location = match resolve_location(&config, http.as_ref()) {
        Ok(location) => location,
        Err(err) => {
            error!("weather: {}, stopping this widget", err);
            return;
        }
    };

    let interval = Duration::from_secs(config.refresh_interval);
    run_polling("weather", interval, &shutdown, || {
        let url = weather_query_url(&location)?;
        let weather = parse_weather(&http.get(&url)?)?;
        let wire = build_snapshot(weather, &config.unit).encode()?;
        sender.send(WidgetKind::Weather, wire)?;
        Ok(())
    });
}
