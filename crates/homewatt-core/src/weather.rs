//! Daily weather context and city geocoding from Open-Meteo
//!
//! Only used to fill the optional temperature feature and to place a home
//! given by city name. Callers treat any failure as "no weather" and keep
//! going.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{HomeProfile, Location};

/// Public Open-Meteo endpoint
pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com";

/// Public Open-Meteo geocoding endpoint
pub const OPEN_METEO_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com";

const WEATHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Weather summary for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
    pub date: NaiveDate,
    pub temp_high: f64,
    pub temp_low: f64,
    pub condition: String,
}

impl DailyWeather {
    pub fn avg_temp_c(&self) -> f64 {
        (self.temp_high + self.temp_low) / 2.0
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: DailySeries,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    time: Vec<NaiveDate>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    weathercode: Vec<Option<u32>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeocodingMatch>,
}

#[derive(Debug, Deserialize)]
struct GeocodingMatch {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    timezone: Option<String>,
}

/// WMO weather interpretation code to a short label
pub fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "Clear",
        1 => "Mainly Clear",
        2 => "Partly Cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        61 | 63 | 65 => "Rain",
        71 | 73 | 75 => "Snow",
        80..=82 => "Rain Showers",
        95 | 96 | 99 => "Thunderstorm",
        _ => "Unknown",
    }
}

/// Open-Meteo daily forecast client
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
    geocoding_url: String,
}

impl Default for WeatherClient {
    fn default() -> Self {
        Self::new(OPEN_METEO_URL)
    }
}

impl WeatherClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEATHER_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            geocoding_url: OPEN_METEO_GEOCODING_URL.to_string(),
        }
    }

    pub fn with_geocoding_url(mut self, url: &str) -> Self {
        self.geocoding_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Best match for a city name
    pub async fn geocode(&self, city: &str) -> Result<Location> {
        let city = city.trim();
        if city.is_empty() {
            return Err(Error::InvalidInput("city name is empty".into()));
        }
        let url = format!("{}/v1/search", self.geocoding_url);

        debug!(city, "Geocoding city");

        let response = self
            .client
            .get(&url)
            .query(&[("name", city), ("count", "1"), ("format", "json")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidInput(format!(
                "geocoding service returned {}: {}",
                status, body
            )));
        }

        let body: GeocodingResponse = response.json().await?;
        let best = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidInput(format!("no location found for '{}'", city)))?;

        Ok(Location {
            latitude: best.latitude,
            longitude: best.longitude,
            timezone: best.timezone.unwrap_or_else(|| "auto".to_string()),
        })
    }

    /// Coordinates for `city`, or `None` when it cannot be resolved
    pub async fn locate(&self, city: &str) -> Option<Location> {
        match self.geocode(city).await {
            Ok(location) => Some(location),
            Err(e) => {
                warn!(error = %e, city, "City lookup failed, continuing without it");
                None
            }
        }
    }

    /// Point the profile at its city, when it names one that resolves
    pub async fn resolve_profile(&self, profile: &mut HomeProfile) {
        let Some(city) = profile.city.as_deref() else {
            return;
        };
        if let Some(location) = self.locate(city).await {
            profile.location = location;
        }
    }

    /// Weather for `date` at `location`
    pub async fn daily(&self, location: &Location, date: NaiveDate) -> Result<DailyWeather> {
        let url = format!("{}/v1/forecast", self.base_url);
        let day = date.format("%Y-%m-%d").to_string();

        debug!(lat = location.latitude, lon = location.longitude, date = %day, "Fetching weather");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                ("timezone", location.timezone.clone()),
                (
                    "daily",
                    "temperature_2m_max,temperature_2m_min,weathercode".to_string(),
                ),
                ("start_date", day.clone()),
                ("end_date", day),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidInput(format!(
                "weather service returned {}: {}",
                status, body
            )));
        }

        let body: ForecastResponse = response.json().await?;
        Self::pick_day(body.daily, date)
    }

    /// Average temperature for `date`, or `None` when weather is unavailable
    pub async fn avg_temp(&self, location: &Location, date: NaiveDate) -> Option<f64> {
        match self.daily(location, date).await {
            Ok(weather) => Some(weather.avg_temp_c()),
            Err(e) => {
                warn!(error = %e, date = %date, "Weather unavailable, continuing without temperature");
                None
            }
        }
    }

    fn pick_day(daily: DailySeries, date: NaiveDate) -> Result<DailyWeather> {
        let idx = daily
            .time
            .iter()
            .position(|d| *d == date)
            .ok_or_else(|| Error::InvalidInput(format!("no weather returned for {}", date)))?;

        let high = daily.temperature_2m_max.get(idx).copied().flatten();
        let low = daily.temperature_2m_min.get(idx).copied().flatten();
        let (Some(temp_high), Some(temp_low)) = (high, low) else {
            return Err(Error::InvalidInput(format!(
                "incomplete temperatures for {}",
                date
            )));
        };
        let condition = daily
            .weathercode
            .get(idx)
            .copied()
            .flatten()
            .map(describe_weather_code)
            .unwrap_or("Unknown")
            .to_string();

        Ok(DailyWeather {
            date,
            temp_high,
            temp_low,
            condition,
        })
    }
}
