//! Domain models for Homewatt

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single metered consumption reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    pub timestamp: DateTime<Utc>,
    pub household_id: String,
    /// Appliance or sub-meter; `None` for the whole-home meter
    #[serde(default)]
    pub meter_id: Option<String>,
    pub consumption_kwh: f64,
}

impl UsageSample {
    pub fn new(
        timestamp: DateTime<Utc>,
        household_id: impl Into<String>,
        meter_id: Option<String>,
        consumption_kwh: f64,
    ) -> Self {
        Self {
            timestamp,
            household_id: household_id.into(),
            meter_id,
            consumption_kwh,
        }
    }
}

/// Meteorological season (northern hemisphere months)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::from_month(date.month())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "winter" => Ok(Season::Winter),
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "autumn" => Ok(Season::Autumn),
            _ => Err(format!("Unknown season: {}", s)),
        }
    }
}

/// Numeric model inputs derived from a usage window
///
/// Built by [`crate::forecast::FeatureAssembler`]; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub household_id: String,
    pub meter_id: Option<String>,
    /// Day being forecast
    pub target_date: NaiveDate,
    /// Mean daily consumption over the window
    pub recent_avg_kwh: f64,
    /// Consumption on the last complete day of the window
    pub last_day_kwh: f64,
    /// Hour the forecast horizon starts (0-23)
    pub hour_of_day: u32,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub season: Season,
    pub avg_temp_c: Option<f64>,
    pub household_size: Option<u32>,
}

impl FeatureVector {
    /// Reject vectors a model must not see
    pub fn validate(&self) -> Result<()> {
        if self.household_id.trim().is_empty() {
            return Err(Error::InvalidInput("household_id is required".into()));
        }
        check_non_negative("recent_avg_kwh", self.recent_avg_kwh)?;
        check_non_negative("last_day_kwh", self.last_day_kwh)?;
        if self.hour_of_day > 23 {
            return Err(Error::InvalidInput(format!(
                "hour_of_day out of range: {}",
                self.hour_of_day
            )));
        }
        if self.day_of_week > 6 {
            return Err(Error::InvalidInput(format!(
                "day_of_week out of range: {}",
                self.day_of_week
            )));
        }
        if let Some(temp) = self.avg_temp_c {
            if !temp.is_finite() || !(-60.0..=60.0).contains(&temp) {
                return Err(Error::InvalidInput(format!(
                    "avg_temp_c out of range: {}",
                    temp
                )));
            }
        }
        if self.household_size == Some(0) {
            return Err(Error::InvalidInput("household_size must be positive".into()));
        }
        Ok(())
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidInput(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

/// A predicted consumption value for one horizon
///
/// Immutable once produced: fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    household_id: String,
    meter_id: Option<String>,
    horizon_start: DateTime<Utc>,
    horizon_end: DateTime<Utc>,
    predicted_kwh: f64,
    confidence: Option<f64>,
    interval: Option<(f64, f64)>,
    model_version: String,
}

impl Forecast {
    pub fn new(
        household_id: impl Into<String>,
        meter_id: Option<String>,
        horizon_start: DateTime<Utc>,
        horizon_end: DateTime<Utc>,
        predicted_kwh: f64,
        model_version: impl Into<String>,
    ) -> Result<Self> {
        if horizon_end <= horizon_start {
            return Err(Error::InvalidInput(
                "forecast horizon must end after it starts".into(),
            ));
        }
        check_non_negative("predicted_kwh", predicted_kwh)?;
        Ok(Self {
            household_id: household_id.into(),
            meter_id,
            horizon_start,
            horizon_end,
            predicted_kwh,
            confidence: None,
            interval: None,
            model_version: model_version.into(),
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidInput(format!(
                "confidence must be within [0, 1], got {}",
                confidence
            )));
        }
        self.confidence = Some(confidence);
        Ok(self)
    }

    pub fn with_interval(mut self, lower: f64, upper: f64) -> Self {
        self.interval = Some((lower.max(0.0), upper.max(lower.max(0.0))));
        self
    }

    /// A one-day forecast starting at midnight UTC of `date`
    pub fn for_day(
        household_id: impl Into<String>,
        meter_id: Option<String>,
        date: NaiveDate,
        predicted_kwh: f64,
        model_version: impl Into<String>,
    ) -> Result<Self> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + chrono::Duration::days(1);
        Self::new(household_id, meter_id, start, end, predicted_kwh, model_version)
    }

    /// Re-check the construction invariants on a forecast that came in over
    /// the wire
    pub fn validate(&self) -> Result<()> {
        if self.horizon_end <= self.horizon_start {
            return Err(Error::InvalidInput(
                "forecast horizon must end after it starts".into(),
            ));
        }
        check_non_negative("predicted_kwh", self.predicted_kwh)?;
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(Error::InvalidInput(format!(
                    "confidence must be within [0, 1], got {}",
                    confidence
                )));
            }
        }
        if let Some((lower, upper)) = self.interval {
            check_non_negative("interval lower bound", lower)?;
            check_non_negative("interval upper bound", upper)?;
            if upper < lower {
                return Err(Error::InvalidInput(format!(
                    "interval upper bound {} is below lower bound {}",
                    upper, lower
                )));
            }
        }
        Ok(())
    }

    pub fn household_id(&self) -> &str {
        &self.household_id
    }

    pub fn meter_id(&self) -> Option<&str> {
        self.meter_id.as_deref()
    }

    pub fn horizon_start(&self) -> DateTime<Utc> {
        self.horizon_start
    }

    pub fn horizon_end(&self) -> DateTime<Utc> {
        self.horizon_end
    }

    pub fn predicted_kwh(&self) -> f64 {
        self.predicted_kwh
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn interval(&self) -> Option<(f64, f64)> {
        self.interval
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }
}

/// Time-of-use tariff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    pub rate_peak: f64,
    pub rate_offpeak: f64,
    /// "HH:MM"
    pub peak_start: String,
    pub peak_end: String,
    pub currency: String,
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            rate_peak: 12.0,
            rate_offpeak: 7.5,
            peak_start: "18:00".to_string(),
            peak_end: "22:00".to_string(),
            currency: "INR".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            latitude: 18.6298,
            longitude: 73.7997,
            timezone: "Asia/Kolkata".to_string(),
        }
    }
}

/// Household description used to give agents context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeProfile {
    pub household_size: u32,
    #[serde(default)]
    pub appliances: Vec<String>,
    #[serde(default)]
    pub tariff: Tariff,
    #[serde(default)]
    pub location: Location,
    /// City name; when it geocodes, it replaces `location`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Default for HomeProfile {
    fn default() -> Self {
        Self {
            household_size: 4,
            appliances: Vec::new(),
            tariff: Tariff::default(),
            location: Location::default(),
            city: None,
        }
    }
}
