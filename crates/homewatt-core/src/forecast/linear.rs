//! Linear next-day consumption model

use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{FeatureVector, Forecast, Season};

use super::ForecastModel;

/// z-score of the 80% two-sided prediction interval
const Z_80: f64 = 1.2816;

/// Per-season multiplier applied to the linear estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonFactors {
    #[serde(default = "one")]
    pub winter: f64,
    #[serde(default = "one")]
    pub spring: f64,
    #[serde(default = "one")]
    pub summer: f64,
    #[serde(default = "one")]
    pub autumn: f64,
}

fn one() -> f64 {
    1.0
}

impl Default for SeasonFactors {
    fn default() -> Self {
        Self {
            winter: 1.0,
            spring: 1.0,
            summer: 1.0,
            autumn: 1.0,
        }
    }
}

impl SeasonFactors {
    pub fn factor(&self, season: Season) -> f64 {
        match season {
            Season::Winter => self.winter,
            Season::Spring => self.spring,
            Season::Summer => self.summer,
            Season::Autumn => self.autumn,
        }
    }
}

/// Fitted coefficients, as stored in the model registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCoefficients {
    pub intercept: f64,
    pub recent_avg: f64,
    pub last_day: f64,
    /// Added on Saturdays and Sundays
    #[serde(default)]
    pub weekend: f64,
    /// kWh per degree above `temp_base`
    #[serde(default)]
    pub temp: f64,
    #[serde(default = "default_temp_base")]
    pub temp_base: f64,
    /// kWh per household member
    #[serde(default)]
    pub household_size: f64,
    /// Standard deviation of training residuals (kWh)
    pub residual_std: f64,
    #[serde(default)]
    pub season: SeasonFactors,
}

fn default_temp_base() -> f64 {
    24.0
}

/// A linear model bound to a version string
#[derive(Debug, Clone)]
pub struct LinearModel {
    version: String,
    coefficients: LinearCoefficients,
}

impl LinearModel {
    pub fn new(version: impl Into<String>, coefficients: LinearCoefficients) -> Result<Self> {
        if !coefficients.residual_std.is_finite() || coefficients.residual_std < 0.0 {
            return Err(Error::ModelUnavailable(format!(
                "invalid residual_std {}",
                coefficients.residual_std
            )));
        }
        Ok(Self {
            version: version.into(),
            coefficients,
        })
    }

    pub fn coefficients(&self) -> &LinearCoefficients {
        &self.coefficients
    }

    /// Point estimate before clamping
    fn estimate(&self, fv: &FeatureVector) -> f64 {
        let c = &self.coefficients;
        let mut kwh = c.intercept + c.recent_avg * fv.recent_avg_kwh + c.last_day * fv.last_day_kwh;

        if fv.is_weekend {
            kwh += c.weekend;
        }
        if let Some(temp) = fv.avg_temp_c {
            kwh += c.temp * (temp - c.temp_base);
        }
        if let Some(size) = fv.household_size {
            kwh += c.household_size * size as f64;
        }

        kwh * c.season.factor(fv.season)
    }
}

impl ForecastModel for LinearModel {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict(&self, features: &FeatureVector) -> Result<Forecast> {
        features.validate()?;

        let predicted = self.estimate(features).max(0.0);
        let spread = Z_80 * self.coefficients.residual_std;
        let confidence = 1.0 / (1.0 + self.coefficients.residual_std / predicted.max(0.1));

        let day_start = features.target_date.and_time(NaiveTime::MIN).and_utc();
        let start = day_start + Duration::hours(features.hour_of_day as i64);
        let end = day_start + Duration::days(1);

        Ok(Forecast::new(
            features.household_id.clone(),
            features.meter_id.clone(),
            start,
            end,
            predicted,
            self.version.clone(),
        )?
        .with_confidence(confidence)?
        .with_interval(predicted - spread, predicted + spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn coefficients() -> LinearCoefficients {
        LinearCoefficients {
            intercept: 1.0,
            recent_avg: 0.5,
            last_day: 0.5,
            weekend: 2.0,
            temp: 0.1,
            temp_base: 24.0,
            household_size: 0.5,
            residual_std: 1.0,
            season: SeasonFactors {
                summer: 2.0,
                ..Default::default()
            },
        }
    }

    fn features() -> FeatureVector {
        FeatureVector {
            household_id: "H1".into(),
            meter_id: None,
            target_date: NaiveDate::from_ymd_opt(2025, 1, 14).unwrap(),
            recent_avg_kwh: 10.0,
            last_day_kwh: 12.0,
            hour_of_day: 0,
            day_of_week: 1,
            is_weekend: false,
            season: Season::Winter,
            avg_temp_c: Some(34.0),
            household_size: Some(2),
        }
    }

    #[test]
    fn test_linear_prediction() {
        let model = LinearModel::new("test-1", coefficients()).unwrap();
        let forecast = model.predict(&features()).unwrap();

        // 1 + 5 + 6 + 0.1*10 + 0.5*2 = 14
        assert!((forecast.predicted_kwh() - 14.0).abs() < 1e-9);
        assert_eq!(forecast.model_version(), "test-1");
        let (lo, hi) = forecast.interval().unwrap();
        assert!(lo < 14.0 && hi > 14.0);
        let confidence = forecast.confidence().unwrap();
        assert!(confidence > 0.9 && confidence < 1.0);
    }

    #[test]
    fn test_weekend_and_season_terms() {
        let model = LinearModel::new("test-1", coefficients()).unwrap();
        let mut fv = features();
        fv.is_weekend = true;
        fv.season = Season::Summer;
        let forecast = model.predict(&fv).unwrap();
        assert!((forecast.predicted_kwh() - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_is_clamped_and_deterministic() {
        let mut c = coefficients();
        c.intercept = -100.0;
        let model = LinearModel::new("test-1", c).unwrap();
        let a = model.predict(&features()).unwrap();
        let b = model.predict(&features()).unwrap();
        assert_eq!(a.predicted_kwh(), 0.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_features_rejected() {
        let model = LinearModel::new("test-1", coefficients()).unwrap();
        let mut fv = features();
        fv.recent_avg_kwh = -3.0;
        assert!(matches!(model.predict(&fv), Err(Error::InvalidInput(_))));
    }
}
