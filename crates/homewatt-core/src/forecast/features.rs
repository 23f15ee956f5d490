//! Feature assembly from usage windows

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

use crate::error::{Error, Result};
use crate::models::{FeatureVector, Season};
use crate::telemetry::{daily_totals, UsageSeries};

/// Context that does not come from the meter itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureContext {
    /// Mean forecast temperature for the target day
    pub avg_temp_c: Option<f64>,
    pub household_size: Option<u32>,
}

/// Builds [`FeatureVector`]s from the days preceding the target date
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    window_days: u32,
}

impl Default for FeatureAssembler {
    fn default() -> Self {
        Self { window_days: 7 }
    }
}

impl FeatureAssembler {
    pub fn new(window_days: u32) -> Self {
        Self {
            window_days: window_days.max(1),
        }
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Assemble features for a next-day forecast of `target_date`
    ///
    /// Uses samples in `[target_date - window_days, target_date)`. The series
    /// was validated on construction, so the window is already ordered and
    /// non-negative.
    pub fn assemble(
        &self,
        series: &UsageSeries,
        target_date: NaiveDate,
        context: &FeatureContext,
    ) -> Result<FeatureVector> {
        let end = target_date.and_time(NaiveTime::MIN).and_utc();
        let window = series.window(end, self.window_days);
        if window.is_empty() {
            return Err(Error::InvalidInput(format!(
                "no usage samples in the {} days before {} for household {}",
                self.window_days,
                target_date,
                series.household_id()
            )));
        }

        let daily = daily_totals(window);
        let total: f64 = daily.iter().map(|(_, kwh)| kwh).sum();
        let recent_avg_kwh = total / daily.len() as f64;
        let last_day_kwh = daily.last().map(|(_, kwh)| *kwh).unwrap_or(0.0);

        let weekday = target_date.weekday();
        let features = FeatureVector {
            household_id: series.household_id().to_string(),
            meter_id: series.meter_id().map(str::to_string),
            target_date,
            recent_avg_kwh,
            last_day_kwh,
            hour_of_day: 0,
            day_of_week: weekday.num_days_from_monday(),
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
            season: Season::from_date(target_date),
            avg_temp_c: context.avg_temp_c,
            household_size: context.household_size,
        };
        features.validate()?;
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UsageSample;
    use chrono::{TimeZone, Utc};

    fn series() -> UsageSeries {
        // July 1..=7, two readings a day
        let mut samples = Vec::new();
        for day in 1..=7 {
            for hour in [6, 18] {
                samples.push(UsageSample::new(
                    Utc.with_ymd_and_hms(2025, 7, day, hour, 0, 0).unwrap(),
                    "H1",
                    None,
                    day as f64,
                ));
            }
        }
        UsageSeries::new("H1", None, samples).unwrap()
    }

    #[test]
    fn test_assemble_features() {
        // 2025-07-08 is a Tuesday
        let target = NaiveDate::from_ymd_opt(2025, 7, 8).unwrap();
        let ctx = FeatureContext {
            avg_temp_c: Some(31.0),
            household_size: Some(4),
        };
        let fv = FeatureAssembler::default()
            .assemble(&series(), target, &ctx)
            .unwrap();

        // daily totals 2,4,..,14 -> mean 8
        assert_eq!(fv.recent_avg_kwh, 8.0);
        assert_eq!(fv.last_day_kwh, 14.0);
        assert_eq!(fv.day_of_week, 1);
        assert!(!fv.is_weekend);
        assert_eq!(fv.season, Season::Summer);
        assert_eq!(fv.avg_temp_c, Some(31.0));
        assert_eq!(fv.household_id, "H1");
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let target = NaiveDate::from_ymd_opt(2025, 7, 5).unwrap();
        let assembler = FeatureAssembler::new(3);
        let a = assembler
            .assemble(&series(), target, &FeatureContext::default())
            .unwrap();
        let b = assembler
            .assemble(&series(), target, &FeatureContext::default())
            .unwrap();
        assert_eq!(a, b);
        // July 2..=4 only
        assert_eq!(a.recent_avg_kwh, 6.0);
        assert!(a.is_weekend);
    }

    #[test]
    fn test_empty_window_is_invalid_input() {
        let target = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let err = FeatureAssembler::default()
            .assemble(&series(), target, &FeatureContext::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
