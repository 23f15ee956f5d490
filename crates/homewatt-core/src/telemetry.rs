//! Usage telemetry loading and validation
//!
//! CSV format (header required):
//!
//! ```text
//! timestamp,household_id,meter_id,consumption_kwh
//! 2025-07-01T00:00:00Z,H1,ac,1.25
//! 2025-07-01 01:00:00,H1,,0.40
//! ```
//!
//! `meter_id` may be empty for whole-home readings. Timestamps are RFC 3339 or
//! `YYYY-MM-DD HH:MM:SS` interpreted as UTC.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use csv::ReaderBuilder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::UsageSample;

/// Validated, time-ordered samples for one household and meter
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSeries {
    household_id: String,
    meter_id: Option<String>,
    samples: Vec<UsageSample>,
}

impl UsageSeries {
    /// Build a series, enforcing strictly increasing timestamps and
    /// non-negative consumption
    pub fn new(
        household_id: impl Into<String>,
        meter_id: Option<String>,
        samples: Vec<UsageSample>,
    ) -> Result<Self> {
        let household_id = household_id.into();

        for (i, sample) in samples.iter().enumerate() {
            if sample.household_id != household_id || sample.meter_id != meter_id {
                return Err(Error::InvalidInput(format!(
                    "sample {} belongs to {}/{} not {}/{}",
                    i,
                    sample.household_id,
                    sample.meter_id.as_deref().unwrap_or("-"),
                    household_id,
                    meter_id.as_deref().unwrap_or("-"),
                )));
            }
            if !sample.consumption_kwh.is_finite() || sample.consumption_kwh < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "negative or non-finite consumption at {}: {}",
                    sample.timestamp, sample.consumption_kwh
                )));
            }
            if i > 0 && sample.timestamp <= samples[i - 1].timestamp {
                return Err(Error::InvalidInput(format!(
                    "timestamps not strictly increasing at {} (previous {})",
                    sample.timestamp,
                    samples[i - 1].timestamp
                )));
            }
        }

        Ok(Self {
            household_id,
            meter_id,
            samples,
        })
    }

    pub fn household_id(&self) -> &str {
        &self.household_id
    }

    pub fn meter_id(&self) -> Option<&str> {
        self.meter_id.as_deref()
    }

    pub fn samples(&self) -> &[UsageSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// The calendar day after the last sample; the default forecast target
    pub fn next_day(&self) -> Option<NaiveDate> {
        self.last_timestamp()
            .and_then(|ts| ts.date_naive().succ_opt())
    }

    /// Samples with `end - days <= timestamp < end`
    pub fn window(&self, end: DateTime<Utc>, days: u32) -> &[UsageSample] {
        let start = end - Duration::days(days as i64);
        let lo = self.samples.partition_point(|s| s.timestamp < start);
        let hi = self.samples.partition_point(|s| s.timestamp < end);
        &self.samples[lo..hi]
    }
}

/// Load samples from a CSV file
pub fn load_csv(path: &Path) -> Result<Vec<UsageSample>> {
    let file = File::open(path)?;
    let samples = read_csv(file)?;
    debug!(path = %path.display(), count = samples.len(), "Loaded usage samples");
    Ok(samples)
}

/// Parse samples from any CSV reader
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<UsageSample>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();

    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        // Header is line 1
        let line = idx + 2;

        let ts_str = record
            .get(0)
            .ok_or_else(|| Error::InvalidInput(format!("line {}: missing timestamp", line)))?;
        let timestamp = parse_timestamp(ts_str)
            .ok_or_else(|| Error::InvalidInput(format!("line {}: bad timestamp '{}'", line, ts_str)))?;

        let household_id = record
            .get(1)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidInput(format!("line {}: missing household_id", line)))?
            .to_string();

        let meter_id = record
            .get(2)
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty());

        let kwh_str = record
            .get(3)
            .ok_or_else(|| Error::InvalidInput(format!("line {}: missing consumption_kwh", line)))?;
        let consumption_kwh: f64 = kwh_str.parse().map_err(|_| {
            Error::InvalidInput(format!("line {}: bad consumption '{}'", line, kwh_str))
        })?;

        samples.push(UsageSample {
            timestamp,
            household_id,
            meter_id,
            consumption_kwh,
        });
    }

    Ok(samples)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Raw samples bucketed by (household, meter)
///
/// Nothing is validated here; a bucket only becomes a [`UsageSeries`] when it
/// is selected, so bad rows for one household never block another.
#[derive(Debug, Clone, Default)]
pub struct SampleGroups {
    groups: BTreeMap<(String, Option<String>), Vec<UsageSample>>,
}

impl SampleGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Meters recorded for a household; `None` is the whole-home meter
    pub fn meters(&self, household_id: &str) -> Vec<Option<&str>> {
        self.groups
            .keys()
            .filter(|(household, _)| household == household_id)
            .map(|(_, meter)| meter.as_deref())
            .collect()
    }

    fn series(&self, household_id: &str, meter_id: Option<&str>) -> Option<Result<UsageSeries>> {
        let key = (household_id.to_string(), meter_id.map(String::from));
        self.groups
            .get(&key)
            .map(|samples| UsageSeries::new(household_id, key.1.clone(), samples.clone()))
    }
}

/// Bucket samples per (household, meter), preserving input order within
/// each bucket
pub fn group_series(samples: Vec<UsageSample>) -> SampleGroups {
    let mut groups: BTreeMap<(String, Option<String>), Vec<UsageSample>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry((sample.household_id.clone(), sample.meter_id.clone()))
            .or_default()
            .push(sample);
    }
    SampleGroups { groups }
}

/// Sum a household's appliance sub-meters into a single whole-home series
///
/// Readings sharing a timestamp are added together. Rows without a meter id
/// are not part of the sum. Each sub-meter is validated on its own first.
pub fn household_total(groups: &SampleGroups, household_id: &str) -> Result<UsageSeries> {
    let mut buckets: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for meter in groups.meters(household_id).into_iter().flatten() {
        let Some(series) = groups.series(household_id, Some(meter)) else {
            continue;
        };
        for sample in series?.samples() {
            *buckets.entry(sample.timestamp).or_insert(0.0) += sample.consumption_kwh;
        }
    }

    if buckets.is_empty() {
        return Err(Error::InvalidInput(format!(
            "no usage samples for household {}",
            household_id
        )));
    }

    let samples = buckets
        .into_iter()
        .map(|(timestamp, kwh)| UsageSample::new(timestamp, household_id, None, kwh))
        .collect();
    UsageSeries::new(household_id, None, samples)
}

/// Select and validate the series for a household/meter
///
/// With a meter, that meter's own readings. Without one, the whole-home
/// meter when the household has one, else the sum of its sub-meters.
pub fn select_series(
    groups: &SampleGroups,
    household_id: &str,
    meter_id: Option<&str>,
) -> Result<UsageSeries> {
    match meter_id {
        Some(meter) => groups.series(household_id, Some(meter)).unwrap_or_else(|| {
            Err(Error::InvalidInput(format!(
                "no usage samples for household {} meter {}",
                household_id, meter
            )))
        }),
        None => match groups.series(household_id, None) {
            Some(whole_home) => whole_home,
            None => household_total(groups, household_id),
        },
    }
}

/// Total kWh per calendar day (UTC), ascending
pub fn daily_totals(samples: &[UsageSample]) -> Vec<(NaiveDate, f64)> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for sample in samples {
        *days.entry(sample.timestamp.date_naive()).or_insert(0.0) += sample.consumption_kwh;
    }
    days.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    const CSV: &str = "timestamp,household_id,meter_id,consumption_kwh
2025-07-01T00:00:00Z,H1,ac,1.5
2025-07-01T01:00:00Z,H1,ac,1.0
2025-07-01 00:00:00,H1,fridge,0.25
2025-07-02,H1,ac,2.0
2025-07-01T00:00:00Z,H2,,3.0
";

    fn ts(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_read_csv() {
        let samples = read_csv(CSV.as_bytes()).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].meter_id.as_deref(), Some("ac"));
        assert_eq!(samples[2].timestamp, ts(1, 0));
        assert_eq!(samples[3].timestamp, ts(2, 0));
        assert!(samples[4].meter_id.is_none());
    }

    #[test]
    fn test_read_csv_rejects_bad_rows() {
        let bad_ts = "timestamp,household_id,meter_id,consumption_kwh\nyesterday,H1,,1.0\n";
        let err = read_csv(bad_ts.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let bad_kwh = "timestamp,household_id,meter_id,consumption_kwh\n2025-07-01,H1,,lots\n";
        assert!(matches!(
            read_csv(bad_kwh.as_bytes()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_load_csv_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        let samples = load_csv(file.path()).unwrap();
        assert_eq!(samples.len(), 5);
    }

    #[test]
    fn test_series_rejects_non_monotonic() {
        let samples = vec![
            UsageSample::new(ts(1, 1), "H1", None, 1.0),
            UsageSample::new(ts(1, 1), "H1", None, 1.0),
        ];
        assert!(matches!(
            UsageSeries::new("H1", None, samples),
            Err(Error::InvalidInput(_))
        ));

        let samples = vec![
            UsageSample::new(ts(1, 2), "H1", None, 1.0),
            UsageSample::new(ts(1, 1), "H1", None, 1.0),
        ];
        assert!(UsageSeries::new("H1", None, samples).is_err());
    }

    #[test]
    fn test_series_rejects_negative_consumption() {
        let samples = vec![UsageSample::new(ts(1, 1), "H1", None, -0.5)];
        assert!(matches!(
            UsageSeries::new("H1", None, samples),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_group_and_total() {
        let groups = group_series(read_csv(CSV.as_bytes()).unwrap());
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.meters("H1"), vec![Some("ac"), Some("fridge")]);

        let total = household_total(&groups, "H1").unwrap();
        assert!(total.meter_id().is_none());
        // ac 1.5 + fridge 0.25 share the first timestamp
        assert_eq!(total.samples()[0].consumption_kwh, 1.75);
        assert_eq!(total.len(), 3);

        assert!(household_total(&groups, "H9").is_err());
    }

    #[test]
    fn test_select_series() {
        let groups = group_series(read_csv(CSV.as_bytes()).unwrap());
        let ac = select_series(&groups, "H1", Some("ac")).unwrap();
        assert_eq!(ac.len(), 3);
        assert!(select_series(&groups, "H1", Some("heater")).is_err());

        let h2 = select_series(&groups, "H2", None).unwrap();
        assert_eq!(h2.len(), 1);
        assert_eq!(h2.samples()[0].consumption_kwh, 3.0);
    }

    #[test]
    fn test_whole_home_meter_is_not_added_to_sub_meters() {
        let csv = "timestamp,household_id,meter_id,consumption_kwh
2025-07-01T00:00:00Z,H1,,10.0
2025-07-01T00:00:00Z,H1,ac,4.0
2025-07-01T01:00:00Z,H1,,6.0
2025-07-01T01:00:00Z,H1,ac,2.5
";
        let groups = group_series(read_csv(csv.as_bytes()).unwrap());

        let whole_home = select_series(&groups, "H1", None).unwrap();
        assert_eq!(whole_home.meter_id(), None);
        let kwh: Vec<f64> = whole_home
            .samples()
            .iter()
            .map(|s| s.consumption_kwh)
            .collect();
        assert_eq!(kwh, vec![10.0, 6.0]);

        // The sub-meter sum leaves the main meter out
        let sub_meters = household_total(&groups, "H1").unwrap();
        assert_eq!(sub_meters.samples()[0].consumption_kwh, 4.0);
    }

    #[test]
    fn test_bad_rows_only_affect_their_own_series() {
        let csv = "timestamp,household_id,meter_id,consumption_kwh
2025-07-01T00:00:00Z,H1,,1.0
2025-07-02T00:00:00Z,H2,,2.0
2025-07-01T00:00:00Z,H2,,2.0
2025-07-02T00:00:00Z,H1,ac,0.5
2025-07-01T00:00:00Z,H1,ac,0.5
";
        let groups = group_series(read_csv(csv.as_bytes()).unwrap());

        let h1 = select_series(&groups, "H1", None).unwrap();
        assert_eq!(h1.len(), 1);

        assert!(matches!(
            select_series(&groups, "H2", None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            select_series(&groups, "H1", Some("ac")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_window_and_daily_totals() {
        let samples: Vec<UsageSample> = (1..=5)
            .map(|d| UsageSample::new(ts(d, 12), "H1", None, d as f64))
            .collect();
        let series = UsageSeries::new("H1", None, samples).unwrap();

        let window = series.window(ts(5, 0), 2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].consumption_kwh, 3.0);

        let daily = daily_totals(series.samples());
        assert_eq!(daily.len(), 5);
        assert_eq!(daily[4].1, 5.0);

        assert_eq!(series.next_day(), NaiveDate::from_ymd_opt(2025, 7, 6));
    }
}
