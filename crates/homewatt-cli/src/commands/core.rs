//! Shared utilities for the forecasting commands
//!
//! - `load_config` - config file + environment
//! - `load_series` - read the usage CSV and pick one household/meter
//! - `build_pipeline` - forecast model registry + agent backend
//! - `resolve_location` - coordinates from `--lat/--lon` or a geocoded `--city`
//! - `feature_context` - temperature and household size for the target day

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use homewatt_core::telemetry::{group_series, load_csv, select_series};
use homewatt_core::{
    AgentClient, AppConfig, EnergyPipeline, FeatureContext, HomeProfile, Location, ModelRegistry,
    UsageSeries, WeatherClient,
};
use tracing::debug;

use crate::cli::{LocationArgs, TargetArgs};

/// Explicit `--config` wins over `HOMEWATT_CONFIG`; `HOMEWATT_*` variables apply on top
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load(Some(path)),
        None => AppConfig::from_env(),
    };
    config.context("Failed to load configuration")
}

pub fn load_series(target: &TargetArgs) -> Result<UsageSeries> {
    let samples = load_csv(&target.csv)
        .with_context(|| format!("Failed to read usage CSV {}", target.csv.display()))?;
    let groups = group_series(samples);
    let selected = select_series(&groups, &target.household, target.meter.as_deref())
        .context("Invalid usage data")?;
    debug!(
        household = %target.household,
        meter = target.meter.as_deref().unwrap_or("-"),
        samples = selected.len(),
        "Selected usage series"
    );
    Ok(selected)
}

/// `--date`, else the day after the newest sample
pub fn target_date(target: &TargetArgs, series: &UsageSeries) -> Result<NaiveDate> {
    match target.date.or_else(|| series.next_day()) {
        Some(date) => Ok(date),
        None => anyhow::bail!("No samples to infer a target date from; pass --date"),
    }
}

pub fn build_pipeline(config: &AppConfig) -> Result<(EnergyPipeline, AgentClient)> {
    let registry = ModelRegistry::load(config.model_registry.as_deref())
        .context("Failed to load forecast models")?;
    let agent = AgentClient::from_config(&config.agent).context("Failed to configure agent")?;
    let pipeline = EnergyPipeline::new(
        Arc::new(registry),
        Arc::new(agent.clone()),
        config.orchestrator.clone(),
    );
    Ok((pipeline, agent))
}

/// `--lat/--lon` as given, or `--city` geocoded. A city that cannot be
/// resolved is logged and skipped.
pub async fn resolve_location(args: &LocationArgs) -> Option<Location> {
    match (args.lat, args.lon, &args.city) {
        (Some(latitude), Some(longitude), _) => Some(Location {
            latitude,
            longitude,
            timezone: args.timezone.clone(),
        }),
        (_, _, Some(city)) => WeatherClient::default().locate(city).await,
        _ => None,
    }
}

/// `--temp` when given; otherwise ask the weather service if the home was
/// located. A failed lookup leaves the temperature unset.
pub async fn feature_context(
    target: &TargetArgs,
    args: &LocationArgs,
    location: Option<&Location>,
    date: NaiveDate,
) -> FeatureContext {
    let avg_temp_c = match (args.temp, location) {
        (Some(temp), _) => Some(temp),
        (None, Some(location)) => WeatherClient::default().avg_temp(location, date).await,
        (None, None) => None,
    };
    FeatureContext {
        avg_temp_c,
        household_size: target.household_size,
    }
}

/// Only built when the caller told us something about the home
pub fn home_profile(
    target: &TargetArgs,
    args: &LocationArgs,
    location: Option<&Location>,
) -> Option<HomeProfile> {
    if target.household_size.is_none() && location.is_none() && args.city.is_none() {
        return None;
    }
    let mut profile = HomeProfile {
        city: args.city.clone(),
        ..HomeProfile::default()
    };
    if let Some(size) = target.household_size {
        profile.household_size = size;
    }
    if let Some(location) = location {
        profile.location = location.clone();
    }
    if let Some(meter) = &target.meter {
        profile.appliances.push(meter.clone());
    }
    Some(profile)
}
