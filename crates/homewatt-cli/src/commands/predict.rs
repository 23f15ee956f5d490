//! Forecast command

use std::path::Path;

use anyhow::{Context, Result};
use homewatt_core::{AppConfig, Forecast};

use super::{
    build_pipeline, feature_context, load_config, load_series, resolve_location, target_date,
};
use crate::cli::{LocationArgs, TargetArgs};

pub async fn cmd_predict(
    config_path: Option<&Path>,
    target: &TargetArgs,
    location: &LocationArgs,
) -> Result<()> {
    let config = load_config(config_path)?;
    let forecast = predict(&config, target, location).await?;
    println!("{}", serde_json::to_string_pretty(&forecast)?);
    Ok(())
}

pub async fn predict(
    config: &AppConfig,
    target: &TargetArgs,
    location: &LocationArgs,
) -> Result<Forecast> {
    let series = load_series(target)?;
    let date = target_date(target, &series)?;
    let place = resolve_location(location).await;
    let context = feature_context(target, location, place.as_ref(), date).await;
    let (pipeline, _) = build_pipeline(config)?;
    pipeline
        .forecast(&series, date, &context)
        .context("Forecast failed")
}
