//! Forecast model registry
//!
//! The registry maps a forecast target to a fitted model. `household` is the
//! whole-home entry; every other key is a meter or appliance id.
//!
//! Registry resolution:
//! 1. Explicit path (`HOMEWATT_MODEL_REGISTRY` / config file)
//! 2. Embedded default (compiled into binary)

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{FeatureVector, Forecast};

use super::linear::{LinearCoefficients, LinearModel};
use super::ForecastModel;

/// Embedded default registry (compiled into binary)
const DEFAULT_REGISTRY: &str = include_str!("../../../../config/models.toml");

/// Registry key for whole-home forecasts
pub const HOUSEHOLD_TARGET: &str = "household";

#[derive(Debug, Deserialize)]
struct RegistryFile {
    version: String,
    #[serde(default)]
    models: HashMap<String, LinearCoefficients>,
}

/// A versioned set of per-target models, read-only after loading
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    version: String,
    models: HashMap<String, LinearModel>,
}

impl ModelRegistry {
    /// Load the embedded default registry
    pub fn embedded() -> Result<Self> {
        Self::from_toml(DEFAULT_REGISTRY)
    }

    /// Load from an explicit path, or the embedded default when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::embedded(),
        }
    }

    /// Load a registry file; an absent or unreadable file means no model
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::ModelUnavailable(format!(
                "cannot read model registry {}: {}",
                path.display(),
                e
            ))
        })?;
        let registry = Self::from_toml(&content)?;
        info!(
            path = %path.display(),
            version = %registry.version,
            targets = registry.models.len(),
            "Loaded forecast model registry"
        );
        Ok(registry)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(content)
            .map_err(|e| Error::ModelUnavailable(format!("invalid model registry: {}", e)))?;

        if file.models.is_empty() {
            return Err(Error::ModelUnavailable(
                "model registry contains no models".into(),
            ));
        }

        let models = file
            .models
            .into_iter()
            .map(|(target, coefficients)| {
                let version = format!("{}:{}", file.version, target);
                LinearModel::new(version, coefficients).map(|m| (target, m))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            version: file.version,
            models,
        })
    }

    /// Model serving a target (`None` = whole home)
    pub fn model_for(&self, meter_id: Option<&str>) -> Result<&LinearModel> {
        let key = meter_id.unwrap_or(HOUSEHOLD_TARGET);
        self.models
            .get(key)
            .ok_or_else(|| Error::ModelUnavailable(format!("no model found for target '{}'", key)))
    }

    /// Known targets, sorted
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self.models.keys().map(String::as_str).collect();
        targets.sort_unstable();
        targets
    }
}

impl ForecastModel for ModelRegistry {
    fn version(&self) -> &str {
        &self.version
    }

    fn predict(&self, features: &FeatureVector) -> Result<Forecast> {
        let model = self.model_for(features.meter_id.as_deref())?;
        debug!(
            household = %features.household_id,
            target = features.meter_id.as_deref().unwrap_or(HOUSEHOLD_TARGET),
            model = model.version(),
            "Predicting consumption"
        );
        model.predict(features)
    }
}
