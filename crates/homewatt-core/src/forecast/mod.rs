//! Forecast models and feature assembly
//!
//! The rest of the crate only depends on the [`ForecastModel`] contract:
//! a pure, deterministic `predict` for a fixed model version. The model
//! family behind it (here a coefficient registry) is an implementation detail.
//!
//! ```rust,ignore
//! let registry = ModelRegistry::embedded()?;
//! let features = FeatureAssembler::default().assemble(&series, date, &ctx)?;
//! let forecast = registry.predict(&features)?;
//! ```

pub mod features;
pub mod linear;
pub mod registry;

pub use features::{FeatureAssembler, FeatureContext};
pub use linear::{LinearCoefficients, LinearModel};
pub use registry::ModelRegistry;

use crate::error::Result;
use crate::models::{FeatureVector, Forecast};

/// A trained consumption model
///
/// Implementations must be side-effect free: the same features and the same
/// `version()` always produce the same forecast.
pub trait ForecastModel: Send + Sync {
    /// Version string embedded in every forecast this model produces
    fn version(&self) -> &str;

    /// Predict consumption for the horizon described by `features`
    ///
    /// Fails with `InvalidInput` for out-of-range features and
    /// `ModelUnavailable` when no model can serve the request.
    fn predict(&self, features: &FeatureVector) -> Result<Forecast>;
}
