//! Wind power prediction
//!
//! Forecasts each datacenter's green power from its turbine's recent history
//! and injects the result into the global observation.

mod augmenter;
mod features;
mod inference;
mod scaler;
mod service;

#[cfg(test)]
mod tests;

pub use augmenter::{WindPredictionAugmenter, STATS_LOG_INTERVAL};
pub use features::{
    read_trace, CsvFeatureLoader, FeatureRow, FEATURE_COLUMNS, NUM_FEATURES, TARGET_FEATURE,
    TARGET_INDEX,
};
pub use inference::{OnnxForecaster, PersistenceForecaster};
pub use scaler::{FeatureScalers, StandardScaler};
pub use service::{PredictionService, PredictionStats};

use crate::config::EnvConfig;
use crate::env::HierarchicalEnvironment;
use crate::error::Result;

/// Forecasting model over one turbine's normalized history
pub trait PowerForecaster: Send {
    /// Next `horizon` normalized active-power values
    fn forecast(&self, history: &[FeatureRow], horizon: usize) -> Result<Vec<f32>>;

    fn name(&self) -> &str;
}

/// Wrap `env` with the forecast decorator when prediction is enabled
pub fn maybe_augment<E>(env: E, config: &EnvConfig) -> Result<Box<dyn HierarchicalEnvironment>>
where
    E: HierarchicalEnvironment + 'static,
{
    match config.active_wind_prediction() {
        Some(wind) => {
            let service = PredictionService::from_config(wind)?;
            Ok(Box::new(WindPredictionAugmenter::new(env, service)?))
        }
        None => Ok(Box::new(env)),
    }
}
