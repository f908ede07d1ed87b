//! Rolling per-datacenter forecasts with a per-step cache

use super::features::CsvFeatureLoader;
use super::inference::{OnnxForecaster, PersistenceForecaster};
use super::scaler::FeatureScalers;
use super::PowerForecaster;
use crate::config::WindPredictionConfig;
use crate::error::{EnvError, Result};
use crate::observability::EnvMetrics;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

const KW_TO_W: f32 = 1000.0;

/// Counters since the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictionStats {
    pub forecasts: u64,
    pub cache_hits: u64,
    pub zero_rows: u64,
}

pub struct PredictionService {
    forecaster: Box<dyn PowerForecaster>,
    loader: CsvFeatureLoader,
    scalers: FeatureScalers,
    turbine_ids: Vec<u32>,
    horizon: usize,
    history_length: usize,
    current_step: u64,
    cache: HashMap<usize, Vec<f32>>,
    stats: PredictionStats,
    metrics: EnvMetrics,
}

impl PredictionService {
    pub fn new(
        forecaster: Box<dyn PowerForecaster>,
        loader: CsvFeatureLoader,
        scalers: FeatureScalers,
        turbine_ids: Vec<u32>,
        horizon: usize,
        history_length: usize,
    ) -> Self {
        info!(
            num_datacenters = turbine_ids.len(),
            turbines = ?turbine_ids,
            horizon = horizon,
            history_length = history_length,
            forecaster = forecaster.name(),
            "Wind prediction service initialized"
        );
        Self {
            forecaster,
            loader,
            scalers,
            turbine_ids,
            horizon,
            history_length,
            current_step: 0,
            cache: HashMap::new(),
            stats: PredictionStats::default(),
            metrics: EnvMetrics::new(),
        }
    }

    /// Build the model, scalers and traces named in the configuration
    pub fn from_config(config: &WindPredictionConfig) -> Result<Self> {
        if config.device != "cpu" {
            warn!(device = %config.device, "Only CPU inference is supported, using cpu");
        }

        let forecaster: Box<dyn PowerForecaster> = match &config.model_checkpoint {
            Some(path) => Box::new(OnnxForecaster::from_path(path, config.history_length).map_err(
                |e| EnvError::Prediction(format!("loading {}: {}", path.display(), e)),
            )?),
            None => {
                warn!("No model_checkpoint configured, using persistence forecaster");
                Box::new(PersistenceForecaster)
            }
        };

        let scalers = match &config.scalers_path {
            Some(path) => FeatureScalers::from_path(path)?,
            None => FeatureScalers::new(HashMap::new()),
        };
        let loader = CsvFeatureLoader::from_paths(
            &config.resolved_csv_paths()?,
            config.csv_start_offset,
        );

        Ok(Self::new(
            forecaster,
            loader,
            scalers,
            config.turbine_ids.clone(),
            config.horizon,
            config.history_length,
        ))
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn num_datacenters(&self) -> usize {
        self.turbine_ids.len()
    }

    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    pub fn stats(&self) -> PredictionStats {
        self.stats
    }

    /// Forecast in watts for one datacenter, all zeros when unavailable
    pub fn predict(&mut self, dc_id: usize, simulation_time: f64) -> Vec<f32> {
        if let Some(cached) = self.cache.get(&dc_id) {
            self.stats.cache_hits += 1;
            return cached.clone();
        }

        let row = match self.compute(dc_id, simulation_time) {
            Ok(Some(watts)) => {
                self.stats.forecasts += 1;
                self.metrics.inc_forecasts();
                watts
            }
            Ok(None) => {
                self.stats.zero_rows += 1;
                self.metrics.inc_forecast_failures();
                vec![0.0; self.horizon]
            }
            Err(e) => {
                error!(dc_id = dc_id, error = %e, "Forecast failed");
                self.stats.zero_rows += 1;
                self.metrics.inc_forecast_failures();
                vec![0.0; self.horizon]
            }
        };
        self.cache.insert(dc_id, row.clone());
        row
    }

    /// `(num_datacenters, horizon)` forecast
    pub fn predict_all(&mut self, simulation_time: f64) -> Vec<Vec<f32>> {
        (0..self.num_datacenters())
            .map(|dc_id| self.predict(dc_id, simulation_time))
            .collect()
    }

    fn compute(&self, dc_id: usize, simulation_time: f64) -> Result<Option<Vec<f32>>> {
        let Some(&turbine_id) = self.turbine_ids.get(dc_id) else {
            warn!(dc_id = dc_id, "No turbine assigned to datacenter");
            return Ok(None);
        };
        let Some(history) =
            self.loader
                .historical_features(turbine_id, simulation_time, self.history_length)
        else {
            return Ok(None);
        };

        let normalized: Vec<_> = history.iter().map(|row| self.scalers.normalize_row(row)).collect();
        let output = self.forecaster.forecast(&normalized, self.horizon)?;
        if output.len() != self.horizon {
            return Err(EnvError::Prediction(format!(
                "forecaster returned {} values, expected {}",
                output.len(),
                self.horizon
            )));
        }

        let watts: Vec<f32> = self
            .scalers
            .denormalize_target(&output)
            .into_iter()
            .map(|kw| kw * KW_TO_W)
            .collect();
        debug!(
            dc_id = dc_id,
            turbine_id = turbine_id,
            mean_w = watts.iter().sum::<f32>() / watts.len().max(1) as f32,
            "Forecast computed"
        );
        Ok(Some(watts))
    }

    /// Move to the next step, dropping cached forecasts
    pub fn advance(&mut self) {
        self.current_step += 1;
        self.cache.clear();
    }

    pub fn reset(&mut self) {
        self.current_step = 0;
        self.cache.clear();
        self.stats = PredictionStats::default();
        debug!("Wind prediction service reset");
    }
}
