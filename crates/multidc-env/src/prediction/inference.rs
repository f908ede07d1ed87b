//! Forecast models
//!
//! The ONNX forecaster runs an exported sequence model through tract. Its
//! input is `[1, history_length, 13]` normalized features and its output the
//! next `horizon` normalized active-power values.

use super::features::{FeatureRow, NUM_FEATURES, TARGET_INDEX};
use super::PowerForecaster;
use crate::error::{EnvError, Result};
use anyhow::Context;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct OnnxForecaster {
    model: TractModel,
    history_length: usize,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl OnnxForecaster {
    pub fn from_path(path: &Path, history_length: usize) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, history_length)
    }

    pub fn from_bytes(model_bytes: &[u8], history_length: usize) -> Result<Self> {
        let model = Self::load_model(model_bytes, history_length)
            .map_err(|e| EnvError::Prediction(format!("{:#}", e)))?;
        Ok(Self {
            model,
            history_length,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        })
    }

    fn load_model(model_bytes: &[u8], history_length: usize) -> anyhow::Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, history_length, NUM_FEATURES]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    fn run(&self, history: &[FeatureRow], horizon: usize) -> anyhow::Result<Vec<f32>> {
        if history.len() != self.history_length {
            anyhow::bail!(
                "history has {} steps, model expects {}",
                history.len(),
                self.history_length
            );
        }
        let data: Vec<f32> = history.iter().flat_map(|row| row.iter().copied()).collect();
        let input: Tensor =
            tract_ndarray::Array3::from_shape_vec((1, self.history_length, NUM_FEATURES), data)?
                .into();

        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let values: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();
        if values.len() < horizon {
            anyhow::bail!("model produced {} values, expected {}", values.len(), horizon);
        }
        Ok(values[..horizon].to_vec())
    }

    pub fn inference_count(&self) -> u64 {
        self.inference_count.load(Ordering::Relaxed)
    }
}

impl PowerForecaster for OnnxForecaster {
    fn forecast(&self, history: &[FeatureRow], horizon: usize) -> Result<Vec<f32>> {
        let start = Instant::now();
        let values = self
            .run(history, horizon)
            .map_err(|e| EnvError::Prediction(format!("{:#}", e)))?;

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(elapsed_ms = elapsed.as_millis(), "Forecast exceeded {}ms", SLOW_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Forecast completed");
        }
        Ok(values)
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Repeats the last observed active power over the horizon
///
/// Used when no model checkpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistenceForecaster;

impl PowerForecaster for PersistenceForecaster {
    fn forecast(&self, history: &[FeatureRow], horizon: usize) -> Result<Vec<f32>> {
        let last = history
            .last()
            .ok_or_else(|| EnvError::Prediction("empty history".to_string()))?;
        Ok(vec![last[TARGET_INDEX]; horizon])
    }

    fn name(&self) -> &str {
        "persistence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_repeats_last_target() {
        let mut first = [0.0; NUM_FEATURES];
        first[TARGET_INDEX] = 1.0;
        let mut last = [0.0; NUM_FEATURES];
        last[TARGET_INDEX] = 2.5;

        let forecast = PersistenceForecaster.forecast(&[first, last], 4).unwrap();
        assert_eq!(forecast, vec![2.5; 4]);
        assert!(PersistenceForecaster.forecast(&[], 4).is_err());
    }

    #[test]
    fn test_onnx_rejects_invalid_model() {
        let result = OnnxForecaster::from_bytes(b"not a model", 12);
        assert!(matches!(result, Err(EnvError::Prediction(_))));
    }
}
