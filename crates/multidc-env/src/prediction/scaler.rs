//! Per-feature standard scalers

use super::features::{FeatureRow, FEATURE_COLUMNS, TARGET_FEATURE};
use crate::error::{EnvError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// `z = (x - mean) / scale`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: f64,
    pub scale: f64,
}

impl StandardScaler {
    pub fn new(mean: f64, scale: f64) -> Self {
        Self { mean, scale }
    }

    // A zero scale means a constant feature in training
    fn effective_scale(&self) -> f64 {
        if self.scale == 0.0 {
            1.0
        } else {
            self.scale
        }
    }

    pub fn transform(&self, value: f32) -> f32 {
        ((value as f64 - self.mean) / self.effective_scale()) as f32
    }

    pub fn inverse_transform(&self, value: f32) -> f32 {
        (value as f64 * self.effective_scale() + self.mean) as f32
    }
}

/// Scalers keyed by feature column name
#[derive(Debug, Clone, Default)]
pub struct FeatureScalers {
    scalers: HashMap<String, StandardScaler>,
}

impl FeatureScalers {
    pub fn new(scalers: HashMap<String, StandardScaler>) -> Self {
        for name in FEATURE_COLUMNS {
            if !scalers.contains_key(name) {
                warn!(feature = name, "No scaler for feature, using raw values");
            }
        }
        Self { scalers }
    }

    /// Read `{"Wspd": {"mean": .., "scale": ..}, ...}`
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let scalers: HashMap<String, StandardScaler> = serde_json::from_str(raw)
            .map_err(|e| EnvError::Prediction(format!("invalid scalers file: {}", e)))?;
        Ok(Self::new(scalers))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn get(&self, feature: &str) -> Option<&StandardScaler> {
        self.scalers.get(feature)
    }

    pub fn normalize_row(&self, row: &FeatureRow) -> FeatureRow {
        let mut out = *row;
        for (value, name) in out.iter_mut().zip(FEATURE_COLUMNS) {
            if let Some(scaler) = self.scalers.get(name) {
                *value = scaler.transform(*value);
            }
        }
        out
    }

    /// Map normalized target values back to kW
    pub fn denormalize_target(&self, values: &[f32]) -> Vec<f32> {
        match self.scalers.get(TARGET_FEATURE) {
            Some(scaler) => values.iter().map(|&v| scaler.inverse_transform(v)).collect(),
            None => values.to_vec(),
        }
    }
}
