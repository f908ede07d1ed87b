//! Environment configuration
//!
//! The configuration is read once at the environment boundary and validated
//! before any connection is attempted. Keys the environment does not model
//! are kept and forwarded to the simulator untouched.

use crate::error::{EnvError, Result};
use crate::models::{DatacenterDescriptor, DatacenterLayout};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Prefix for environment variable overrides (`MULTIDC_GATEWAY_PORT=...`)
pub const ENV_PREFIX: &str = "MULTIDC";

pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Datacenter definition as sent to the simulator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatacenterConfig {
    pub datacenter_id: usize,

    #[serde(default = "default_hosts_count")]
    pub hosts_count: usize,

    #[serde(default = "default_s_vms")]
    pub initial_s_vm_count: usize,

    #[serde(default = "default_m_vms")]
    pub initial_m_vm_count: usize,

    #[serde(default = "default_l_vms")]
    pub initial_l_vm_count: usize,

    /// Simulator-specific keys (energy traces, host specs, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatacenterConfig {
    pub fn new(datacenter_id: usize, hosts_count: usize, s: usize, m: usize, l: usize) -> Self {
        Self {
            datacenter_id,
            hosts_count,
            initial_s_vm_count: s,
            initial_m_vm_count: m,
            initial_l_vm_count: l,
            extra: Map::new(),
        }
    }

    pub fn vm_count(&self) -> usize {
        self.initial_s_vm_count + self.initial_m_vm_count + self.initial_l_vm_count
    }
}

fn default_hosts_count() -> usize {
    16
}

fn default_s_vms() -> usize {
    10
}

fn default_m_vms() -> usize {
    5
}

fn default_l_vms() -> usize {
    3
}

/// Turbine CSV locations, either `{id: path}` or `[{id: path}, ...]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TurbineCsvPaths {
    Map(BTreeMap<String, PathBuf>),
    List(Vec<BTreeMap<String, PathBuf>>),
}

impl TurbineCsvPaths {
    fn entries(&self) -> Vec<(&String, &PathBuf)> {
        match self {
            TurbineCsvPaths::Map(map) => map.iter().collect(),
            TurbineCsvPaths::List(list) => list.iter().flat_map(|m| m.iter()).collect(),
        }
    }
}

/// Wind power forecast settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindPredictionConfig {
    #[serde(default)]
    pub enabled: bool,

    /// ONNX export of the forecasting model
    #[serde(default)]
    pub model_checkpoint: Option<PathBuf>,

    /// Per-feature standard scalers (JSON)
    #[serde(default)]
    pub scalers_path: Option<PathBuf>,

    /// Directory holding `turbine_NNN.csv` traces
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    /// Turbine assigned to each datacenter, by datacenter index
    #[serde(default)]
    pub turbine_ids: Vec<u32>,

    #[serde(default)]
    pub turbine_csv_paths: Option<TurbineCsvPaths>,

    #[serde(default = "default_horizon")]
    pub horizon: usize,

    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_csv_start_offset")]
    pub csv_start_offset: usize,

    #[serde(default = "default_history_length")]
    pub history_length: usize,
}

impl Default for WindPredictionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_checkpoint: None,
            scalers_path: None,
            data_path: None,
            turbine_ids: Vec::new(),
            turbine_csv_paths: None,
            horizon: default_horizon(),
            device: default_device(),
            csv_start_offset: default_csv_start_offset(),
            history_length: default_history_length(),
        }
    }
}

fn default_horizon() -> usize {
    8
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_csv_start_offset() -> usize {
    12
}

fn default_history_length() -> usize {
    12
}

impl WindPredictionConfig {
    /// Resolve the CSV trace for every configured turbine
    pub fn resolved_csv_paths(&self) -> Result<BTreeMap<u32, PathBuf>> {
        let mut paths = BTreeMap::new();
        if let Some(explicit) = &self.turbine_csv_paths {
            for (key, path) in explicit.entries() {
                let turbine_id: u32 = key.trim().parse().map_err(|_| {
                    EnvError::invalid_config(format!("turbine id '{}' is not an integer", key))
                })?;
                paths.insert(turbine_id, path.clone());
            }
        }

        for &turbine_id in &self.turbine_ids {
            if paths.contains_key(&turbine_id) {
                continue;
            }
            match &self.data_path {
                Some(dir) => {
                    paths.insert(turbine_id, dir.join(format!("turbine_{:03}.csv", turbine_id)));
                }
                None => {
                    return Err(EnvError::invalid_config(format!(
                        "no CSV path for turbine {} and no data_path to resolve it",
                        turbine_id
                    )))
                }
            }
        }
        Ok(paths)
    }

    fn validate(&self, num_datacenters: usize) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.turbine_ids.len() != num_datacenters {
            return Err(EnvError::invalid_config(format!(
                "wind_prediction.turbine_ids has {} entries, expected one per datacenter ({})",
                self.turbine_ids.len(),
                num_datacenters
            )));
        }
        if self.horizon == 0 || self.history_length == 0 {
            return Err(EnvError::invalid_config(
                "wind_prediction.horizon and history_length must be positive",
            ));
        }
        self.resolved_csv_paths()?;
        Ok(())
    }
}

/// Full environment configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvConfig {
    #[serde(default = "default_datacenters")]
    pub datacenters: Vec<DatacenterConfig>,

    /// Cloudlets routed by the global agent per step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_routing_batch_size: Option<usize>,

    /// Deprecated name for `global_routing_batch_size`
    #[serde(default, skip_serializing)]
    pub max_arriving_cloudlets: Option<usize>,

    #[serde(default = "default_gateway_host")]
    pub gateway_host: String,

    #[serde(default = "default_gateway_port", alias = "py4j_port")]
    pub gateway_port: u16,

    #[serde(default = "default_max_retries")]
    pub gateway_max_retries: u32,

    /// Seconds between connection attempts
    #[serde(default = "default_retry_delay")]
    pub gateway_retry_delay: f64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_prediction: Option<WindPredictionConfig>,

    /// Everything else is passed through to the simulator
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_datacenters() -> Vec<DatacenterConfig> {
    vec![DatacenterConfig::new(
        0,
        default_hosts_count(),
        default_s_vms(),
        default_m_vms(),
        default_l_vms(),
    )]
}

fn default_gateway_host() -> String {
    "localhost".to_string()
}

fn default_gateway_port() -> u16 {
    25333
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> f64 {
    5.0
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            datacenters: default_datacenters(),
            global_routing_batch_size: None,
            max_arriving_cloudlets: None,
            gateway_host: default_gateway_host(),
            gateway_port: default_gateway_port(),
            gateway_max_retries: default_max_retries(),
            gateway_retry_delay: default_retry_delay(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            wind_prediction: None,
            extra: Map::new(),
        }
    }
}

impl EnvConfig {
    /// Load from an optional file, layered with `MULTIDC_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EnvError::invalid_config(e.to_string()))?;

        let config: EnvConfig = settings
            .try_deserialize()
            .map_err(|e| EnvError::invalid_config(e.to_string()))?;
        config.normalized()
    }

    /// Build from an in-memory JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        let config: EnvConfig =
            serde_json::from_value(value).map_err(|e| EnvError::invalid_config(e.to_string()))?;
        config.normalized()
    }

    fn normalized(mut self) -> Result<Self> {
        if self.global_routing_batch_size.is_none() {
            if let Some(legacy) = self.max_arriving_cloudlets.take() {
                warn!(
                    max_arriving_cloudlets = legacy,
                    "max_arriving_cloudlets is deprecated, use global_routing_batch_size"
                );
                self.global_routing_batch_size = Some(legacy);
            }
        }
        self.max_arriving_cloudlets = None;
        self.validate()?;
        Ok(self)
    }

    pub fn routing_batch_size(&self) -> usize {
        self.global_routing_batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.gateway_retry_delay.max(0.0))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.gateway_host, self.gateway_port)
    }

    /// Prediction settings, only when enabled
    pub fn active_wind_prediction(&self) -> Option<&WindPredictionConfig> {
        self.wind_prediction.as_ref().filter(|w| w.enabled)
    }

    /// Reject configurations the environment cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.datacenters.is_empty() {
            return Err(EnvError::invalid_config("at least one datacenter is required"));
        }

        let mut seen = HashSet::new();
        for (index, dc) in self.datacenters.iter().enumerate() {
            if !seen.insert(dc.datacenter_id) {
                return Err(EnvError::invalid_config(format!(
                    "duplicate datacenter_id {}",
                    dc.datacenter_id
                )));
            }
            if dc.datacenter_id != index {
                return Err(EnvError::invalid_config(format!(
                    "datacenter_id {} at position {}, ids must be 0..{} in order",
                    dc.datacenter_id,
                    index,
                    self.datacenters.len()
                )));
            }
            if dc.hosts_count == 0 {
                return Err(EnvError::invalid_config(format!(
                    "datacenter {} has no hosts",
                    dc.datacenter_id
                )));
            }
            if dc.vm_count() == 0 {
                return Err(EnvError::invalid_config(format!(
                    "datacenter {} has no VMs",
                    dc.datacenter_id
                )));
            }
        }

        if self.routing_batch_size() == 0 {
            return Err(EnvError::invalid_config(
                "global_routing_batch_size must be positive",
            ));
        }
        if self.gateway_max_retries == 0 {
            return Err(EnvError::invalid_config("gateway_max_retries must be at least 1"));
        }
        if !self.gateway_retry_delay.is_finite() || self.gateway_retry_delay < 0.0 {
            return Err(EnvError::invalid_config(
                "gateway_retry_delay must be a non-negative number of seconds",
            ));
        }

        if let Some(wind) = &self.wind_prediction {
            wind.validate(self.datacenters.len())?;
        }
        Ok(())
    }

    /// Datacenter size table
    pub fn layout(&self) -> DatacenterLayout {
        DatacenterLayout::new(
            self.datacenters
                .iter()
                .map(|dc| DatacenterDescriptor {
                    id: dc.datacenter_id,
                    host_count: dc.hosts_count,
                    vm_count: dc.vm_count(),
                })
                .collect(),
        )
    }

    /// JSON payload for the simulator's `configure` call
    pub fn to_simulator_json(&self) -> Result<String> {
        let mut value =
            serde_json::to_value(self).map_err(|e| EnvError::Configuration(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "global_routing_batch_size".to_string(),
                Value::from(self.routing_batch_size()),
            );
        }
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn two_dc_value() -> Value {
        json!({
            "datacenters": [
                {"datacenter_id": 0, "hosts_count": 4, "initial_s_vm_count": 1,
                 "initial_m_vm_count": 1, "initial_l_vm_count": 1},
                {"datacenter_id": 1, "hosts_count": 8, "initial_s_vm_count": 3,
                 "initial_m_vm_count": 1, "initial_l_vm_count": 1}
            ]
        })
    }

    #[test]
    fn test_defaults() {
        let config = EnvConfig::default();
        assert_eq!(config.gateway_port, 25333);
        assert_eq!(config.gateway_max_retries, 5);
        assert_eq!(config.routing_batch_size(), 5);
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.datacenters[0].vm_count(), 18);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_keys() {
        let mut value = two_dc_value();
        value["max_arriving_cloudlets"] = json!(7);
        value["py4j_port"] = json!(26000);
        let config = EnvConfig::from_value(value).unwrap();
        assert_eq!(config.routing_batch_size(), 7);
        assert_eq!(config.gateway_port, 26000);
    }

    #[test]
    fn test_new_batch_key_wins_over_legacy() {
        let mut value = two_dc_value();
        value["max_arriving_cloudlets"] = json!(7);
        value["global_routing_batch_size"] = json!(3);
        let config = EnvConfig::from_value(value).unwrap();
        assert_eq!(config.routing_batch_size(), 3);
    }

    #[test]
    fn test_layout_from_datacenters() {
        let config = EnvConfig::from_value(two_dc_value()).unwrap();
        let layout = config.layout();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.max_hosts(), 8);
        assert_eq!(layout.max_vms(), 5);
        assert_eq!(layout.get(0).map(|d| d.vm_count), Some(3));
    }

    #[test]
    fn test_rejects_out_of_order_ids() {
        let mut value = two_dc_value();
        value["datacenters"][1]["datacenter_id"] = json!(5);
        let err = EnvConfig::from_value(value).unwrap_err();
        assert!(matches!(err, EnvError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_empty_datacenter() {
        let mut value = two_dc_value();
        value["datacenters"][0]["initial_s_vm_count"] = json!(0);
        value["datacenters"][0]["initial_m_vm_count"] = json!(0);
        value["datacenters"][0]["initial_l_vm_count"] = json!(0);
        assert!(EnvConfig::from_value(value).is_err());
    }

    #[test]
    fn test_rejects_zero_retries() {
        let mut value = two_dc_value();
        value["gateway_max_retries"] = json!(0);
        assert!(EnvConfig::from_value(value).is_err());
    }

    #[test]
    fn test_extra_keys_forwarded_to_simulator() {
        let mut value = two_dc_value();
        value["simulation_timestep"] = json!(1.0);
        value["datacenters"][0]["green_energy_enabled"] = json!(true);
        let config = EnvConfig::from_value(value).unwrap();

        let payload: Value = serde_json::from_str(&config.to_simulator_json().unwrap()).unwrap();
        assert_eq!(payload["simulation_timestep"], json!(1.0));
        assert_eq!(payload["datacenters"][0]["green_energy_enabled"], json!(true));
        assert_eq!(payload["global_routing_batch_size"], json!(5));
    }

    #[test]
    fn test_wind_prediction_turbine_count_must_match() {
        let mut value = two_dc_value();
        value["wind_prediction"] = json!({
            "enabled": true,
            "turbine_ids": [1],
            "turbine_csv_paths": {"1": "/data/t1.csv"}
        });
        assert!(EnvConfig::from_value(value).is_err());
    }

    #[test]
    fn test_turbine_paths_accept_list_and_data_path() {
        let wind = WindPredictionConfig {
            enabled: true,
            turbine_ids: vec![1, 2],
            data_path: Some(PathBuf::from("/data/turbines")),
            turbine_csv_paths: Some(TurbineCsvPaths::List(vec![BTreeMap::from([(
                "1".to_string(),
                PathBuf::from("/custom/t1.csv"),
            )])])),
            ..Default::default()
        };
        let paths = wind.resolved_csv_paths().unwrap();
        assert_eq!(paths[&1], PathBuf::from("/custom/t1.csv"));
        assert_eq!(paths[&2], PathBuf::from("/data/turbines/turbine_002.csv"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{}", two_dc_value()).unwrap();

        let config = EnvConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.datacenters.len(), 2);
        assert_eq!(config.gateway_host, "localhost");
    }
}
