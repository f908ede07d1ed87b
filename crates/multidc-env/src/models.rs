//! Core data models for the hierarchical environment

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Auxiliary step/reset information forwarded from the simulator
pub type Info = Map<String, Value>;

/// Key under which the augmenter stores the forecast tensor
pub const PREDICTED_GREEN_POWER_KEY: &str = "dc_predicted_green_power_w";

/// Number of bins in `upcoming_pes_distribution`
pub const PES_DISTRIBUTION_BINS: usize = 3;

/// Static size of one datacenter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterDescriptor {
    pub id: usize,
    pub host_count: usize,
    pub vm_count: usize,
}

impl DatacenterDescriptor {
    /// Local action count: slot 0 is "no assignment", slot k is VM k-1
    pub fn action_count(&self) -> usize {
        self.vm_count + 1
    }
}

/// True sizes of every datacenter, indexed by datacenter id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatacenterLayout {
    datacenters: Vec<DatacenterDescriptor>,
    max_hosts: usize,
    max_vms: usize,
}

impl DatacenterLayout {
    /// Build from descriptors whose ids are their positions
    pub fn new(datacenters: Vec<DatacenterDescriptor>) -> Self {
        let max_hosts = datacenters.iter().map(|d| d.host_count).max().unwrap_or(0);
        let max_vms = datacenters.iter().map(|d| d.vm_count).max().unwrap_or(0);
        Self {
            datacenters,
            max_hosts,
            max_vms,
        }
    }

    pub fn len(&self) -> usize {
        self.datacenters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datacenters.is_empty()
    }

    pub fn get(&self, dc_id: usize) -> Option<&DatacenterDescriptor> {
        self.datacenters.get(dc_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatacenterDescriptor> {
        self.datacenters.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.datacenters.iter().map(|d| d.id)
    }

    pub fn max_hosts(&self) -> usize {
        self.max_hosts
    }

    pub fn max_vms(&self) -> usize {
        self.max_vms
    }

    /// Local action count in the shared (padded) schema
    pub fn max_action_count(&self) -> usize {
        self.max_vms + 1
    }
}

/// Simulation-wide view used by the global routing agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalObservation {
    pub dc_current_green_power_w: Vec<f32>,
    pub dc_current_power_w: Vec<f32>,
    pub dc_green_ratio: Vec<f32>,
    pub dc_cumulative_wasted_green_wh: Vec<f32>,
    pub dc_queue_sizes: Vec<i32>,
    pub dc_utilizations: Vec<f32>,
    pub dc_available_pes: Vec<i32>,
    pub dc_ram_utilizations: Vec<f32>,
    pub upcoming_cloudlets_count: i32,
    pub batch_cloudlet_pes: Vec<i32>,
    pub batch_cloudlet_mi: Vec<i64>,
    pub upcoming_pes_distribution: Vec<i32>,
    pub load_imbalance: f32,
    pub recent_completed: i32,
    pub simulation_time: f64,
    /// `(num_datacenters, horizon)` forecast, present when prediction is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc_predicted_green_power_w: Option<Vec<Vec<f32>>>,
}

/// Per-datacenter view used by a local assignment agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalObservation {
    pub host_loads: Vec<f32>,
    pub host_ram_usage: Vec<f32>,
    pub vm_loads: Vec<f32>,
    pub vm_types: Vec<i32>,
    pub vm_available_pes: Vec<i32>,
    pub waiting_cloudlets: i32,
    pub next_cloudlet_pes: i32,
}

/// Observation for both levels in the shared (padded) schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalObservation {
    pub global: GlobalObservation,
    pub local: BTreeMap<usize, LocalObservation>,
}

/// Decisions for both levels
///
/// `global` holds one datacenter index per routed cloudlet in arrival order.
/// `local` maps datacenter id to an action in `[0, vm_count]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchicalAction {
    pub global: Vec<i64>,
    pub local: BTreeMap<usize, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalRewards {
    pub global: f64,
    pub local: BTreeMap<usize, f64>,
}

impl HierarchicalRewards {
    /// Mean local reward, or `None` without local rewards
    pub fn mean_local(&self) -> Option<f64> {
        if self.local.is_empty() {
            None
        } else {
            Some(self.local.values().sum::<f64>() / self.local.len() as f64)
        }
    }
}

/// Result of one environment step
#[derive(Debug, Clone)]
pub struct Transition<O, R> {
    pub observation: O,
    pub rewards: R,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

impl<O, R> Transition<O, R> {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

pub type HierarchicalTransition = Transition<HierarchicalObservation, HierarchicalRewards>;

/// Episode bookkeeping, reset on `reset()` and advanced by `step()`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeState {
    pub current_step: u64,
    pub episode_reward: f64,
    pub done: bool,
}

impl EpisodeState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record(&mut self, reward: f64, done: bool) {
        self.current_step += 1;
        self.episode_reward += reward;
        self.done = done;
    }
}

/// Nested numeric observation used for flattening
#[derive(Debug, Clone, PartialEq)]
pub enum ObsValue {
    Scalar(f32),
    Vector(Vec<f32>),
    Matrix(Vec<Vec<f32>>),
    Dict(BTreeMap<String, ObsValue>),
}

impl ObsValue {
    /// Append every number, visiting dictionary keys in sorted order
    pub fn flatten_into(&self, out: &mut Vec<f32>) {
        match self {
            ObsValue::Scalar(v) => out.push(*v),
            ObsValue::Vector(values) => out.extend_from_slice(values),
            ObsValue::Matrix(rows) => rows.iter().for_each(|r| out.extend_from_slice(r)),
            ObsValue::Dict(map) => map.values().for_each(|v| v.flatten_into(out)),
        }
    }

    pub fn flatten(&self) -> Vec<f32> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }
}

fn ints(values: &[i32]) -> ObsValue {
    ObsValue::Vector(values.iter().map(|&v| v as f32).collect())
}

fn floats(values: &[f32]) -> ObsValue {
    ObsValue::Vector(values.to_vec())
}

impl GlobalObservation {
    pub fn to_obs_value(&self) -> ObsValue {
        let mut map = BTreeMap::new();
        map.insert("dc_current_green_power_w".into(), floats(&self.dc_current_green_power_w));
        map.insert("dc_current_power_w".into(), floats(&self.dc_current_power_w));
        map.insert("dc_green_ratio".into(), floats(&self.dc_green_ratio));
        map.insert(
            "dc_cumulative_wasted_green_wh".into(),
            floats(&self.dc_cumulative_wasted_green_wh),
        );
        map.insert("dc_queue_sizes".into(), ints(&self.dc_queue_sizes));
        map.insert("dc_utilizations".into(), floats(&self.dc_utilizations));
        map.insert("dc_available_pes".into(), ints(&self.dc_available_pes));
        map.insert("dc_ram_utilizations".into(), floats(&self.dc_ram_utilizations));
        map.insert(
            "upcoming_cloudlets_count".into(),
            ObsValue::Scalar(self.upcoming_cloudlets_count as f32),
        );
        map.insert("batch_cloudlet_pes".into(), ints(&self.batch_cloudlet_pes));
        map.insert(
            "batch_cloudlet_mi".into(),
            ObsValue::Vector(self.batch_cloudlet_mi.iter().map(|&v| v as f32).collect()),
        );
        map.insert("upcoming_pes_distribution".into(), ints(&self.upcoming_pes_distribution));
        map.insert("load_imbalance".into(), ObsValue::Scalar(self.load_imbalance));
        map.insert(
            "recent_completed".into(),
            ObsValue::Scalar(self.recent_completed as f32),
        );
        map.insert(
            "simulation_time".into(),
            ObsValue::Scalar(self.simulation_time as f32),
        );
        if let Some(forecast) = &self.dc_predicted_green_power_w {
            map.insert(PREDICTED_GREEN_POWER_KEY.into(), ObsValue::Matrix(forecast.clone()));
        }
        ObsValue::Dict(map)
    }
}

impl LocalObservation {
    pub fn to_obs_value(&self) -> ObsValue {
        let mut map = BTreeMap::new();
        map.insert("host_loads".into(), floats(&self.host_loads));
        map.insert("host_ram_usage".into(), floats(&self.host_ram_usage));
        map.insert("vm_loads".into(), floats(&self.vm_loads));
        map.insert("vm_types".into(), ints(&self.vm_types));
        map.insert("vm_available_pes".into(), ints(&self.vm_available_pes));
        map.insert(
            "waiting_cloudlets".into(),
            ObsValue::Scalar(self.waiting_cloudlets as f32),
        );
        map.insert(
            "next_cloudlet_pes".into(),
            ObsValue::Scalar(self.next_cloudlet_pes as f32),
        );
        ObsValue::Dict(map)
    }
}
