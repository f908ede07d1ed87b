//! Observation and action space descriptors

use crate::models::{DatacenterDescriptor, DatacenterLayout, PES_DISTRIBUTION_BINS};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

/// Element type of a box space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DType {
    F32,
    I32,
    I64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Space {
    /// Integers `0..n`
    Discrete(usize),
    /// One `Discrete(n_i)` per position
    MultiDiscrete(Vec<usize>),
    Box {
        low: f64,
        high: f64,
        shape: Vec<usize>,
        dtype: DType,
    },
    Dict(BTreeMap<String, Space>),
}

impl Space {
    pub fn boxed(low: f64, high: f64, shape: &[usize], dtype: DType) -> Self {
        Space::Box {
            low,
            high,
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// Number of scalars after flattening
    pub fn flat_dim(&self) -> usize {
        match self {
            Space::Discrete(_) => 1,
            Space::MultiDiscrete(nvec) => nvec.len(),
            Space::Box { shape, .. } => shape.iter().product(),
            Space::Dict(spaces) => spaces.values().map(Space::flat_dim).sum(),
        }
    }

    /// Whether a discrete action belongs to this space
    pub fn contains_discrete(&self, action: i64) -> bool {
        match self {
            Space::Discrete(n) => action >= 0 && (action as usize) < *n,
            _ => false,
        }
    }

    /// Whether a multi-discrete action belongs to this space
    pub fn contains_multi(&self, actions: &[i64]) -> bool {
        match self {
            Space::MultiDiscrete(nvec) => {
                nvec.len() == actions.len()
                    && nvec
                        .iter()
                        .zip(actions)
                        .all(|(&n, &a)| a >= 0 && (a as usize) < n)
            }
            _ => false,
        }
    }

    /// Uniform sample of a discrete space
    pub fn sample_discrete<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<i64> {
        match self {
            Space::Discrete(n) if *n > 0 => Some(rng.gen_range(0..*n) as i64),
            _ => None,
        }
    }

    /// Uniform sample of a multi-discrete space
    pub fn sample_multi<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Vec<i64>> {
        match self {
            Space::MultiDiscrete(nvec) if nvec.iter().all(|&n| n > 0) => Some(
                nvec.iter()
                    .map(|&n| rng.gen_range(0..n) as i64)
                    .collect(),
            ),
            _ => None,
        }
    }
}

fn dict(entries: Vec<(&str, Space)>) -> Space {
    Space::Dict(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

/// Global observation space; `forecast_horizon` adds the prediction tensor
pub fn global_observation_space(
    num_datacenters: usize,
    batch_size: usize,
    forecast_horizon: Option<usize>,
) -> Space {
    let n = [num_datacenters];
    let b = [batch_size];
    let mut entries = vec![
        ("dc_current_green_power_w", Space::boxed(0.0, 5e6, &n, DType::F32)),
        ("dc_current_power_w", Space::boxed(0.0, 1e4, &n, DType::F32)),
        ("dc_green_ratio", Space::boxed(0.0, 1.0, &n, DType::F32)),
        ("dc_cumulative_wasted_green_wh", Space::boxed(0.0, 1e6, &n, DType::F32)),
        ("dc_queue_sizes", Space::boxed(0.0, 1e4, &n, DType::I32)),
        ("dc_utilizations", Space::boxed(0.0, 1.0, &n, DType::F32)),
        ("dc_available_pes", Space::boxed(0.0, 1e3, &n, DType::I32)),
        ("dc_ram_utilizations", Space::boxed(0.0, 1.0, &n, DType::F32)),
        ("upcoming_cloudlets_count", Space::Discrete(1000)),
        ("batch_cloudlet_pes", Space::boxed(0.0, 100.0, &b, DType::I32)),
        ("batch_cloudlet_mi", Space::boxed(0.0, 1e6, &b, DType::I64)),
        (
            "upcoming_pes_distribution",
            Space::boxed(0.0, 1e3, &[PES_DISTRIBUTION_BINS], DType::I32),
        ),
        ("load_imbalance", Space::boxed(0.0, 10.0, &[1], DType::F32)),
        ("recent_completed", Space::Discrete(10000)),
        ("simulation_time", Space::boxed(0.0, f64::MAX, &[1], DType::F32)),
    ];
    if let Some(horizon) = forecast_horizon {
        entries.push((
            crate::models::PREDICTED_GREEN_POWER_KEY,
            Space::boxed(0.0, 1e6, &[num_datacenters, horizon], DType::F32),
        ));
    }
    dict(entries)
}

/// Local observation space for the given vector sizes
pub fn local_observation_space(host_count: usize, vm_count: usize) -> Space {
    dict(vec![
        ("host_loads", Space::boxed(0.0, 1.0, &[host_count], DType::F32)),
        ("host_ram_usage", Space::boxed(0.0, 1.0, &[host_count], DType::F32)),
        ("vm_loads", Space::boxed(0.0, 1.0, &[vm_count], DType::F32)),
        ("vm_types", Space::boxed(0.0, 3.0, &[vm_count], DType::I32)),
        ("vm_available_pes", Space::boxed(0.0, 100.0, &[vm_count], DType::I32)),
        ("waiting_cloudlets", Space::Discrete(10000)),
        ("next_cloudlet_pes", Space::Discrete(100)),
    ])
}

/// Shared local observation space (padded to the largest datacenter)
pub fn shared_local_observation_space(layout: &DatacenterLayout) -> Space {
    local_observation_space(layout.max_hosts(), layout.max_vms())
}

/// One routing decision per batch slot, each a datacenter index
pub fn global_action_space(num_datacenters: usize, batch_size: usize) -> Space {
    Space::MultiDiscrete(vec![num_datacenters; batch_size])
}

/// Local action space of one datacenter (`vm_count + 1`, 0 = no assignment)
pub fn local_action_space(dc: &DatacenterDescriptor) -> Space {
    Space::Discrete(dc.action_count())
}

/// Local action space shared by all datacenters
pub fn shared_local_action_space(layout: &DatacenterLayout) -> Space {
    Space::Discrete(layout.max_action_count())
}
