//! Scripted in-memory simulation
//!
//! A small deterministic stand-in for the remote simulator: cloudlets arrive
//! in a global queue, are routed to datacenter queues and assigned to VMs with
//! finite free PEs. Everything is driven by a seeded RNG so identical action
//! sequences produce identical trajectories.

use super::{Connector, RawResetResult, RawStepResult, SimulationBackend};
use crate::error::BackendError;
use crate::proto::{GlobalObservation, LocalObservation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

const MAX_CLOUDLET_PES: i32 = 4;
const MAX_VM_PES: i32 = 4;

/// Shape and failure injection for a scripted simulation
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// `(host_count, vm_count)` per datacenter
    pub datacenters: Vec<(usize, usize)>,
    pub batch_size: usize,
    /// Episode is truncated after this many steps
    pub episode_length: u64,
    pub reject_configure: bool,
    /// Step number (1-based) that fails remotely
    pub fail_step_at: Option<u64>,
    /// Drop the global observation from step results
    pub malformed_step_result: bool,
    pub fail_waiting_count: bool,
}

impl ScriptConfig {
    pub fn new(datacenters: Vec<(usize, usize)>, batch_size: usize) -> Self {
        Self {
            datacenters,
            batch_size,
            episode_length: 50,
            reject_configure: false,
            fail_step_at: None,
            malformed_step_result: false,
            fail_waiting_count: false,
        }
    }
}

/// Calls observed by every simulation a connector handed out
#[derive(Debug, Default, Clone)]
pub struct ScriptLog {
    pub connects: u32,
    pub configure_calls: u32,
    pub last_config_json: Option<String>,
    pub reset_seeds: Vec<i64>,
    pub steps: Vec<(Vec<i32>, HashMap<i32, i32>)>,
    pub waiting_count_calls: u32,
    pub close_calls: u32,
    pub shutdown_calls: u32,
}

#[derive(Debug, Clone, Copy)]
struct Cloudlet {
    pes: i32,
    mi: i64,
}

struct DatacenterState {
    host_count: usize,
    vm_available_pes: Vec<i32>,
    vm_types: Vec<i32>,
    queue: VecDeque<Cloudlet>,
}

pub struct ScriptedSimulation {
    config: ScriptConfig,
    log: Arc<Mutex<ScriptLog>>,
    rng: StdRng,
    step_count: u64,
    global_queue: VecDeque<Cloudlet>,
    datacenters: Vec<DatacenterState>,
    completed: i32,
}

impl ScriptedSimulation {
    pub fn new(config: ScriptConfig) -> Self {
        Self::with_log(config, Arc::new(Mutex::new(ScriptLog::default())))
    }

    fn with_log(config: ScriptConfig, log: Arc<Mutex<ScriptLog>>) -> Self {
        let mut sim = Self {
            config,
            log,
            rng: StdRng::seed_from_u64(0),
            step_count: 0,
            global_queue: VecDeque::new(),
            datacenters: Vec::new(),
            completed: 0,
        };
        sim.rebuild(0);
        sim
    }

    fn record(&self, f: impl FnOnce(&mut ScriptLog)) {
        if let Ok(mut log) = self.log.lock() {
            f(&mut log);
        }
    }

    fn rebuild(&mut self, seed: i64) {
        self.rng = StdRng::seed_from_u64(seed as u64);
        self.step_count = 0;
        self.completed = 0;
        self.global_queue.clear();

        let rng = &mut self.rng;
        self.datacenters = self
            .config
            .datacenters
            .iter()
            .map(|&(host_count, vm_count)| DatacenterState {
                host_count,
                vm_available_pes: (0..vm_count).map(|_| rng.gen_range(0..=MAX_VM_PES)).collect(),
                vm_types: (0..vm_count).map(|i| (i % 3) as i32 + 1).collect(),
                queue: VecDeque::new(),
            })
            .collect();
        self.arrivals();
    }

    fn arrivals(&mut self) {
        let count = self.rng.gen_range(0..=self.config.batch_size);
        for _ in 0..count {
            let cloudlet = Cloudlet {
                pes: self.rng.gen_range(1..=MAX_CLOUDLET_PES),
                mi: self.rng.gen_range(1_000..100_000),
            };
            self.global_queue.push_back(cloudlet);
        }
    }

    fn global_observation(&self) -> GlobalObservation {
        let n = self.datacenters.len();
        let batch: Vec<Cloudlet> = self
            .global_queue
            .iter()
            .take(self.config.batch_size)
            .copied()
            .collect();

        let mut distribution = vec![0; 3];
        for c in &self.global_queue {
            let bin = match c.pes {
                1..=2 => 0,
                3..=4 => 1,
                _ => 2,
            };
            distribution[bin] += 1;
        }

        let available: Vec<i32> = self
            .datacenters
            .iter()
            .map(|dc| dc.vm_available_pes.iter().sum())
            .collect();
        let utilizations: Vec<f32> = self
            .datacenters
            .iter()
            .map(|dc| {
                let capacity = (dc.vm_available_pes.len() as i32 * MAX_VM_PES).max(1);
                1.0 - dc.vm_available_pes.iter().sum::<i32>() as f32 / capacity as f32
            })
            .collect();
        let mean_util = utilizations.iter().sum::<f32>() / n.max(1) as f32;
        let imbalance = utilizations
            .iter()
            .map(|u| (u - mean_util).abs())
            .fold(0.0_f32, f32::max);

        GlobalObservation {
            dc_current_green_power_w: (0..n).map(|i| 1000.0 * (i as f32 + 1.0)).collect(),
            dc_current_power_w: utilizations.iter().map(|u| 500.0 + 1000.0 * u).collect(),
            dc_green_ratio: utilizations.iter().map(|u| 1.0 - u * 0.5).collect(),
            dc_cumulative_wasted_green_wh: vec![0.0; n],
            dc_queue_sizes: self.datacenters.iter().map(|dc| dc.queue.len() as i32).collect(),
            dc_utilizations: utilizations.clone(),
            dc_available_pes: available,
            dc_ram_utilizations: utilizations,
            upcoming_cloudlets_count: self.global_queue.len() as i32,
            batch_cloudlet_pes: batch.iter().map(|c| c.pes).collect(),
            batch_cloudlet_mi: batch.iter().map(|c| c.mi).collect(),
            upcoming_pes_distribution: distribution,
            load_imbalance: imbalance,
            recent_completed: self.completed,
            simulation_time: self.step_count as f64,
        }
    }

    fn local_observations(&self) -> HashMap<i32, LocalObservation> {
        self.datacenters
            .iter()
            .enumerate()
            .map(|(id, dc)| {
                let loads: Vec<f32> = dc
                    .vm_available_pes
                    .iter()
                    .map(|&p| 1.0 - p as f32 / MAX_VM_PES as f32)
                    .collect();
                let host_load = loads.iter().sum::<f32>() / loads.len().max(1) as f32;
                let obs = LocalObservation {
                    host_loads: vec![host_load; dc.host_count],
                    host_ram_usage: vec![host_load * 0.5; dc.host_count],
                    vm_loads: loads,
                    vm_types: dc.vm_types.clone(),
                    vm_available_pes: dc.vm_available_pes.clone(),
                    waiting_cloudlets: dc.queue.len() as i32,
                    next_cloudlet_pes: dc.queue.front().map(|c| c.pes).unwrap_or(0),
                };
                (id as i32, obs)
            })
            .collect()
    }

    fn info_json(&self) -> String {
        let green: f32 = self.global_observation().dc_green_ratio.iter().sum::<f32>()
            / self.datacenters.len().max(1) as f32;
        json!({
            "step": self.step_count,
            "global_energy_stats": {
                "green_energy_ratio": green,
                "total_brown_energy_wh": (1.0 - green) * 100.0,
                "total_wasted_green_wh": 0.0,
            }
        })
        .to_string()
    }
}

impl SimulationBackend for ScriptedSimulation {
    fn configure(&mut self, config_json: &str) -> Result<(), BackendError> {
        self.record(|log| {
            log.configure_calls += 1;
            log.last_config_json = Some(config_json.to_string());
        });
        if self.config.reject_configure {
            return Err(BackendError::Rejected("scripted configure rejection".to_string()));
        }
        Ok(())
    }

    fn reset(&mut self, seed: i64) -> Result<RawResetResult, BackendError> {
        self.record(|log| log.reset_seeds.push(seed));
        self.rebuild(seed);
        Ok(RawResetResult {
            global_observation: Some(self.global_observation()),
            local_observations: self.local_observations(),
            info_json: self.info_json(),
        })
    }

    fn step(
        &mut self,
        global_actions: Vec<i32>,
        local_actions: HashMap<i32, i32>,
    ) -> Result<RawStepResult, BackendError> {
        self.record(|log| log.steps.push((global_actions.clone(), local_actions.clone())));
        self.step_count += 1;
        if self.config.fail_step_at == Some(self.step_count) {
            return Err(BackendError::Rejected(format!(
                "scripted failure at step {}",
                self.step_count
            )));
        }

        let mut global_reward = 0.0;
        for &dc in &global_actions {
            let Some(cloudlet) = self.global_queue.pop_front() else {
                global_reward -= 0.5;
                continue;
            };
            match self.datacenters.get_mut(dc as usize) {
                Some(target) if dc >= 0 => {
                    target.queue.push_back(cloudlet);
                    global_reward += 0.1;
                }
                _ => {
                    self.global_queue.push_front(cloudlet);
                    global_reward -= 1.0;
                }
            }
        }

        let mut local_rewards = HashMap::new();
        for (id, dc) in self.datacenters.iter_mut().enumerate() {
            let vm = local_actions.get(&(id as i32)).copied().unwrap_or(-1);
            let reward = match (dc.queue.front().copied(), vm) {
                (None, -1) => 0.0,
                (None, _) => -0.1,
                (Some(_), -1) => -0.5,
                (Some(cloudlet), vm) => match dc.vm_available_pes.get_mut(vm as usize) {
                    Some(free) if vm >= 0 && *free >= cloudlet.pes => {
                        *free -= cloudlet.pes;
                        dc.queue.pop_front();
                        self.completed += 1;
                        1.0
                    }
                    Some(_) if vm >= 0 => {
                        dc.queue.pop_front();
                        -1.0
                    }
                    _ => -2.0,
                },
            };
            local_rewards.insert(id as i32, reward);

            for free in dc.vm_available_pes.iter_mut() {
                if *free < MAX_VM_PES {
                    *free += 1;
                }
            }
        }

        let backlog: usize = self.datacenters.iter().map(|dc| dc.queue.len()).sum();
        global_reward -= 0.01 * backlog as f64;
        self.arrivals();

        let truncated = self.step_count >= self.config.episode_length;
        let global_observation =
            (!self.config.malformed_step_result).then(|| self.global_observation());

        Ok(RawStepResult {
            global_observation,
            local_observations: self.local_observations(),
            global_reward,
            local_rewards,
            terminated: false,
            truncated,
            info_json: self.info_json(),
        })
    }

    fn global_waiting_cloudlets_count(&mut self) -> Result<usize, BackendError> {
        self.record(|log| log.waiting_count_calls += 1);
        if self.config.fail_waiting_count {
            return Err(BackendError::Unavailable("scripted waiting count failure".to_string()));
        }
        Ok(self.global_queue.len())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.record(|log| log.close_calls += 1);
        Ok(())
    }

    fn shutdown_gateway(&mut self) -> Result<(), BackendError> {
        self.record(|log| log.shutdown_calls += 1);
        Ok(())
    }
}

/// Connector handing out scripted simulations
///
/// The first `failures` connection attempts are refused.
pub struct ScriptedConnector {
    config: ScriptConfig,
    remaining_failures: AtomicU32,
    log: Arc<Mutex<ScriptLog>>,
}

impl ScriptedConnector {
    pub fn new(config: ScriptConfig) -> Self {
        Self {
            config,
            remaining_failures: AtomicU32::new(0),
            log: Arc::new(Mutex::new(ScriptLog::default())),
        }
    }

    pub fn failing(config: ScriptConfig, failures: u32) -> Self {
        let connector = Self::new(config);
        connector.remaining_failures.store(failures, Ordering::SeqCst);
        connector
    }

    /// Shared call log, readable after the connector moved into an environment
    pub fn log_handle(&self) -> Arc<Mutex<ScriptLog>> {
        Arc::clone(&self.log)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> Result<Box<dyn SimulationBackend>, BackendError> {
        if let Ok(mut log) = self.log.lock() {
            log.connects += 1;
        }
        let refused = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }
        Ok(Box::new(ScriptedSimulation::with_log(
            self.config.clone(),
            Arc::clone(&self.log),
        )))
    }

    fn port(&self) -> u16 {
        0
    }

    fn target(&self) -> String {
        "scripted://in-memory".to_string()
    }
}
