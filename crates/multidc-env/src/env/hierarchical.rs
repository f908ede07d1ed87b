//! Reset/step state machine over the remote simulation

use super::masking::{compute_mask, ActionMask, MaskDecision};
use super::padding::{pad, pad_local, remap_local_action, trim, truncate_global_actions};
use super::HierarchicalEnvironment;
use crate::config::EnvConfig;
use crate::error::{EnvError, ParsePhase, Result};
use crate::gateway::{Connector, GatewayShutdown, GrpcConnector, SimulationBackend};
use crate::models::{
    DatacenterLayout, EpisodeState, GlobalObservation, HierarchicalAction,
    HierarchicalObservation, HierarchicalRewards, HierarchicalTransition, Info, LocalObservation,
    Transition, PES_DISTRIBUTION_BINS,
};
use crate::observability::{EnvMetrics, EpisodeLogger};
use crate::proto;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The hierarchical multi-datacenter environment
///
/// Calls must be sequential: `reset()` once, then `step()` repeatedly.
/// The connection is opened lazily on the first `reset()` and must be
/// released with `close()`.
pub struct HierarchicalEnv {
    config: EnvConfig,
    layout: DatacenterLayout,
    connector: Box<dyn Connector>,
    backend: Option<Box<dyn SimulationBackend>>,
    shutdown: GatewayShutdown,
    episode: EpisodeState,
    last_observation: Option<HierarchicalObservation>,
    metrics: EnvMetrics,
    logger: EpisodeLogger,
}

impl HierarchicalEnv {
    /// Environment talking to the gRPC gateway named in the configuration
    pub fn new(config: EnvConfig) -> Result<Self> {
        let connector = GrpcConnector::from_config(&config);
        Self::with_connector(config, Box::new(connector))
    }

    pub fn with_connector(config: EnvConfig, connector: Box<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        info!(
            num_datacenters = layout.len(),
            max_hosts = layout.max_hosts(),
            max_vms = layout.max_vms(),
            batch_size = config.routing_batch_size(),
            gateway = %connector.target(),
            "Hierarchical environment created"
        );
        Ok(Self {
            config,
            layout,
            connector,
            backend: None,
            shutdown: GatewayShutdown::new(),
            episode: EpisodeState::default(),
            last_observation: None,
            metrics: EnvMetrics::new(),
            logger: EpisodeLogger::new("hierarchical"),
        })
    }

    /// Share a gateway shutdown guard with other environments on the same gateway
    pub fn with_shutdown(mut self, shutdown: GatewayShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    /// Observation cached by the last reset or step
    pub fn last_observation(&self) -> Option<&HierarchicalObservation> {
        self.last_observation.as_ref()
    }

    fn connect_with_retries(&self) -> Result<Box<dyn SimulationBackend>> {
        let max_retries = self.config.gateway_max_retries;
        let mut last_error = String::new();

        for attempt in 1..=max_retries {
            match self.connector.connect() {
                Ok(backend) => {
                    info!(
                        gateway = %self.connector.target(),
                        attempt = attempt,
                        "Connected to simulation"
                    );
                    return Ok(backend);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < max_retries {
                        warn!(
                            error = %e,
                            attempt = attempt,
                            max_retries = max_retries,
                            retry_delay_secs = self.config.gateway_retry_delay,
                            "Simulation gateway not reachable, retrying"
                        );
                        std::thread::sleep(self.config.retry_delay());
                    }
                }
            }
        }

        error!(
            port = self.connector.port(),
            attempts = max_retries,
            "Max retries reached, could not connect to simulation gateway"
        );
        Err(EnvError::Connection {
            port: self.connector.port(),
            attempts: max_retries,
            message: last_error,
        })
    }

    /// Connect and configure if not connected yet
    fn ensure_connected(&mut self) -> Result<&mut Box<dyn SimulationBackend>> {
        if self.backend.is_none() {
            let mut backend = self.connect_with_retries()?;
            let payload = self.config.to_simulator_json()?;
            if let Err(e) = backend.configure(&payload) {
                error!(error = %e, "Failed to configure simulation");
                if let Err(close_err) = backend.close() {
                    warn!(error = %close_err, "Error closing connection after configure failure");
                }
                return Err(EnvError::Configuration(e.to_string()));
            }
            debug!("Simulation configured");
            self.backend = Some(backend);
        }
        self.backend.as_mut().ok_or(EnvError::NotInitialized)
    }

    fn validate_action(&self, action: &HierarchicalAction) -> Result<()> {
        let num_dcs = self.layout.len() as i64;
        let batch_size = self.config.routing_batch_size();

        if action.global.len() > batch_size {
            return Err(EnvError::action(format!(
                "global action has {} routing decisions, batch size is {}",
                action.global.len(),
                batch_size
            )));
        }
        if let Some((slot, dc)) = action
            .global
            .iter()
            .enumerate()
            .find(|&(_, &dc)| dc < 0 || dc >= num_dcs)
        {
            return Err(EnvError::action(format!(
                "global action slot {} routes to datacenter {}, expected 0..{}",
                slot, dc, num_dcs
            )));
        }

        for (&dc_id, &local) in &action.local {
            let dc = self.layout.get(dc_id).ok_or_else(|| {
                EnvError::action(format!("local action for unknown datacenter {}", dc_id))
            })?;
            if local < 0 || local > dc.vm_count as i64 {
                return Err(EnvError::action(format!(
                    "local action {} for datacenter {} outside 0..={}",
                    local, dc_id, dc.vm_count
                )));
            }
        }
        Ok(())
    }

    fn parse_global(
        &self,
        raw: Option<proto::GlobalObservation>,
        phase: ParsePhase,
    ) -> Result<GlobalObservation> {
        let raw = raw.ok_or_else(|| parse_error(phase, "missing global observation"))?;
        let n = self.layout.len();
        let batch = self.config.routing_batch_size();

        let per_dc = [
            ("dc_current_green_power_w", raw.dc_current_green_power_w.len()),
            ("dc_current_power_w", raw.dc_current_power_w.len()),
            ("dc_green_ratio", raw.dc_green_ratio.len()),
            ("dc_cumulative_wasted_green_wh", raw.dc_cumulative_wasted_green_wh.len()),
            ("dc_queue_sizes", raw.dc_queue_sizes.len()),
            ("dc_utilizations", raw.dc_utilizations.len()),
            ("dc_available_pes", raw.dc_available_pes.len()),
            ("dc_ram_utilizations", raw.dc_ram_utilizations.len()),
        ];
        if let Some((key, len)) = per_dc.iter().find(|(_, len)| *len != n) {
            return Err(parse_error(
                phase,
                format!("{} has {} entries, expected {}", key, len, n),
            ));
        }

        Ok(GlobalObservation {
            dc_current_green_power_w: raw.dc_current_green_power_w,
            dc_current_power_w: raw.dc_current_power_w,
            dc_green_ratio: raw.dc_green_ratio,
            dc_cumulative_wasted_green_wh: raw.dc_cumulative_wasted_green_wh,
            dc_queue_sizes: raw.dc_queue_sizes,
            dc_utilizations: raw.dc_utilizations,
            dc_available_pes: raw.dc_available_pes,
            dc_ram_utilizations: raw.dc_ram_utilizations,
            upcoming_cloudlets_count: raw.upcoming_cloudlets_count,
            batch_cloudlet_pes: pad(&raw.batch_cloudlet_pes, batch, 0),
            batch_cloudlet_mi: pad(&raw.batch_cloudlet_mi, batch, 0),
            upcoming_pes_distribution: pad(&raw.upcoming_pes_distribution, PES_DISTRIBUTION_BINS, 0),
            load_imbalance: raw.load_imbalance,
            recent_completed: raw.recent_completed,
            simulation_time: raw.simulation_time,
            dc_predicted_green_power_w: None,
        })
    }

    fn parse_local(
        &self,
        raw: HashMap<i32, proto::LocalObservation>,
        phase: ParsePhase,
    ) -> Result<BTreeMap<usize, LocalObservation>> {
        let mut local = BTreeMap::new();
        for (raw_id, obs) in raw {
            let Some(dc) = usize::try_from(raw_id).ok().and_then(|id| self.layout.get(id)) else {
                warn!(dc_id = raw_id, "Local observation for unknown datacenter, skipping");
                continue;
            };

            let short = [
                ("host_loads", obs.host_loads.len(), dc.host_count),
                ("host_ram_usage", obs.host_ram_usage.len(), dc.host_count),
                ("vm_loads", obs.vm_loads.len(), dc.vm_count),
                ("vm_types", obs.vm_types.len(), dc.vm_count),
                ("vm_available_pes", obs.vm_available_pes.len(), dc.vm_count),
            ];
            if let Some((key, len, expected)) = short.iter().find(|(_, len, expected)| len < expected) {
                return Err(parse_error(
                    phase,
                    format!(
                        "datacenter {} {} has {} entries, expected {}",
                        dc.id, key, len, expected
                    ),
                ));
            }

            // Cut anything the simulator sent beyond the true size, then pad to the shared size
            let exact = LocalObservation {
                host_loads: trim(&obs.host_loads, dc.host_count),
                host_ram_usage: trim(&obs.host_ram_usage, dc.host_count),
                vm_loads: trim(&obs.vm_loads, dc.vm_count),
                vm_types: trim(&obs.vm_types, dc.vm_count),
                vm_available_pes: trim(&obs.vm_available_pes, dc.vm_count),
                waiting_cloudlets: obs.waiting_cloudlets,
                next_cloudlet_pes: obs.next_cloudlet_pes,
            };
            local.insert(
                dc.id,
                pad_local(&exact, self.layout.max_hosts(), self.layout.max_vms()),
            );
        }

        for dc in self.layout.iter() {
            if !local.contains_key(&dc.id) {
                warn!(dc_id = dc.id, "No local observation for datacenter");
            }
        }
        Ok(local)
    }

    fn parse_rewards(&self, global: f64, raw: &HashMap<i32, f64>) -> Result<HierarchicalRewards> {
        if !global.is_finite() {
            return Err(EnvError::step_parse(format!("non-finite global reward {}", global)));
        }
        let mut local: BTreeMap<usize, f64> = self.layout.ids().map(|id| (id, 0.0)).collect();
        for (&raw_id, &reward) in raw {
            match usize::try_from(raw_id).ok().and_then(|id| local.get_mut(&id)) {
                Some(slot) => *slot = reward,
                None => warn!(dc_id = raw_id, "Local reward for unknown datacenter, ignoring"),
            }
        }
        Ok(HierarchicalRewards { global, local })
    }

    fn waiting_count(&mut self) -> usize {
        let Some(backend) = self.backend.as_mut() else {
            return 0;
        };
        match backend.global_waiting_cloudlets_count() {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "Failed to get global waiting cloudlets count, assuming 0");
                0
            }
        }
    }
}

fn parse_error(phase: ParsePhase, detail: impl Into<String>) -> EnvError {
    EnvError::ResultParse {
        phase,
        detail: detail.into(),
    }
}

fn parse_info(raw: &str, phase: ParsePhase) -> Result<Info> {
    if raw.trim().is_empty() {
        return Ok(Info::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(parse_error(
            phase,
            format!("info must be a JSON object, got {}", other),
        )),
        Err(e) => Err(parse_error(phase, format!("invalid info JSON: {}", e))),
    }
}

impl HierarchicalEnvironment for HierarchicalEnv {
    fn layout(&self) -> &DatacenterLayout {
        &self.layout
    }

    fn batch_size(&self) -> usize {
        self.config.routing_batch_size()
    }

    fn reset(&mut self, seed: Option<i64>) -> Result<(HierarchicalObservation, Info)> {
        let seed = seed.unwrap_or(0);
        let raw = self
            .ensure_connected()?
            .reset(seed)
            .map_err(|e| EnvError::ResetExecution(e.to_string()))?;

        let observation = HierarchicalObservation {
            global: self.parse_global(raw.global_observation, ParsePhase::Reset)?,
            local: self.parse_local(raw.local_observations, ParsePhase::Reset)?,
        };
        let info = parse_info(&raw.info_json, ParsePhase::Reset)?;

        self.episode.reset();
        self.last_observation = Some(observation.clone());
        self.metrics.inc_resets();
        self.logger.log_reset(seed, self.layout.len());
        Ok((observation, info))
    }

    fn step(&mut self, action: &HierarchicalAction) -> Result<HierarchicalTransition> {
        if self.backend.is_none() {
            return Err(EnvError::NotInitialized);
        }
        let start = Instant::now();
        self.validate_action(action)?;

        let waiting = self.waiting_count();
        let routed = truncate_global_actions(&action.global, waiting);
        if routed.len() < action.global.len() {
            debug!(
                requested = action.global.len(),
                waiting = waiting,
                "Truncated global actions to waiting cloudlets"
            );
        }

        // Values are range-checked above, so the narrowing is exact
        let global_wire: Vec<i32> = routed.iter().map(|&dc| dc as i32).collect();
        let local_wire: HashMap<i32, i32> = action
            .local
            .iter()
            .map(|(&dc, &a)| (dc as i32, remap_local_action(a) as i32))
            .collect();

        let backend = self.backend.as_mut().ok_or(EnvError::NotInitialized)?;
        let raw = backend.step(global_wire, local_wire).map_err(|e| {
            error!(error = %e, "Failed to execute step in simulation");
            EnvError::StepExecution(e.to_string())
        })?;

        let observation = HierarchicalObservation {
            global: self.parse_global(raw.global_observation, ParsePhase::Step)?,
            local: self.parse_local(raw.local_observations, ParsePhase::Step)?,
        };
        let rewards = self.parse_rewards(raw.global_reward, &raw.local_rewards)?;
        let mut info = parse_info(&raw.info_json, ParsePhase::Step)?;
        let (terminated, truncated) = (raw.terminated, raw.truncated);

        self.episode.record(rewards.global, terminated || truncated);
        info.insert("episode_step".into(), Value::from(self.episode.current_step));
        info.insert("episode_reward".into(), Value::from(self.episode.episode_reward));
        self.last_observation = Some(observation.clone());

        self.metrics.observe_step_latency(start.elapsed().as_secs_f64());
        self.logger
            .log_step(self.episode.current_step, rewards.global, terminated, truncated);
        if self.episode.done {
            self.metrics.record_episode_end(self.episode.episode_reward);
        }

        Ok(Transition {
            observation,
            rewards,
            terminated,
            truncated,
            info,
        })
    }

    fn local_action_mask(&self, dc_id: usize) -> ActionMask {
        let shared = self.layout.max_action_count();
        let Some(dc) = self.layout.get(dc_id) else {
            warn!(dc_id = dc_id, "Cannot generate mask for unknown datacenter, allowing all actions");
            self.metrics.inc_mask_decision(MaskDecision::FailOpen);
            return ActionMask::fail_open(shared);
        };
        let Some(obs) = self
            .last_observation
            .as_ref()
            .and_then(|o| o.local.get(&dc_id))
        else {
            warn!(dc_id = dc_id, "No observation for datacenter yet, allowing all actions");
            self.metrics.inc_mask_decision(MaskDecision::FailOpen);
            return ActionMask::fail_open(shared);
        };

        let vm_pes = trim(&obs.vm_available_pes, dc.vm_count);
        let mask = compute_mask(obs.waiting_cloudlets, obs.next_cloudlet_pes, &vm_pes);
        self.metrics.inc_mask_decision(mask.decision);
        mask.padded(shared)
    }

    fn episode(&self) -> &EpisodeState {
        &self.episode
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };
        info!("Closing hierarchical environment");

        if let Err(e) = backend.close() {
            warn!(error = %e, "Error closing simulation environment");
        }

        if self.shutdown.try_begin_close() {
            let result = backend.shutdown_gateway();
            if let Err(e) = &result {
                warn!(error = %e, "Error shutting down simulation gateway");
            }
            self.logger
                .log_gateway_closed(&self.connector.target(), result.is_ok());
        } else {
            debug!("Simulation gateway already shut down");
        }

        self.last_observation = None;
        Ok(())
    }
}
