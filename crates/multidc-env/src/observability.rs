//! Observability for the environment
//!
//! Provides:
//! - Prometheus metrics (step and RPC latency, episode counters, mask outcomes, forecasts)
//! - Structured episode logging with tracing

use crate::env::MaskDecision;
use prometheus::{
    register_gauge, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Gauge, Histogram, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for step and RPC latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

static GLOBAL_METRICS: OnceLock<EnvMetricsInner> = OnceLock::new();

struct EnvMetricsInner {
    step_latency_seconds: Histogram,
    rpc_latency_seconds: HistogramVec,
    steps_total: IntCounter,
    resets_total: IntCounter,
    episodes_completed: IntCounter,
    mask_decisions: IntCounterVec,
    last_episode_reward: Gauge,
    forecasts_computed: IntCounter,
    forecast_failures: IntCounter,
}

impl EnvMetricsInner {
    fn new() -> Self {
        Self {
            step_latency_seconds: register_histogram!(
                "multidc_env_step_latency_seconds",
                "Wall time of one environment step including the simulator round trip",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register step_latency_seconds"),

            rpc_latency_seconds: register_histogram_vec!(
                "multidc_env_rpc_latency_seconds",
                "Simulation gateway call latency",
                &["method"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register rpc_latency_seconds"),

            steps_total: register_int_counter!(
                "multidc_env_steps_total",
                "Environment steps executed"
            )
            .expect("Failed to register steps_total"),

            resets_total: register_int_counter!(
                "multidc_env_resets_total",
                "Environment resets executed"
            )
            .expect("Failed to register resets_total"),

            episodes_completed: register_int_counter!(
                "multidc_env_episodes_completed_total",
                "Episodes that reached termination or truncation"
            )
            .expect("Failed to register episodes_completed"),

            mask_decisions: register_int_counter_vec!(
                "multidc_env_mask_decisions_total",
                "Local action masks computed, by policy branch",
                &["decision"]
            )
            .expect("Failed to register mask_decisions"),

            last_episode_reward: register_gauge!(
                "multidc_env_last_episode_reward",
                "Cumulative global reward of the last finished episode"
            )
            .expect("Failed to register last_episode_reward"),

            forecasts_computed: register_int_counter!(
                "multidc_env_forecasts_computed_total",
                "Wind power forecasts computed (cache misses)"
            )
            .expect("Failed to register forecasts_computed"),

            forecast_failures: register_int_counter!(
                "multidc_env_forecast_failures_total",
                "Wind power forecasts that fell back to zeros"
            )
            .expect("Failed to register forecast_failures"),
        }
    }
}

/// Handle to the process-wide environment metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct EnvMetrics {
    _private: (),
}

impl Default for EnvMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EnvMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EnvMetricsInner {
        GLOBAL_METRICS.get_or_init(EnvMetricsInner::new)
    }

    pub fn observe_step_latency(&self, duration_secs: f64) {
        self.inner().step_latency_seconds.observe(duration_secs);
        self.inner().steps_total.inc();
    }

    pub fn observe_rpc_latency(&self, method: &str, duration_secs: f64) {
        self.inner()
            .rpc_latency_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    pub fn inc_resets(&self) {
        self.inner().resets_total.inc();
    }

    pub fn record_episode_end(&self, episode_reward: f64) {
        self.inner().episodes_completed.inc();
        self.inner().last_episode_reward.set(episode_reward);
    }

    pub fn inc_mask_decision(&self, decision: MaskDecision) {
        self.inner()
            .mask_decisions
            .with_label_values(&[decision.as_str()])
            .inc();
    }

    pub fn inc_forecasts(&self) {
        self.inner().forecasts_computed.inc();
    }

    pub fn inc_forecast_failures(&self) {
        self.inner().forecast_failures.inc();
    }

    /// Steps recorded so far in this process
    pub fn steps_total(&self) -> u64 {
        self.inner().steps_total.get()
    }
}

/// Energy figures reported by the simulator at the end of an episode
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergySummary {
    pub green_energy_ratio: f64,
    pub brown_energy_wh: f64,
    pub wasted_green_wh: f64,
}

/// Structured logger for environment lifecycle events
#[derive(Clone)]
pub struct EpisodeLogger {
    env_name: String,
}

impl EpisodeLogger {
    pub fn new(env_name: impl Into<String>) -> Self {
        Self {
            env_name: env_name.into(),
        }
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn log_reset(&self, seed: i64, num_datacenters: usize) {
        info!(
            event = "env_reset",
            env = %self.env_name,
            seed = seed,
            num_datacenters = num_datacenters,
            "Environment reset"
        );
    }

    pub fn log_step(&self, step: u64, global_reward: f64, terminated: bool, truncated: bool) {
        debug!(
            event = "env_step",
            env = %self.env_name,
            step = step,
            global_reward = global_reward,
            terminated = terminated,
            truncated = truncated,
            "Environment step"
        );
    }

    /// Log an episode summary for one-level or two-level training
    pub fn log_episode_complete(
        &self,
        steps: u64,
        global_reward: f64,
        local_reward: Option<f64>,
        energy: &EnergySummary,
    ) {
        info!(
            event = "episode_complete",
            env = %self.env_name,
            steps = steps,
            global_reward = global_reward,
            local_reward = ?local_reward,
            green_energy_ratio = energy.green_energy_ratio,
            brown_energy_wh = energy.brown_energy_wh,
            wasted_green_wh = energy.wasted_green_wh,
            "Episode complete"
        );
    }

    pub fn log_gateway_closed(&self, target: &str, success: bool) {
        if success {
            info!(
                event = "gateway_closed",
                env = %self.env_name,
                gateway = %target,
                "Simulation gateway shut down"
            );
        } else {
            warn!(
                event = "gateway_closed",
                env = %self.env_name,
                gateway = %target,
                "Simulation gateway shutdown failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_metrics_creation() {
        let metrics = EnvMetrics::new();
        let before = metrics.steps_total();

        metrics.observe_step_latency(0.01);
        metrics.observe_rpc_latency("step", 0.005);
        metrics.inc_resets();
        metrics.record_episode_end(12.5);
        metrics.inc_mask_decision(MaskDecision::FallbackAll);
        metrics.inc_forecasts();

        assert!(metrics.steps_total() > before);
    }

    #[test]
    fn test_episode_logger_creation() {
        let logger = EpisodeLogger::new("joint");
        assert_eq!(logger.env_name(), "joint");
        logger.log_episode_complete(10, 1.0, Some(0.5), &EnergySummary::default());
    }
}
