//! Environment decorator adding the wind power forecast to the global observation

use super::service::PredictionService;
use crate::env::{ActionMask, HierarchicalEnvironment};
use crate::error::{EnvError, Result};
use crate::models::{
    DatacenterLayout, EpisodeState, HierarchicalAction, HierarchicalObservation,
    HierarchicalTransition, Info,
};
use tracing::info;

/// Steps between prediction statistics log lines
pub const STATS_LOG_INTERVAL: u64 = 100;

pub struct WindPredictionAugmenter<E> {
    inner: E,
    service: PredictionService,
    step_count: u64,
    predictions_made: u64,
}

impl<E: HierarchicalEnvironment> WindPredictionAugmenter<E> {
    pub fn new(inner: E, service: PredictionService) -> Result<Self> {
        if service.num_datacenters() != inner.layout().len() {
            return Err(EnvError::invalid_config(format!(
                "wind prediction has {} turbines for {} datacenters",
                service.num_datacenters(),
                inner.layout().len()
            )));
        }
        info!(
            num_datacenters = service.num_datacenters(),
            horizon = service.horizon(),
            "Wind prediction enabled"
        );
        Ok(Self {
            inner,
            service,
            step_count: 0,
            predictions_made: 0,
        })
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    pub fn service(&self) -> &PredictionService {
        &self.service
    }

    fn zero_forecast(&self) -> Vec<Vec<f32>> {
        vec![vec![0.0; self.service.horizon()]; self.service.num_datacenters()]
    }

    fn log_statistics(&self) {
        let stats = self.service.stats();
        info!(
            step = self.step_count,
            predictions = self.predictions_made,
            forecasts = stats.forecasts,
            cache_hits = stats.cache_hits,
            zero_rows = stats.zero_rows,
            "Wind prediction statistics"
        );
    }
}

impl<E: HierarchicalEnvironment> HierarchicalEnvironment for WindPredictionAugmenter<E> {
    fn layout(&self) -> &DatacenterLayout {
        self.inner.layout()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }

    fn reset(&mut self, seed: Option<i64>) -> Result<(HierarchicalObservation, Info)> {
        let (mut observation, info) = self.inner.reset(seed)?;
        self.service.reset();
        self.step_count = 0;
        self.predictions_made = 0;
        // No history yet
        observation.global.dc_predicted_green_power_w = Some(self.zero_forecast());
        Ok((observation, info))
    }

    fn step(&mut self, action: &HierarchicalAction) -> Result<HierarchicalTransition> {
        let mut transition = self.inner.step(action)?;

        let reported = transition.observation.global.simulation_time;
        let time = if reported.is_finite() && reported >= 0.0 {
            reported
        } else {
            self.step_count as f64
        };
        transition.observation.global.dc_predicted_green_power_w =
            Some(self.service.predict_all(time));
        self.predictions_made += 1;

        self.service.advance();
        self.step_count += 1;
        if self.step_count % STATS_LOG_INTERVAL == 0 {
            self.log_statistics();
        }
        Ok(transition)
    }

    fn local_action_mask(&self, dc_id: usize) -> ActionMask {
        self.inner.local_action_mask(dc_id)
    }

    fn episode(&self) -> &EpisodeState {
        self.inner.episode()
    }

    fn forecast_horizon(&self) -> Option<usize> {
        Some(self.service.horizon())
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
