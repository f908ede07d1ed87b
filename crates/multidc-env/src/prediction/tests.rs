//! Tests for the forecast decorator over a scripted simulation

use super::*;
use crate::config::{DatacenterConfig, EnvConfig, WindPredictionConfig};
use crate::env::{HierarchicalEnv, Space};
use crate::error::EnvError;
use crate::gateway::mock::{ScriptConfig, ScriptedConnector};
use crate::models::{HierarchicalAction, PREDICTED_GREEN_POWER_KEY};
use std::collections::BTreeMap;

const HORIZON: usize = 4;

fn config() -> EnvConfig {
    EnvConfig {
        datacenters: vec![
            DatacenterConfig::new(0, 2, 1, 1, 1),
            DatacenterConfig::new(1, 4, 3, 1, 1),
        ],
        global_routing_batch_size: Some(3),
        gateway_retry_delay: 0.0,
        ..Default::default()
    }
}

fn base_env() -> HierarchicalEnv {
    let connector = ScriptedConnector::new(ScriptConfig::new(vec![(2, 3), (4, 5)], 3));
    HierarchicalEnv::with_connector(config(), Box::new(connector)).unwrap()
}

/// Row `i` has an active power of `i` kW
fn ramp(rows: usize) -> Vec<FeatureRow> {
    (0..rows)
        .map(|i| {
            let mut row = [0.0; NUM_FEATURES];
            row[TARGET_INDEX] = i as f32;
            row
        })
        .collect()
}

fn service(trace_len: usize) -> PredictionService {
    let mut loader = CsvFeatureLoader::new(12);
    loader.insert_turbine(1, ramp(trace_len));
    PredictionService::new(
        Box::new(PersistenceForecaster),
        loader,
        FeatureScalers::default(),
        vec![1, 57],
        HORIZON,
        12,
    )
}

fn idle() -> HierarchicalAction {
    HierarchicalAction {
        global: vec![],
        local: BTreeMap::new(),
    }
}

#[test]
fn test_reset_injects_zero_forecast() {
    let mut env = WindPredictionAugmenter::new(base_env(), service(40)).unwrap();
    let (obs, _) = env.reset(Some(0)).unwrap();

    assert_eq!(
        obs.global.dc_predicted_green_power_w,
        Some(vec![vec![0.0; HORIZON]; 2])
    );
}

#[test]
fn test_step_injects_forecast_per_datacenter() {
    let mut env = WindPredictionAugmenter::new(base_env(), service(40)).unwrap();
    env.reset(Some(0)).unwrap();

    // simulation time 1 -> row 13
    let t = env.step(&idle()).unwrap();
    let forecast = t.observation.global.dc_predicted_green_power_w.unwrap();
    assert_eq!(forecast[0], vec![13_000.0; HORIZON]);
    // turbine 57 has no trace
    assert_eq!(forecast[1], vec![0.0; HORIZON]);

    let t = env.step(&idle()).unwrap();
    let forecast = t.observation.global.dc_predicted_green_power_w.unwrap();
    assert_eq!(forecast[0], vec![14_000.0; HORIZON]);
    assert_eq!(env.service().current_step(), 2);
}

#[test]
fn test_exhausted_trace_gives_zero_row() {
    let mut env = WindPredictionAugmenter::new(base_env(), service(14)).unwrap();
    env.reset(Some(0)).unwrap();

    let first = env.step(&idle()).unwrap();
    assert_eq!(
        first.observation.global.dc_predicted_green_power_w.unwrap()[0],
        vec![13_000.0; HORIZON]
    );
    let second = env.step(&idle()).unwrap();
    assert_eq!(
        second.observation.global.dc_predicted_green_power_w.unwrap()[0],
        vec![0.0; HORIZON]
    );
}

#[test]
fn test_observation_space_includes_forecast() {
    let env = WindPredictionAugmenter::new(base_env(), service(40)).unwrap();
    assert_eq!(env.forecast_horizon(), Some(HORIZON));

    match env.global_observation_space() {
        Space::Dict(spaces) => match &spaces[PREDICTED_GREEN_POWER_KEY] {
            Space::Box { shape, .. } => assert_eq!(shape, &vec![2, HORIZON]),
            other => panic!("unexpected space {:?}", other),
        },
        other => panic!("unexpected space {:?}", other),
    }
}

#[test]
fn test_turbine_count_must_match_datacenters() {
    let mut loader = CsvFeatureLoader::new(12);
    loader.insert_turbine(1, ramp(40));
    let single = PredictionService::new(
        Box::new(PersistenceForecaster),
        loader,
        FeatureScalers::default(),
        vec![1],
        HORIZON,
        12,
    );
    assert!(matches!(
        WindPredictionAugmenter::new(base_env(), single),
        Err(EnvError::InvalidConfig(_))
    ));
}

#[test]
fn test_maybe_augment_respects_enabled_flag() {
    let disabled = maybe_augment(base_env(), &config()).unwrap();
    assert_eq!(disabled.forecast_horizon(), None);

    let mut enabled_config = config();
    enabled_config.wind_prediction = Some(WindPredictionConfig {
        enabled: true,
        turbine_ids: vec![1, 57],
        data_path: Some(std::env::temp_dir()),
        horizon: HORIZON,
        ..Default::default()
    });
    let enabled = maybe_augment(base_env(), &enabled_config).unwrap();
    assert_eq!(enabled.forecast_horizon(), Some(HORIZON));
}
