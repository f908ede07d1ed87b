//! Tests for the hierarchical environment core
//!
//! These run the environment against the scripted simulation and verify:
//! - Connection, configuration and shutdown lifecycle
//! - Action validation, truncation and remapping on the wire
//! - Observation padding and mask derivation

use super::*;
use crate::config::{DatacenterConfig, EnvConfig};
use crate::error::{EnvError, ParsePhase};
use crate::gateway::mock::{ScriptConfig, ScriptLog, ScriptedConnector};
use crate::gateway::GatewayShutdown;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

fn test_config() -> EnvConfig {
    EnvConfig {
        datacenters: vec![
            DatacenterConfig::new(0, 2, 1, 1, 1),
            DatacenterConfig::new(1, 4, 3, 1, 1),
        ],
        global_routing_batch_size: Some(4),
        gateway_max_retries: 3,
        gateway_retry_delay: 0.0,
        ..Default::default()
    }
}

fn script() -> ScriptConfig {
    ScriptConfig::new(vec![(2, 3), (4, 5)], 4)
}

fn env_with(script: ScriptConfig) -> (HierarchicalEnv, Arc<Mutex<ScriptLog>>) {
    let connector = ScriptedConnector::new(script);
    let log = connector.log_handle();
    let env = HierarchicalEnv::with_connector(test_config(), Box::new(connector)).unwrap();
    (env, log)
}

fn no_op_action() -> HierarchicalAction {
    HierarchicalAction {
        global: vec![],
        local: BTreeMap::from([(0, 0), (1, 0)]),
    }
}

mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_reset_connects_and_configures_once() {
        let (mut env, log) = env_with(script());
        assert!(!env.is_connected());

        env.reset(None).unwrap();
        env.reset(Some(9)).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.connects, 1);
        assert_eq!(log.configure_calls, 1);
        assert_eq!(log.reset_seeds, vec![0, 9]);
        assert!(log.last_config_json.as_ref().unwrap().contains("datacenters"));
    }

    #[test]
    fn test_step_before_reset_fails() {
        let (mut env, _) = env_with(script());
        assert!(matches!(env.step(&no_op_action()), Err(EnvError::NotInitialized)));
    }

    #[test]
    fn test_connection_retries_then_succeeds() {
        let connector = ScriptedConnector::failing(script(), 2);
        let log = connector.log_handle();
        let mut env = HierarchicalEnv::with_connector(test_config(), Box::new(connector)).unwrap();

        env.reset(None).unwrap();
        assert_eq!(log.lock().unwrap().connects, 3);
    }

    #[test]
    fn test_connection_exhaustion_reports_port() {
        let connector = ScriptedConnector::failing(script(), 10);
        let log = connector.log_handle();
        let mut env = HierarchicalEnv::with_connector(test_config(), Box::new(connector)).unwrap();

        let err = env.reset(None).unwrap_err();
        match &err {
            EnvError::Connection { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("RPC server must be running"));
        assert_eq!(log.lock().unwrap().connects, 3);
        assert!(!env.is_connected());
    }

    #[test]
    fn test_configure_failure_tears_down_connection() {
        let mut failing = script();
        failing.reject_configure = true;
        let (mut env, log) = env_with(failing);

        assert!(matches!(env.reset(None), Err(EnvError::Configuration(_))));
        assert!(!env.is_connected());
        assert_eq!(log.lock().unwrap().close_calls, 1);
    }

    #[test]
    fn test_episode_bookkeeping() {
        let (mut env, _) = env_with(script());
        env.reset(Some(1)).unwrap();

        let mut total = 0.0;
        for step in 1..=3u64 {
            let t = env.step(&no_op_action()).unwrap();
            total += t.rewards.global;
            assert_eq!(t.info["episode_step"], serde_json::json!(step));
            assert_eq!(env.episode().current_step, step);
        }
        assert!((env.episode().episode_reward - total).abs() < 1e-12);

        env.reset(Some(1)).unwrap();
        assert_eq!(env.episode().current_step, 0);
        assert_eq!(env.episode().episode_reward, 0.0);
        assert!(!env.episode().done);
    }

    #[test]
    fn test_truncation_marks_done() {
        let mut short = script();
        short.episode_length = 2;
        let (mut env, _) = env_with(short);
        env.reset(None).unwrap();

        assert!(!env.step(&no_op_action()).unwrap().done());
        let last = env.step(&no_op_action()).unwrap();
        assert!(last.truncated);
        assert!(env.episode().done);
    }

    #[test]
    fn test_shared_gateway_shut_down_once() {
        let shutdown = GatewayShutdown::new();
        let (env_a, log_a) = env_with(script());
        let (env_b, log_b) = env_with(script());
        let mut env_a = env_a.with_shutdown(shutdown.clone());
        let mut env_b = env_b.with_shutdown(shutdown.clone());

        env_a.reset(None).unwrap();
        env_b.reset(None).unwrap();
        env_a.close().unwrap();
        env_b.close().unwrap();
        env_b.close().unwrap();

        let shutdowns =
            log_a.lock().unwrap().shutdown_calls + log_b.lock().unwrap().shutdown_calls;
        assert_eq!(shutdowns, 1);
        assert_eq!(log_b.lock().unwrap().close_calls, 1);
        assert!(shutdown.is_closed());
        assert!(matches!(env_a.step(&no_op_action()), Err(EnvError::NotInitialized)));
    }
}

mod action_tests {
    use super::*;

    #[test]
    fn test_invalid_actions_rejected_before_rpc() {
        let (mut env, log) = env_with(script());
        env.reset(None).unwrap();

        let too_long = HierarchicalAction {
            global: vec![0; 5],
            local: BTreeMap::new(),
        };
        let bad_dc = HierarchicalAction {
            global: vec![0, 2],
            local: BTreeMap::new(),
        };
        let bad_local = HierarchicalAction {
            global: vec![],
            local: BTreeMap::from([(0, 4)]),
        };
        let unknown_local = HierarchicalAction {
            global: vec![],
            local: BTreeMap::from([(7, 0)]),
        };

        for action in [too_long, bad_dc, bad_local, unknown_local] {
            assert!(matches!(env.step(&action), Err(EnvError::ActionValidation(_))));
        }
        let log = log.lock().unwrap();
        assert!(log.steps.is_empty());
        assert_eq!(log.waiting_count_calls, 0);
    }

    #[test]
    fn test_global_actions_truncated_to_waiting() {
        let (mut env, log) = env_with(script());
        let (obs, _) = env.reset(Some(5)).unwrap();
        let waiting = obs.global.upcoming_cloudlets_count as usize;

        env.step(&HierarchicalAction {
            global: vec![1, 0, 1, 0],
            local: BTreeMap::new(),
        })
        .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.steps[0].0, vec![1, 0, 1, 0][..waiting.min(4)].to_vec());
    }

    #[test]
    fn test_local_actions_remapped_on_wire() {
        let (mut env, log) = env_with(script());
        env.reset(None).unwrap();

        env.step(&HierarchicalAction {
            global: vec![],
            local: BTreeMap::from([(0, 0), (1, 5)]),
        })
        .unwrap();

        let log = log.lock().unwrap();
        let wire = &log.steps[0].1;
        assert_eq!(wire[&0], -1);
        assert_eq!(wire[&1], 4);
    }

    #[test]
    fn test_waiting_count_failure_routes_nothing() {
        let mut failing = script();
        failing.fail_waiting_count = true;
        let (mut env, log) = env_with(failing);
        env.reset(None).unwrap();

        env.step(&HierarchicalAction {
            global: vec![0, 1],
            local: BTreeMap::new(),
        })
        .unwrap();
        assert!(log.lock().unwrap().steps[0].0.is_empty());
    }

    #[test]
    fn test_remote_step_failure() {
        let mut failing = script();
        failing.fail_step_at = Some(2);
        let (mut env, _) = env_with(failing);
        env.reset(None).unwrap();

        env.step(&no_op_action()).unwrap();
        assert!(matches!(env.step(&no_op_action()), Err(EnvError::StepExecution(_))));
    }

    #[test]
    fn test_malformed_step_result() {
        let mut failing = script();
        failing.malformed_step_result = true;
        let (mut env, _) = env_with(failing);
        env.reset(None).unwrap();

        match env.step(&no_op_action()) {
            Err(EnvError::ResultParse { phase, .. }) => assert_eq!(phase, ParsePhase::Step),
            other => panic!("unexpected result: {:?}", other.map(|t| t.rewards)),
        }
    }
}

mod observation_tests {
    use super::*;
    use crate::env::padding::trim;

    #[test]
    fn test_local_observations_padded_to_shared_schema() {
        let (mut env, _) = env_with(script());
        let (obs, _) = env.reset(Some(2)).unwrap();

        for local in obs.local.values() {
            assert_eq!(local.host_loads.len(), 4);
            assert_eq!(local.vm_available_pes.len(), 5);
        }
        assert_eq!(&obs.local[&0].vm_types[3..], &[0, 0]);
        assert_eq!(obs.global.batch_cloudlet_pes.len(), 4);
        assert_eq!(obs.global.dc_queue_sizes.len(), 2);
    }

    #[test]
    fn test_mask_fails_open_without_observation() {
        let (env, _) = env_with(script());
        let mask = env.local_action_mask(0);
        assert_eq!(mask.decision, MaskDecision::FailOpen);
        assert_eq!(mask.legal, vec![true; 6]);
    }

    #[test]
    fn test_mask_fails_open_for_unknown_datacenter() {
        let (mut env, _) = env_with(script());
        env.reset(None).unwrap();
        let mask = env.local_action_mask(9);
        assert_eq!(mask.decision, MaskDecision::FailOpen);
        assert!(mask.legal.iter().all(|&ok| ok));
    }

    #[test]
    fn test_mask_matches_trimmed_observation() {
        let (mut env, _) = env_with(script());
        env.reset(Some(4)).unwrap();
        for _ in 0..5 {
            let t = env
                .step(&HierarchicalAction {
                    global: vec![0, 0, 0, 0],
                    local: BTreeMap::new(),
                })
                .unwrap();
            let local = &t.observation.local[&0];
            let expected = compute_mask(
                local.waiting_cloudlets,
                local.next_cloudlet_pes,
                &trim(&local.vm_available_pes, 3),
            );
            let mask = env.local_action_mask(0);
            assert_eq!(mask.len(), 6);
            assert_eq!(&mask.legal[..4], &expected.legal[..]);
            assert!(mask.legal[4..].iter().all(|&ok| !ok));
        }
    }
}
