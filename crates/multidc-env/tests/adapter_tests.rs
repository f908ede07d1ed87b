//! Integration tests for the training presentations over a scripted simulation

use multidc_env::adapters::translate::hierarchical_to_flat_action;
use multidc_env::adapters::{
    AgentAction, AgentId, Collaborator, FrozenPolicy, JointEnv, ParallelEnv, SingleLevelEnv,
    TrainingLevel,
};
use multidc_env::env::ActionMask;
use multidc_env::gateway::mock::{ScriptConfig, ScriptLog, ScriptedConnector};
use multidc_env::{
    DatacenterConfig, EnvConfig, HierarchicalAction, HierarchicalEnv, HierarchicalEnvironment,
    LocalObservation,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const SEED: i64 = 7;
const BATCH: usize = 3;

fn config() -> EnvConfig {
    EnvConfig {
        datacenters: vec![
            DatacenterConfig::new(0, 2, 1, 1, 1),
            DatacenterConfig::new(1, 3, 3, 1, 1),
        ],
        global_routing_batch_size: Some(BATCH),
        gateway_retry_delay: 0.0,
        ..Default::default()
    }
}

fn script(episode_length: u64) -> ScriptConfig {
    let mut script = ScriptConfig::new(vec![(2, 3), (3, 5)], BATCH);
    script.episode_length = episode_length;
    script
}

fn env(episode_length: u64) -> (HierarchicalEnv, Arc<Mutex<ScriptLog>>) {
    let connector = ScriptedConnector::new(script(episode_length));
    let log = connector.log_handle();
    let env = HierarchicalEnv::with_connector(config(), Box::new(connector)).unwrap();
    (env, log)
}

/// Ten fixed two-level decisions, all within both datacenters' action spaces
fn decisions() -> Vec<HierarchicalAction> {
    (0..10i64)
        .map(|k| HierarchicalAction {
            global: (0..BATCH as i64).map(|i| (k + i) % 2).collect(),
            local: BTreeMap::from([(0, k % 4), (1, (2 * k) % 6)]),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct Outcome {
    global_reward: f64,
    local_rewards: BTreeMap<usize, f64>,
    terminated: bool,
    truncated: bool,
}

/// Replays the local half of the fixed decisions
struct ReplayPolicy {
    decisions: Vec<HierarchicalAction>,
    calls: usize,
    num_datacenters: usize,
}

impl FrozenPolicy for ReplayPolicy {
    fn assign(&mut self, dc_id: usize, _observation: &LocalObservation, _mask: &ActionMask) -> i64 {
        let step = self.calls / self.num_datacenters;
        self.calls += 1;
        self.decisions[step].local[&dc_id]
    }
}

mod equivalence_tests {
    use super::*;

    /// Apply the fixed decisions until the episode ends
    fn drive(mut step: impl FnMut(&HierarchicalAction) -> Outcome) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        for action in &decisions() {
            let outcome = step(action);
            let done = outcome.terminated || outcome.truncated;
            outcomes.push(outcome);
            if done {
                break;
            }
        }
        outcomes
    }

    fn run_joint(episode_length: u64) -> Vec<Outcome> {
        let (env, _) = env(episode_length);
        let mut joint = JointEnv::new(env);
        joint.reset(Some(SEED)).unwrap();
        drive(|action| {
            let step = joint.step(action).unwrap();
            Outcome {
                global_reward: step.rewards.global,
                local_rewards: step.rewards.local,
                terminated: step.terminated,
                truncated: step.truncated,
            }
        })
    }

    fn run_parallel(episode_length: u64) -> (Vec<Outcome>, ParallelEnv<HierarchicalEnv>) {
        let (env, _) = env(episode_length);
        let mut parallel = ParallelEnv::new(env);
        parallel.reset(Some(SEED)).unwrap();
        let outcomes = drive(|action| {
            let step = parallel.step(&hierarchical_to_flat_action(action)).unwrap();
            let local_rewards = step
                .rewards
                .iter()
                .filter_map(|(agent, &r)| match agent {
                    AgentId::Local(dc) => Some((*dc, r)),
                    AgentId::Global => None,
                })
                .collect();
            assert!(step.truncations.values().all(|&t| t == step.truncations[&AgentId::Global]));
            Outcome {
                global_reward: step.rewards[&AgentId::Global],
                local_rewards,
                terminated: step.terminations[&AgentId::Global],
                truncated: step.truncations[&AgentId::Global],
            }
        });
        (outcomes, parallel)
    }

    /// Global training with the local half replayed by a frozen collaborator
    fn run_single_global(episode_length: u64) -> Vec<Outcome> {
        let (env, _) = env(episode_length);
        let policy = ReplayPolicy {
            decisions: decisions(),
            calls: 0,
            num_datacenters: 2,
        };
        let mut single = SingleLevelEnv::new(
            env,
            TrainingLevel::Global,
            Collaborator::Frozen(Box::new(policy)),
        )
        .unwrap();
        single.reset(Some(SEED)).unwrap();
        drive(|action| {
            let t = single.step(&AgentAction::Routing(action.global.clone())).unwrap();
            Outcome {
                global_reward: t.rewards,
                local_rewards: BTreeMap::new(),
                terminated: t.terminated,
                truncated: t.truncated,
            }
        })
    }

    fn assert_same_global_trajectory(single: &[Outcome], joint: &[Outcome]) {
        assert_eq!(single.len(), joint.len());
        for (s, j) in single.iter().zip(joint) {
            assert_eq!(s.global_reward.to_bits(), j.global_reward.to_bits());
            assert_eq!(s.terminated, j.terminated);
            assert_eq!(s.truncated, j.truncated);
        }
    }

    #[test]
    fn test_parallel_and_joint_produce_same_trajectory() {
        let joint = run_joint(50);
        let (parallel, _) = run_parallel(50);

        assert_eq!(joint.len(), 10);
        assert_eq!(joint, parallel);

        let joint_sum: f64 = joint.iter().map(|o| o.global_reward).sum();
        let parallel_sum: f64 = parallel.iter().map(|o| o.global_reward).sum();
        assert_eq!(joint_sum.to_bits(), parallel_sum.to_bits());
    }

    #[test]
    fn test_single_level_with_replayed_collaborator_matches() {
        assert_same_global_trajectory(&run_single_global(50), &run_joint(50));
    }

    #[test]
    fn test_all_presentations_truncate_on_same_step() {
        let joint = run_joint(6);
        let (parallel, parallel_env) = run_parallel(6);
        let single = run_single_global(6);

        assert_eq!(joint.len(), 6);
        assert!(joint[..5].iter().all(|o| !o.truncated && !o.terminated));
        assert!(joint[5].truncated);
        assert!(!joint[5].terminated);

        assert_eq!(parallel, joint);
        assert!(parallel_env.agents().is_empty());
        assert_same_global_trajectory(&single, &joint);
    }
}

mod joint_tests {
    use super::*;

    #[test]
    fn test_total_reward_decomposes_every_step() {
        let (env, _) = env(15);
        let mut joint = JointEnv::new(env);
        joint.reset(Some(3)).unwrap();

        let mut done = false;
        for action in decisions().iter().cycle().take(15) {
            let step = joint.step(action).unwrap();
            let mean = step.rewards.local.values().sum::<f64>() / step.rewards.local.len() as f64;
            assert_eq!(step.total_reward, step.rewards.global + mean);
            assert_eq!(step.info["total_reward"], serde_json::json!(step.total_reward));
            assert!(step.info.contains_key("green_energy_ratio"));
            assert!(step.info.contains_key("episode_step"));
            done = step.truncated;
        }
        assert!(done);
        assert_eq!(joint.episode().steps, 15);
    }

    #[test]
    fn test_masks_and_batches_in_datacenter_order() {
        let (env, _) = env(50);
        let mut joint = JointEnv::new(env);
        let (observation, _) = joint.reset(Some(1)).unwrap();

        let masks = joint.get_action_masks();
        assert_eq!(masks.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert!(masks.values().all(|m| m.len() == 6));

        let rows = joint.batched_local_observations(&observation);
        assert_eq!(rows.len(), 2);
        // 3 hosts * 2 + 5 VMs * 3 + 2 scalars
        assert!(rows.iter().all(|r| r.len() == 23));
        assert_eq!(joint.batched_action_masks().len(), 2);
    }
}

mod parallel_tests {
    use super::*;

    #[test]
    fn test_agents_and_spaces() {
        let (env, _) = env(50);
        let parallel = ParallelEnv::new(env);

        assert_eq!(
            parallel.possible_agents(),
            &[AgentId::Global, AgentId::Local(0), AgentId::Local(1)]
        );
        assert!(parallel.agents().is_empty());
        assert_eq!(
            parallel.action_space(AgentId::Local(0)).map(|s| s.flat_dim()),
            Some(1)
        );
        assert!(parallel.action_space(AgentId::Local(5)).is_none());
        // observation (2 hosts * 2 + 3 VMs * 3 + 2) + mask (4)
        assert_eq!(
            parallel.observation_space(AgentId::Local(0)).map(|s| s.flat_dim()),
            Some(19)
        );
    }

    #[test]
    fn test_local_observations_trimmed_with_masks() {
        let (env, _) = env(50);
        let mut parallel = ParallelEnv::new(env);
        let (observations, infos) = parallel.reset(Some(SEED)).unwrap();

        assert_eq!(infos.len(), 3);
        assert!(observations[&AgentId::Global].action_mask.is_none());
        assert_eq!(
            observations[&AgentId::Local(0)].action_mask.as_ref().map(Vec::len),
            Some(4)
        );
        assert_eq!(
            observations[&AgentId::Local(1)].action_mask.as_ref().map(Vec::len),
            Some(6)
        );
        assert_eq!(observations[&AgentId::Local(0)].observation.flatten().len(), 15);
        assert_eq!(parallel.get_action_mask(AgentId::Local(0)).map(|m| m.len()), Some(4));
    }

    #[test]
    fn test_action_mask_unavailable_cases() {
        let (env, _) = env(50);
        let mut parallel = ParallelEnv::new(env);
        assert!(parallel.get_action_mask(AgentId::Local(0)).is_none());

        parallel.reset(None).unwrap();
        assert!(parallel.get_action_mask(AgentId::Global).is_none());
        assert!(parallel.get_action_mask(AgentId::Local(9)).is_none());
    }

    #[test]
    fn test_state_concatenates_every_agent() {
        let (env, _) = env(50);
        let mut parallel = ParallelEnv::new(env);
        assert!(parallel.state().is_empty());

        let (observations, _) = parallel.reset(Some(SEED)).unwrap();
        let expected: usize = observations
            .values()
            .map(|o| o.to_obs_value().flatten().len())
            .sum();
        let state = parallel.state();
        assert_eq!(state.len(), expected);

        // the global agent comes first
        let global = observations[&AgentId::Global].to_obs_value().flatten();
        assert_eq!(&state[..global.len()], &global[..]);
    }

    #[test]
    fn test_agents_cleared_when_episode_ends() {
        let (env, _) = env(2);
        let mut parallel = ParallelEnv::new(env);
        parallel.reset(None).unwrap();
        let actions = hierarchical_to_flat_action(&decisions()[0]);

        let first = parallel.step(&actions).unwrap();
        assert!(first.truncations.values().all(|&t| !t));
        assert_eq!(parallel.agents().len(), 3);

        let last = parallel.step(&actions).unwrap();
        assert_eq!(last.truncations.len(), 3);
        assert!(last.truncations.values().all(|&t| t));
        assert!(parallel.agents().is_empty());
    }
}

mod single_level_tests {
    use super::*;

    #[test]
    fn test_local_mode_routes_batch_to_trained_datacenter() {
        let (env, log) = env(50);
        let mut single = SingleLevelEnv::new(
            env,
            TrainingLevel::Local { datacenter: 1 },
            Collaborator::uniform(11),
        )
        .unwrap();
        assert_eq!(single.action_space().flat_dim(), 1);
        assert_eq!(single.action_mask().map(|m| m.len()), Some(6));

        single.reset(Some(2)).unwrap();
        for _ in 0..5 {
            single.step(&AgentAction::Assignment(0)).unwrap();
        }

        let log = log.lock().unwrap();
        for (global, local) in &log.steps {
            assert!(global.iter().all(|&dc| dc == 1));
            assert_eq!(local[&1], -1);
            assert!((-1..3).contains(&local[&0]));
        }
    }

    #[test]
    fn test_local_mode_uses_shared_padded_schema() {
        let (env, _) = env(50);
        let mut single = SingleLevelEnv::new(
            env,
            TrainingLevel::Local { datacenter: 0 },
            Collaborator::uniform(5),
        )
        .unwrap();

        // 3 hosts * 2 + 5 VMs * 3 + 2 scalars, although datacenter 0 is smaller
        let shared = single.inner().local_observation_space();
        assert_eq!(single.observation_space().flat_dim(), shared.flat_dim());
        assert_eq!(single.observation_space().flat_dim(), 23);
        assert_eq!(single.action_space(), single.inner().local_action_space());

        let (observation, _) = single.reset(Some(SEED)).unwrap();
        assert_eq!(observation.flatten().len(), 23);

        let mask = single.action_mask().unwrap();
        assert_eq!(mask.len(), 6);
        assert!(!mask.is_legal(4));
        assert!(!mask.is_legal(5));

        let t = single.step(&AgentAction::Assignment(1)).unwrap();
        assert_eq!(t.observation.flatten().len(), 23);
    }

    #[test]
    fn test_wrong_action_kind_rejected() {
        let (env, log) = env(50);
        let mut single =
            SingleLevelEnv::new(env, TrainingLevel::Global, Collaborator::uniform(0)).unwrap();
        single.reset(None).unwrap();

        assert!(single.step(&AgentAction::Assignment(1)).is_err());
        assert!(log.lock().unwrap().steps.is_empty());
    }

    #[test]
    fn test_unknown_trained_datacenter_rejected() {
        let (env, _) = env(50);
        assert!(SingleLevelEnv::new(
            env,
            TrainingLevel::Local { datacenter: 2 },
            Collaborator::uniform(0)
        )
        .is_err());
    }
}
