//! Random-policy rollouts through each training presentation

use anyhow::{Context, Result};
use clap::ValueEnum;
use multidc_env::adapters::translate::hierarchical_to_flat_action;
use multidc_env::adapters::{
    energy_summary, AgentAction, AgentId, Collaborator, JointEnv, ParallelEnv, SingleLevelEnv,
    TrainingLevel,
};
use multidc_env::{EnvMetrics, HierarchicalEnvironment};
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use crate::output::{color_reward, format_ratio, print_info, print_success, print_table, OutputFormat};
use crate::policy::RandomPolicy;

/// Presentation the rollout drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdapterKind {
    /// Both levels with combined rewards
    Joint,
    /// One agent per decision point
    Parallel,
    /// Routing agent with a uniform local collaborator
    SingleGlobal,
    /// One datacenter's assignment agent, whole batch routed to it
    SingleLocal,
}

#[derive(Debug, Clone)]
pub struct RolloutOptions {
    pub adapter: AdapterKind,
    pub episodes: u32,
    pub max_steps: Option<u64>,
    pub seed: i64,
    pub datacenter: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Terminated,
    Truncated,
    StepLimit,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Outcome::Terminated => "terminated",
            Outcome::Truncated => "truncated",
            Outcome::StepLimit => "step limit",
        };
        f.write_str(name)
    }
}

/// Row of the episode summary table
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct EpisodeSummary {
    #[tabled(rename = "Episode")]
    pub episode: u32,
    #[tabled(rename = "Steps")]
    pub steps: u64,
    #[tabled(rename = "Global", display_with = "display_optional")]
    pub global_reward: Option<f64>,
    #[tabled(rename = "Local (mean)", display_with = "display_optional")]
    pub local_reward: Option<f64>,
    #[tabled(rename = "Trained reward", display_with = "display_reward")]
    pub reward: f64,
    #[tabled(rename = "Green ratio", display_with = "display_ratio")]
    pub green_energy_ratio: f64,
    #[tabled(rename = "Outcome")]
    pub outcome: Outcome,
}

fn display_optional(reward: &Option<f64>) -> String {
    reward.map(color_reward).unwrap_or_else(|| "-".to_string())
}

fn display_reward(reward: &f64) -> String {
    color_reward(*reward)
}

fn display_ratio(ratio: &f64) -> String {
    format_ratio(*ratio)
}

fn outcome(terminated: bool, truncated: bool) -> Option<Outcome> {
    if terminated {
        Some(Outcome::Terminated)
    } else if truncated {
        Some(Outcome::Truncated)
    } else {
        None
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

struct Runner {
    options: RolloutOptions,
    policy: RandomPolicy,
}

impl Runner {
    fn seed(&self, episode: u32) -> i64 {
        self.options.seed + episode as i64
    }

    /// `Some(StepLimit)` once the step budget is spent
    fn limit_reached(&self, steps: u64) -> Option<Outcome> {
        match self.options.max_steps {
            Some(max) if steps >= max => Some(Outcome::StepLimit),
            _ => None,
        }
    }

    fn joint<E: HierarchicalEnvironment>(&mut self, env: E) -> Result<Vec<EpisodeSummary>> {
        let mut joint = JointEnv::new(env);
        let mut summaries = Vec::new();

        for episode in 0..self.options.episodes {
            joint.reset(Some(self.seed(episode)))?;
            let mut green = 0.0;
            let finish = loop {
                let action = self.policy.act(joint.inner());
                let step = joint.step(&action).context("Joint step failed")?;
                green = step.info.get("green_energy_ratio").and_then(|v| v.as_f64()).unwrap_or(green);
                let steps = joint.episode().steps;
                if let Some(done) = outcome(step.terminated, step.truncated).or(self.limit_reached(steps)) {
                    break done;
                }
            };

            let totals = joint.episode();
            summaries.push(EpisodeSummary {
                episode,
                steps: totals.steps,
                global_reward: Some(totals.global),
                local_reward: totals.mean_local(),
                reward: totals.total,
                green_energy_ratio: green,
                outcome: finish,
            });
        }

        joint.close()?;
        Ok(summaries)
    }

    fn parallel<E: HierarchicalEnvironment>(&mut self, env: E) -> Result<Vec<EpisodeSummary>> {
        let mut parallel = ParallelEnv::new(env);
        let mut summaries = Vec::new();

        for episode in 0..self.options.episodes {
            parallel.reset(Some(self.seed(episode)))?;
            let mut steps = 0;
            let mut global = 0.0;
            let mut local = Vec::new();
            let mut green = 0.0;

            let finish = loop {
                let actions = hierarchical_to_flat_action(&self.policy.act(parallel.inner()));
                let step = parallel.step(&actions).context("Parallel step failed")?;
                steps += 1;
                global += step.rewards.get(&AgentId::Global).copied().unwrap_or(0.0);
                for (agent, reward) in &step.rewards {
                    if let AgentId::Local(dc) = agent {
                        if local.len() <= *dc {
                            local.resize(dc + 1, 0.0);
                        }
                        local[*dc] += *reward;
                    }
                }
                if let Some(info) = step.infos.get(&AgentId::Global) {
                    green = energy_summary(info).green_energy_ratio;
                }

                let terminated = step.terminations.values().any(|&t| t);
                let truncated = step.truncations.values().any(|&t| t);
                if let Some(done) = outcome(terminated, truncated).or(self.limit_reached(steps)) {
                    break done;
                }
            };

            let local_mean = mean(&local);
            summaries.push(EpisodeSummary {
                episode,
                steps,
                global_reward: Some(global),
                local_reward: local_mean,
                reward: global + local_mean.unwrap_or(0.0),
                green_energy_ratio: green,
                outcome: finish,
            });
        }

        parallel.close()?;
        Ok(summaries)
    }

    fn single<E: HierarchicalEnvironment>(
        &mut self,
        env: E,
        level: TrainingLevel,
    ) -> Result<Vec<EpisodeSummary>> {
        let collaborator = Collaborator::uniform(self.options.seed as u64);
        let mut single = SingleLevelEnv::new(env, level, collaborator)?;
        let mut summaries = Vec::new();

        for episode in 0..self.options.episodes {
            single.reset(Some(self.seed(episode)))?;
            let mut steps = 0;
            let mut reward = 0.0;
            let mut green = 0.0;

            let finish = loop {
                let action = match level {
                    TrainingLevel::Global => AgentAction::Routing(self.policy.routing(single.inner())),
                    TrainingLevel::Local { .. } => AgentAction::Assignment(
                        single
                            .action_mask()
                            .map_or(0, |mask| self.policy.assignment(&mask)),
                    ),
                };
                let transition = single.step(&action).context("Single-level step failed")?;
                steps += 1;
                reward += transition.rewards;
                green = energy_summary(&transition.info).green_energy_ratio;
                if let Some(done) =
                    outcome(transition.terminated, transition.truncated).or(self.limit_reached(steps))
                {
                    break done;
                }
            };

            let (global_reward, local_reward) = match level {
                TrainingLevel::Global => (Some(reward), None),
                TrainingLevel::Local { .. } => (None, Some(reward)),
            };
            summaries.push(EpisodeSummary {
                episode,
                steps,
                global_reward,
                local_reward,
                reward,
                green_energy_ratio: green,
                outcome: finish,
            });
        }

        single.close()?;
        Ok(summaries)
    }
}

/// Drive `options.episodes` episodes and return one summary per episode
pub fn run_rollout<E: HierarchicalEnvironment>(
    env: E,
    options: RolloutOptions,
) -> Result<Vec<EpisodeSummary>> {
    info!(
        adapter = ?options.adapter,
        episodes = options.episodes,
        seed = options.seed,
        "Starting rollout"
    );
    let mut runner = Runner {
        policy: RandomPolicy::new(options.seed as u64),
        options,
    };
    match runner.options.adapter {
        AdapterKind::Joint => runner.joint(env),
        AdapterKind::Parallel => runner.parallel(env),
        AdapterKind::SingleGlobal => runner.single(env, TrainingLevel::Global),
        AdapterKind::SingleLocal => {
            let datacenter = runner.options.datacenter;
            runner.single(env, TrainingLevel::Local { datacenter })
        }
    }
}

pub fn rollout<E: HierarchicalEnvironment>(
    env: E,
    options: RolloutOptions,
    format: OutputFormat,
) -> Result<()> {
    let summaries = run_rollout(env, options)?;
    print_table(&summaries, format);

    if let OutputFormat::Table = format {
        print_info(&format!(
            "{} environment steps recorded",
            EnvMetrics::new().steps_total()
        ));
        print_success(&format!("Completed {} episode(s)", summaries.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multidc_env::gateway::mock::{ScriptConfig, ScriptedConnector};
    use multidc_env::{DatacenterConfig, EnvConfig, HierarchicalEnv};

    fn scripted_env(episode_length: u64) -> HierarchicalEnv {
        let config = EnvConfig {
            datacenters: vec![
                DatacenterConfig::new(0, 2, 1, 1, 0),
                DatacenterConfig::new(1, 2, 2, 1, 1),
            ],
            global_routing_batch_size: Some(2),
            gateway_retry_delay: 0.0,
            ..Default::default()
        };
        let mut script = ScriptConfig::new(vec![(2, 2), (2, 4)], 2);
        script.episode_length = episode_length;
        HierarchicalEnv::with_connector(config, Box::new(ScriptedConnector::new(script))).unwrap()
    }

    fn options(adapter: AdapterKind, max_steps: Option<u64>) -> RolloutOptions {
        RolloutOptions {
            adapter,
            episodes: 2,
            max_steps,
            seed: 5,
            datacenter: 1,
        }
    }

    #[test]
    fn test_every_adapter_completes_episodes() {
        for adapter in [
            AdapterKind::Joint,
            AdapterKind::Parallel,
            AdapterKind::SingleGlobal,
            AdapterKind::SingleLocal,
        ] {
            let summaries = run_rollout(scripted_env(4), options(adapter, None)).unwrap();
            assert_eq!(summaries.len(), 2, "{:?}", adapter);
            for summary in &summaries {
                assert_eq!(summary.steps, 4);
                assert_eq!(summary.outcome, Outcome::Truncated);
            }
        }
    }

    #[test]
    fn test_step_limit_stops_early() {
        let summaries = run_rollout(scripted_env(50), options(AdapterKind::Joint, Some(3))).unwrap();
        assert!(summaries
            .iter()
            .all(|s| s.steps == 3 && s.outcome == Outcome::StepLimit));
    }

    #[test]
    fn test_joint_and_parallel_agree() {
        let joint = run_rollout(scripted_env(6), options(AdapterKind::Joint, None)).unwrap();
        let parallel = run_rollout(scripted_env(6), options(AdapterKind::Parallel, None)).unwrap();
        for (j, p) in joint.iter().zip(&parallel) {
            assert_eq!(j.global_reward, p.global_reward);
            assert_eq!(j.steps, p.steps);
        }
    }

    #[test]
    fn test_single_level_reward_columns() {
        let global = run_rollout(scripted_env(3), options(AdapterKind::SingleGlobal, None)).unwrap();
        assert!(global[0].global_reward.is_some() && global[0].local_reward.is_none());

        let local = run_rollout(scripted_env(3), options(AdapterKind::SingleLocal, None)).unwrap();
        assert!(local[0].global_reward.is_none() && local[0].local_reward.is_some());
    }
}
