//! Coupled two-level training presentation
//!
//! Keeps the `{global, local}` structure and adds cross-level bookkeeping for
//! training loops that optimize both levels side by side.

use crate::env::{ActionMask, HierarchicalEnvironment};
use crate::error::Result;
use crate::models::{HierarchicalAction, HierarchicalObservation, HierarchicalRewards, Info};
use crate::observability::{EnergySummary, EpisodeLogger};
use serde_json::Value;
use std::collections::BTreeMap;

/// Step result with the combined reward
#[derive(Debug, Clone)]
pub struct JointStep {
    pub observation: HierarchicalObservation,
    pub rewards: HierarchicalRewards,
    /// `global + mean(local)`, or `global` without local rewards
    pub total_reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info,
}

/// Cumulative rewards of the running episode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointEpisode {
    pub steps: u64,
    pub global: f64,
    pub local: BTreeMap<usize, f64>,
    pub total: f64,
}

impl JointEpisode {
    pub fn mean_local(&self) -> Option<f64> {
        if self.local.is_empty() {
            None
        } else {
            Some(self.local.values().sum::<f64>() / self.local.len() as f64)
        }
    }
}

pub fn total_reward(rewards: &HierarchicalRewards) -> f64 {
    rewards.global + rewards.mean_local().unwrap_or(0.0)
}

/// Energy figures from the simulator's `global_energy_stats` info entry
pub fn energy_summary(info: &Info) -> EnergySummary {
    let Some(stats) = info.get("global_energy_stats").and_then(Value::as_object) else {
        return EnergySummary::default();
    };
    let field = |key: &str| stats.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    EnergySummary {
        green_energy_ratio: field("green_energy_ratio"),
        brown_energy_wh: field("total_brown_energy_wh"),
        wasted_green_wh: field("total_wasted_green_wh"),
    }
}

pub struct JointEnv<E> {
    env: E,
    episode: JointEpisode,
    logger: EpisodeLogger,
}

impl<E: HierarchicalEnvironment> JointEnv<E> {
    pub fn new(env: E) -> Self {
        Self {
            env,
            episode: JointEpisode::default(),
            logger: EpisodeLogger::new("joint"),
        }
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn episode(&self) -> &JointEpisode {
        &self.episode
    }

    pub fn reset(&mut self, seed: Option<i64>) -> Result<(HierarchicalObservation, Info)> {
        let result = self.env.reset(seed)?;
        self.episode = JointEpisode {
            local: self.env.layout().ids().map(|id| (id, 0.0)).collect(),
            ..Default::default()
        };
        Ok(result)
    }

    pub fn step(&mut self, action: &HierarchicalAction) -> Result<JointStep> {
        let transition = self.env.step(action)?;
        let rewards = transition.rewards;
        let total = total_reward(&rewards);
        let local_mean = rewards.mean_local().unwrap_or(0.0);

        self.episode.steps += 1;
        self.episode.global += rewards.global;
        self.episode.total += total;
        for (&dc, &reward) in &rewards.local {
            *self.episode.local.entry(dc).or_insert(0.0) += reward;
        }

        let mut info = transition.info;
        let energy = energy_summary(&info);
        info.insert("global_reward".into(), Value::from(rewards.global));
        info.insert("local_reward".into(), Value::from(local_mean));
        info.insert("total_reward".into(), Value::from(total));
        info.insert("green_energy_ratio".into(), Value::from(energy.green_energy_ratio));
        info.insert("brown_energy_wh".into(), Value::from(energy.brown_energy_wh));
        info.insert("wasted_green_wh".into(), Value::from(energy.wasted_green_wh));

        let done = transition.terminated || transition.truncated;
        if done {
            self.logger.log_episode_complete(
                self.episode.steps,
                self.episode.global,
                self.episode.mean_local(),
                &energy,
            );
        }

        Ok(JointStep {
            observation: transition.observation,
            rewards,
            total_reward: total,
            terminated: transition.terminated,
            truncated: transition.truncated,
            info,
        })
    }

    /// Shared-size mask for every datacenter, in id order
    pub fn get_action_masks(&self) -> BTreeMap<usize, ActionMask> {
        self.env
            .layout()
            .ids()
            .map(|id| (id, self.env.local_action_mask(id)))
            .collect()
    }

    /// Flattened local observations, one row per datacenter in id order
    ///
    /// Datacenters without an observation get a zero row.
    pub fn batched_local_observations(&self, observation: &HierarchicalObservation) -> Vec<Vec<f32>> {
        let dim = self.env.local_observation_space().flat_dim();
        self.env
            .layout()
            .ids()
            .map(|id| {
                observation
                    .local
                    .get(&id)
                    .map(|local| local.to_obs_value().flatten())
                    .unwrap_or_else(|| vec![0.0; dim])
            })
            .collect()
    }

    /// Shared-size masks, one row per datacenter in id order
    pub fn batched_action_masks(&self) -> Vec<Vec<bool>> {
        self.get_action_masks()
            .into_values()
            .map(|mask| mask.legal)
            .collect()
    }

    pub fn close(&mut self) -> Result<()> {
        self.env.close()
    }
}
