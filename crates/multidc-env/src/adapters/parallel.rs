//! Parallel multi-agent presentation
//!
//! One named agent per decision point: `global_agent` routes the batch and
//! `local_agent_{i}` assigns cloudlets inside datacenter `i`. All agents act
//! in the same step and share the episode's termination status.

use super::translate::{
    agents, flat_to_hierarchical_action, hierarchical_to_flat_observation,
    hierarchical_to_flat_rewards, state_vector, AgentAction, AgentId,
};
use crate::env::{spaces, HierarchicalEnvironment, Space};
use crate::error::Result;
use crate::models::{HierarchicalObservation, Info, ObsValue};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const OBSERVATION_KEY: &str = "observation";
pub const ACTION_MASK_KEY: &str = "action_mask";

/// What one agent sees
#[derive(Debug, Clone, PartialEq)]
pub struct AgentObservation {
    pub observation: ObsValue,
    /// Only local agents carry a mask, sized to their datacenter
    pub action_mask: Option<Vec<f32>>,
}

impl AgentObservation {
    /// `{"observation": .., "action_mask": ..}` as one nested value
    pub fn to_obs_value(&self) -> ObsValue {
        let mut map = BTreeMap::new();
        map.insert(OBSERVATION_KEY.to_string(), self.observation.clone());
        if let Some(mask) = &self.action_mask {
            map.insert(ACTION_MASK_KEY.to_string(), ObsValue::Vector(mask.clone()));
        }
        ObsValue::Dict(map)
    }
}

pub type AgentMap<T> = BTreeMap<AgentId, T>;

#[derive(Debug, Clone)]
pub struct ParallelStep {
    pub observations: AgentMap<AgentObservation>,
    pub rewards: AgentMap<f64>,
    pub terminations: AgentMap<bool>,
    pub truncations: AgentMap<bool>,
    pub infos: AgentMap<Info>,
}

pub struct ParallelEnv<E> {
    env: E,
    possible_agents: Vec<AgentId>,
    agents: Vec<AgentId>,
    last_observations: Option<AgentMap<AgentObservation>>,
}

impl<E: HierarchicalEnvironment> ParallelEnv<E> {
    pub fn new(env: E) -> Self {
        let possible_agents = agents(env.layout());
        info!(agents = possible_agents.len(), "Parallel multi-agent environment created");
        Self {
            env,
            possible_agents,
            agents: Vec::new(),
            last_observations: None,
        }
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn possible_agents(&self) -> &[AgentId] {
        &self.possible_agents
    }

    /// Agents still acting in the current episode
    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    pub fn observation_space(&self, agent: AgentId) -> Option<Space> {
        match agent {
            AgentId::Global => {
                let mut map = BTreeMap::new();
                map.insert(OBSERVATION_KEY.to_string(), self.env.global_observation_space());
                Some(Space::Dict(map))
            }
            AgentId::Local(dc_id) => {
                let dc = self.env.layout().get(dc_id)?;
                let mut map = BTreeMap::new();
                map.insert(
                    OBSERVATION_KEY.to_string(),
                    spaces::local_observation_space(dc.host_count, dc.vm_count),
                );
                map.insert(
                    ACTION_MASK_KEY.to_string(),
                    Space::boxed(0.0, 1.0, &[dc.action_count()], spaces::DType::F32),
                );
                Some(Space::Dict(map))
            }
        }
    }

    pub fn action_space(&self, agent: AgentId) -> Option<Space> {
        match agent {
            AgentId::Global => Some(self.env.global_action_space()),
            AgentId::Local(dc_id) => self.env.layout().get(dc_id).map(spaces::local_action_space),
        }
    }

    fn local_mask(&self, dc_id: usize) -> Option<Vec<f32>> {
        let dc = self.env.layout().get(dc_id)?;
        let mask = self.env.local_action_mask(dc_id);
        if mask.len() < dc.action_count() {
            warn!(dc_id = dc_id, mask_len = mask.len(), "Mask shorter than action space, allowing all actions");
            return Some(vec![1.0; dc.action_count()]);
        }
        Some(mask.trimmed(dc.action_count()).as_floats())
    }

    fn to_agent_observations(
        &self,
        observation: &HierarchicalObservation,
    ) -> AgentMap<AgentObservation> {
        hierarchical_to_flat_observation(observation, self.env.layout())
            .into_iter()
            .map(|(agent, value)| {
                let action_mask = match agent {
                    AgentId::Global => None,
                    AgentId::Local(dc_id) => self.local_mask(dc_id),
                };
                (
                    agent,
                    AgentObservation {
                        observation: value,
                        action_mask,
                    },
                )
            })
            .collect()
    }

    fn replicate<T: Clone>(&self, value: &T) -> AgentMap<T> {
        self.agents.iter().map(|&agent| (agent, value.clone())).collect()
    }

    pub fn reset(
        &mut self,
        seed: Option<i64>,
    ) -> Result<(AgentMap<AgentObservation>, AgentMap<Info>)> {
        let (observation, info) = self.env.reset(seed)?;
        self.agents = self.possible_agents.clone();

        let observations = self.to_agent_observations(&observation);
        let infos = self.replicate(&info);
        self.last_observations = Some(observations.clone());
        Ok((observations, infos))
    }

    pub fn step(&mut self, actions: &AgentMap<AgentAction>) -> Result<ParallelStep> {
        let action = flat_to_hierarchical_action(actions)?;
        let transition = self.env.step(&action)?;

        let observations = self.to_agent_observations(&transition.observation);
        let rewards = hierarchical_to_flat_rewards(&transition.rewards);
        let terminations = self.replicate(&transition.terminated);
        let truncations = self.replicate(&transition.truncated);
        let infos = self.replicate(&transition.info);
        self.last_observations = Some(observations.clone());

        debug!(
            global_reward = transition.rewards.global,
            terminated = transition.terminated,
            truncated = transition.truncated,
            "Parallel step"
        );
        if transition.done() {
            self.agents.clear();
        }

        Ok(ParallelStep {
            observations,
            rewards,
            terminations,
            truncations,
            infos,
        })
    }

    /// Mask for a local agent; `None` for the global agent, unknown agents
    /// and before the first observation
    pub fn get_action_mask(&self, agent: AgentId) -> Option<Vec<bool>> {
        let AgentId::Local(dc_id) = agent else {
            return None;
        };
        if self.last_observations.is_none() {
            warn!(agent = %agent, "Action mask requested before first observation");
            return None;
        }
        let dc = self.env.layout().get(dc_id)?;
        Some(self.env.local_action_mask(dc_id).trimmed(dc.action_count()).legal)
    }

    /// Every agent's latest observation concatenated into one vector
    pub fn state(&self) -> Vec<f32> {
        match &self.last_observations {
            Some(observations) => {
                let values: Vec<ObsValue> =
                    observations.values().map(AgentObservation::to_obs_value).collect();
                state_vector(&values)
            }
            None => Vec::new(),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        self.agents.clear();
        self.last_observations = None;
        self.env.close()
    }
}
