//! Single-agent presentation of one level
//!
//! The trained level sees its own observation and action space, in the same
//! shared padded schema as the joint presentation. The other level is played
//! by a collaborator: uniform random over legal actions, or a frozen policy
//! trained earlier.

use super::translate::AgentAction;
use crate::env::padding::pad_local;
use crate::env::{ActionMask, HierarchicalEnvironment, Space};
use crate::error::{EnvError, Result};
use crate::models::{
    HierarchicalAction, HierarchicalObservation, Info, LocalObservation, ObsValue, Transition,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingLevel {
    /// Train the routing agent; local assignments come from the collaborator
    Global,
    /// Train one datacenter's assignment agent; the whole batch is routed to it
    Local { datacenter: usize },
}

/// Previously trained local policy
pub trait FrozenPolicy: Send {
    /// Action in `[0, vm_count]` for one datacenter
    ///
    /// The observation is padded to the shared size; the mask is shared-size
    /// with slots past the datacenter's VMs illegal.
    fn assign(&mut self, dc_id: usize, observation: &LocalObservation, mask: &ActionMask) -> i64;
}

pub enum Collaborator {
    Uniform(StdRng),
    Frozen(Box<dyn FrozenPolicy>),
}

impl Collaborator {
    pub fn uniform(seed: u64) -> Self {
        Collaborator::Uniform(StdRng::seed_from_u64(seed))
    }

    fn assign(&mut self, dc_id: usize, observation: &LocalObservation, mask: &ActionMask) -> i64 {
        match self {
            Collaborator::Uniform(rng) => mask.sample(rng).map_or(0, |a| a as i64),
            Collaborator::Frozen(policy) => policy.assign(dc_id, observation, mask),
        }
    }
}

pub type SingleLevelTransition = Transition<ObsValue, f64>;

pub struct SingleLevelEnv<E> {
    env: E,
    level: TrainingLevel,
    collaborator: Collaborator,
    last_observation: Option<HierarchicalObservation>,
}

impl<E: HierarchicalEnvironment> SingleLevelEnv<E> {
    pub fn new(env: E, level: TrainingLevel, collaborator: Collaborator) -> Result<Self> {
        if let TrainingLevel::Local { datacenter } = level {
            if env.layout().get(datacenter).is_none() {
                return Err(EnvError::invalid_config(format!(
                    "cannot train unknown datacenter {}",
                    datacenter
                )));
            }
        }
        info!(level = ?level, "Single-level environment created");
        Ok(Self {
            env,
            level,
            collaborator,
            last_observation: None,
        })
    }

    pub fn level(&self) -> TrainingLevel {
        self.level
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    /// Global space, or the local space shared by every datacenter
    pub fn observation_space(&self) -> Space {
        match self.level {
            TrainingLevel::Global => self.env.global_observation_space(),
            TrainingLevel::Local { .. } => self.env.local_observation_space(),
        }
    }

    pub fn action_space(&self) -> Space {
        match self.level {
            TrainingLevel::Global => self.env.global_action_space(),
            TrainingLevel::Local { .. } => self.env.local_action_space(),
        }
    }

    /// Shared-size mask for the trained datacenter; `None` in global mode
    pub fn action_mask(&self) -> Option<ActionMask> {
        match self.level {
            TrainingLevel::Global => None,
            TrainingLevel::Local { datacenter } => Some(self.local_mask(datacenter)),
        }
    }

    /// Shared-size mask; slots past the datacenter's VMs are never legal
    fn local_mask(&self, dc_id: usize) -> ActionMask {
        let mask = self.env.local_action_mask(dc_id);
        match self.env.layout().get(dc_id) {
            Some(dc) => mask
                .trimmed(dc.action_count())
                .padded(self.env.layout().max_action_count()),
            None => mask,
        }
    }

    fn padded_local(&self, observation: &HierarchicalObservation, dc_id: usize) -> LocalObservation {
        match observation.local.get(&dc_id) {
            Some(local) => local.clone(),
            None => {
                warn!(dc_id = dc_id, "No local observation, presenting zeros");
                let layout = self.env.layout();
                pad_local(&LocalObservation::default(), layout.max_hosts(), layout.max_vms())
            }
        }
    }

    fn present(&self, observation: &HierarchicalObservation) -> ObsValue {
        match self.level {
            TrainingLevel::Global => observation.global.to_obs_value(),
            TrainingLevel::Local { datacenter } => {
                self.padded_local(observation, datacenter).to_obs_value()
            }
        }
    }

    fn collaborator_assignments(&mut self, skip: Option<usize>) -> BTreeMap<usize, i64> {
        let Some(observation) = self.last_observation.take() else {
            return BTreeMap::new();
        };
        let ids: Vec<usize> = self.env.layout().ids().filter(|&id| Some(id) != skip).collect();
        let mut local = BTreeMap::new();
        for dc_id in ids {
            let mask = self.local_mask(dc_id);
            let local_obs = self.padded_local(&observation, dc_id);
            local.insert(dc_id, self.collaborator.assign(dc_id, &local_obs, &mask));
        }
        self.last_observation = Some(observation);
        local
    }

    pub fn reset(&mut self, seed: Option<i64>) -> Result<(ObsValue, Info)> {
        let (observation, info) = self.env.reset(seed)?;
        let presented = self.present(&observation);
        self.last_observation = Some(observation);
        Ok((presented, info))
    }

    pub fn step(&mut self, action: &AgentAction) -> Result<SingleLevelTransition> {
        let hierarchical = match (self.level, action) {
            (TrainingLevel::Global, AgentAction::Routing(routes)) => HierarchicalAction {
                global: routes.clone(),
                local: self.collaborator_assignments(None),
            },
            (TrainingLevel::Local { datacenter }, AgentAction::Assignment(a)) => {
                let mut local = self.collaborator_assignments(Some(datacenter));
                local.insert(datacenter, *a);
                HierarchicalAction {
                    global: vec![datacenter as i64; self.env.batch_size()],
                    local,
                }
            }
            (level, action) => {
                return Err(EnvError::action(format!(
                    "{:?} training cannot take action {:?}",
                    level, action
                )))
            }
        };

        let transition = self.env.step(&hierarchical)?;
        let reward = match self.level {
            TrainingLevel::Global => transition.rewards.global,
            TrainingLevel::Local { datacenter } => transition
                .rewards
                .local
                .get(&datacenter)
                .copied()
                .unwrap_or(0.0),
        };
        let presented = self.present(&transition.observation);
        self.last_observation = Some(transition.observation);

        Ok(Transition {
            observation: presented,
            rewards: reward,
            terminated: transition.terminated,
            truncated: transition.truncated,
            info: transition.info,
        })
    }

    pub fn close(&mut self) -> Result<()> {
        self.last_observation = None;
        self.env.close()
    }
}
