//! Translation between the hierarchical structure and per-agent maps
//!
//! Every adapter goes through these functions, so they all present the same
//! simulated step in different shapes.

use crate::env::padding::trim_local;
use crate::error::{EnvError, Result};
use crate::models::{
    DatacenterLayout, HierarchicalAction, HierarchicalObservation, HierarchicalRewards, ObsValue,
};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const GLOBAL_AGENT: &str = "global_agent";
pub const LOCAL_AGENT_PREFIX: &str = "local_agent_";

/// Flat agent name
///
/// Ordering puts the global agent first, then local agents by datacenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentId {
    Global,
    Local(usize),
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentId::Global => f.write_str(GLOBAL_AGENT),
            AgentId::Local(dc) => write!(f, "{}{}", LOCAL_AGENT_PREFIX, dc),
        }
    }
}

impl FromStr for AgentId {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self> {
        if s == GLOBAL_AGENT {
            return Ok(AgentId::Global);
        }
        s.strip_prefix(LOCAL_AGENT_PREFIX)
            .and_then(|id| id.parse::<usize>().ok())
            .map(AgentId::Local)
            .ok_or_else(|| EnvError::action(format!("unknown agent '{}'", s)))
    }
}

/// Every agent for a layout
pub fn agents(layout: &DatacenterLayout) -> Vec<AgentId> {
    std::iter::once(AgentId::Global)
        .chain(layout.ids().map(AgentId::Local))
        .collect()
}

/// Action of a single agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentAction {
    /// One datacenter index per batch slot
    Routing(Vec<i64>),
    /// `0` for no assignment, `k` for VM `k - 1`
    Assignment(i64),
}

pub fn flat_to_hierarchical_action(
    actions: &BTreeMap<AgentId, AgentAction>,
) -> Result<HierarchicalAction> {
    let mut hierarchical = HierarchicalAction::default();
    for (agent, action) in actions {
        match (agent, action) {
            (AgentId::Global, AgentAction::Routing(routes)) => hierarchical.global = routes.clone(),
            (AgentId::Local(dc), AgentAction::Assignment(a)) => {
                hierarchical.local.insert(*dc, *a);
            }
            (agent, action) => {
                return Err(EnvError::action(format!(
                    "{} cannot take action {:?}",
                    agent, action
                )))
            }
        }
    }
    Ok(hierarchical)
}

pub fn hierarchical_to_flat_action(action: &HierarchicalAction) -> BTreeMap<AgentId, AgentAction> {
    std::iter::once((AgentId::Global, AgentAction::Routing(action.global.clone())))
        .chain(
            action
                .local
                .iter()
                .map(|(&dc, &a)| (AgentId::Local(dc), AgentAction::Assignment(a))),
        )
        .collect()
}

pub fn hierarchical_to_flat_rewards(rewards: &HierarchicalRewards) -> BTreeMap<AgentId, f64> {
    std::iter::once((AgentId::Global, rewards.global))
        .chain(rewards.local.iter().map(|(&dc, &r)| (AgentId::Local(dc), r)))
        .collect()
}

/// Per-agent observations, local ones trimmed to the datacenter's true size
pub fn hierarchical_to_flat_observation(
    observation: &HierarchicalObservation,
    layout: &DatacenterLayout,
) -> BTreeMap<AgentId, ObsValue> {
    let mut flat = BTreeMap::new();
    flat.insert(AgentId::Global, observation.global.to_obs_value());
    for (&dc_id, local) in &observation.local {
        if let Some(dc) = layout.get(dc_id) {
            flat.insert(AgentId::Local(dc_id), trim_local(local, dc).to_obs_value());
        }
    }
    flat
}

/// Concatenate per-agent values, agent by agent, each in sorted key order
pub fn state_vector<'a>(values: impl IntoIterator<Item = &'a ObsValue>) -> Vec<f32> {
    let mut state = Vec::new();
    for value in values {
        value.flatten_into(&mut state);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatacenterDescriptor, LocalObservation};

    fn layout() -> DatacenterLayout {
        DatacenterLayout::new(vec![
            DatacenterDescriptor { id: 0, host_count: 1, vm_count: 2 },
            DatacenterDescriptor { id: 1, host_count: 2, vm_count: 3 },
        ])
    }

    #[test]
    fn test_agent_id_names() {
        assert_eq!(AgentId::Global.to_string(), "global_agent");
        assert_eq!(AgentId::Local(3).to_string(), "local_agent_3");
        assert_eq!("local_agent_12".parse::<AgentId>().unwrap(), AgentId::Local(12));
        assert_eq!("global_agent".parse::<AgentId>().unwrap(), AgentId::Global);
        assert!("local_agent_x".parse::<AgentId>().is_err());
        assert!("observer".parse::<AgentId>().is_err());
        assert_eq!(
            agents(&layout()),
            vec![AgentId::Global, AgentId::Local(0), AgentId::Local(1)]
        );
    }

    #[test]
    fn test_action_translation() {
        let flat = BTreeMap::from([
            (AgentId::Global, AgentAction::Routing(vec![1, 0])),
            (AgentId::Local(1), AgentAction::Assignment(2)),
        ]);
        let hierarchical = flat_to_hierarchical_action(&flat).unwrap();
        assert_eq!(hierarchical.global, vec![1, 0]);
        assert_eq!(hierarchical.local, BTreeMap::from([(1, 2)]));
        assert_eq!(hierarchical_to_flat_action(&hierarchical), flat);

        let mismatched = BTreeMap::from([(AgentId::Global, AgentAction::Assignment(1))]);
        assert!(matches!(
            flat_to_hierarchical_action(&mismatched),
            Err(EnvError::ActionValidation(_))
        ));
    }

    #[test]
    fn test_local_observations_trimmed() {
        let mut observation = HierarchicalObservation::default();
        observation.local.insert(
            0,
            LocalObservation {
                host_loads: vec![0.5, 0.0],
                host_ram_usage: vec![0.25, 0.0],
                vm_loads: vec![0.1, 0.2, 0.0],
                vm_types: vec![1, 2, 0],
                vm_available_pes: vec![2, 1, 0],
                waiting_cloudlets: 3,
                next_cloudlet_pes: 2,
            },
        );

        let flat = hierarchical_to_flat_observation(&observation, &layout());
        let local = flat[&AgentId::Local(0)].flatten();
        // host_loads, host_ram_usage, next_cloudlet_pes, vm_available_pes, vm_loads, vm_types, waiting
        assert_eq!(
            local,
            vec![0.5, 0.25, 2.0, 2.0, 1.0, 0.1, 0.2, 1.0, 2.0, 3.0]
        );
        assert!(!flat.contains_key(&AgentId::Local(1)));
    }
}
