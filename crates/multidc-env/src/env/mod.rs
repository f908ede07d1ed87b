//! Hierarchical multi-datacenter environment
//!
//! This module provides:
//! - The reset/step state machine over a simulation backend
//! - Padding and trimming between the shared and per-datacenter schemas
//! - The local action-masking policy
//! - Observation and action space descriptors

mod hierarchical;
pub mod masking;
pub mod padding;
pub mod spaces;

#[cfg(test)]
mod tests;

use crate::error::Result;
use crate::models::{
    DatacenterLayout, EpisodeState, HierarchicalAction, HierarchicalObservation,
    HierarchicalTransition, Info,
};

pub use hierarchical::HierarchicalEnv;
pub use masking::{compute_mask, ActionMask, MaskDecision};
pub use spaces::{DType, Space};

/// Two-level environment contract shared by the core and its decorators
pub trait HierarchicalEnvironment {
    fn layout(&self) -> &DatacenterLayout;

    /// Routing decisions expected per step
    fn batch_size(&self) -> usize;

    /// Start a new episode; `None` uses seed 0
    fn reset(&mut self, seed: Option<i64>) -> Result<(HierarchicalObservation, Info)>;

    fn step(&mut self, action: &HierarchicalAction) -> Result<HierarchicalTransition>;

    /// Mask over the shared local action space (`max_vms + 1`) for one datacenter
    fn local_action_mask(&self, dc_id: usize) -> ActionMask;

    fn episode(&self) -> &EpisodeState;

    /// Horizon of the forecast tensor in the global observation, if any
    fn forecast_horizon(&self) -> Option<usize> {
        None
    }

    fn close(&mut self) -> Result<()>;

    fn global_observation_space(&self) -> Space {
        spaces::global_observation_space(self.layout().len(), self.batch_size(), self.forecast_horizon())
    }

    fn global_action_space(&self) -> Space {
        spaces::global_action_space(self.layout().len(), self.batch_size())
    }

    fn local_observation_space(&self) -> Space {
        spaces::shared_local_observation_space(self.layout())
    }

    fn local_action_space(&self) -> Space {
        spaces::shared_local_action_space(self.layout())
    }
}

impl<E: HierarchicalEnvironment + ?Sized> HierarchicalEnvironment for Box<E> {
    fn layout(&self) -> &DatacenterLayout {
        (**self).layout()
    }

    fn batch_size(&self) -> usize {
        (**self).batch_size()
    }

    fn reset(&mut self, seed: Option<i64>) -> Result<(HierarchicalObservation, Info)> {
        (**self).reset(seed)
    }

    fn step(&mut self, action: &HierarchicalAction) -> Result<HierarchicalTransition> {
        (**self).step(action)
    }

    fn local_action_mask(&self, dc_id: usize) -> ActionMask {
        (**self).local_action_mask(dc_id)
    }

    fn episode(&self) -> &EpisodeState {
        (**self).episode()
    }

    fn forecast_horizon(&self) -> Option<usize> {
        (**self).forecast_horizon()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
