//! Training-framework presentations of the hierarchical environment
//!
//! - `single_level`: one level trained as a single agent, the other played by a collaborator
//! - `parallel`: one named agent per decision point with per-agent masks
//! - `joint`: the full two-level structure with combined rewards
//!
//! All three translate through `translate`, so a given sequence of decisions
//! drives the simulation identically whichever presentation is used.

mod joint;
mod parallel;
mod single_level;
pub mod translate;

pub use joint::{energy_summary, total_reward, JointEnv, JointEpisode, JointStep};
pub use parallel::{
    AgentMap, AgentObservation, ParallelEnv, ParallelStep, ACTION_MASK_KEY, OBSERVATION_KEY,
};
pub use single_level::{
    Collaborator, FrozenPolicy, SingleLevelEnv, SingleLevelTransition, TrainingLevel,
};
pub use translate::{AgentAction, AgentId};
