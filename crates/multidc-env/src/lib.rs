//! Hierarchical multi-datacenter scheduling environment
//!
//! This crate provides the core functionality for:
//! - Driving a remote datacenter simulation through reset/step episodes
//! - Two-level actions: batch routing across datacenters, VM assignment inside each
//! - Padding, trimming and action masking across heterogeneous datacenters
//! - Single-agent, parallel multi-agent and joint training presentations
//! - Optional wind power forecasts in the global observation
//! - Configuration, observability and the gRPC simulation client

pub mod adapters;
pub mod config;
pub mod env;
pub mod error;
pub mod gateway;
pub mod models;
pub mod observability;
pub mod prediction;
pub mod proto;

pub use config::{DatacenterConfig, EnvConfig, WindPredictionConfig};
pub use env::{ActionMask, HierarchicalEnv, HierarchicalEnvironment, MaskDecision, Space};
pub use error::{EnvError, Result};
pub use gateway::GatewayShutdown;
pub use models::*;
pub use observability::{EnvMetrics, EpisodeLogger};
