//! Remote simulation gateway
//!
//! This module provides:
//! - The `SimulationBackend` contract the environment core drives
//! - A gRPC implementation over tonic
//! - A shared shutdown coordinator for gateways used by several environments
//! - A scripted in-memory simulation for tests and dry runs

mod client;
pub mod mock;
mod shutdown;

use crate::error::BackendError;
use crate::proto;
use std::collections::HashMap;

pub use client::{GrpcConnector, GrpcSimulationClient};
pub use shutdown::GatewayShutdown;

/// Raw reset payload as returned by the simulator
pub type RawResetResult = proto::ResetResponse;

/// Raw step payload as returned by the simulator
pub type RawStepResult = proto::StepResponse;

/// Blocking view of the remote simulation engine
pub trait SimulationBackend: Send {
    /// Send the simulation parameters (JSON)
    fn configure(&mut self, config_json: &str) -> Result<(), BackendError>;

    fn reset(&mut self, seed: i64) -> Result<RawResetResult, BackendError>;

    /// `local_actions` maps datacenter id to target VM id, `-1` for no assignment
    fn step(
        &mut self,
        global_actions: Vec<i32>,
        local_actions: HashMap<i32, i32>,
    ) -> Result<RawStepResult, BackendError>;

    /// Cloudlets currently waiting for a routing decision
    fn global_waiting_cloudlets_count(&mut self) -> Result<usize, BackendError>;

    /// Close the simulation environment on the server
    fn close(&mut self) -> Result<(), BackendError>;

    /// Tear down the gateway process itself
    fn shutdown_gateway(&mut self) -> Result<(), BackendError>;
}

/// Opens backend connections
pub trait Connector: Send {
    fn connect(&self) -> Result<Box<dyn SimulationBackend>, BackendError>;

    /// Port reported in connection errors
    fn port(&self) -> u16;

    /// Human-readable target for logs
    fn target(&self) -> String;
}
