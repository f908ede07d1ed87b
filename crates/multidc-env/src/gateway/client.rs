//! gRPC client for the simulation gateway
//!
//! The environment API is synchronous, so each client owns a current-thread
//! tokio runtime and blocks on every call.

use super::{Connector, RawResetResult, RawStepResult, SimulationBackend};
use crate::config::EnvConfig;
use crate::error::BackendError;
use crate::observability::EnvMetrics;
use crate::proto::{
    simulation_gateway_client::SimulationGatewayClient, CloseRequest, ConfigureRequest,
    ResetRequest, ShutdownRequest, StepRequest, WaitingCountRequest,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

/// Builds gRPC connections from the environment configuration
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    endpoint: String,
    port: u16,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(endpoint: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: endpoint.into(),
            port,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(config: &EnvConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            port: config.gateway_port,
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn validated_endpoint(&self) -> Result<Endpoint, BackendError> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| BackendError::Transport(format!("invalid endpoint {}: {}", self.endpoint, e)))?;
        if url.host_str().is_none() {
            return Err(BackendError::Transport(format!(
                "no host in endpoint {}",
                self.endpoint
            )));
        }
        Endpoint::from_shared(self.endpoint.clone())
            .map(|e| {
                e.connect_timeout(self.connect_timeout)
                    .timeout(self.request_timeout)
                    .tcp_nodelay(true)
            })
            .map_err(|e| BackendError::Transport(e.to_string()))
    }
}

impl Connector for GrpcConnector {
    fn connect(&self) -> Result<Box<dyn SimulationBackend>, BackendError> {
        let endpoint = self.validated_endpoint()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to start runtime: {}", e)))?;

        let channel: Channel = runtime
            .block_on(endpoint.connect())
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        info!(endpoint = %self.endpoint, "Connected to simulation gateway");
        Ok(Box::new(GrpcSimulationClient {
            runtime,
            client: SimulationGatewayClient::new(channel),
            metrics: EnvMetrics::new(),
        }))
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn target(&self) -> String {
        self.endpoint.clone()
    }
}

/// Connected gateway client
pub struct GrpcSimulationClient {
    runtime: Runtime,
    client: SimulationGatewayClient<Channel>,
    metrics: EnvMetrics,
}

impl GrpcSimulationClient {
    fn observe(&self, method: &str, start: Instant) {
        let elapsed = start.elapsed();
        self.metrics.observe_rpc_latency(method, elapsed.as_secs_f64());
        debug!(method = method, elapsed_ms = elapsed.as_millis() as u64, "Gateway call completed");
    }
}

impl SimulationBackend for GrpcSimulationClient {
    fn configure(&mut self, config_json: &str) -> Result<(), BackendError> {
        let start = Instant::now();
        let response = self
            .runtime
            .block_on(self.client.configure(ConfigureRequest {
                config_json: config_json.to_string(),
            }))?
            .into_inner();
        self.observe("configure", start);

        if response.success {
            Ok(())
        } else {
            Err(BackendError::Rejected(response.message))
        }
    }

    fn reset(&mut self, seed: i64) -> Result<RawResetResult, BackendError> {
        let start = Instant::now();
        let response = self
            .runtime
            .block_on(self.client.reset(ResetRequest { seed }))?
            .into_inner();
        self.observe("reset", start);
        Ok(response)
    }

    fn step(
        &mut self,
        global_actions: Vec<i32>,
        local_actions: HashMap<i32, i32>,
    ) -> Result<RawStepResult, BackendError> {
        let start = Instant::now();
        let response = self
            .runtime
            .block_on(self.client.step(StepRequest {
                global_actions,
                local_actions,
            }))?
            .into_inner();
        self.observe("step", start);
        Ok(response)
    }

    fn global_waiting_cloudlets_count(&mut self) -> Result<usize, BackendError> {
        let start = Instant::now();
        let response = self
            .runtime
            .block_on(self.client.get_global_waiting_cloudlets_count(WaitingCountRequest {}))?
            .into_inner();
        self.observe("waiting_count", start);
        Ok(response.count.max(0) as usize)
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.runtime.block_on(self.client.close(CloseRequest {}))?;
        Ok(())
    }

    fn shutdown_gateway(&mut self) -> Result<(), BackendError> {
        self.runtime.block_on(self.client.shutdown(ShutdownRequest {}))?;
        Ok(())
    }
}
