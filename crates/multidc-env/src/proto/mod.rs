//! Protobuf types for the simulation gateway
//!
//! With the `proto-gen` feature the code is generated at build time by
//! tonic-build from `proto/simulation/v1/simulation.proto`. Otherwise the
//! bundled types below are used; they must stay wire-compatible with the
//! proto file.

#[cfg(feature = "proto-gen")]
pub mod simulation {
    pub mod v1 {
        tonic::include_proto!("simulation.v1");
    }
}

#[cfg(not(feature = "proto-gen"))]
pub mod simulation {
    pub mod v1 {
        use prost::Message;
        use std::collections::HashMap;

        #[derive(Clone, PartialEq, Message)]
        pub struct ConfigureRequest {
            #[prost(string, tag = "1")]
            pub config_json: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ConfigureResponse {
            #[prost(bool, tag = "1")]
            pub success: bool,
            #[prost(string, tag = "2")]
            pub message: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ResetRequest {
            #[prost(int64, tag = "1")]
            pub seed: i64,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ResetResponse {
            #[prost(message, optional, tag = "1")]
            pub global_observation: Option<GlobalObservation>,
            #[prost(map = "int32, message", tag = "2")]
            pub local_observations: HashMap<i32, LocalObservation>,
            #[prost(string, tag = "3")]
            pub info_json: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct StepRequest {
            #[prost(int32, repeated, tag = "1")]
            pub global_actions: Vec<i32>,
            #[prost(map = "int32, int32", tag = "2")]
            pub local_actions: HashMap<i32, i32>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct StepResponse {
            #[prost(message, optional, tag = "1")]
            pub global_observation: Option<GlobalObservation>,
            #[prost(map = "int32, message", tag = "2")]
            pub local_observations: HashMap<i32, LocalObservation>,
            #[prost(double, tag = "3")]
            pub global_reward: f64,
            #[prost(map = "int32, double", tag = "4")]
            pub local_rewards: HashMap<i32, f64>,
            #[prost(bool, tag = "5")]
            pub terminated: bool,
            #[prost(bool, tag = "6")]
            pub truncated: bool,
            #[prost(string, tag = "7")]
            pub info_json: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct WaitingCountRequest {}

        #[derive(Clone, PartialEq, Message)]
        pub struct WaitingCountResponse {
            #[prost(int32, tag = "1")]
            pub count: i32,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct CloseRequest {}

        #[derive(Clone, PartialEq, Message)]
        pub struct CloseResponse {}

        #[derive(Clone, PartialEq, Message)]
        pub struct ShutdownRequest {}

        #[derive(Clone, PartialEq, Message)]
        pub struct ShutdownResponse {}

        #[derive(Clone, PartialEq, Message)]
        pub struct GlobalObservation {
            #[prost(float, repeated, tag = "1")]
            pub dc_current_green_power_w: Vec<f32>,
            #[prost(float, repeated, tag = "2")]
            pub dc_current_power_w: Vec<f32>,
            #[prost(float, repeated, tag = "3")]
            pub dc_green_ratio: Vec<f32>,
            #[prost(float, repeated, tag = "4")]
            pub dc_cumulative_wasted_green_wh: Vec<f32>,
            #[prost(int32, repeated, tag = "5")]
            pub dc_queue_sizes: Vec<i32>,
            #[prost(float, repeated, tag = "6")]
            pub dc_utilizations: Vec<f32>,
            #[prost(int32, repeated, tag = "7")]
            pub dc_available_pes: Vec<i32>,
            #[prost(float, repeated, tag = "8")]
            pub dc_ram_utilizations: Vec<f32>,
            #[prost(int32, tag = "9")]
            pub upcoming_cloudlets_count: i32,
            #[prost(int32, repeated, tag = "10")]
            pub batch_cloudlet_pes: Vec<i32>,
            #[prost(int64, repeated, tag = "11")]
            pub batch_cloudlet_mi: Vec<i64>,
            #[prost(int32, repeated, tag = "12")]
            pub upcoming_pes_distribution: Vec<i32>,
            #[prost(float, tag = "13")]
            pub load_imbalance: f32,
            #[prost(int32, tag = "14")]
            pub recent_completed: i32,
            #[prost(double, tag = "15")]
            pub simulation_time: f64,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct LocalObservation {
            #[prost(float, repeated, tag = "1")]
            pub host_loads: Vec<f32>,
            #[prost(float, repeated, tag = "2")]
            pub host_ram_usage: Vec<f32>,
            #[prost(float, repeated, tag = "3")]
            pub vm_loads: Vec<f32>,
            #[prost(int32, repeated, tag = "4")]
            pub vm_types: Vec<i32>,
            #[prost(int32, repeated, tag = "5")]
            pub vm_available_pes: Vec<i32>,
            #[prost(int32, tag = "6")]
            pub waiting_cloudlets: i32,
            #[prost(int32, tag = "7")]
            pub next_cloudlet_pes: i32,
        }

        pub mod simulation_gateway_client {
            use super::*;
            use tonic::codegen::*;
            use tonic::transport::Uri;

            #[derive(Debug, Clone)]
            pub struct SimulationGatewayClient<T> {
                inner: tonic::client::Grpc<T>,
            }

            impl SimulationGatewayClient<tonic::transport::Channel> {
                pub fn new(channel: tonic::transport::Channel) -> Self {
                    let inner = tonic::client::Grpc::new(channel);
                    Self { inner }
                }
            }

            impl<T> SimulationGatewayClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::BoxBody>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + Send,
            {
                pub fn with_origin(inner: T, origin: Uri) -> Self {
                    let inner = tonic::client::Grpc::with_origin(inner, origin);
                    Self { inner }
                }

                async fn ready(&mut self) -> Result<(), tonic::Status> {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })
                }

                pub async fn configure(
                    &mut self,
                    request: impl tonic::IntoRequest<ConfigureRequest>,
                ) -> Result<tonic::Response<ConfigureResponse>, tonic::Status> {
                    self.ready().await?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/simulation.v1.SimulationGateway/Configure",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn reset(
                    &mut self,
                    request: impl tonic::IntoRequest<ResetRequest>,
                ) -> Result<tonic::Response<ResetResponse>, tonic::Status> {
                    self.ready().await?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/simulation.v1.SimulationGateway/Reset",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn step(
                    &mut self,
                    request: impl tonic::IntoRequest<StepRequest>,
                ) -> Result<tonic::Response<StepResponse>, tonic::Status> {
                    self.ready().await?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/simulation.v1.SimulationGateway/Step",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn get_global_waiting_cloudlets_count(
                    &mut self,
                    request: impl tonic::IntoRequest<WaitingCountRequest>,
                ) -> Result<tonic::Response<WaitingCountResponse>, tonic::Status> {
                    self.ready().await?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/simulation.v1.SimulationGateway/GetGlobalWaitingCloudletsCount",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn close(
                    &mut self,
                    request: impl tonic::IntoRequest<CloseRequest>,
                ) -> Result<tonic::Response<CloseResponse>, tonic::Status> {
                    self.ready().await?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/simulation.v1.SimulationGateway/Close",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }

                pub async fn shutdown(
                    &mut self,
                    request: impl tonic::IntoRequest<ShutdownRequest>,
                ) -> Result<tonic::Response<ShutdownResponse>, tonic::Status> {
                    self.ready().await?;
                    let codec = tonic::codec::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/simulation.v1.SimulationGateway/Shutdown",
                    );
                    self.inner.unary(request.into_request(), path, codec).await
                }
            }
        }
    }
}

pub use simulation::v1::*;
