//! Error types for the multi-datacenter environment

use std::fmt;
use thiserror::Error;

/// Which call a result-parsing failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePhase {
    Reset,
    Step,
}

impl fmt::Display for ParsePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsePhase::Reset => write!(f, "reset"),
            ParsePhase::Step => write!(f, "step"),
        }
    }
}

/// Errors surfaced by the environment and its adapters
#[derive(Error, Debug)]
pub enum EnvError {
    #[error(
        "could not connect to simulation gateway on port {port} after {attempts} attempts: {message}. \
         The RPC server must be running and listening on that port"
    )]
    Connection {
        port: u16,
        attempts: u32,
        message: String,
    },

    #[error("simulation configuration failed: {0}")]
    Configuration(String),

    #[error("invalid environment configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid action: {0}")]
    ActionValidation(String),

    #[error("failed to parse {phase} result from simulation: {detail}")]
    ResultParse { phase: ParsePhase, detail: String },

    #[error("failed to reset multi-datacenter simulation: {0}. Check the simulator logs for details")]
    ResetExecution(String),

    #[error("simulation step failed: {0}")]
    StepExecution(String),

    #[error("environment not initialized, call reset() before step()")]
    NotInitialized,

    #[error("wind power prediction error: {0}")]
    Prediction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    pub fn action(msg: impl Into<String>) -> Self {
        EnvError::ActionValidation(msg.into())
    }

    pub fn reset_parse(detail: impl Into<String>) -> Self {
        EnvError::ResultParse {
            phase: ParsePhase::Reset,
            detail: detail.into(),
        }
    }

    pub fn step_parse(detail: impl Into<String>) -> Self {
        EnvError::ResultParse {
            phase: ParsePhase::Step,
            detail: detail.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        EnvError::InvalidConfig(msg.into())
    }
}

/// Errors raised by a simulation backend transport
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("gateway returned status: {0}")]
    Status(#[from] tonic::Status),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend rejected request: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, EnvError>;
