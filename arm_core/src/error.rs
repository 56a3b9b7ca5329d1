use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArmError {
    #[error("invalid pose: {0}")]
    InvalidPose(String),
    #[error("invalid test definition: {0}")]
    InvalidDefinition(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("bridge disconnected")]
    Disconnected,
    #[error("invalid state: {0}")]
    State(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
