use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("timeout waiting for {0}")]
    Timeout(&'static str),
    #[error("did not receive READY from controller")]
    NotReady,
    #[error("bridge is not connected")]
    Disconnected,
    #[error("open serial port {0}")]
    Open(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
