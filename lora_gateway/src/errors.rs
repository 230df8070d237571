// errors.rs: thiserror-based error types for the gateway
use gateway_protocol::FramingError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    #[error("radio lock not acquired within {0:?}")] AcquireTimeout(Duration),
    #[error("radio still busy after {0:?}")] BusyTimeout(Duration),
    #[error("radio hardware: {0}")] Hardware(String),
    #[error("radio init failed: {0}")] Init(String),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("command queue full ({capacity} entries)")] QueueFull { capacity: usize },
    #[error("device registry full ({max} devices)")] RegistryFull { max: usize },
    #[error("invalid command: {0}")] InvalidCommand(String),
    #[error("storage: {0}")] Storage(String),
    #[error("Radio: {0}")] Radio(#[from] RadioError),
    #[error("Framing: {0}")] Framing(#[from] FramingError),
    #[error("IO: {0}")] Io(#[from] std::io::Error),
    #[error("JSON: {0}")] Json(#[from] serde_json::Error),
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
