use log::SetLoggerError;
use std::io;
use thiserror::Error;

/// Numeric fault taxonomy surfaced through `MissionStatus::error_code`.
/// 0 means no fault; a non-zero code is published only in the `Error` state.
pub mod code {
    pub const OK: u32 = 0;
    pub const TIMEOUT: u32 = 1201;
    pub const INIT_FAILED: u32 = 1301;
    pub const GENERIC: u32 = 1500;
}

#[derive(Error, Debug)]
pub enum MissionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Initialization failure: {0}")]
    InitializationFailure(String),

    #[error("Runtime fault (code {0})")]
    RuntimeFault(u32),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Logging error: {0}")]
    Logging(#[from] SetLoggerError),

    #[error("Controller unavailable: {0}")]
    Channel(String),
}

impl MissionError {
    /// Map a fault onto the numeric taxonomy published in `error_code`.
    pub fn fault_code(&self) -> u32 {
        match self {
            MissionError::RuntimeFault(code) => *code,
            MissionError::InitializationFailure(_) => code::INIT_FAILED,
            _ => code::GENERIC,
        }
    }
}

pub type MissionResult<T> = std::result::Result<T, MissionError>;
