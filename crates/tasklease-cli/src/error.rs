//! Error types for the tasklease CLI

use tasklease_supervisor::SupervisorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidConfiguration(_) | Self::YamlError(_) | Self::JsonError(_) => 4,
            Self::Supervisor(SupervisorError::InvalidConfiguration(_)) => 4,
            Self::Supervisor(SupervisorError::TimerInit(_)) => 5,
            Self::Supervisor(_) => 1,
            Self::IoError(_) => 3,
        }
    }
}
