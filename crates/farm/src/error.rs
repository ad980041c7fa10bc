use thiserror::Error;

use crate::registry::FarmId;

/// Errors returned by farm administration, submission, and result reads.
#[derive(Debug, Error)]
pub enum FarmError {
    #[error("farm is not running")]
    NotRunning,

    #[error("farm is already running")]
    AlreadyRunning,

    #[error("farm is already initialized")]
    AlreadyInitialized,

    #[error("farm has not been initialized")]
    NotInitialized,

    /// The result slot was closed before a worker delivered a value.
    #[error("job was interrupted before it executed")]
    Interrupted,

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(std::io::Error),

    #[error("farm {0} is not registered")]
    UnknownFarm(FarmId),

    /// Failure reported by the embedder's start or shutdown hook, passed through unchanged.
    #[error(transparent)]
    Hook(#[from] anyhow::Error),
}

impl FarmError {
    /// Whether this error means the job never ran (safe to resubmit).
    pub fn is_interrupted(&self) -> bool {
        matches!(self, FarmError::Interrupted)
    }
}
