use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Resource {0} not found")]
    NotFound(String),

    #[error("No loader can handle resource {0}")]
    LoaderUnavailable(String),

    #[error("Download timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled")]
    Cancelled,

    #[error("A download run is already active")]
    RunInProgress,

    #[error("Invalid resource key: {0}")]
    InvalidKey(String),

    #[error("Worker stopped")]
    WorkerStopped,
}

impl OfflineError {
    /// Text recorded on a failed task and in the error marker. Loader errors
    /// keep their own wording.
    pub fn failure_text(&self) -> String {
        match self {
            OfflineError::Bridge(inner) => inner.to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OfflineError>;
