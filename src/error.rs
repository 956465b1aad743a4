use crate::CameraId;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by a capture backend
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to open capture device {index}: {reason}")]
    Open { index: u32, reason: String },

    #[error("failed to read frame: {0}")]
    Read(String),

    #[error("device is closed")]
    Closed,
}

/// Failures raised by a frame processor
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The processor cannot run at all (missing model file, runtime not loadable)
    #[error("processor unavailable: {0}")]
    Unavailable(String),

    #[error("processor failed: {0}")]
    Failed(String),
}

/// Failures raised by snapshot persistence
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot {0} not found")]
    NotFound(String),

    #[error("snapshot storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot index is corrupt: {0}")]
    Index(#[from] serde_json::Error),
}

/// Errors surfaced by the camera service
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("camera {camera_id} could not be opened: {source}")]
    DeviceOpen {
        camera_id: CameraId,
        #[source]
        source: DeviceError,
    },

    #[error("camera {camera_id} did not produce a frame: {source}")]
    ReadFailure {
        camera_id: CameraId,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Persistence(PersistenceError),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

impl Error {
    /// Stable failure code reported to clients
    pub fn code(&self) -> &'static str {
        match self {
            Error::DeviceOpen { .. } => "DEVICE_OPEN_ERROR",
            Error::ReadFailure { .. } => "READ_FAILURE",
            Error::Processor(ProcessorError::Unavailable(_)) => "PROCESSOR_UNAVAILABLE",
            Error::Processor(ProcessorError::Failed(_)) => "PROCESSOR_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Persistence(_) => "PERSISTENCE_ERROR",
            Error::Encode(_) => "ENCODE_ERROR",
        }
    }
}

impl From<PersistenceError> for Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(artifact) => Error::NotFound(artifact),
            other => Error::Persistence(other),
        }
    }
}
