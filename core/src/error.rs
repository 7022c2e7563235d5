use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlashError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot read metadata for volume {volume}: {reason}")]
    MetadataRead { volume: String, reason: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("External command failed: {0}")]
    External(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl FlashError {
    /// Wraps an OS error raised while querying one volume.
    pub fn metadata(volume: &str, reason: impl ToString) -> Self {
        FlashError::MetadataRead {
            volume: volume.to_string(),
            reason: reason.to_string(),
        }
    }
}
