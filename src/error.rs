use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Input file is not readable: {0}")]
    InputUnreadable(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Can't access or make directory: {0}")]
    DirectoryUnavailable(String),

    #[error("Invalid trim range: {0}")]
    InvalidRange(String),

    #[error("Failed to launch media processor: {0}")]
    LaunchFailed(String),

    #[error("Media processing failed: {0}")]
    ProcessFailed(String),

    #[error("Thumbnail error: {0}")]
    Thumbnail(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
