use std::error::Error;
use std::fmt;

/// Error type for beat map, resource and configuration operations
#[derive(Debug)]
pub enum SyncError {
    /// An audio segment failed to load
    Load(String),
    /// An audio segment failed to unload
    Unload(String),
    /// The operation was aborted through its cancel token
    Cancelled,
    /// A map definition describes an impossible tick grid
    InvalidMap(String),
    /// Settings could not be read or are out of range
    Config(String),
    /// Filesystem error, mostly from logger setup
    Io(std::io::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Load(msg) => write!(f, "segment load error: {}", msg),
            SyncError::Unload(msg) => write!(f, "segment unload error: {}", msg),
            SyncError::Cancelled => write!(f, "operation cancelled"),
            SyncError::InvalidMap(msg) => write!(f, "invalid beat map: {}", msg),
            SyncError::Config(msg) => write!(f, "configuration error: {}", msg),
            SyncError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(e: config::ConfigError) -> Self {
        SyncError::Config(e.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e)
    }
}

/// Result type for beatsyncrs operations
pub type Result<T> = std::result::Result<T, SyncError>;
