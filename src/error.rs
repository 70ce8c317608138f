//! Error types for the follower control core
//!
//! Control-path faults (sensor timeouts, near-zero divides, stale timesteps)
//! recover locally and never surface here; this enum covers configuration
//! and rig construction only.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Follower core error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
