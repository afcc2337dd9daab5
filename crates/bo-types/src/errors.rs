use thiserror::Error;

/// Main error type for the optimization test client
#[derive(Error, Debug)]
pub enum BoError {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors establishing or tearing down a service session.
///
/// Failures of individual calls are not listed here: those end a run and are
/// reported by the service layer's own call error.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Optimization service at {address} unavailable after {waited_ms} ms")]
    Unavailable { address: String, waited_ms: u64 },

    #[error("Invalid service address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Session shutdown failed: {message}")]
    Shutdown { message: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown benchmark: {name}")]
    UnknownBenchmark { name: String },

    #[error("Failed to read config file {path}: {message}")]
    Unreadable { path: String, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for client operations
pub type BoResult<T> = Result<T, BoError>;
