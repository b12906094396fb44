use thiserror::Error;

/// Broad failure classes shared by both bus components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The device node could not be opened, bound or configured.
    DeviceUnavailable,
    /// A transaction moved fewer bytes than requested.
    TransactionShort,
    /// The kernel rejected the transaction outright.
    TransactionFailed,
    /// The call was rejected before touching hardware.
    Precondition,
    /// A shared bus operation did not finish in time.
    Timeout,
}

/// Errors reported by the command and serial bus transports
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Bus device '{device}' unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("Short transfer on '{device}': expected {expected} byte(s), moved {actual}")]
    ShortTransfer {
        device: String,
        expected: usize,
        actual: usize,
    },

    #[error("Transaction on '{device}' failed: {reason}")]
    TransactionFailed { device: String, reason: String },

    #[error("Bus device '{device}' is not open")]
    NotOpen { device: String },

    #[error("Rejected request on '{device}': {reason}")]
    InvalidRequest { device: String, reason: String },

    #[error("Bus '{bus}' communication timeout after {timeout_ms}ms")]
    BusTimeout { bus: String, timeout_ms: u64 },

    #[error("Operation '{operation}' is not supported on '{device}'")]
    Unsupported { device: String, operation: String },
}

impl BusError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BusError::DeviceUnavailable { .. } => FailureKind::DeviceUnavailable,
            BusError::ShortTransfer { .. } => FailureKind::TransactionShort,
            BusError::TransactionFailed { .. } => FailureKind::TransactionFailed,
            BusError::NotOpen { .. }
            | BusError::InvalidRequest { .. }
            | BusError::Unsupported { .. } => FailureKind::Precondition,
            BusError::BusTimeout { .. } => FailureKind::Timeout,
        }
    }

    pub(crate) fn invalid(device: &str, reason: impl Into<String>) -> Self {
        BusError::InvalidRequest {
            device: device.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_open(device: &str) -> Self {
        BusError::NotOpen {
            device: device.to_string(),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Bus bring-up errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Bus configuration failed: {0}")]
    Config(#[from] ConfigError),

    #[error("Bus '{bus}' failed to start: {source}")]
    BusInitError {
        bus: String,
        #[source]
        source: BusError,
    },
}

/// Result type aliases for convenience
pub type BusResult<T> = Result<T, BusError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type RegistryResult<T> = Result<T, RegistryError>;
