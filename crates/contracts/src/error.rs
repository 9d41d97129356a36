//! Layered error definitions
//!
//! Categorized by source: config / resolution / lifecycle / device / io

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Request Errors =====
    /// Mutually exclusive requests
    #[error("config conflict: {message}")]
    ConfigConflict { message: String },

    /// No device / profile assignment satisfies the request set
    #[error("failed to resolve request: {message}")]
    ResolutionFailure { message: String },

    // ===== Lifecycle Errors =====
    /// Bounded wait exceeded
    #[error("timeout: {what} did not complete within {waited_ms}ms")]
    Timeout { waited_ms: u64, what: String },

    /// API invoked in an invalid lifecycle state
    #[error("wrong api call sequence: {operation}() {message}")]
    WrongCallSequence {
        operation: &'static str,
        message: String,
    },

    /// Device accessor used before a device is bound
    #[error("device is unavailable: {message}")]
    DeviceUnavailable { message: String },

    /// Invalid argument
    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    // ===== Device Errors =====
    /// Collaborator (device / sensor / factory) failure
    #[error("backend error in '{source_name}': {message}")]
    Backend {
        source_name: String,
        message: String,
    },

    // ===== Configuration File Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create config conflict error
    pub fn config_conflict(message: impl Into<String>) -> Self {
        Self::ConfigConflict {
            message: message.into(),
        }
    }

    /// Create resolution failure
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::ResolutionFailure {
            message: message.into(),
        }
    }

    /// Create timeout error
    pub fn timeout(waited_ms: u64, what: impl Into<String>) -> Self {
        Self::Timeout {
            waited_ms,
            what: what.into(),
        }
    }

    /// Create wrong call sequence error
    pub fn wrong_call_sequence(operation: &'static str, message: impl Into<String>) -> Self {
        Self::WrongCallSequence {
            operation,
            message: message.into(),
        }
    }

    /// Create device unavailable error
    pub fn device_unavailable(message: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            message: message.into(),
        }
    }

    /// Create invalid value error
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Create backend error
    pub fn backend(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether a failed start attempt may be retried.
    ///
    /// Transient device / resolution failures are retryable; request conflicts,
    /// lifecycle misuse and invalid arguments are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ResolutionFailure { .. }
            | Self::Timeout { .. }
            | Self::DeviceUnavailable { .. }
            | Self::Backend { .. }
            | Self::Io(_) => true,
            Self::ConfigConflict { .. }
            | Self::WrongCallSequence { .. }
            | Self::InvalidValue { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigValidation { .. } => false,
        }
    }

    /// Short machine-readable kind (metrics label)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigConflict { .. } => "config_conflict",
            Self::ResolutionFailure { .. } => "resolution_failure",
            Self::Timeout { .. } => "timeout",
            Self::WrongCallSequence { .. } => "wrong_call_sequence",
            Self::DeviceUnavailable { .. } => "device_unavailable",
            Self::InvalidValue { .. } => "invalid_value",
            Self::Backend { .. } => "backend",
            Self::ConfigParse { .. } => "config_parse",
            Self::ConfigValidation { .. } => "config_validation",
            Self::Io(_) => "io",
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ContractError::resolution("no device").is_retryable());
        assert!(ContractError::backend("sensor", "open failed").is_retryable());
        assert!(ContractError::timeout(5000, "wait_for_device").is_retryable());
        assert!(!ContractError::config_conflict("file vs record").is_retryable());
        assert!(!ContractError::wrong_call_sequence("start", "twice").is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = ContractError::wrong_call_sequence("stop", "cannot be called before start()");
        assert_eq!(
            err.to_string(),
            "wrong api call sequence: stop() cannot be called before start()"
        );
        assert_eq!(err.kind(), "wrong_call_sequence");
    }
}
