//! Error types and handling for Drivelink
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Drivelink operations
pub type Result<T> = std::result::Result<T, DriveLinkError>;

/// Main error type for Drivelink
#[derive(Debug, Error)]
pub enum DriveLinkError {
    /// Missing or invalid setup; terminal until the configuration is corrected
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network or HTTP level failure reported by the vehicle cloud
    #[error("Transport error: {status} {reason}")]
    Transport { status: u16, reason: String },

    /// Malformed payload received from the vehicle cloud
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Status endpoint not found, legacy protocol takes over
    #[error("Protocol fallback: {message}")]
    ProtocolFallback { message: String },

    /// Unsupported edit field, value or command
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl DriveLinkError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        DriveLinkError::Config {
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(status: u16, reason: S) -> Self {
        DriveLinkError::Transport {
            status,
            reason: reason.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        DriveLinkError::Parse {
            message: message.into(),
        }
    }

    /// Create a new protocol fallback error
    pub fn protocol_fallback<S: Into<String>>(message: S) -> Self {
        DriveLinkError::ProtocolFallback {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        DriveLinkError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        DriveLinkError::Io {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        DriveLinkError::Web {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        DriveLinkError::Generic {
            message: message.into(),
        }
    }

    /// Whether the error should be reported back to the caller of an entry point
    pub fn is_validation(&self) -> bool {
        matches!(self, DriveLinkError::Validation { .. })
    }
}

impl From<std::io::Error> for DriveLinkError {
    fn from(err: std::io::Error) -> Self {
        DriveLinkError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for DriveLinkError {
    fn from(err: serde_yaml::Error) -> Self {
        DriveLinkError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DriveLinkError {
    fn from(err: serde_json::Error) -> Self {
        DriveLinkError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for DriveLinkError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        DriveLinkError::transport(status, err.to_string())
    }
}
