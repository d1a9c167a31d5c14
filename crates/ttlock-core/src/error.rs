//! Unified error types for the ttlock core library.
//!
//! [`TtlockError`] covers every failure mode of the bridge: talking to the
//! TTLock cloud, decoding its payloads, addressing locks that are not
//! registered, and loading configuration. The configuration module keeps its
//! own [`ConfigError`](crate::config::ConfigError) for detailed reporting and
//! converts into this type at the crate boundary.
//!
//! # Example
//!
//! ```rust
//! use ttlock_core::error::{Result, TtlockError};
//! use ttlock_core::LockId;
//!
//! fn require_known(lock_id: LockId, known: &[LockId]) -> Result<()> {
//!     if !known.contains(&lock_id) {
//!         return Err(TtlockError::UnknownLock(lock_id));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::models::LockId;

/// The unified error type for all ttlock operations.
#[derive(Debug, Error)]
pub enum TtlockError {
    // =========================================================================
    // REMOTE SERVICE ERRORS
    // =========================================================================
    /// The request never produced a usable HTTP response.
    #[error("Transport error talking to the TTLock cloud: {0}")]
    Transport(String),

    /// The TTLock cloud answered with an HTTP error status.
    #[error("TTLock cloud returned HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The TTLock cloud accepted the request but refused it with a non-zero `errcode`.
    #[error("TTLock cloud rejected the request (errcode {code}): {message}")]
    RemoteRejection {
        /// Application error code reported by the cloud.
        code: i64,
        /// Message reported by the cloud.
        message: String,
    },

    // =========================================================================
    // PAYLOAD ERRORS
    // =========================================================================
    /// A snapshot or push event payload could not be decoded.
    #[error("Malformed payload: {0}")]
    Decode(String),

    // =========================================================================
    // REGISTRY ERRORS
    // =========================================================================
    /// A command or event addressed a lock that is not registered.
    #[error("Lock {0} is not registered with this bridge")]
    UnknownLock(LockId),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration could not be loaded or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),
}

/// A specialized [`Result`] type for ttlock operations.
pub type Result<T> = std::result::Result<T, TtlockError>;

impl TtlockError {
    /// Returns `true` if the error came from the network or HTTP layer.
    #[inline]
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::HttpStatus { .. })
    }

    /// Returns `true` if the cloud refused the request.
    #[inline]
    #[must_use]
    pub const fn is_remote_rejection(&self) -> bool {
        matches!(self, Self::RemoteRejection { .. })
    }

    /// Returns `true` if a payload could not be decoded.
    #[inline]
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if retrying later on the poll cadence may succeed.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 404 Not Found
            Self::UnknownLock(_) | Self::ConfigNotFound(_) => 404,

            // 422 Unprocessable Entity - payload could not be understood
            Self::Decode(_) => 422,

            // 502 Bad Gateway - the cloud answered, but not usefully
            Self::HttpStatus { .. } | Self::RemoteRejection { .. } => 502,

            // 503 Service Unavailable - the cloud could not be reached
            Self::Transport(_) => 503,

            // 500 Internal Server Error - misconfiguration
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 500,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::HttpStatus { .. } => "HTTP_STATUS_ERROR",
            Self::RemoteRejection { .. } => "REMOTE_REJECTION",
            Self::Decode(_) => "DECODE_ERROR",
            Self::UnknownLock(_) => "UNKNOWN_LOCK",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<reqwest::Error> for TtlockError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::HttpStatus {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => Self::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TtlockError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<crate::config::ConfigError> for TtlockError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_classification() {
        assert!(TtlockError::Transport("connection reset".into()).is_transport_error());
        assert!(TtlockError::HttpStatus {
            status: 500,
            body: String::new()
        }
        .is_transport_error());

        assert!(!TtlockError::Decode("bad".into()).is_transport_error());
        assert!(!TtlockError::RemoteRejection {
            code: -3,
            message: "invalid".into()
        }
        .is_transport_error());
    }

    #[test]
    fn test_remote_rejection_classification() {
        let err = TtlockError::RemoteRejection {
            code: -4043,
            message: "The function is not supported for this lock".into(),
        };
        assert!(err.is_remote_rejection());
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("-4043"));
    }

    #[test]
    fn test_config_error_classification() {
        assert!(TtlockError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(TtlockError::ConfigParseError("syntax error".into()).is_config_error());
        assert!(TtlockError::ConfigValidationError("invalid value".into()).is_config_error());

        assert!(!TtlockError::UnknownLock(LockId(1)).is_config_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(TtlockError::Transport("timeout".into()).is_recoverable());
        assert!(TtlockError::HttpStatus {
            status: 503,
            body: String::new()
        }
        .is_recoverable());
        assert!(!TtlockError::HttpStatus {
            status: 401,
            body: String::new()
        }
        .is_recoverable());
        assert!(!TtlockError::UnknownLock(LockId(7)).is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(TtlockError::UnknownLock(LockId(1)).http_status_code(), 404);
        assert_eq!(TtlockError::Decode("x".into()).http_status_code(), 422);
        assert_eq!(
            TtlockError::RemoteRejection {
                code: 1,
                message: String::new()
            }
            .http_status_code(),
            502
        );
        assert_eq!(TtlockError::Transport("x".into()).http_status_code(), 503);
        assert_eq!(
            TtlockError::ConfigValidationError("x".into()).http_status_code(),
            500
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(TtlockError::UnknownLock(LockId(1)).error_code(), "UNKNOWN_LOCK");
        assert_eq!(TtlockError::Decode("x".into()).error_code(), "DECODE_ERROR");
        assert_eq!(
            TtlockError::ConfigNotFound(PathBuf::new()).error_code(),
            "CONFIG_NOT_FOUND"
        );
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let converted: TtlockError = err.into();
        assert!(converted.is_decode_error());
    }

    #[test]
    fn test_unknown_lock_display() {
        let err = TtlockError::UnknownLock(LockId(7_252_408));
        assert!(err.to_string().contains("7252408"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TtlockError>();
        assert_sync::<TtlockError>();
    }
}
