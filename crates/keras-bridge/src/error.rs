//! Error types for the keras-bridge crate.
//!
//! This module defines [`BridgeError`], the single error type used throughout
//! the crate. All public API functions return [`Result<T>`](Result).
//!
//! # Error Kinds
//!
//! | Variant | Raised by | Recoverable |
//! |---------|-----------|-------------|
//! | [`InitializationFailed`](BridgeError::InitializationFailed) | [`RuntimeHandle::acquire`](crate::RuntimeHandle::acquire) | No (fatal) |
//! | [`AttributeNotFound`](BridgeError::AttributeNotFound) | [`InvocationDispatcher`](crate::InvocationDispatcher) | Caller decides |
//! | [`UnsupportedType`](BridgeError::UnsupportedType) | [`to_foreign_any`](crate::value::to_foreign_any) | Caller decides |
//! | [`ConversionError`](BridgeError::ConversionError) | value bridge, backends, flattener | Caller decides |
//! | [`ForeignInvocationError`](BridgeError::ForeignInvocationError) | the embedded runtime | Caller decides |
//!
//! Nothing in the bridge recovers locally. The only retry anywhere is the
//! single repair attempt during initialization.
//!
//! # Example
//!
//! ```
//! use keras_bridge::BridgeError;
//!
//! let err = BridgeError::UnsupportedType("core::time::Duration".to_string());
//! assert_eq!(err.code(), "UNSUPPORTED_TYPE");
//! assert!(!err.is_fatal());
//! ```

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for bridge operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BridgeError {
    /// The embedded runtime could not be brought up, even after the single
    /// repair attempt.
    ///
    /// The message carries the diagnostics of every attempt. A handle that
    /// failed once keeps returning this error without retrying.
    #[error("Runtime initialization failed: {0}")]
    InitializationFailed(String),

    /// A segment of a call target's attribute path did not resolve.
    #[error("Attribute '{segment}' not found while resolving '{path}'")]
    AttributeNotFound {
        /// The first segment that was missing.
        segment: String,
        /// The full dotted path being resolved.
        path: String,
    },

    /// A host value's type lies outside the closed conversion set.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// A value did not have the shape the conversion expected.
    #[error("Conversion error: expected {expected}, found {found}")]
    ConversionError {
        /// What the conversion needed.
        expected: String,
        /// What it actually got.
        found: String,
    },

    /// The embedded runtime raised during a call.
    ///
    /// The message is the runtime's own diagnostic text, unmodified.
    #[error("Foreign invocation error: {0}")]
    ForeignInvocationError(String),
}

impl BridgeError {
    /// Shorthand for building a [`ConversionError`](Self::ConversionError).
    pub fn conversion(expected: impl Into<String>, found: impl Into<String>) -> Self {
        BridgeError::ConversionError {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Stable error code, suitable for machine consumption (CLI `--json`).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InitializationFailed(_) => "INITIALIZATION_FAILED",
            Self::AttributeNotFound { .. } => "ATTRIBUTE_NOT_FOUND",
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            Self::ConversionError { .. } => "CONVERSION_ERROR",
            Self::ForeignInvocationError(_) => "FOREIGN_INVOCATION_ERROR",
        }
    }

    /// Whether the error should end the process.
    ///
    /// Only a failed initialization is fatal; everything else is surfaced to
    /// the caller, who decides whether the condition is recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InitializationFailed(_))
    }
}

/// Errors serialize as a struct with `code` and `message` fields.
impl Serialize for BridgeError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("BridgeError", 2)?;
        state.serialize_field("code", &self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

#[cfg(feature = "python")]
impl From<pyo3::PyErr> for BridgeError {
    fn from(err: pyo3::PyErr) -> Self {
        BridgeError::ForeignInvocationError(err.to_string())
    }
}

/// Lets `?` pass through pyo3's infallible conversions.
impl From<std::convert::Infallible> for BridgeError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            BridgeError::InitializationFailed("x".to_string()).code(),
            "INITIALIZATION_FAILED"
        );
        assert_eq!(
            BridgeError::conversion("int", "tuple").code(),
            "CONVERSION_ERROR"
        );
    }

    #[test]
    fn test_is_fatal() {
        assert!(BridgeError::InitializationFailed("boom".to_string()).is_fatal());
        assert!(!BridgeError::ForeignInvocationError("ValueError".to_string()).is_fatal());
    }

    #[test]
    fn test_attribute_not_found_names_segment() {
        let err = BridgeError::AttributeNotFound {
            segment: "missing".to_string(),
            path: "keras.layers.missing".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'missing'"));
        assert!(msg.contains("keras.layers.missing"));
    }

    #[test]
    fn test_error_serialization() {
        let err = BridgeError::UnsupportedType("HashSet".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("UNSUPPORTED_TYPE"));
        assert!(json.contains("HashSet"));
    }
}
