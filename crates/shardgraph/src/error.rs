//! Error kinds surfaced by scopes, device contexts, and operator handles.

use thiserror::Error;

use crate::device::Place;

/// Failure raised while resolving variables or executing an operator handle.
///
/// Every variant is fatal for the current run; callers abort graph execution rather than retry.
#[derive(Debug, Error)]
pub enum GatherError {
    /// A variable holds a value of a different kind than requested, or holds nothing.
    #[error("variable '{name}' holds {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    /// A scope, variable, or device-context binding could not be resolved.
    #[error("{what} not found")]
    NotFound { what: String },
    /// Inputs disagree on height, dtype, or feature shape.
    #[error("inconsistent gather input: {detail}")]
    InconsistentInput { detail: String },
    /// Work enqueued on a device context failed.
    #[error("device {place} failed: {message}")]
    Device { place: Place, message: String },
    /// The operator or graph was wired incorrectly.
    #[error("invalid graph construction: {detail}")]
    Construction { detail: String },
}

impl GatherError {
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        GatherError::TypeMismatch {
            name: name.into(),
            expected,
            found,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        GatherError::NotFound { what: what.into() }
    }

    pub fn inconsistent(detail: impl Into<String>) -> Self {
        GatherError::InconsistentInput {
            detail: detail.into(),
        }
    }

    pub fn device(place: Place, message: impl Into<String>) -> Self {
        GatherError::Device {
            place,
            message: message.into(),
        }
    }

    pub fn construction(detail: impl Into<String>) -> Self {
        GatherError::Construction {
            detail: detail.into(),
        }
    }
}

/// Convenience alias for results returned by graph and scope routines.
pub type GatherResult<T> = Result<T, GatherError>;
