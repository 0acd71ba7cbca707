//! Machine-readable error codes.
//!
//! Every library error maps to an [`ErrorCode`] so a presentation layer can
//! branch on failures without matching message text, and to a serializable
//! [`StructuredError`] for JSON output.

use serde::Serialize;

use crate::decisions::DecisionError;
use crate::duplicates::{GroupError, MergeError};
use crate::session::SessionError;

/// Stable error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// Every asset has been reviewed. Not a fault.
    NoPhotosRemaining,
    /// An operation was called in the wrong session state.
    InvalidState,
    /// The asset is already being deleted.
    DeleteInFlight,
    /// The backend refused a deletion.
    BackendDelete,
    /// The backend could not list its assets.
    BackendList,
    /// A decision conflicts with the reassignment policy.
    Conflict,
    /// Decisions could not be read or written.
    Persistence,
    /// A duplicate scan was cancelled.
    Cancelled,
    /// Anything else.
    Internal,
}

impl ErrorCode {
    /// The machine-readable code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::NoPhotosRemaining => "PT000",
            Self::InvalidState => "PT001",
            Self::DeleteInFlight => "PT002",
            Self::BackendDelete => "PT010",
            Self::BackendList => "PT011",
            Self::Conflict => "PT020",
            Self::Persistence => "PT021",
            Self::Cancelled => "PT030",
            Self::Internal => "PT099",
        }
    }

    /// Whether the code reports something that went wrong, as opposed to a
    /// normal terminal condition.
    #[must_use]
    pub fn is_fault(self) -> bool {
        !matches!(self, Self::NoPhotosRemaining | Self::Cancelled)
    }
}

impl From<&DecisionError> for ErrorCode {
    fn from(err: &DecisionError) -> Self {
        match err {
            DecisionError::Conflict { .. } => Self::Conflict,
            DecisionError::Persistence(_) => Self::Persistence,
        }
    }
}

impl From<&SessionError> for ErrorCode {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::NoPhotosRemaining => Self::NoPhotosRemaining,
            SessionError::NoActiveBatch
            | SessionError::BatchAlreadyActive
            | SessionError::NotInBatch(_) => Self::InvalidState,
            SessionError::DeleteInFlight(_) => Self::DeleteInFlight,
            SessionError::BackendDelete(_) => Self::BackendDelete,
            SessionError::Decision(e) => e.into(),
            SessionError::List(_) => Self::BackendList,
        }
    }
}

impl From<&MergeError> for ErrorCode {
    fn from(err: &MergeError) -> Self {
        match err {
            MergeError::Backend { .. } => Self::BackendDelete,
            MergeError::Decision { source, .. } => source.into(),
            MergeError::InFlight { .. } => Self::DeleteInFlight,
        }
    }
}

impl From<&GroupError> for ErrorCode {
    fn from(err: &GroupError) -> Self {
        match err {
            GroupError::Cancelled => Self::Cancelled,
            GroupError::ThreadPool(_) => Self::Internal,
        }
    }
}

/// Error information for JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "PT010")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Whether this is a real failure rather than a terminal condition
    pub fault: bool,
}

impl StructuredError {
    /// Build from any error and its code.
    #[must_use]
    pub fn new(err: &dyn std::error::Error, code: ErrorCode) -> Self {
        Self {
            code: code.code().to_string(),
            message: err.to_string(),
            fault: code.is_fault(),
        }
    }
}

impl From<&SessionError> for StructuredError {
    fn from(err: &SessionError) -> Self {
        Self::new(err, err.into())
    }
}

impl From<&MergeError> for StructuredError {
    fn from(err: &MergeError) -> Self {
        Self::new(err, err.into())
    }
}

impl From<&GroupError> for StructuredError {
    fn from(err: &GroupError) -> Self {
        Self::new(err, err.into())
    }
}
