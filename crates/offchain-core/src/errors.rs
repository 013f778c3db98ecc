//! Error types shared across the workspace

use crate::identifiers::{CommandId, ObjectId};
use crate::object::ObjectStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error for configuration and ambient failures
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum OffchainError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Description of the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// What was not found
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

impl OffchainError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for OffchainError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

/// Machine-readable reason a command was not applied.
///
/// Travels on the wire inside rejections and is stored with rejected
/// sequence entries for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Expected prior version does not match the object's version
    InvalidTransition { expected: u64, actual: u64 },
    /// The prior version was produced by a different command
    StaleParent,
    /// The object already reached a terminal status
    TerminalObject,
    /// Domain validation refused the proposed state
    SchemaViolation { code: String, detail: String },
    /// The command raced a command of the other party and lost the tie-break
    LostConflict,
    /// The command targets a different object than the one it was applied to
    WrongObject,
}

impl RejectReason {
    /// Stable reason code
    pub fn code(&self) -> &str {
        match self {
            RejectReason::InvalidTransition { .. } => "invalid_transition",
            RejectReason::StaleParent => "stale_parent",
            RejectReason::TerminalObject => "terminal_object",
            RejectReason::SchemaViolation { code, .. } => code,
            RejectReason::LostConflict => "lost_conflict",
            RejectReason::WrongObject => "wrong_object",
        }
    }

    /// Whether re-proposing against the current version can succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            RejectReason::SchemaViolation { .. } | RejectReason::TerminalObject
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidTransition { expected, actual } => write!(
                f,
                "invalid_transition (expected version {expected}, object at {actual})"
            ),
            RejectReason::SchemaViolation { code, detail } => write!(f, "{code}: {detail}"),
            other => f.write_str(other.code()),
        }
    }
}

/// Failure of applying a command to an object version
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{command_id} expects {object_id} at version {expected}, found {actual}")]
    InvalidTransition {
        command_id: CommandId,
        object_id: ObjectId,
        expected: u64,
        actual: u64,
    },

    #[error("{command_id} builds on a version of {object_id} produced by another command")]
    StaleParent {
        command_id: CommandId,
        object_id: ObjectId,
    },

    #[error("{command_id} updates {object_id} which is already {status}")]
    TerminalObject {
        command_id: CommandId,
        object_id: ObjectId,
        status: ObjectStatus,
    },

    #[error("{command_id} violates schema of {object_id}: {code}: {detail}")]
    SchemaViolation {
        command_id: CommandId,
        object_id: ObjectId,
        code: String,
        detail: String,
    },

    #[error("{command_id} targets {expected} but was applied to {actual}")]
    WrongObject {
        command_id: CommandId,
        expected: ObjectId,
        actual: ObjectId,
    },
}

impl TransitionError {
    /// Offending command
    pub fn command_id(&self) -> CommandId {
        match self {
            TransitionError::InvalidTransition { command_id, .. }
            | TransitionError::StaleParent { command_id, .. }
            | TransitionError::TerminalObject { command_id, .. }
            | TransitionError::SchemaViolation { command_id, .. }
            | TransitionError::WrongObject { command_id, .. } => *command_id,
        }
    }

    /// Wire-level reason for this failure
    pub fn reason(&self) -> RejectReason {
        match self {
            TransitionError::InvalidTransition {
                expected, actual, ..
            } => RejectReason::InvalidTransition {
                expected: *expected,
                actual: *actual,
            },
            TransitionError::StaleParent { .. } => RejectReason::StaleParent,
            TransitionError::TerminalObject { .. } => RejectReason::TerminalObject,
            TransitionError::SchemaViolation { code, detail, .. } => {
                RejectReason::SchemaViolation {
                    code: code.clone(),
                    detail: detail.clone(),
                }
            }
            TransitionError::WrongObject { .. } => RejectReason::WrongObject,
        }
    }
}

/// Standard Result type for core operations
pub type Result<T> = std::result::Result<T, OffchainError>;
