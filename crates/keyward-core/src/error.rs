//! Error types for the core library.

use thiserror::Error;

use crate::account::ValidationError;
use crate::directory::DirectoryError;
use crate::store::PersistenceError;

/// Errors that can occur in account lifecycle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The username is not present in the index.
    #[error("Account not found: {0}")]
    NotFound(String),

    /// The username is already known to the identity directory.
    #[error("Account already exists: {0}")]
    Conflict(String),

    /// The new password violates the password history policy.
    #[error("Password policy violation: {0}")]
    PolicyViolation(String),

    /// Account input failed validation.
    #[error("Invalid account: {}", join_messages(.0))]
    Validation(Vec<ValidationError>),

    /// Index and directory disagree in a way that should not be possible.
    #[error("Index and directory out of sync: {0}")]
    ConsistencyFault(String),

    /// Identity directory call failed.
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Persistence provider call failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Password hashing primitive failed.
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of [`Error`], used by outer layers to map failures
/// onto response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Referenced account does not exist.
    NotFound,
    /// Account already exists.
    Conflict,
    /// Password history or input rules rejected the request.
    PolicyViolation,
    /// Index and directory diverged.
    ConsistencyFault,
    /// A collaborator or primitive failed.
    CollaboratorFailure,
}

impl ErrorKind {
    /// HTTP status code conventionally returned for this kind.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::PolicyViolation => 400,
            Self::Conflict => 409,
            Self::ConsistencyFault | Self::CollaboratorFailure => 500,
        }
    }
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::PolicyViolation(_) | Self::Validation(_) => ErrorKind::PolicyViolation,
            Self::ConsistencyFault(_) => ErrorKind::ConsistencyFault,
            Self::Directory(_) | Self::Persistence(_) | Self::Hashing(_) | Self::Config(_) => {
                ErrorKind::CollaboratorFailure
            }
        }
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ValidationError::message)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
