//! Account input validation.

use std::collections::BTreeSet;

/// Minimum number of characters in a username.
pub const MIN_USERNAME_LEN: usize = 5;

/// Validation error for a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Username is shorter than [`MIN_USERNAME_LEN`].
    UsernameTooShort,
    /// Username contains whitespace.
    UsernameWhitespace,
    /// No roles were given.
    EmptyRoles,
    /// A role is empty or whitespace only.
    BlankRole,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::UsernameTooShort => "Username must be at least 5 characters",
            Self::UsernameWhitespace => "Username must not contain whitespace",
            Self::EmptyRoles => "At least one role is required",
            Self::BlankRole => "Roles must not be blank",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::UsernameTooShort | Self::UsernameWhitespace => "username",
            Self::EmptyRoles | Self::BlankRole => "roles",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating account input.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate the identity half of a new account.
///
/// Password strength is the caller's concern and is not checked here.
///
/// # Errors
///
/// Returns every rule the input breaks.
pub fn validate_new_account(username: &str, roles: &BTreeSet<String>) -> ValidationResult {
    let mut errors = Vec::new();

    if username.chars().count() < MIN_USERNAME_LEN {
        errors.push(ValidationError::UsernameTooShort);
    }
    if username.chars().any(char::is_whitespace) {
        errors.push(ValidationError::UsernameWhitespace);
    }

    if roles.is_empty() {
        errors.push(ValidationError::EmptyRoles);
    } else if roles.iter().any(|r| r.trim().is_empty()) {
        errors.push(ValidationError::BlankRole);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
