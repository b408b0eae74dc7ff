//! Account management module.
//!
//! Provides the account model, input validation and the password policy.

mod model;
pub mod policy;
mod validation;

pub use model::Account;
pub use policy::PasswordPolicy;
pub use validation::{MIN_USERNAME_LEN, ValidationError, ValidationResult, validate_new_account};
