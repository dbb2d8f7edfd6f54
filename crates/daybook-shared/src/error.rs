use thiserror::Error;

use crate::constants::{MAX_CONTENT_LEN, MAX_PROFILE_FIELD_LEN, MIN_PASSWORD_LEN, MIN_USERNAME_LEN};

/// Rejections of malformed client input. Every variant maps to HTTP 400.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Content is required")]
    MissingContent,

    #[error("Content must be at most {} characters long", MAX_CONTENT_LEN)]
    ContentTooLong,

    #[error("Invalid entry date: {0}")]
    InvalidEntryDate(String),

    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Username must be at least {} characters long", MIN_USERNAME_LEN)]
    UsernameTooShort,

    #[error("Password must be at least {} characters long", MIN_PASSWORD_LEN)]
    PasswordTooShort,

    #[error("Profile field '{0}' must be at most {} characters long", MAX_PROFILE_FIELD_LEN)]
    ProfileFieldTooLong(&'static str),
}
