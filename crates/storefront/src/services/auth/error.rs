//! Account error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Failures from registration, login and profile lookup.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] threadline_core::EmailError),

    /// Unknown email or wrong password. The two are not distinguished.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The session refers to an account that no longer exists.
    #[error("user not found")]
    UserNotFound,

    /// Registration with an email that is already taken.
    #[error("user already exists")]
    UserAlreadyExists,

    #[error("password validation failed: {0}")]
    WeakPassword(String),

    #[error("name is required")]
    MissingName,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Argon2 failed to hash or parse a stored hash.
    #[error("password hashing error")]
    PasswordHash,
}
