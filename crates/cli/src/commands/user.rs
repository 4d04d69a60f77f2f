//! User management commands.
//!
//! Accounts are created through the public register endpoint; this command
//! only changes roles, which is how the first admin is bootstrapped.

use threadline_core::{Email, UserRole};
use threadline_storefront::db::{self, PgUsers, UserRepository};

use super::{CommandError, database_url};

/// Errors from user management.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] db::RepositoryError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: admin, customer")]
    InvalidRole(String),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No account with this email.
    #[error("No user registered with email: {0}")]
    NotFound(String),
}

/// Set the role of the user registered under `email`.
///
/// # Errors
///
/// Returns an error if the inputs are invalid, the user does not exist, or
/// the database is unreachable.
pub async fn promote(email: &str, role: &str) -> Result<(), UserError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;
    let email = Email::parse(email).map_err(|_| UserError::InvalidEmail(email.to_owned()))?;

    tracing::info!("Connecting to storefront database...");
    let pool = db::create_pool(&database_url()?).await?;
    let users = PgUsers::new(pool);

    let user = users
        .set_role(&email, role)
        .await?
        .ok_or_else(|| UserError::NotFound(email.to_string()))?;

    tracing::info!(
        "Role updated! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(())
}
