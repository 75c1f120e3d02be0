//! Domain service for registration, authentication and session lifecycle.

use thiserror::Error;

use crate::auth::{AuthenticateError, StoreError, TokenError, UniqueField};
use crate::models::{Account, NewAccount, ValidationErrors};

pub const TAKEN: &str = "has already been taken";

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Session token issuance exhausted after {attempts} attempts")]
    TokenIssuanceExhausted { attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    fn taken(field: UniqueField) -> Self {
        let mut errors = ValidationErrors::default();
        errors.add(field.as_str(), TAKEN);
        Self::Validation(errors)
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            // A lost race on username/email is still the caller's input problem.
            StoreError::Conflict(field @ (UniqueField::Username | UniqueField::Email)) => {
                Self::taken(field)
            }
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Exhausted { attempts } => Self::TokenIssuanceExhausted { attempts },
            TokenError::Store(err) => err.into(),
        }
    }
}

impl From<AuthenticateError> for AuthError {
    fn from(err: AuthenticateError) -> Self {
        match err {
            AuthenticateError::Store(err) => err.into(),
            AuthenticateError::Hasher(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Domain service trait for authentication.
///
/// A session identity is the account's current session token. Callers keep
/// it in their own session storage and pass it back explicitly.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Validates, hashes the password, assigns a unique session token and
    /// persists a new account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] with every failing field.
    async fn register(&self, account: NewAccount) -> Result<Account, AuthError>;

    /// Resolves `credential` (email-shaped => email, else username) and
    /// verifies `password`. Unknown identity and wrong password both give `None`.
    async fn authenticate(
        &self,
        credential: &str,
        password: &str,
    ) -> Result<Option<Account>, AuthError>;

    /// Looks up an account by username or email without checking a password.
    async fn find_account(&self, credential: &str) -> Result<Option<Account>, AuthError>;

    /// Account bound to `identity`, if any. Never fails for a missing session.
    async fn current_session(&self, identity: Option<&str>) -> Result<Option<Account>, AuthError>;

    /// Authenticates and rotates the account's session token. The returned
    /// account carries the token the caller should bind as its identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if login fails.
    async fn create_session(&self, credential: &str, password: &str)
    -> Result<Account, AuthError>;

    /// Rotates the token behind `identity`; `false` when no session resolved.
    async fn destroy_session(&self, identity: Option<&str>) -> Result<bool, AuthError>;

    /// Assigns and persists a fresh unique token, returning it.
    async fn reset_session_token(&self, account: &Account) -> Result<String, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_on_identity_fields_are_validation_errors() {
        let err = AuthError::from(StoreError::Conflict(UniqueField::Email));
        let AuthError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.on("email"), [TAKEN]);
    }

    #[test]
    fn token_conflicts_and_database_errors_are_persistence_failures() {
        assert!(matches!(
            AuthError::from(StoreError::Conflict(UniqueField::SessionToken)),
            AuthError::Persistence(_)
        ));
        assert!(matches!(
            AuthError::from(StoreError::Database("disk I/O error".to_string())),
            AuthError::Persistence(_)
        ));
    }

    #[test]
    fn exhausted_issuance_keeps_attempt_count() {
        let err = AuthError::from(TokenError::Exhausted { attempts: 10 });
        assert_eq!(
            err.to_string(),
            "Session token issuance exhausted after 10 attempts"
        );
    }
}
