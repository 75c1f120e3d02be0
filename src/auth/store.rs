//! The credential store capability the authentication core is written against.
//!
//! The store owns the uniqueness guarantee: `insert` and
//! `update_session_token` must reject duplicates atomically and report them as
//! [`StoreError::Conflict`] so callers can regenerate and retry.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::models::Account;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    SessionToken,
}

impl UniqueField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::SessionToken => "session_token",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated on {0}")]
    Conflict(UniqueField),

    #[error("Account {0} not found")]
    NotFound(i32),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

/// An account together with its stored password digest.
#[derive(Clone)]
pub struct StoredAccount {
    pub account: Account,
    pub password_digest: Option<String>,
}

impl fmt::Debug for StoredAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredAccount")
            .field("account", &self.account)
            .field("password_digest", &self.password_digest.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Fields written when an account is first persisted.
#[derive(Debug, Clone)]
pub struct AccountInsert {
    pub username: String,
    pub email: String,
    pub password_digest: String,
    pub session_token: String,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<StoredAccount>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<StoredAccount>, StoreError>;

    async fn find_by_session_token(&self, token: &str) -> Result<Option<Account>, StoreError>;

    async fn username_taken(&self, username: &str) -> Result<bool, StoreError>;

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError>;

    async fn session_token_taken(&self, token: &str) -> Result<bool, StoreError>;

    /// Persists a new account; duplicates surface as [`StoreError::Conflict`].
    async fn insert(&self, account: AccountInsert) -> Result<Account, StoreError>;

    /// Replaces the session token of account `id`; duplicates surface as
    /// [`StoreError::Conflict`].
    async fn update_session_token(&self, id: i32, token: &str) -> Result<Account, StoreError>;
}
