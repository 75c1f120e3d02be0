//! Session token generation and issuance.
//!
//! Issuance is generate-and-check against the store, bounded by a retry cap.
//! The check is only an optimization: two writers can draw the same candidate
//! before either persists, so write paths also treat a store-level
//! `session_token` conflict as a signal to draw again.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use super::store::{AccountInsert, CredentialStore, StoreError, UniqueField};
use crate::models::{Account, NewAccount};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Session token issuance exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Source of candidate session tokens.
pub trait TokenSource: Send + Sync {
    fn generate(&self) -> String;
}

/// URL-safe base64 (no padding) over bytes from the thread-local CSPRNG.
#[derive(Debug, Clone, Copy)]
pub struct SecureTokenSource {
    bytes: usize,
}

impl SecureTokenSource {
    #[must_use]
    pub const fn new(bytes: usize) -> Self {
        Self { bytes }
    }
}

impl Default for SecureTokenSource {
    fn default() -> Self {
        Self::new(16)
    }
}

impl TokenSource for SecureTokenSource {
    fn generate(&self) -> String {
        let mut buf = vec![0u8; self.bytes];
        rand::rng().fill_bytes(&mut buf);
        URL_SAFE_NO_PAD.encode(buf)
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn CredentialStore>,
    source: Arc<dyn TokenSource>,
    max_attempts: u32,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        source: Arc<dyn TokenSource>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            source,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns a token not currently held by any account. Does not persist it.
    pub async fn issue_unique_token(&self) -> Result<String, TokenError> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.source.generate();
            if !self.store.session_token_taken(&candidate).await? {
                return Ok(candidate);
            }
            record_collision(attempt);
        }

        error!(
            attempts = self.max_attempts,
            "Could not draw an unused session token"
        );
        Err(TokenError::Exhausted {
            attempts: self.max_attempts,
        })
    }

    /// Pre-save hook: assigns a token only when none is set.
    pub async fn ensure_session_token(&self, account: &mut NewAccount) -> Result<(), TokenError> {
        let missing = account
            .session_token
            .as_deref()
            .is_none_or(str::is_empty);

        if missing {
            account.session_token = Some(self.issue_unique_token().await?);
        }

        Ok(())
    }

    /// Inserts `insert`, drawing a fresh token whenever the store reports the
    /// current one as taken. Username/email conflicts are returned as-is.
    pub async fn insert_account(&self, mut insert: AccountInsert) -> Result<Account, TokenError> {
        for attempt in 1..=self.max_attempts {
            match self.store.insert(insert.clone()).await {
                Err(StoreError::Conflict(UniqueField::SessionToken)) => {
                    record_collision(attempt);
                    insert.session_token = self.issue_unique_token().await?;
                }
                Err(e) => return Err(e.into()),
                Ok(account) => return Ok(account),
            }
        }

        Err(TokenError::Exhausted {
            attempts: self.max_attempts,
        })
    }

    /// Rotates the account's token and persists it immediately.
    pub async fn reset_session_token(&self, account: &Account) -> Result<Account, TokenError> {
        for attempt in 1..=self.max_attempts {
            let token = self.issue_unique_token().await?;
            match self.store.update_session_token(account.id, &token).await {
                Err(StoreError::Conflict(UniqueField::SessionToken)) => record_collision(attempt),
                Err(e) => return Err(e.into()),
                Ok(updated) => return Ok(updated),
            }
        }

        Err(TokenError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

fn record_collision(attempt: u32) {
    metrics::counter!("auth_token_collisions_total").increment(1);
    debug!(attempt, "Session token already in use, regenerating");
}
