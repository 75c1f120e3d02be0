use anyhow::Context;
use std::sync::Arc;
use tokio::task;

use super::password::PasswordHasher;
use super::store::{CredentialStore, StoreError, StoredAccount};
use crate::models::{Account, Credential};

/// Resolves a (credential, password) pair to an account.
///
/// Unknown identity and wrong password both yield `Ok(None)`; only store or
/// hasher failures are errors.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthenticateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hasher(#[from] anyhow::Error),
}

impl Authenticator {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    pub async fn authenticate(
        &self,
        credential: &str,
        password: &str,
    ) -> Result<Option<Account>, AuthenticateError> {
        let Some(stored) = self.lookup(Credential::classify(credential)).await? else {
            return Ok(None);
        };

        let StoredAccount {
            account,
            password_digest,
        } = stored;

        let Some(digest) = password_digest else {
            return Ok(None);
        };

        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();

        // Argon2 is CPU-bound; keep it off the async workers.
        let verified = task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .context("Password verification task panicked")?;

        Ok(verified.then_some(account))
    }

    async fn lookup(&self, credential: Credential<'_>) -> Result<Option<StoredAccount>, StoreError> {
        match credential {
            Credential::Email(email) => self.store.find_by_email(email).await,
            Credential::Username(username) => self.store.find_by_username(username).await,
        }
    }
}
