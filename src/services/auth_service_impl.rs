//! Store-backed implementation of the `AuthService` trait.

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

use crate::auth::{
    AccountInsert, Argon2Hasher, Authenticator, CredentialStore, PasswordHasher,
    SecureTokenSource, TokenIssuer, TokenSource,
};
use crate::config::SecurityConfig;
use crate::models::{Account, Credential, NewAccount};
use crate::services::auth_service::{AuthError, AuthService, TAKEN};

pub struct StoreAuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    authenticator: Authenticator,
    issuer: TokenIssuer,
}

impl StoreAuthService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenSource>,
        max_token_attempts: u32,
    ) -> Self {
        let authenticator = Authenticator::new(Arc::clone(&store), Arc::clone(&hasher));
        let issuer = TokenIssuer::new(Arc::clone(&store), tokens, max_token_attempts);

        Self {
            store,
            hasher,
            authenticator,
            issuer,
        }
    }

    /// Argon2id hashing and CSPRNG tokens sized by `config`.
    pub fn from_config(
        store: Arc<dyn CredentialStore>,
        config: &SecurityConfig,
    ) -> anyhow::Result<Self> {
        let hasher = Arc::new(Argon2Hasher::new(config)?);
        let tokens = Arc::new(SecureTokenSource::new(config.session_token_bytes));

        Ok(Self::new(
            store,
            hasher,
            tokens,
            config.token_issue_max_attempts,
        ))
    }
}

#[async_trait]
impl AuthService for StoreAuthService {
    async fn register(&self, mut account: NewAccount) -> Result<Account, AuthError> {
        let mut errors = account.validate();

        if self.store.username_taken(&account.username).await? {
            errors.add("username", TAKEN);
        }
        if self.store.email_taken(&account.email).await? {
            errors.add("email", TAKEN);
        }

        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let hasher = Arc::clone(&self.hasher);
        let password = std::mem::take(&mut account.password);
        let password_digest = task::spawn_blocking(move || hasher.digest(&password))
            .await
            .context("Password hashing task panicked")??;

        self.issuer.ensure_session_token(&mut account).await?;
        let session_token = account
            .session_token
            .take()
            .ok_or_else(|| AuthError::Internal("Session token was not assigned".to_string()))?;

        let created = self
            .issuer
            .insert_account(AccountInsert {
                username: account.username,
                email: account.email,
                password_digest,
                session_token,
            })
            .await?;

        info!(account_id = created.id, username = %created.username, "Account registered");

        Ok(created)
    }

    async fn authenticate(
        &self,
        credential: &str,
        password: &str,
    ) -> Result<Option<Account>, AuthError> {
        Ok(self.authenticator.authenticate(credential, password).await?)
    }

    async fn find_account(&self, credential: &str) -> Result<Option<Account>, AuthError> {
        let stored = match Credential::classify(credential) {
            Credential::Email(email) => self.store.find_by_email(email).await?,
            Credential::Username(username) => self.store.find_by_username(username).await?,
        };

        Ok(stored.map(|s| s.account))
    }

    async fn current_session(&self, identity: Option<&str>) -> Result<Option<Account>, AuthError> {
        let Some(token) = identity.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        Ok(self.store.find_by_session_token(token).await?)
    }

    async fn create_session(
        &self,
        credential: &str,
        password: &str,
    ) -> Result<Account, AuthError> {
        let Some(account) = self.authenticate(credential, password).await? else {
            metrics::counter!("auth_login_attempts_total", "outcome" => "rejected").increment(1);
            warn!("Rejected login attempt");
            return Err(AuthError::InvalidCredentials);
        };

        let account = self.issuer.reset_session_token(&account).await?;

        metrics::counter!("auth_login_attempts_total", "outcome" => "accepted").increment(1);
        info!(account_id = account.id, "Session created");

        Ok(account)
    }

    async fn destroy_session(&self, identity: Option<&str>) -> Result<bool, AuthError> {
        let Some(account) = self.current_session(identity).await? else {
            return Ok(false);
        };

        self.issuer.reset_session_token(&account).await?;
        info!(account_id = account.id, "Session destroyed");

        Ok(true)
    }

    async fn reset_session_token(&self, account: &Account) -> Result<String, AuthError> {
        let updated = self.issuer.reset_session_token(account).await?;
        info!(account_id = updated.id, "Session token reset");

        Ok(updated.session_token)
    }
}
