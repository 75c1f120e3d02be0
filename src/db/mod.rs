use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::auth::store::{AccountInsert, CredentialStore, StoreError, StoredAccount};
use crate::entities::accounts;
use crate::models::Account;

pub mod migrator;
pub mod repositories;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn account_repo(&self) -> repositories::account::AccountRepository {
        repositories::account::AccountRepository::new(self.conn.clone())
    }
}

#[async_trait]
impl CredentialStore for Store {
    async fn find_by_username(&self, username: &str) -> Result<Option<StoredAccount>, StoreError> {
        self.account_repo().get_by_username(username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<StoredAccount>, StoreError> {
        self.account_repo().get_by_email(email).await
    }

    async fn find_by_session_token(&self, token: &str) -> Result<Option<Account>, StoreError> {
        self.account_repo().get_by_session_token(token).await
    }

    async fn username_taken(&self, username: &str) -> Result<bool, StoreError> {
        self.account_repo()
            .exists_where(accounts::Column::Username, username)
            .await
    }

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError> {
        self.account_repo()
            .exists_where(accounts::Column::Email, email)
            .await
    }

    async fn session_token_taken(&self, token: &str) -> Result<bool, StoreError> {
        self.account_repo()
            .exists_where(accounts::Column::SessionToken, token)
            .await
    }

    async fn insert(&self, account: AccountInsert) -> Result<Account, StoreError> {
        self.account_repo().insert(account).await
    }

    async fn update_session_token(&self, id: i32, token: &str) -> Result<Account, StoreError> {
        self.account_repo().update_session_token(id, token).await
    }
}
