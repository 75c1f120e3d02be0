use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, Set, SqlErr,
};

use crate::auth::store::{AccountInsert, StoreError, StoredAccount, UniqueField};
use crate::entities::accounts;
use crate::models::Account;

impl From<accounts::Model> for StoredAccount {
    fn from(model: accounts::Model) -> Self {
        let password_digest = model.password_digest.clone();
        Self {
            account: Account::from(model),
            password_digest,
        }
    }
}

pub struct AccountRepository {
    conn: DatabaseConnection,
}

impl AccountRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<StoredAccount>, StoreError> {
        let account = accounts::Entity::find()
            .filter(accounts::Column::Username.eq(username))
            .one(&self.conn)
            .await?;

        Ok(account.map(StoredAccount::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<StoredAccount>, StoreError> {
        let account = accounts::Entity::find()
            .filter(accounts::Column::Email.eq(email))
            .one(&self.conn)
            .await?;

        Ok(account.map(StoredAccount::from))
    }

    pub async fn get_by_session_token(&self, token: &str) -> Result<Option<Account>, StoreError> {
        let account = accounts::Entity::find()
            .filter(accounts::Column::SessionToken.eq(token))
            .one(&self.conn)
            .await?;

        Ok(account.map(Account::from))
    }

    pub async fn exists_where(
        &self,
        column: accounts::Column,
        value: &str,
    ) -> Result<bool, StoreError> {
        let count = accounts::Entity::find()
            .filter(column.eq(value))
            .count(&self.conn)
            .await?;

        Ok(count > 0)
    }

    pub async fn insert(&self, insert: AccountInsert) -> Result<Account, StoreError> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = accounts::ActiveModel {
            id: NotSet,
            username: Set(insert.username),
            email: Set(insert.email),
            password_digest: Set(Some(insert.password_digest)),
            session_token: Set(insert.session_token),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        let model = active.insert(&self.conn).await.map_err(classify)?;

        Ok(Account::from(model))
    }

    pub async fn update_session_token(&self, id: i32, token: &str) -> Result<Account, StoreError> {
        let account = accounts::Entity::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: accounts::ActiveModel = account.into();
        active.session_token = Set(token.to_string());
        active.updated_at = Set(now);
        let model = active.update(&self.conn).await.map_err(classify)?;

        Ok(Account::from(model))
    }
}

/// Maps unique-index violations to the column that tripped them.
fn classify(err: DbErr) -> StoreError {
    if let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err()
        && let Some(field) = violated_field(&message)
    {
        return StoreError::Conflict(field);
    }

    StoreError::from(err)
}

fn violated_field(message: &str) -> Option<UniqueField> {
    // SQLite: "UNIQUE constraint failed: accounts.session_token"
    if message.contains("session_token") {
        Some(UniqueField::SessionToken)
    } else if message.contains("email") {
        Some(UniqueField::Email)
    } else if message.contains("username") {
        Some(UniqueField::Username)
    } else {
        None
    }
}
