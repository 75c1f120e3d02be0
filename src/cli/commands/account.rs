//! Account administration command handlers

use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::models::NewAccount;
use crate::services::{AuthError, AuthService, StoreAuthService};

async fn auth_service(config: &Config) -> anyhow::Result<StoreAuthService> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    StoreAuthService::from_config(Arc::new(store), &config.security)
}

pub async fn cmd_register(
    config: &Config,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let auth = auth_service(config).await?;

    match auth
        .register(NewAccount::new(username, email, password))
        .await
    {
        Ok(account) => {
            println!("✓ Registered {} <{}>", account.username, account.email);
            println!("  ID: {}", account.id);
            Ok(())
        }
        Err(AuthError::Validation(errors)) => {
            println!("Could not register account:");
            for message in errors.full_messages() {
                println!("  • {message}");
            }
            anyhow::bail!("validation failed")
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn cmd_reset_token(config: &Config, credential: &str) -> anyhow::Result<()> {
    let auth = auth_service(config).await?;

    let Some(account) = auth.find_account(credential).await? else {
        anyhow::bail!("No account found for '{credential}'");
    };

    auth.reset_session_token(&account).await?;

    println!(
        "✓ Session token reset for {}; existing sessions are signed out",
        account.username
    );

    Ok(())
}
