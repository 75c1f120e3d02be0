//! Registration, authentication and session-token properties against a real
//! SQLite store.

use async_trait::async_trait;
use sesame::auth::{
    AccountInsert, Argon2Hasher, Authenticator, CredentialStore, SecureTokenSource, StoreError,
    StoredAccount, TokenError, TokenIssuer, TokenSource,
};
use sesame::config::SecurityConfig;
use sesame::db::Store;
use sesame::models::{Account, NewAccount};
use sesame::services::{AuthError, AuthService, StoreAuthService};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

const PASSWORD: &str = "correct horse";

async fn temp_store() -> Store {
    let db_path =
        std::env::temp_dir().join(format!("sesame-auth-test-{}.db", uuid::Uuid::new_v4()));
    Store::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("failed to open store")
}

fn cheap_hasher() -> Arc<Argon2Hasher> {
    Arc::new(
        Argon2Hasher::new(&SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            ..SecurityConfig::default()
        })
        .unwrap(),
    )
}

fn service_with(store: Arc<dyn CredentialStore>, tokens: Arc<dyn TokenSource>) -> StoreAuthService {
    StoreAuthService::new(store, cheap_hasher(), tokens, 10)
}

fn service(store: &Store) -> StoreAuthService {
    service_with(
        Arc::new(store.clone()),
        Arc::new(SecureTokenSource::default()),
    )
}

/// Yields the scripted tokens in order, then random ones.
struct ScriptedTokens {
    queue: Mutex<VecDeque<String>>,
    fallback: SecureTokenSource,
}

impl ScriptedTokens {
    fn new<I: IntoIterator<Item = S>, S: Into<String>>(tokens: I) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(tokens.into_iter().map(Into::into).collect()),
            fallback: SecureTokenSource::default(),
        })
    }
}

impl TokenSource for ScriptedTokens {
    fn generate(&self) -> String {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.generate())
    }
}

/// Always yields the same token.
struct StuckTokens(&'static str);

impl TokenSource for StuckTokens {
    fn generate(&self) -> String {
        self.0.to_string()
    }
}

/// Wraps a store, recording lookups and optionally hiding existing tokens
/// from the pre-check (as a concurrent writer would).
struct SpyStore {
    inner: Store,
    calls: Mutex<Vec<&'static str>>,
    blind_token_check: bool,
}

impl SpyStore {
    fn new(inner: Store, blind_token_check: bool) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(Vec::new()),
            blind_token_check,
        })
    }

    fn take_calls(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CredentialStore for SpyStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<StoredAccount>, StoreError> {
        self.record("find_by_username");
        self.inner.find_by_username(username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<StoredAccount>, StoreError> {
        self.record("find_by_email");
        self.inner.find_by_email(email).await
    }

    async fn find_by_session_token(&self, token: &str) -> Result<Option<Account>, StoreError> {
        self.inner.find_by_session_token(token).await
    }

    async fn username_taken(&self, username: &str) -> Result<bool, StoreError> {
        self.inner.username_taken(username).await
    }

    async fn email_taken(&self, email: &str) -> Result<bool, StoreError> {
        self.inner.email_taken(email).await
    }

    async fn session_token_taken(&self, token: &str) -> Result<bool, StoreError> {
        if self.blind_token_check {
            return Ok(false);
        }
        self.inner.session_token_taken(token).await
    }

    async fn insert(&self, account: AccountInsert) -> Result<Account, StoreError> {
        self.record("insert");
        self.inner.insert(account).await
    }

    async fn update_session_token(&self, id: i32, token: &str) -> Result<Account, StoreError> {
        self.record("update_session_token");
        self.inner.update_session_token(id, token).await
    }
}

async fn register(auth: &StoreAuthService, username: &str) -> Account {
    auth.register(NewAccount::new(
        username,
        format!("{username}@example.com"),
        PASSWORD,
    ))
    .await
    .expect("registration should succeed")
}

fn validation_errors(err: AuthError) -> sesame::models::ValidationErrors {
    match err {
        AuthError::Validation(errors) => errors,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn registration_assigns_distinct_tokens() {
    let store = temp_store().await;
    let auth = service(&store);

    let mut tokens = HashSet::new();
    for name in ["alice", "bobby", "carol", "dave_"] {
        let account = register(&auth, name).await;
        assert_eq!(account.session_token.len(), 22);
        assert!(tokens.insert(account.session_token));
    }
}

#[tokio::test]
async fn digest_is_stored_instead_of_password() {
    let store = temp_store().await;
    let auth = service(&store);
    register(&auth, "alice").await;

    let stored = store.find_by_username("alice").await.unwrap().unwrap();
    let digest = stored.password_digest.expect("digest should be set");
    assert!(digest.starts_with("$argon2id$"));
    assert!(!digest.contains(PASSWORD));
}

#[tokio::test]
async fn authenticate_by_username_or_email() {
    let store = temp_store().await;
    let auth = service(&store);
    let alice = register(&auth, "alice").await;

    let by_username = auth.authenticate("alice", PASSWORD).await.unwrap();
    assert_eq!(by_username.map(|a| a.id), Some(alice.id));

    let by_email = auth
        .authenticate("alice@example.com", PASSWORD)
        .await
        .unwrap();
    assert_eq!(by_email.map(|a| a.id), Some(alice.id));

    assert!(auth.authenticate("alice", "wrong password").await.unwrap().is_none());
    assert!(auth.authenticate("nobody", PASSWORD).await.unwrap().is_none());
    assert!(
        auth.authenticate("nobody@example.com", PASSWORD)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn credential_shape_picks_the_lookup_column() {
    let spy = SpyStore::new(temp_store().await, false);
    let authenticator = Authenticator::new(spy.clone(), cheap_hasher());

    let _ = authenticator.authenticate("bob@example.com", PASSWORD).await.unwrap();
    assert_eq!(spy.take_calls(), ["find_by_email"]);

    let _ = authenticator.authenticate("bob", PASSWORD).await.unwrap();
    assert_eq!(spy.take_calls(), ["find_by_username"]);
}

#[tokio::test]
async fn issuance_skips_tokens_already_in_store() {
    let store = temp_store().await;
    let seeded: Vec<String> = (0..5).map(|i| format!("seeded-token-{i}")).collect();

    let seeding = service_with(Arc::new(store.clone()), ScriptedTokens::new(seeded.clone()));
    for name in ["anna", "bert", "cleo", "dora", "emil"] {
        register(&seeding, name).await;
    }

    let issuer = TokenIssuer::new(
        Arc::new(store.clone()),
        ScriptedTokens::new(seeded.clone()),
        10,
    );
    let token = issuer.issue_unique_token().await.unwrap();

    assert!(!seeded.contains(&token));
    assert!(!store.session_token_taken(&token).await.unwrap());
}

#[tokio::test]
async fn issuance_gives_up_after_retry_budget() {
    let store = temp_store().await;
    let seeding = service_with(Arc::new(store.clone()), ScriptedTokens::new(["stuck"]));
    register(&seeding, "alice").await;

    let issuer = TokenIssuer::new(Arc::new(store.clone()), Arc::new(StuckTokens("stuck")), 3);
    let err = issuer.issue_unique_token().await.unwrap_err();
    assert!(matches!(err, TokenError::Exhausted { attempts: 3 }));

    let auth = service_with(Arc::new(store), Arc::new(StuckTokens("stuck")));
    let err = auth
        .register(NewAccount::new("bobby", "bobby@example.com", PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenIssuanceExhausted { attempts: 10 }));
}

#[tokio::test]
async fn store_conflict_on_insert_triggers_regeneration() {
    let store = temp_store().await;
    let seeding = service_with(Arc::new(store.clone()), ScriptedTokens::new(["raced"]));
    register(&seeding, "alice").await;

    // The pre-check cannot see "raced", so only the unique index catches it.
    let spy = SpyStore::new(store.clone(), true);
    let auth = service_with(spy.clone(), ScriptedTokens::new(["raced"]));
    let bobby = register(&auth, "bobby").await;

    assert_ne!(bobby.session_token, "raced");
    assert_eq!(
        spy.take_calls()
            .into_iter()
            .filter(|c| *c == "insert")
            .count(),
        2
    );
}

#[tokio::test]
async fn store_conflict_on_reset_triggers_regeneration() {
    let store = temp_store().await;
    let seeding = service_with(Arc::new(store.clone()), ScriptedTokens::new(["raced"]));
    register(&seeding, "alice").await;
    let bobby = register(&service(&store), "bobby").await;

    let spy = SpyStore::new(store.clone(), true);
    let auth = service_with(spy.clone(), ScriptedTokens::new(["raced"]));
    let token = auth.reset_session_token(&bobby).await.unwrap();

    assert_ne!(token, "raced");
    assert_ne!(token, bobby.session_token);
    assert_eq!(
        spy.take_calls()
            .into_iter()
            .filter(|c| *c == "update_session_token")
            .count(),
        2
    );

    let current = auth.current_session(Some(&token)).await.unwrap();
    assert_eq!(current.map(|a| a.id), Some(bobby.id));
}

#[tokio::test]
async fn ensure_session_token_is_idempotent() {
    let store = temp_store().await;
    let issuer = TokenIssuer::new(
        Arc::new(store),
        Arc::new(SecureTokenSource::default()),
        10,
    );

    let mut preset = NewAccount {
        session_token: Some("preset-token".to_string()),
        ..NewAccount::new("alice", "alice@example.com", PASSWORD)
    };
    issuer.ensure_session_token(&mut preset).await.unwrap();
    issuer.ensure_session_token(&mut preset).await.unwrap();
    assert_eq!(preset.session_token.as_deref(), Some("preset-token"));

    let mut fresh = NewAccount::new("bobby", "bobby@example.com", PASSWORD);
    issuer.ensure_session_token(&mut fresh).await.unwrap();
    let assigned = fresh.session_token.clone().expect("token should be assigned");
    issuer.ensure_session_token(&mut fresh).await.unwrap();
    assert_eq!(fresh.session_token, Some(assigned));
}

#[tokio::test]
async fn reset_rotates_and_persists_token() {
    let store = temp_store().await;
    let auth = service(&store);
    let alice = register(&auth, "alice").await;
    let old = alice.session_token.clone();

    let new = auth.reset_session_token(&alice).await.unwrap();
    assert_ne!(new, old);

    assert!(auth.current_session(Some(&old)).await.unwrap().is_none());
    let current = auth.current_session(Some(&new)).await.unwrap();
    assert_eq!(current.map(|a| a.id), Some(alice.id));
}

#[tokio::test]
async fn session_lifecycle() {
    let store = temp_store().await;
    let auth = service(&store);
    let alice = register(&auth, "alice").await;

    let err = auth.create_session("alice", "wrong password").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    let err = auth.create_session("ghost", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let signed_in = auth.create_session("alice@example.com", PASSWORD).await.unwrap();
    assert_eq!(signed_in.id, alice.id);
    assert_ne!(signed_in.session_token, alice.session_token);

    let identity = signed_in.session_token;
    assert!(auth.current_session(Some(&identity)).await.unwrap().is_some());

    assert!(auth.destroy_session(Some(&identity)).await.unwrap());
    assert!(auth.current_session(Some(&identity)).await.unwrap().is_none());

    assert!(!auth.destroy_session(Some(&identity)).await.unwrap());
    assert!(!auth.destroy_session(None).await.unwrap());
    assert!(auth.current_session(None).await.unwrap().is_none());
}

#[tokio::test]
async fn registration_rejects_invalid_fields() {
    let store = temp_store().await;
    let auth = service(&store);

    let errors = validation_errors(
        auth.register(NewAccount::new("ab", "ab@example.com", PASSWORD))
            .await
            .unwrap_err(),
    );
    assert_eq!(
        errors.on("username"),
        ["is too short (minimum is 3 characters)"]
    );

    let errors = validation_errors(
        auth.register(NewAccount::new(
            "bob@example.com",
            "bob@example.com",
            PASSWORD,
        ))
        .await
        .unwrap_err(),
    );
    assert_eq!(errors.on("username"), ["can't be an email"]);

    let errors = validation_errors(
        auth.register(NewAccount::new("bobby", "not-an-email", PASSWORD))
            .await
            .unwrap_err(),
    );
    assert_eq!(errors.on("email"), ["is invalid"]);

    let errors = validation_errors(
        auth.register(NewAccount::new("bobby", "bobby@example.com", "12345"))
            .await
            .unwrap_err(),
    );
    assert_eq!(
        errors.on("password"),
        ["is too short (minimum is 6 characters)"]
    );

    let bobby = auth
        .register(NewAccount::new("bobby", "bobby@example.com", "123456"))
        .await
        .unwrap();
    assert!(!bobby.session_token.is_empty());
}

#[tokio::test]
async fn registration_rejects_duplicates() {
    let store = temp_store().await;
    let auth = service(&store);
    register(&auth, "alice").await;

    let errors = validation_errors(
        auth.register(NewAccount::new("alice", "other@example.com", PASSWORD))
            .await
            .unwrap_err(),
    );
    assert_eq!(errors.on("username"), ["has already been taken"]);

    let errors = validation_errors(
        auth.register(NewAccount::new("other", "alice@example.com", PASSWORD))
            .await
            .unwrap_err(),
    );
    assert_eq!(errors.on("email"), ["has already been taken"]);
}

#[tokio::test]
async fn unique_index_backs_username_and_email() {
    let store = temp_store().await;
    let auth = service(&store);
    let alice = register(&auth, "alice").await;

    let err = store
        .insert(AccountInsert {
            username: "alice".to_string(),
            email: "fresh@example.com".to_string(),
            password_digest: "digest".to_string(),
            session_token: "fresh-token".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict(sesame::auth::UniqueField::Username)
    ));

    let err = store
        .update_session_token(alice.id + 1000, "whatever")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
