//! Credential authentication and session token issuance.

pub mod authenticator;
pub mod password;
pub mod store;
pub mod token;

pub use authenticator::{AuthenticateError, Authenticator};
pub use password::{Argon2Hasher, PasswordHasher};
pub use store::{AccountInsert, CredentialStore, StoreError, StoredAccount, UniqueField};
pub use token::{SecureTokenSource, TokenError, TokenIssuer, TokenSource};
