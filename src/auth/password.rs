use anyhow::Result;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use crate::config::SecurityConfig;

/// Digest + verify capability. Implementations are CPU-bound and are called
/// from blocking tasks.
pub trait PasswordHasher: Send + Sync {
    fn digest(&self, password: &str) -> Result<String>;

    /// Constant-time comparison of `password` against `digest`.
    fn verify(&self, password: &str, digest: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordHasher for Argon2Hasher {
    fn digest(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            tracing::warn!("Stored password digest is not a valid PHC string");
            return false;
        };

        // Params come from the PHC string, so digests made under older
        // settings still verify.
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
