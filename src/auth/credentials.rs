use anyhow::Context;

use crate::platform::app_error::AppResult;

/// Hashes and checks account passwords.
///
/// Implementations are CPU-bound; async callers run them on the blocking pool.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> AppResult<String>;
    fn verify(&self, plaintext: &str, hash: &str) -> AppResult<bool>;
}

/// Bounds accepted by `bcrypt::hash`.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST),
        }
    }
}

impl CredentialHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> AppResult<String> {
        Ok(bcrypt::hash(plaintext, self.cost).context("Failed to hash credential")?)
    }

    fn verify(&self, plaintext: &str, hash: &str) -> AppResult<bool> {
        Ok(bcrypt::verify(plaintext, hash).context("Failed to verify credential")?)
    }
}
