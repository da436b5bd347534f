//! Credential verification. The credential *file format and its loader* are
//! an external collaborator per spec; this module only defines the contract
//! the Chat Node relies on, plus the one file-backed implementation that
//! satisfies the wire format in the external-interfaces section.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::error::ChatError;

/// Lowercase hex SHA-256 of `password`'s UTF-8 bytes.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verifies a username/password pair against a credential store.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> Result<bool, ChatError>;
}

/// Reads `<username>::<hex-sha256>` records, one per line.
pub struct FileAuthenticator {
    path: PathBuf,
}

impl FileAuthenticator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Authenticator for FileAuthenticator {
    async fn verify(&self, username: &str, password: &str) -> Result<bool, ChatError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let hashed = hash_password(password);
        for line in contents.lines() {
            if let Some((stored_user, stored_hash)) = line.trim().split_once("::") {
                if stored_user == username {
                    return Ok(stored_hash == hashed);
                }
            }
        }
        Ok(false)
    }
}
