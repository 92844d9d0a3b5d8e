//! Scoped, time-limited credentials per target/staging account.
//!
//! Every remote call is made under credentials assumed for the account in
//! scope. Clients hold a [`CredentialSource`] and re-assume when the cached
//! credentials near expiry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteResult;

/// Time-limited credentials scoped to one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedCredentials {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Unix timestamp (seconds) after which these credentials are invalid.
    pub expires_at: u64,
}

impl ScopedCredentials {
    /// Whether the credentials are expired (with a safety margin).
    pub fn is_expired(&self, now: u64) -> bool {
        now + 60 >= self.expires_at
    }
}

/// Assumes scoped credentials for a given account.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn assume(&self, account_id: &str) -> RemoteResult<ScopedCredentials>;
}

/// Fixed credentials for every account — local development and tests.
pub struct StaticCredentialSource {
    expires_at: u64,
}

impl StaticCredentialSource {
    pub fn new(expires_at: u64) -> Self {
        Self { expires_at }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn assume(&self, account_id: &str) -> RemoteResult<ScopedCredentials> {
        Ok(ScopedCredentials {
            account_id: account_id.to_string(),
            access_key_id: "static-access-key".to_string(),
            secret_access_key: "static-secret".to_string(),
            session_token: "static-session".to_string(),
            expires_at: self.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_scopes_to_account() {
        let source = StaticCredentialSource::new(10_000);
        let creds = source.assume("111122223333").await.unwrap();
        assert_eq!(creds.account_id, "111122223333");
        assert!(!creds.is_expired(5_000));
        assert!(creds.is_expired(9_950));
        assert!(creds.is_expired(10_000));
    }
}
