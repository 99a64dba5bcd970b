//! OAuth2 token cache
//!
//! The token lives in the secret store under its own key so it never collides
//! with the credential record.

use crate::{AuthError, AuthResult, SecretStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Secret store key of the OAuth2 token
pub const TOKEN_KEY: &str = "oauth_token";

/// An access token is retired this long before its stated expiry
const EXPIRY_LEEWAY_SECS: i64 = 10;

/// OAuth2 token as persisted between runs
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Short-lived bearer token
    pub access_token: String,
    /// Token type reported by the server, usually "Bearer"
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Long-lived refresh token, absent for non-expiring tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token stops working; `None` means never
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// Build a token from an `expires_in` style lifetime
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Option<std::time::Duration>,
    ) -> Self {
        let expiry = expires_in.and_then(|d| Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token,
            expiry,
        }
    }

    /// Whether the access token can still be presented
    pub fn is_valid(&self) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => Utc::now() + Duration::seconds(EXPIRY_LEEWAY_SECS) < expiry,
            None => true,
        }
    }

    /// Whether the access token has passed its expiry
    pub fn is_expired(&self) -> bool {
        !self.is_valid()
    }
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Persist the token, replacing any previous one
pub fn store_token(store: &SecretStore, token: &OAuthToken) -> AuthResult<()> {
    store.store_json(TOKEN_KEY, token)?;
    info!(expiry = ?token.expiry, "Stored OAuth2 token");
    Ok(())
}

/// Load the persisted token
pub fn load_token(store: &SecretStore) -> AuthResult<OAuthToken> {
    match store.load_json(TOKEN_KEY) {
        Ok(token) => {
            debug!("Retrieved OAuth2 token");
            Ok(token)
        }
        // an unreadable token is as good as none; the user has to log in again
        Err(AuthError::SecretNotFound(_) | AuthError::CorruptSecret(_)) => {
            Err(AuthError::TokenNotFound)
        }
        Err(e) => Err(e),
    }
}

/// Delete the persisted token; a missing token is fine
pub fn remove_token(store: &SecretStore) -> AuthResult<()> {
    store.delete(TOKEN_KEY)
}
