//! Token sources with transparent refresh
//!
//! [`token_source`] stacks three layers:
//!
//! - [`ReuseTokenSource`] hands out the cached token while it is valid,
//! - [`PersistingTokenSource`] writes every freshly fetched token back to the
//!   secret store,
//! - [`RefreshTokenSource`] trades the refresh token for a new access token.

use crate::token::{load_token, store_token};
use crate::{AuthError, AuthResult, OAuthToken, SecretStore};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Something that can hand out a usable OAuth2 token
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> AuthResult<OAuthToken>;
}

/// Something that can trade a refresh token for a new token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<OAuthToken>;
}

#[async_trait]
impl<S: TokenSource + ?Sized> TokenSource for Box<S> {
    async fn token(&self) -> AuthResult<OAuthToken> {
        (**self).token().await
    }
}

/// Fetches a new token on every call using the refresh token
pub struct RefreshTokenSource<R> {
    refresher: R,
    refresh_token: Mutex<Option<String>>,
}

impl<R: TokenRefresher> RefreshTokenSource<R> {
    pub fn new(refresher: R, refresh_token: Option<String>) -> Self {
        Self {
            refresher,
            refresh_token: Mutex::new(refresh_token),
        }
    }
}

#[async_trait]
impl<R: TokenRefresher> TokenSource for RefreshTokenSource<R> {
    async fn token(&self) -> AuthResult<OAuthToken> {
        let mut current = self.refresh_token.lock().await;
        let refresh_token = current
            .clone()
            .ok_or_else(|| AuthError::RefreshFailed("token expired and no refresh token".into()))?;

        let mut token = self.refresher.refresh(&refresh_token).await?;
        match &token.refresh_token {
            Some(rotated) => *current = Some(rotated.clone()),
            None => token.refresh_token = Some(refresh_token),
        }
        Ok(token)
    }
}

/// Persists every token the inner source produces
pub struct PersistingTokenSource<S> {
    inner: S,
    store: Arc<SecretStore>,
}

impl<S: TokenSource> PersistingTokenSource<S> {
    pub fn new(inner: S, store: Arc<SecretStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl<S: TokenSource> TokenSource for PersistingTokenSource<S> {
    async fn token(&self) -> AuthResult<OAuthToken> {
        let token = self.inner.token().await?;
        // the token is usable even if it could not be saved
        if let Err(e) = store_token(&self.store, &token) {
            warn!("Failed to persist refreshed OAuth2 token: {}", e);
        }
        Ok(token)
    }
}

/// Returns the cached token until it expires, then asks the inner source
pub struct ReuseTokenSource<S> {
    current: Mutex<OAuthToken>,
    inner: S,
}

impl<S: TokenSource> ReuseTokenSource<S> {
    pub fn new(token: OAuthToken, inner: S) -> Self {
        Self {
            current: Mutex::new(token),
            inner,
        }
    }
}

#[async_trait]
impl<S: TokenSource> TokenSource for ReuseTokenSource<S> {
    async fn token(&self) -> AuthResult<OAuthToken> {
        let mut current = self.current.lock().await;
        if current.is_valid() {
            return Ok(current.clone());
        }

        info!("OAuth2 access token expired, refreshing");
        let token = self.inner.token().await?;
        *current = token.clone();
        Ok(token)
    }
}

/// Build the refreshing, self-persisting source for the stored token
pub fn token_source<R: TokenRefresher + 'static>(
    store: Arc<SecretStore>,
    refresher: R,
) -> AuthResult<impl TokenSource> {
    let token = load_token(&store)?;
    let refresh = RefreshTokenSource::new(refresher, token.refresh_token.clone());
    Ok(ReuseTokenSource::new(
        token,
        PersistingTokenSource::new(refresh, store),
    ))
}

/// Drive a source once and return only the bearer string
pub async fn access_token(source: &dyn TokenSource) -> AuthResult<String> {
    match source.token().await {
        Ok(token) => {
            debug!("Obtained OAuth2 access token");
            Ok(token.access_token)
        }
        Err(e @ (AuthError::TokenNotFound | AuthError::NotAuthenticated)) => Err(e),
        Err(AuthError::RefreshFailed(msg)) => Err(AuthError::RefreshFailed(msg)),
        Err(e) => Err(AuthError::RefreshFailed(e.to_string())),
    }
}
