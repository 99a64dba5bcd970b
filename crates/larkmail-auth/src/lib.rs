//! Authentication module for larkmail
//!
//! Two ways to sign in to a Yahoo mailbox:
//! 1. App password - stored as-is and used for plain IMAP/SMTP login
//! 2. OAuth2 - browser authorization code flow, tokens refreshed on demand
//!    and presented with XOAUTH2
//!
//! Everything secret goes through [`SecretStore`], which prefers the OS
//! keyring and falls back to owner-only files.

mod config;
mod credentials;
mod dispatcher;
mod error;
mod flow;
mod oauth2;
mod secrets;
mod tls;
mod token;
mod token_source;
mod xoauth2;

pub use config::{OAuthClientConfig, Paths, CLIENT_ID_ENV, CLIENT_SECRET_ENV, CONFIG_DIR_ENV};
pub use credentials::{
    load_credentials, remove_app_password, store_app_password, store_oauth_method, AuthMethod,
    StoredCredentials, CREDENTIALS_KEY,
};
pub use dispatcher::Authenticator;
pub use error::{AuthError, AuthResult, ErrorKind};
pub use flow::{
    browser_login, browser_login_with, callback_router, generate_state, wait_for_callback,
    BrowserLauncher, CallbackServer, CallbackState, SystemBrowser, CALLBACK_TIMEOUT,
    SHUTDOWN_GRACE, SUCCESS_MESSAGE,
};
pub use self::oauth2::OAuthClient;
pub use secrets::{FileBackend, Fallback, KeyringBackend, SecretBackend, SecretStore, SERVICE_NAME};
pub use tls::{generate_self_signed, SelfSignedCert};
pub use token::{load_token, remove_token, store_token, OAuthToken, TOKEN_KEY};
pub use token_source::{
    access_token, token_source, PersistingTokenSource, RefreshTokenSource, ReuseTokenSource,
    TokenRefresher, TokenSource,
};
pub use xoauth2::{new_bearer_client, SaslClient, XOAuth2Client, MECHANISM as XOAUTH2_MECHANISM};

use std::sync::Arc;

/// Yahoo Mail endpoints
pub mod yahoo {
    /// OAuth2 authorization endpoint
    pub const AUTH_URL: &str = "https://api.login.yahoo.com/oauth2/request_auth";
    /// OAuth2 token endpoint
    pub const TOKEN_URL: &str = "https://api.login.yahoo.com/oauth2/get_token";
    /// Requested scopes
    pub const SCOPES: &[&str] = &["openid"];

    /// Yahoo IMAP server
    pub const IMAP_HOST: &str = "imap.mail.yahoo.com";
    pub const IMAP_PORT: u16 = 993;

    /// Yahoo SMTP server
    pub const SMTP_HOST: &str = "smtp.mail.yahoo.com";
    pub const SMTP_PORT: u16 = 465;

    /// Callback port registered with the Yahoo developer app
    pub const DEFAULT_OAUTH_PORT: u16 = 8086;
}

/// Manages authentication for the account
pub struct AuthManager {
    config: Option<OAuthClientConfig>,
    store: Arc<SecretStore>,
}

impl AuthManager {
    /// Create a manager; `config` may be absent for app-password-only use
    pub fn new(config: Option<OAuthClientConfig>, store: SecretStore) -> Self {
        Self {
            config,
            store: Arc::new(store),
        }
    }

    /// OAuth client from the environment, secrets under `paths`
    pub fn from_env(paths: &Paths) -> Self {
        let config = match OAuthClientConfig::from_env() {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::debug!("OAuth2 unavailable: {}", e);
                None
            }
        };
        Self::new(config, SecretStore::open(paths))
    }

    /// The underlying secret store
    pub fn store(&self) -> &Arc<SecretStore> {
        &self.store
    }

    /// OAuth client configuration, or [`AuthError::MissingClientConfig`]
    pub fn oauth_config(&self) -> AuthResult<&OAuthClientConfig> {
        self.config.as_ref().ok_or(AuthError::MissingClientConfig)
    }

    /// Save an app password as the active method
    pub fn store_app_password(&self, password: &str) -> AuthResult<()> {
        store_app_password(&self.store, password)
    }

    /// Load the credential record
    pub fn load_credentials(&self) -> AuthResult<StoredCredentials> {
        load_credentials(&self.store)
    }

    /// Make OAuth tokens the active method
    pub fn store_oauth_method(&self) -> AuthResult<()> {
        store_oauth_method(&self.store)
    }

    /// Remove the credential record
    pub fn remove_app_password(&self) -> AuthResult<()> {
        remove_app_password(&self.store)
    }

    /// Run the browser flow and return the token, without persisting it
    pub async fn browser_login(&self, port: u16) -> AuthResult<OAuthToken> {
        browser_login(self.oauth_config()?, port).await
    }

    /// [`browser_login`](Self::browser_login) with an explicit launcher and deadline
    pub async fn browser_login_with(
        &self,
        port: u16,
        launcher: &dyn BrowserLauncher,
        timeout: std::time::Duration,
    ) -> AuthResult<OAuthToken> {
        browser_login_with(self.oauth_config()?, port, launcher, timeout).await
    }

    /// Persist an OAuth token
    pub fn store_token(&self, token: &OAuthToken) -> AuthResult<()> {
        store_token(&self.store, token)
    }

    /// Load the persisted OAuth token
    pub fn load_token(&self) -> AuthResult<OAuthToken> {
        load_token(&self.store)
    }

    /// Delete the persisted OAuth token
    pub fn remove_token(&self) -> AuthResult<()> {
        remove_token(&self.store)
    }

    /// Refreshing token source that saves every new token
    pub fn token_source(&self) -> AuthResult<impl TokenSource> {
        let client = OAuthClient::new(self.oauth_config()?, None)?;
        token_source(self.store.clone(), client)
    }

    /// Current access token, refreshed first if it has expired
    pub async fn access_token(&self) -> AuthResult<String> {
        let source = self.token_source()?;
        access_token(&source).await
    }

    /// Credentials for connecting as `email`
    pub async fn authenticator(&self, email: &str) -> AuthResult<Authenticator> {
        dispatcher::authenticator(&self.store, email, || {
            OAuthClient::new(self.oauth_config()?, None)
        })
        .await
    }
}
