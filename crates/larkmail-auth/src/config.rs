//! OAuth client configuration and on-disk locations
//!
//! Client credentials come from build-time defaults that the runtime
//! environment can override. The resolved struct is built once at startup and
//! passed by reference; nothing here is process-global.

use crate::{yahoo, AuthError, AuthResult};
use std::path::{Path, PathBuf};

/// Environment variable overriding the OAuth client id
pub const CLIENT_ID_ENV: &str = "LARKMAIL_CLIENT_ID";
/// Environment variable overriding the OAuth client secret
pub const CLIENT_SECRET_ENV: &str = "LARKMAIL_CLIENT_SECRET";
/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "LARKMAIL_CONFIG_DIR";

const APP_NAME: &str = "larkmail";

/// OAuth2 client configuration
#[derive(Clone)]
pub struct OAuthClientConfig {
    /// OAuth2 client ID
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Requested scopes
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    /// Resolve the configuration from compile-time defaults and the process
    /// environment
    pub fn from_env() -> AuthResult<Self> {
        Self::resolve(
            option_env!("LARKMAIL_CLIENT_ID"),
            option_env!("LARKMAIL_CLIENT_SECRET"),
            |name| std::env::var(name).ok(),
        )
    }

    /// Resolve the configuration from explicit defaults and a variable lookup
    ///
    /// A non-empty looked-up value wins over the default. Fails with
    /// [`AuthError::MissingClientConfig`] if either value ends up empty.
    pub fn resolve(
        default_id: Option<&str>,
        default_secret: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> AuthResult<Self> {
        let pick = |name: &str, default: Option<&str>| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .or_else(|| default.filter(|v| !v.is_empty()).map(str::to_string))
        };

        let client_id = pick(CLIENT_ID_ENV, default_id).ok_or(AuthError::MissingClientConfig)?;
        let client_secret =
            pick(CLIENT_SECRET_ENV, default_secret).ok_or(AuthError::MissingClientConfig)?;

        Ok(Self {
            client_id,
            client_secret,
            auth_url: yahoo::AUTH_URL.to_string(),
            token_url: yahoo::TOKEN_URL.to_string(),
            scopes: yahoo::SCOPES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Redirect URI registered with the provider for a given callback port
    pub fn redirect_uri(&self, port: u16) -> String {
        format!("https://localhost:{}", port)
    }
}

impl std::fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Locations of larkmail's private files
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    /// Use an explicit configuration directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform configuration directory, overridable with `LARKMAIL_CONFIG_DIR`
    pub fn from_env() -> AuthResult<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(dir));
        }
        let base = dirs::config_dir().ok_or_else(|| {
            AuthError::InvalidConfig("cannot determine the user configuration directory".into())
        })?;
        Ok(Self::new(base.join(APP_NAME)))
    }

    /// Configuration directory
    pub fn config_dir(&self) -> &Path {
        &self.root
    }

    /// Directory for the secret file fallback
    pub fn token_dir(&self) -> PathBuf {
        self.root.join("tokens")
    }
}
