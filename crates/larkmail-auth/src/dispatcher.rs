//! Turns the stored credential record into something a protocol client can
//! log in with

use crate::credentials::{load_credentials, AuthMethod};
use crate::token_source::{access_token, token_source, TokenRefresher};
use crate::xoauth2::{new_bearer_client, XOAuth2Client};
use crate::{AuthError, AuthResult, SecretStore};
use std::sync::Arc;
use tracing::debug;

/// Credentials ready for IMAP or SMTP
#[derive(Clone)]
pub enum Authenticator {
    /// Native plain login
    Password { username: String, password: String },
    /// XOAUTH2 with a fresh access token
    Bearer(XOAuth2Client),
}

impl Authenticator {
    /// User name presented to the server
    pub fn username(&self) -> &str {
        match self {
            Authenticator::Password { username, .. } => username,
            Authenticator::Bearer(client) => client.email(),
        }
    }

    /// Which stored method produced this authenticator
    pub fn method(&self) -> AuthMethod {
        match self {
            Authenticator::Password { .. } => AuthMethod::AppPassword,
            Authenticator::Bearer(_) => AuthMethod::OAuth,
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authenticator::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Authenticator::Bearer(client) => f.debug_tuple("Bearer").field(client).finish(),
        }
    }
}

/// Build the authenticator for `email` from whatever method is stored
///
/// `refresher` is only invoked for OAuth records, so app-password accounts
/// work without OAuth client credentials.
pub async fn authenticator<R, F>(
    store: &Arc<SecretStore>,
    email: &str,
    refresher: F,
) -> AuthResult<Authenticator>
where
    R: TokenRefresher + 'static,
    F: FnOnce() -> AuthResult<R>,
{
    let record = load_credentials(store)?;
    match record.method {
        AuthMethod::AppPassword => {
            debug!("Using app password for {}", email);
            let password = record.app_password.ok_or(AuthError::NotAuthenticated)?;
            Ok(Authenticator::Password {
                username: email.to_string(),
                password,
            })
        }
        AuthMethod::OAuth => {
            debug!("Using XOAUTH2 for {}", email);
            let source = token_source(store.clone(), refresher()?)?;
            let token = access_token(&source).await?;
            Ok(Authenticator::Bearer(new_bearer_client(email, &token)))
        }
    }
}
