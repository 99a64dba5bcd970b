//! Login, logout and status
//!
//! These tie the credential store, the browser flow and the protocol clients
//! together. Nothing here prints; the command line decides what the user sees.

use crate::account::{load_email, remove_email, save_email, validate_email, AccountConfig};
use crate::{CoreError, CoreResult, ExitKind};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use larkmail_auth::{
    AuthError, AuthManager, AuthMethod, Authenticator, BrowserLauncher, OAuthToken, Paths,
    CALLBACK_TIMEOUT,
};
use larkmail_smtp::SmtpClient;
use std::fmt;
use tracing::{debug, info, warn};

const APP_PASSWORD_HINT: &str = "Check your app password and try again.";

/// Proves an authenticator is accepted by a server
#[async_trait]
pub trait LoginVerifier: Send + Sync {
    /// Short name for messages
    fn name(&self) -> &'static str;

    async fn verify(&self, auth: &Authenticator) -> CoreResult<()>;
}

/// Log in to IMAP, NOOP, log out
pub struct ImapVerifier {
    host: String,
    port: u16,
}

impl ImapVerifier {
    pub fn new(config: &AccountConfig) -> Self {
        Self {
            host: config.imap_host.clone(),
            port: config.imap_port,
        }
    }
}

#[async_trait]
impl LoginVerifier for ImapVerifier {
    fn name(&self) -> &'static str {
        "IMAP"
    }

    async fn verify(&self, auth: &Authenticator) -> CoreResult<()> {
        larkmail_imap::verify(&self.host, self.port, auth).await?;
        Ok(())
    }
}

/// Connect to SMTP and authenticate without sending
pub struct SmtpVerifier {
    client: SmtpClient,
}

impl SmtpVerifier {
    pub fn new(config: &AccountConfig) -> Self {
        Self {
            client: SmtpClient::new(config.smtp_host.clone(), config.smtp_port),
        }
    }
}

#[async_trait]
impl LoginVerifier for SmtpVerifier {
    fn name(&self) -> &'static str {
        "SMTP"
    }

    async fn verify(&self, auth: &Authenticator) -> CoreResult<()> {
        self.client.verify(auth).await?;
        Ok(())
    }
}

/// Store an app password and check it against the server
///
/// If the server rejects the login nothing is left behind.
pub async fn login_with_app_password(
    auth: &AuthManager,
    paths: &Paths,
    email: &str,
    password: &str,
    verifier: &dyn LoginVerifier,
) -> CoreResult<()> {
    validate_email(email)?;
    if password.trim().is_empty() {
        return Err(CoreError::new(ExitKind::InvalidInput, "App password is empty")
            .with_hint("Generate an app password in your Yahoo account security settings."));
    }

    auth.store_app_password(password)?;
    save_email(paths, email)?;
    info!("App password stored for {}, verifying with {}", email, verifier.name());

    let authenticator = Authenticator::Password {
        username: email.to_string(),
        password: password.to_string(),
    };
    if let Err(e) = verifier.verify(&authenticator).await {
        warn!("{} verification failed, discarding app password", verifier.name());
        if let Err(cleanup) = auth.remove_app_password() {
            warn!("Could not remove app password: {}", cleanup);
        }
        if let Err(cleanup) = remove_email(paths) {
            warn!("Could not remove account e-mail: {}", cleanup);
        }
        return Err(match e.kind() {
            ExitKind::Auth => e.with_hint(APP_PASSWORD_HINT),
            _ => e,
        });
    }

    // an older OAuth token would only confuse status
    if let Err(e) = auth.remove_token() {
        debug!("Could not remove stale token: {}", e);
    }
    info!("App password login complete for {}", email);
    Ok(())
}

/// Run the browser flow and make OAuth the active method
pub async fn login_with_browser(
    auth: &AuthManager,
    paths: &Paths,
    email: &str,
    port: u16,
    launcher: &dyn BrowserLauncher,
) -> CoreResult<OAuthToken> {
    validate_email(email)?;
    auth.oauth_config()?;

    let token = auth
        .browser_login_with(port, launcher, CALLBACK_TIMEOUT)
        .await?;
    auth.store_token(&token)?;
    auth.store_oauth_method()?;
    save_email(paths, email)?;
    info!("OAuth2 login complete for {}", email);
    Ok(token)
}

/// Forget every stored credential
///
/// The token is the one thing that must go; the rest is best effort.
pub fn logout(auth: &AuthManager, paths: &Paths) -> CoreResult<()> {
    auth.remove_app_password()?;
    auth.remove_token()?;
    if let Err(e) = remove_email(paths) {
        warn!("Could not remove account e-mail: {}", e);
    }
    info!("Logged out");
    Ok(())
}

/// What is known about the stored token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub expiry: Option<DateTime<Utc>>,
    pub token_type: String,
    pub expired: bool,
}

impl From<&OAuthToken> for TokenStatus {
    fn from(token: &OAuthToken) -> Self {
        Self {
            expiry: token.expiry,
            token_type: token.token_type.clone(),
            expired: token.expiry.is_some() && token.is_expired(),
        }
    }
}

/// Snapshot of the stored authentication state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub email: Option<String>,
    pub method: Option<AuthMethod>,
    pub token: Option<TokenStatus>,
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.authenticated {
            writeln!(f, "Status: not authenticated")?;
            return write!(
                f,
                "Run 'larkmail auth login --email your@yahoo.com' to authenticate."
            );
        }

        write!(f, "Status: authenticated")?;
        if let Some(ref email) = self.email {
            write!(f, "\nEmail:  {}", email)?;
        }
        if let Some(method) = self.method {
            write!(f, "\nMethod: {}", method)?;
        }
        if let Some(ref token) = self.token {
            match token.expiry {
                None => write!(f, "\nExpiry: none (non-expiring token)")?,
                Some(expiry) => {
                    let stamp = expiry.to_rfc3339_opts(SecondsFormat::Secs, true);
                    if token.expired {
                        write!(f, "\nExpiry: {} (expired, will auto-refresh)", stamp)?;
                    } else {
                        write!(f, "\nExpiry: {}", stamp)?;
                    }
                }
            }
            write!(f, "\nType:   {}", token.token_type)?;
        }
        Ok(())
    }
}

/// Inspect stored credentials without contacting any server
pub fn status(auth: &AuthManager, paths: &Paths) -> CoreResult<AuthStatus> {
    let email = load_email(paths)?;

    let method = match auth.load_credentials() {
        Ok(record) => record.method,
        Err(AuthError::NotAuthenticated) => {
            return Ok(AuthStatus {
                authenticated: false,
                email,
                method: None,
                token: None,
            })
        }
        Err(e) => return Err(e.into()),
    };

    let token = match method {
        AuthMethod::AppPassword => None,
        AuthMethod::OAuth => match auth.load_token() {
            Ok(token) => Some(TokenStatus::from(&token)),
            Err(AuthError::TokenNotFound) => {
                debug!("OAuth2 record without a token");
                return Ok(AuthStatus {
                    authenticated: false,
                    email,
                    method: Some(method),
                    token: None,
                });
            }
            Err(e) => return Err(e.into()),
        },
    };

    Ok(AuthStatus {
        authenticated: true,
        email,
        method: Some(method),
        token,
    })
}

/// Log in to every server with the stored credentials
pub async fn check_connection(
    auth: &AuthManager,
    paths: &Paths,
    verifiers: &[&dyn LoginVerifier],
) -> CoreResult<()> {
    let email = load_email(paths)?.ok_or_else(|| {
        CoreError::new(ExitKind::NotConfigured, "No account configured")
            .with_hint("Run 'larkmail auth login --email your@yahoo.com' to authenticate.")
    })?;

    let authenticator = auth.authenticator(&email).await?;
    for verifier in verifiers {
        debug!("Checking {} login for {}", verifier.name(), email);
        verifier.verify(&authenticator).await?;
        info!("{} login OK", verifier.name());
    }
    Ok(())
}
