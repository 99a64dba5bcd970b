//! Error types for the auth module

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Broad category of an authentication failure, used for exit codes and hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// OAuth client credentials or other settings are missing
    Configuration,
    /// Credentials were rejected or the flow was tampered with
    Authentication,
    /// No stored credential or token
    NotFound,
    /// Sockets, timeouts and the callback listener
    Network,
    /// The peer did something the mechanism does not allow
    Protocol,
    /// Neither secret backend could persist a value
    Storage,
}

/// Errors that can occur during authentication
#[derive(Debug, Error)]
pub enum AuthError {
    /// OAuth client id or secret could not be resolved
    #[error(
        "OAuth credentials not configured; set LARKMAIL_CLIENT_ID and LARKMAIL_CLIENT_SECRET"
    )]
    MissingClientConfig,

    /// Invalid configuration value (bad endpoint URL, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The local callback listener could not bind its port
    #[error("Failed to start callback server on port {port}: {message}")]
    CallbackBind { port: u16, message: String },

    /// TLS material for the callback listener could not be produced
    #[error("Failed to prepare TLS for callback server: {0}")]
    Tls(String),

    /// The callback did not echo the state token of this flow
    #[error("OAuth2 state mismatch")]
    StateMismatch,

    /// The authorization server redirected back with an error
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The callback carried neither an error nor a code
    #[error("No authorization code in callback")]
    MissingCode,

    /// Nobody completed the browser step in time
    #[error("Authentication timed out after {0} seconds")]
    CallbackTimeout(u64),

    /// Authorization code could not be exchanged for a token
    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    /// Refresh token was rejected or the refresh request failed
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// No usable credential record
    #[error("Not authenticated")]
    NotAuthenticated,

    /// No OAuth token stored
    #[error("No OAuth token stored")]
    TokenNotFound,

    /// A key is missing from every secret backend
    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    /// A stored value exists but cannot be decoded
    #[error("Stored {0} is unreadable")]
    CorruptSecret(String),

    /// Secret storage error
    #[error("Secret storage error: {0}")]
    Secret(String),

    /// The server sent a challenge to a single-round mechanism
    #[error("XOAUTH2 unexpected challenge: {0}")]
    UnexpectedChallenge(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::MissingClientConfig | AuthError::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            AuthError::StateMismatch
            | AuthError::AuthorizationDenied(_)
            | AuthError::ExchangeFailed(_)
            | AuthError::RefreshFailed(_) => ErrorKind::Authentication,
            AuthError::NotAuthenticated
            | AuthError::TokenNotFound
            | AuthError::SecretNotFound(_)
            | AuthError::CorruptSecret(_) => ErrorKind::NotFound,
            AuthError::CallbackBind { .. }
            | AuthError::Tls(_)
            | AuthError::CallbackTimeout(_)
            | AuthError::Io(_) => ErrorKind::Network,
            AuthError::MissingCode | AuthError::UnexpectedChallenge(_) => ErrorKind::Protocol,
            AuthError::Secret(_) => ErrorKind::Storage,
        }
    }

    /// Short remediation hint for the user, if there is one
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            AuthError::MissingClientConfig => Some(
                "Export LARKMAIL_CLIENT_ID and LARKMAIL_CLIENT_SECRET, or use --app-password.",
            ),
            AuthError::CallbackBind { .. } => {
                Some("Another process is using the port; pass a different --port.")
            }
            AuthError::CallbackTimeout(_) => {
                Some("Complete the sign-in in your browser within two minutes.")
            }
            AuthError::StateMismatch
            | AuthError::AuthorizationDenied(_)
            | AuthError::MissingCode
            | AuthError::ExchangeFailed(_) => Some("Run 'larkmail auth login' again."),
            AuthError::NotAuthenticated
            | AuthError::TokenNotFound
            | AuthError::CorruptSecret(_)
            | AuthError::RefreshFailed(_) => {
                Some("Run 'larkmail auth login' to re-authenticate.")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_errors_are_distinct() {
        let errors = [
            AuthError::StateMismatch,
            AuthError::AuthorizationDenied("access_denied".into()),
            AuthError::MissingCode,
            AuthError::CallbackTimeout(120),
        ];
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_kinds() {
        assert_eq!(AuthError::MissingClientConfig.kind(), ErrorKind::Configuration);
        assert_eq!(AuthError::StateMismatch.kind(), ErrorKind::Authentication);
        assert_eq!(AuthError::NotAuthenticated.kind(), ErrorKind::NotFound);
        assert_eq!(AuthError::CallbackTimeout(120).kind(), ErrorKind::Network);
        assert_eq!(
            AuthError::UnexpectedChallenge("x".into()).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(AuthError::Secret("both failed".into()).kind(), ErrorKind::Storage);
        assert_eq!(
            AuthError::CorruptSecret("oauth_token".into()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_relogin_hint() {
        let hint = AuthError::RefreshFailed("invalid_grant".into()).hint();
        assert!(hint.unwrap().contains("auth login"));
    }
}
