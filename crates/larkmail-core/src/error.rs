//! Error types for the core module
//!
//! [`CoreError`] is what reaches the command line: a user-facing message, an
//! exit code category, and where possible a hint on what to do next. Errors
//! from the auth, IMAP and SMTP crates are sorted into those categories here
//! rather than shown raw.

use larkmail_auth::{AuthError, ErrorKind};
use larkmail_imap::ImapError;
use larkmail_smtp::SmtpError;
use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Exit code category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    General,
    Auth,
    NotFound,
    Imap,
    InvalidInput,
    Network,
    Config,
    NotConfigured,
    Smtp,
}

impl ExitKind {
    /// Process exit code
    pub fn code(self) -> i32 {
        match self {
            ExitKind::General => 1,
            ExitKind::Auth => 2,
            ExitKind::NotFound => 3,
            ExitKind::Imap => 5,
            ExitKind::InvalidInput => 6,
            ExitKind::Network => 7,
            ExitKind::Config => 8,
            ExitKind::NotConfigured => 9,
            ExitKind::Smtp => 10,
        }
    }
}

const RELOGIN_HINT: &str = "Run 'larkmail auth login' to re-authenticate.";
const NETWORK_HINT: &str = "Check your internet connection and try again.";

/// Error reported to the user
#[derive(Debug, Error)]
#[error("{message}{}", .source.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
pub struct CoreError {
    kind: ExitKind,
    message: String,
    hint: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl CoreError {
    pub fn new(kind: ExitKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hint: None,
            source: None,
        }
    }

    /// Wrap an underlying error
    pub fn wrap(
        kind: ExitKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: Some(Box::new(source)),
            ..Self::new(kind, message)
        }
    }

    /// Attach a hint, replacing any earlier one
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn kind(&self) -> ExitKind {
        self.kind
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.code()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}

impl From<AuthError> for CoreError {
    fn from(e: AuthError) -> Self {
        let hint = e.hint();
        let (kind, message) = match e.kind() {
            ErrorKind::Configuration => (ExitKind::Config, "OAuth2 is not configured"),
            ErrorKind::NotFound => (ExitKind::Auth, "Not authenticated"),
            ErrorKind::Authentication | ErrorKind::Protocol => {
                (ExitKind::Auth, "Authentication failed")
            }
            ErrorKind::Network => (ExitKind::Network, "Connection failed"),
            ErrorKind::Storage => (ExitKind::General, "Could not store credentials"),
        };
        let error = CoreError::wrap(kind, message, e);
        match hint {
            Some(hint) => error.with_hint(hint),
            None => error,
        }
    }
}

impl From<ImapError> for CoreError {
    fn from(e: ImapError) -> Self {
        match e {
            ImapError::AuthenticationFailed(_) | ImapError::Protocol(_) => {
                CoreError::wrap(ExitKind::Auth, "Authentication failed", e).with_hint(RELOGIN_HINT)
            }
            ImapError::ConnectionFailed(_)
            | ImapError::TlsError(_)
            | ImapError::IoError(_)
            | ImapError::Timeout => {
                CoreError::wrap(ExitKind::Network, "Connection failed", e).with_hint(NETWORK_HINT)
            }
            ImapError::ServerError(_) | ImapError::NotConnected => {
                CoreError::wrap(ExitKind::Imap, "IMAP error", e)
            }
        }
    }
}

impl From<SmtpError> for CoreError {
    fn from(e: SmtpError) -> Self {
        match e {
            SmtpError::AuthenticationFailed(_) => {
                CoreError::wrap(ExitKind::Auth, "SMTP authentication failed", e)
                    .with_hint(RELOGIN_HINT)
            }
            SmtpError::ConnectionFailed(_) | SmtpError::TlsError(_) => {
                CoreError::wrap(ExitKind::Network, "SMTP connection failed", e)
                    .with_hint(NETWORK_HINT)
            }
            SmtpError::ServerError(_) => CoreError::wrap(ExitKind::Smtp, "SMTP error", e),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::wrap(ExitKind::General, "I/O error", e)
    }
}
