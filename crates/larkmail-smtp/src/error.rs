//! Error types for SMTP operations

use thiserror::Error;

/// Result type for SMTP operations
pub type SmtpResult<T> = Result<T, SmtpError>;

/// Errors that can occur during SMTP operations
#[derive(Debug, Error)]
pub enum SmtpError {
    /// Connection failed
    #[error("Failed to connect to SMTP server: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("SMTP authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server refused the session for a reason other than credentials
    #[error("SMTP server error: {0}")]
    ServerError(String),

    /// TLS error
    #[error("TLS error: {0}")]
    TlsError(String),
}

impl SmtpError {
    /// Sort a lettre transport error into one of ours
    pub fn from_transport(e: lettre::transport::smtp::Error) -> Self {
        let message = e.to_string();
        if e.is_tls() {
            SmtpError::TlsError(message)
        } else if e.is_permanent() && is_auth_rejection(&message) {
            SmtpError::AuthenticationFailed(message)
        } else if e.is_permanent() || e.is_transient() {
            SmtpError::ServerError(message)
        } else {
            SmtpError::ConnectionFailed(message)
        }
    }
}

/// 535 is the reply code for rejected credentials
fn is_auth_rejection(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("535") || lower.contains("authentication") || lower.contains("auth failed")
}
