//! SMTP support for larkmail
//!
//! Builds lettre transports from a [`larkmail_auth::Authenticator`]: plain
//! login for app passwords, XOAUTH2 for OAuth tokens.

mod client;
mod error;

pub use client::{credentials_for, SmtpClient};
pub use error::{SmtpError, SmtpResult};
