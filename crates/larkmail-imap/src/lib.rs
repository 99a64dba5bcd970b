//! IMAP support for larkmail
//!
//! Connects over implicit TLS and logs in with whatever
//! [`larkmail_auth::Authenticator`] the stored credentials produce.

mod client;
mod error;
mod sasl;

pub use client::{
    authenticate, read_greeting, verify, verify_session, ImapClient, CONNECT_TIMEOUT,
};
pub use error::{ImapError, ImapResult};
pub use sasl::SaslAuthenticator;
