//! Core logic for larkmail
//!
//! Ties the auth, IMAP and SMTP crates together into the operations the
//! command line exposes: log in, log out, show status, check the connection.

mod account;
mod error;
mod login;

pub use account::{load_email, remove_email, save_email, validate_email, AccountConfig, ACCOUNT_KEY};
pub use error::{CoreError, CoreResult, ExitKind};
pub use login::{
    check_connection, login_with_app_password, login_with_browser, logout, status, AuthStatus,
    ImapVerifier, LoginVerifier, SmtpVerifier, TokenStatus,
};
