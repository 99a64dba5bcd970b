//! Account management
//!
//! The account e-mail is not secret, but it is kept next to the file secrets
//! in the configuration directory with the same owner-only permissions.

use crate::{CoreError, CoreResult, ExitKind};
use larkmail_auth::{yahoo, AuthError, FileBackend, Paths, SecretBackend};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name (without extension) of the account record
pub const ACCOUNT_KEY: &str = "account";

/// Email account configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// IMAP server hostname
    pub imap_host: String,
    /// IMAP server port
    pub imap_port: u16,
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self::yahoo()
    }
}

impl AccountConfig {
    /// Yahoo Mail servers
    pub fn yahoo() -> Self {
        Self {
            imap_host: yahoo::IMAP_HOST.to_string(),
            imap_port: yahoo::IMAP_PORT,
            smtp_host: yahoo::SMTP_HOST.to_string(),
            smtp_port: yahoo::SMTP_PORT,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountRecord {
    email: String,
}

fn backend(paths: &Paths) -> FileBackend {
    FileBackend::new(paths.config_dir())
}

/// Reject strings that cannot be a mailbox address
pub fn validate_email(email: &str) -> CoreResult<()> {
    let invalid = || {
        CoreError::new(
            ExitKind::InvalidInput,
            format!("Invalid email address: {:?}", email),
        )
        .with_hint("Pass the full address, e.g. --email your@yahoo.com")
    };

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(invalid());
    }
    Ok(())
}

/// Remember the account e-mail
pub fn save_email(paths: &Paths, email: &str) -> CoreResult<()> {
    let record = AccountRecord {
        email: email.to_string(),
    };
    let json = serde_json::to_vec_pretty(&record)
        .map_err(|e| CoreError::wrap(ExitKind::General, "Could not encode account", e))?;
    backend(paths).set(ACCOUNT_KEY, &json)?;
    debug!("Saved account e-mail");
    Ok(())
}

/// The remembered account e-mail, if there is one
pub fn load_email(paths: &Paths) -> CoreResult<Option<String>> {
    let bytes = match backend(paths).get(ACCOUNT_KEY) {
        Ok(bytes) => bytes,
        Err(AuthError::SecretNotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_slice::<AccountRecord>(&bytes) {
        Ok(record) if !record.email.is_empty() => Ok(Some(record.email)),
        Ok(_) => Ok(None),
        Err(e) => Err(CoreError::wrap(
            ExitKind::Config,
            "Account file is corrupt",
            e,
        )
        .with_hint("Run 'larkmail auth login' to recreate it.")),
    }
}

/// Forget the account e-mail; a missing record is fine
pub fn remove_email(paths: &Paths) -> CoreResult<()> {
    backend(paths).delete(ACCOUNT_KEY)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());

        assert_eq!(load_email(&paths).unwrap(), None);
        save_email(&paths, "me@yahoo.com").unwrap();
        assert_eq!(load_email(&paths).unwrap().as_deref(), Some("me@yahoo.com"));

        remove_email(&paths).unwrap();
        assert_eq!(load_email(&paths).unwrap(), None);
        // removing twice is not an error
        remove_email(&paths).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_account_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().join("cfg"));
        save_email(&paths, "me@yahoo.com").unwrap();

        let file = dir.path().join("cfg").join("account.json");
        let mode = std::fs::metadata(file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_account_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path());
        std::fs::write(dir.path().join("account.json"), b"not json").unwrap();

        let err = load_email(&paths).unwrap_err();
        assert_eq!(err.kind(), ExitKind::Config);
    }

    #[test]
    fn test_validate_email() {
        for good in ["me@yahoo.com", "first.last+tag@mail.example.co.uk"] {
            assert!(validate_email(good).is_ok(), "{}", good);
        }
        for bad in ["", "me", "@yahoo.com", "me@", "me@yahoo", "me@@yahoo.com", "me @yahoo.com", "me@.com"] {
            let err = validate_email(bad).unwrap_err();
            assert_eq!(err.exit_code(), 6, "{}", bad);
        }
    }

    #[test]
    fn test_default_servers_are_yahoo() {
        let config = AccountConfig::default();
        assert_eq!(config.imap_host, "imap.mail.yahoo.com");
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.smtp_port, 465);
    }
}
