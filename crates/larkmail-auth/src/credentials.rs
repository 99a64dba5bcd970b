//! The stored credential record
//!
//! One record says how larkmail authenticates: with an app password, or with
//! OAuth tokens kept under their own key (see [`crate::token`]).

use crate::{AuthError, AuthResult, SecretStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Secret store key of the credential record
pub const CREDENTIALS_KEY: &str = "credentials";

/// Authentication method used for the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// IMAP/SMTP plain login with an application password
    AppPassword,
    /// XOAUTH2 with tokens from the browser flow
    #[serde(rename = "oauth")]
    OAuth,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::AppPassword => write!(f, "app password"),
            AuthMethod::OAuth => write!(f, "OAuth2"),
        }
    }
}

/// Persisted credential record
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub method: AuthMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_password: Option<String>,
}

impl std::fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("method", &self.method)
            .field("app_password", &self.app_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Save an app password, replacing whatever method was stored before
pub fn store_app_password(store: &SecretStore, password: &str) -> AuthResult<()> {
    let record = StoredCredentials {
        method: AuthMethod::AppPassword,
        app_password: Some(password.to_string()),
    };
    store.store_json(CREDENTIALS_KEY, &record)?;
    info!("Stored app password credentials");
    Ok(())
}

/// Record that OAuth tokens are the active method
pub fn store_oauth_method(store: &SecretStore) -> AuthResult<()> {
    let record = StoredCredentials {
        method: AuthMethod::OAuth,
        app_password: None,
    };
    store.store_json(CREDENTIALS_KEY, &record)?;
    info!("Stored OAuth2 credential record");
    Ok(())
}

/// Load the credential record
///
/// Anything short of a well-formed record, including a missing one, is
/// [`AuthError::NotAuthenticated`].
pub fn load_credentials(store: &SecretStore) -> AuthResult<StoredCredentials> {
    let record: StoredCredentials = store.load_json(CREDENTIALS_KEY).map_err(|e| {
        debug!("No usable credential record: {}", e);
        AuthError::NotAuthenticated
    })?;

    if record.method == AuthMethod::AppPassword && record.app_password.is_none() {
        debug!("App password record without a password");
        return Err(AuthError::NotAuthenticated);
    }
    Ok(record)
}

/// Remove the credential record; a missing record is fine
pub fn remove_app_password(store: &SecretStore) -> AuthResult<()> {
    if let Err(e) = store.delete(CREDENTIALS_KEY) {
        debug!("Ignoring credential removal failure: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::tests::{Memory, Unavailable};
    use crate::FileBackend;
    use crate::SecretBackend;

    #[test]
    fn test_app_password_roundtrip_on_either_backend() {
        let dir = tempfile::tempdir().unwrap();
        let stores = [
            SecretStore::with_backends(Memory::default(), dir.path().join("a")),
            SecretStore::with_backends(Unavailable, dir.path().join("b")),
        ];

        for store in &stores {
            store_app_password(store, "hunter2").unwrap();
            let record = load_credentials(store).unwrap();
            assert_eq!(record.method, AuthMethod::AppPassword);
            assert_eq!(record.app_password.as_deref(), Some("hunter2"));
        }
    }

    #[test]
    fn test_fresh_store_is_not_authenticated() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::with_backends(Unavailable, dir.path());
        assert!(matches!(
            load_credentials(&store),
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_remove_clears_either_method() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::with_backends(Unavailable, dir.path());

        store_oauth_method(&store).unwrap();
        assert_eq!(load_credentials(&store).unwrap().method, AuthMethod::OAuth);
        remove_app_password(&store).unwrap();
        assert!(load_credentials(&store).is_err());

        store_app_password(&store, "pw").unwrap();
        remove_app_password(&store).unwrap();
        assert!(matches!(
            load_credentials(&store),
            Err(AuthError::NotAuthenticated)
        ));

        // nothing left to remove
        remove_app_password(&store).unwrap();
    }

    #[test]
    fn test_new_method_supersedes_old() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::with_backends(Memory::default(), dir.path());

        store_app_password(&store, "pw").unwrap();
        store_oauth_method(&store).unwrap();

        let record = load_credentials(&store).unwrap();
        assert_eq!(record.method, AuthMethod::OAuth);
        assert_eq!(record.app_password, None);
    }

    #[test]
    fn test_garbage_record_is_not_authenticated() {
        let dir = tempfile::tempdir().unwrap();
        FileBackend::new(dir.path())
            .set(CREDENTIALS_KEY, b"not json")
            .unwrap();
        let store = SecretStore::file_only(dir.path());
        assert!(matches!(
            load_credentials(&store),
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let record = StoredCredentials {
            method: AuthMethod::AppPassword,
            app_password: Some("hunter2".into()),
        };
        assert!(!format!("{:?}", record).contains("hunter2"));
    }
}
