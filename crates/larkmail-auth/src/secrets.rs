//! Secure credential storage
//!
//! Secrets live in the platform keyring when one is reachable. When it is
//! not (no secret service, locked down, headless) the same key is written to
//! a private file instead. Callers only see [`SecretStore`]; the keyring and
//! the file are two [`SecretBackend`]s composed by [`Fallback`].

use crate::{AuthError, AuthResult, Paths};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Keyring service name for larkmail entries
pub const SERVICE_NAME: &str = "larkmail";

/// A place secrets can be written to and read back from
pub trait SecretBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Read a secret; a missing key is [`AuthError::SecretNotFound`]
    fn get(&self, key: &str) -> AuthResult<Vec<u8>>;

    /// Create or replace a secret
    fn set(&self, key: &str, value: &[u8]) -> AuthResult<()>;

    /// Remove a secret; removing a missing key succeeds
    fn delete(&self, key: &str) -> AuthResult<()>;
}

impl<B: SecretBackend + ?Sized> SecretBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn get(&self, key: &str) -> AuthResult<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> AuthResult<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> AuthResult<()> {
        (**self).delete(key)
    }
}

/// OS keyring backend (Keychain, Credential Manager, Secret Service)
///
/// Every platform store used here outlives a reboot.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    /// Create a backend addressing entries under `service`
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> AuthResult<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(map_keyring_error)
    }
}

fn map_keyring_error(e: keyring::Error) -> AuthError {
    AuthError::Secret(format!("keyring: {}", e))
}

impl SecretBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn get(&self, key: &str) -> AuthResult<Vec<u8>> {
        match self.entry(key)?.get_secret() {
            Ok(value) => Ok(value),
            Err(keyring::Error::NoEntry) => Err(AuthError::SecretNotFound(key.to_string())),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> AuthResult<()> {
        self.entry(key)?.set_secret(value).map_err(map_keyring_error)
    }

    fn delete(&self, key: &str) -> AuthResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}

/// Owner-only files, one `<key>.json` per secret
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Store files under `dir`, creating it on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file holding `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn ensure_dir(&self) -> std::io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.dir)
    }
}

fn write_private(path: &Path, value: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        // mode() only applies on creation
        let mut file = options.open(path)?;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        file.write_all(value)?;
        return file.sync_all();
    }
    #[cfg(not(unix))]
    {
        let mut file = options.open(path)?;
        file.write_all(value)?;
        file.sync_all()
    }
}

impl SecretBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> AuthResult<Vec<u8>> {
        match fs::read(self.path_for(key)) {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AuthError::SecretNotFound(key.to_string()))
            }
            Err(e) => Err(AuthError::Secret(format!("reading {}: {}", key, e))),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> AuthResult<()> {
        self.ensure_dir().map_err(|e| {
            AuthError::Secret(format!("creating {}: {}", self.dir.display(), e))
        })?;
        write_private(&self.path_for(key), value)
            .map_err(|e| AuthError::Secret(format!("writing {}: {}", key, e)))
    }

    fn delete(&self, key: &str) -> AuthResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Io(e)),
        }
    }
}

/// Try `primary`, else `secondary`
///
/// Writes and reads go to the primary first and fall through to the secondary
/// on any primary error. Deletes are best-effort on the primary and
/// authoritative on the secondary.
pub struct Fallback<P, S> {
    primary: P,
    secondary: S,
}

impl<P: SecretBackend, S: SecretBackend> Fallback<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: SecretBackend, S: SecretBackend> SecretBackend for Fallback<P, S> {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn get(&self, key: &str) -> AuthResult<Vec<u8>> {
        match self.primary.get(key) {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!(key, backend = self.primary.name(), "read failed ({}), trying {}", e, self.secondary.name());
                self.secondary.get(key)
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> AuthResult<()> {
        let primary_err = match self.primary.set(key, value) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        debug!(key, backend = self.primary.name(), "write failed ({}), using {}", primary_err, self.secondary.name());
        self.secondary.set(key, value).map_err(|e| {
            AuthError::Secret(format!(
                "{}: {}; {}: {}",
                self.primary.name(),
                primary_err,
                self.secondary.name(),
                e
            ))
        })
    }

    fn delete(&self, key: &str) -> AuthResult<()> {
        if let Err(e) = self.primary.delete(key) {
            debug!(key, backend = self.primary.name(), "delete failed: {}", e);
        }
        self.secondary.delete(key)
    }
}

/// Manages secure storage of credentials
pub struct SecretStore {
    backend: Box<dyn SecretBackend>,
}

impl SecretStore {
    /// Keyring first, private files under the token directory second
    pub fn open(paths: &Paths) -> Self {
        Self::with_backends(KeyringBackend::new(SERVICE_NAME), paths.token_dir())
    }

    /// A custom primary backend with the file fallback in `fallback_dir`
    pub fn with_backends(primary: impl SecretBackend + 'static, fallback_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: Box::new(Fallback::new(primary, FileBackend::new(fallback_dir))),
        }
    }

    /// Files only, for environments without a keyring
    pub fn file_only(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: Box::new(FileBackend::new(dir)),
        }
    }

    /// Read raw bytes
    pub fn get(&self, key: &str) -> AuthResult<Vec<u8>> {
        self.backend.get(key)
    }

    /// Write raw bytes
    pub fn set(&self, key: &str, value: &[u8]) -> AuthResult<()> {
        self.backend.set(key, value)
    }

    /// Delete a key from every backend
    pub fn delete(&self, key: &str) -> AuthResult<()> {
        self.backend.delete(key)?;
        info!(key, "Deleted secret");
        Ok(())
    }

    /// Serialize `value` as JSON and store it under `key`
    pub fn store_json<T: Serialize>(&self, key: &str, value: &T) -> AuthResult<()> {
        let json = serde_json::to_vec(value)
            .map_err(|e| AuthError::Secret(format!("Failed to serialize {}: {}", key, e)))?;
        self.set(key, &json)?;
        debug!(key, "Stored secret");
        Ok(())
    }

    /// Load and deserialize the JSON stored under `key`
    ///
    /// A value that does not decode is [`AuthError::CorruptSecret`].
    pub fn load_json<T: DeserializeOwned>(&self, key: &str) -> AuthResult<T> {
        let json = self.get(key)?;
        serde_json::from_slice(&json).map_err(|e| {
            warn!(key, "Failed to parse stored secret: {}", e);
            AuthError::CorruptSecret(key.to_string())
        })
    }
}
