//! The pre-shared secret used both as the HMAC signing key and as the
//! key-derivation input for sealing.
//!
//! There is no built-in fallback secret. A secret is either passed in
//! explicitly or read from a file; an absent or empty secret is a
//! configuration error.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;

use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::errors::{LicenseError, LicenseResult};

/// Random bytes in a generated secret (hex-encoded to 64 characters).
pub const GENERATED_SECRET_BYTES: usize = 32;

/// Process-wide secret, loaded at most once per run.
static GLOBAL_SECRET: OnceLock<SharedSecret> = OnceLock::new();

/// A shared secret string. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Wrap an explicit secret. Surrounding whitespace is ignored.
    pub fn new(secret: impl Into<String>) -> LicenseResult<Self> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            return Err(LicenseError::ConfigError(
                "shared secret cannot be empty".to_string(),
            ));
        }
        Ok(Self(secret))
    }

    /// Generate a new random secret (64 lowercase hex characters).
    pub fn generate() -> LicenseResult<Self> {
        let mut bytes = [0u8; GENERATED_SECRET_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| LicenseError::EncryptionError(format!("system rng failure: {e}")))?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Read a secret from a plain-text file.
    pub fn from_file(path: impl AsRef<Path>) -> LicenseResult<Self> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LicenseError::ConfigError(format!(
                    "secret file not found: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(LicenseError::StorageError(e)),
        };
        Self::new(contents)
    }

    /// Write the secret to `path` so later issuance runs can reuse it.
    ///
    /// The file is plain text. Anyone who can read it can mint licenses.
    pub fn persist(&self, path: impl AsRef<Path>) -> LicenseResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.0)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
        }

        Ok(())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

/// Install the process-wide secret.
///
/// The first call wins; later calls return the already-installed secret.
pub fn init_global_secret(secret: SharedSecret) -> &'static SharedSecret {
    GLOBAL_SECRET.get_or_init(|| secret)
}

/// Load the process-wide secret from `path` on first use.
pub fn load_global_secret(path: impl AsRef<Path>) -> LicenseResult<&'static SharedSecret> {
    if let Some(secret) = GLOBAL_SECRET.get() {
        return Ok(secret);
    }
    let secret = SharedSecret::from_file(path)?;
    Ok(init_global_secret(secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            SharedSecret::new("   \n"),
            Err(LicenseError::ConfigError(_))
        ));
    }

    #[test]
    fn generated_secret_is_64_hex_chars() {
        let secret = SharedSecret::generate().unwrap();
        assert_eq!(secret.expose().len(), 64);
        assert!(secret.expose().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, SharedSecret::generate().unwrap());
    }

    #[test]
    fn debug_does_not_leak_value() {
        let secret = SharedSecret::new("super-secret").unwrap();
        assert!(!format!("{secret:?}").contains("super-secret"));
    }

    #[test]
    fn persist_then_load_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("license_secret.key");

        let secret = SharedSecret::new("abc123").unwrap();
        secret.persist(&path).unwrap();
        fs::write(&path, "abc123\n").unwrap();

        assert_eq!(SharedSecret::from_file(&path).unwrap(), secret);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SharedSecret::from_file(dir.path().join("nope.key"));
        assert!(matches!(result, Err(LicenseError::ConfigError(_))));
    }
}
