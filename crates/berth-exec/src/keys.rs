//! SSH private key resolution
//!
//! A host descriptor names where its key comes from; resolution turns
//! that into something the SSH client can load. Keys handed over through
//! the environment are materialized as owner-only temp files for the
//! lifetime of the session.

use std::path::{Path, PathBuf};

use base64::Engine;
use thiserror::Error;
use tracing::warn;

/// Where a host's SSH private key comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Key file on disk
    Path(PathBuf),
    /// Running SSH agent
    Agent,
    /// Base64-encoded key in the named environment variable
    Env(String),
}

/// Key resolution errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeySource {
    /// Turn the source into a loadable key location
    ///
    /// Keys on disk must be owner-only. An environment key is decoded
    /// and written to a temp file that is removed again on drop.
    ///
    /// # Errors
    /// Returns `KeyError` when the variable is unset, the encoding is
    /// invalid or the key file is world-readable.
    pub fn resolve(&self) -> Result<ResolvedKey, KeyError> {
        match self {
            KeySource::Agent => Ok(ResolvedKey::Agent),
            KeySource::Path(path) => {
                ensure_owner_only(path)?;
                Ok(ResolvedKey::Path(path.clone()))
            }
            KeySource::Env(variable) => {
                let encoded = std::env::var(variable)
                    .map_err(|_| KeyError::EnvNotSet(variable.clone()))?;
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|_| KeyError::InvalidBase64)?;

                Ok(ResolvedKey::Temp(materialize(&decoded)?))
            }
        }
    }
}

/// A key location the SSH client can use
#[derive(Debug)]
pub enum ResolvedKey {
    /// Key file on disk
    Path(PathBuf),
    /// Running SSH agent
    Agent,
    /// Temp file holding a decoded environment key; removed on drop
    Temp(PathBuf),
}

impl ResolvedKey {
    /// Path to load the key from, `None` when the agent is used
    #[must_use]
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ResolvedKey::Path(path) | ResolvedKey::Temp(path) => Some(path),
            ResolvedKey::Agent => None,
        }
    }

    /// Whether to authenticate through the SSH agent
    #[must_use]
    pub fn use_agent(&self) -> bool {
        matches!(self, ResolvedKey::Agent)
    }
}

impl Drop for ResolvedKey {
    fn drop(&mut self) {
        if let ResolvedKey::Temp(path) = self
            && let Err(error) = std::fs::remove_file(&path)
        {
            warn!(path = %path.display(), error = %error, "failed to remove temp key");
        }
    }
}

/// Group and other permission bits must be clear
fn ensure_owner_only(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();
    if mode & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

fn materialize(key: &[u8]) -> Result<PathBuf, KeyError> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = std::env::temp_dir().join(format!("berth_ssh_key_{}", std::process::id()));

    let mut file = std::fs::File::create(&path)?;
    file.write_all(key)?;

    let mut permissions = file.metadata()?.permissions();
    permissions.set_mode(0o600);
    std::fs::set_permissions(&path, permissions)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_resolves_without_path() {
        let resolved = KeySource::Agent.resolve().unwrap();
        assert!(resolved.use_agent());
        assert!(resolved.path().is_none());
    }

    #[test]
    fn test_unset_env_variable_is_reported() {
        let result = KeySource::Env("BERTH_TEST_KEY_UNSET".to_string()).resolve();
        assert!(matches!(result, Err(KeyError::EnvNotSet(_))));
    }

    #[test]
    fn test_env_key_roundtrip() {
        // Safety: test-local variable name, no concurrent readers.
        unsafe {
            std::env::set_var(
                "BERTH_TEST_KEY_B64",
                base64::engine::general_purpose::STANDARD.encode("fake key material"),
            );
        }

        let resolved = KeySource::Env("BERTH_TEST_KEY_B64".to_string())
            .resolve()
            .unwrap();
        let path = resolved.path().unwrap().clone();

        let content = std::fs::read(&path).unwrap();
        assert_eq!(content, b"fake key material");

        drop(resolved);
        assert!(!path.exists());
    }
}
