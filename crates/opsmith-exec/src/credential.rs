//! Session credentials

use std::path::{Path, PathBuf};

use crate::error::ExecError;

/// Authentication material for a session.
///
/// A host identity carries at most one of these; absence is legal
/// (agent-backed or passwordless auth).
#[derive(Debug, Clone)]
pub enum Credential {
    /// Password authentication. Also reused as the default sudo password.
    Password(String),
    /// Private key file authentication
    Key {
        /// Path to the private key file
        path: PathBuf,
        /// Passphrase protecting the key, if any
        passphrase: Option<String>,
    },
}

impl Credential {
    /// Key-file credential without a passphrase
    #[must_use]
    pub fn key(path: impl Into<PathBuf>) -> Self {
        Credential::Key {
            path: path.into(),
            passphrase: None,
        }
    }

    /// The password, if this credential carries one
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        match self {
            Credential::Password(password) => Some(password),
            Credential::Key { .. } => None,
        }
    }
}

/// Reject private key files readable by group or other.
pub(crate) fn validate_key_permissions(path: &Path) -> Result<(), ExecError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| ExecError::KeyError(e.to_string()))?;
    let mode = metadata.permissions().mode();

    if mode & 0o77 != 0 {
        return Err(ExecError::KeyError(format!(
            "key file permissions too open: {} (should be 600)",
            path.display()
        )));
    }

    Ok(())
}
