//! Verified file copy
//!
//! Moves a file from the calling machine to a bound host and commits it
//! to the final path only after the content hash has been independently
//! verified on both ends. An unverifiable transfer never reaches the
//! final path: it is abandoned at the temporary location.

use std::path::Path;

use sha2::{Digest, Sha512};
use tracing::{debug, info, instrument};

use opsmith_exec::error::ExecError;
use opsmith_exec::sudo::SudoOptions;

use crate::error::HostError;
use crate::host::{Host, MktempOptions};

/// Options for [`Host::copy`]
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Hash and promote the file under sudo (needed when the final
    /// destination is not writable by the session user)
    pub elevate: bool,
    /// Explicit sudo password; the session credential is the fallback
    pub password: Option<String>,
}

impl CopyOptions {
    fn sudo_options(&self) -> SudoOptions {
        SudoOptions {
            as_user: None,
            password: self.password.clone(),
        }
    }
}

impl Host {
    /// Copy a file from the calling machine to `dest` on this host,
    /// verifying integrity before the destination is committed.
    ///
    /// Protocol, in order: temporary path via `mktemp`; bulk transfer to
    /// the temporary path; SHA-512 digest of the source content; the
    /// equivalent hashing command against the temporary file on this
    /// host; byte-for-byte comparison; promotion to `dest`.
    ///
    /// # Errors
    /// `CopyFailed` for transport failures (underlying error attached)
    /// and for hash mismatches (no cause attached). After any error the
    /// final destination path is untouched.
    #[instrument(skip(self, opts), fields(dest = %dest))]
    pub async fn copy(&self, src: &Path, dest: &str, opts: &CopyOptions) -> Result<(), HostError> {
        let tmp = self
            .mktemp(&MktempOptions::default())
            .await
            .map_err(|e| match e {
                HostError::Exec(cause) => {
                    HostError::copy_failed("could not create temporary file", cause)
                }
                other => other,
            })?;

        self.upload(src, &tmp)
            .await
            .map_err(|cause| HostError::copy_failed("transfer failed", cause))?;

        let source_hash = hash_source(src).await?;

        let dest_hash = if opts.elevate {
            self.checksum_with(&tmp, &opts.sudo_options()).await
        } else {
            self.checksum(&tmp, false).await
        }
        .map_err(|e| match e {
            HostError::Exec(cause) => {
                HostError::copy_failed("could not hash transferred file", cause)
            }
            other => other,
        })?;

        if source_hash != dest_hash {
            debug!(%source_hash, %dest_hash, "hash mismatch, abandoning transfer");
            return Err(HostError::copy_rejected("checksum mismatch after transfer"));
        }

        let promote = format!(
            "cp {} {}",
            shell_words::quote(&tmp),
            shell_words::quote(dest)
        );
        let result = if opts.elevate {
            self.sudo(&promote, &opts.sudo_options()).await
        } else {
            self.run(&promote).await
        }
        .map_err(|cause| HostError::copy_failed("promotion failed", cause))?;

        if !result.success() {
            return Err(HostError::CopyFailed {
                reason: format!("promotion exited {}: {}", result.exit_code, result.stderr_joined()),
                cause: None,
            });
        }

        info!(src = %src.display(), dest = %dest, "verified copy committed");
        Ok(())
    }

    async fn checksum_with(&self, path: &str, opts: &SudoOptions) -> Result<String, HostError> {
        let cmd = format!("sha512sum {}", shell_words::quote(path));
        let result = self.sudo(&cmd, opts).await?;
        if !result.success() {
            return Err(ExecError::CommandFailed {
                exit_code: result.exit_code,
                stderr: result.stderr_joined(),
            }
            .into());
        }
        Ok(result
            .first_stdout()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string())
    }
}

/// SHA-512 digest of the source file's content, hex-encoded the way
/// `sha512sum` prints it.
async fn hash_source(src: &Path) -> Result<String, HostError> {
    let data = tokio::fs::read(src).await.map_err(|e| {
        HostError::copy_failed("could not read source file", ExecError::Io(e.to_string()))
    })?;

    let mut hasher = Sha512::new();
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_hash_matches_sha512sum_format() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"abc").unwrap();

        let hash = hash_source(file.path()).await.unwrap();
        // Well-known SHA-512 of "abc"
        assert!(hash.starts_with("ddaf35a193617aba"));
        assert_eq!(hash.len(), 128);
    }
}
