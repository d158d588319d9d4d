//! SSH command execution using the russh crate

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::credential::{Credential, validate_key_permissions};
use crate::error::ExecError;
use crate::result::CommandResult;
use crate::sudo::{SudoOptions, resolve_password, strip_sudo_prompt, sudo_command};
use crate::traits::Executor;

/// Delay between launching a remote sudo and writing the password.
///
/// The prompt's exact timing cannot be observed over an exec channel, so
/// ordering here is probabilistic rather than acknowledged.
const SUDO_SETTLE: Duration = Duration::from_millis(100);

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// SSH command executor
///
/// Holds one persistent session to the remote machine. The session is
/// authenticated once, on first use, and reused for every subsequent
/// call; a dropped transport surfaces as a failure on the next call and
/// recovery means constructing a new executor.
pub struct SshExecutor {
    addr: String,
    port: u16,
    user: String,
    credential: Option<Credential>,
    /// SSH session (established on first use)
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("addr", &self.addr)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Create a new SSH executor. No connection is made until the first
    /// call.
    #[must_use]
    pub fn new(
        addr: impl Into<String>,
        user: impl Into<String>,
        credential: Option<Credential>,
    ) -> Self {
        Self {
            addr: addr.into(),
            port: 22,
            user: user.into(),
            credential,
            session: Mutex::new(None),
        }
    }

    /// Set a custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connect and authenticate, if not already connected.
    #[instrument(skip(self), fields(host = %self.addr))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        info!(
            host = %self.addr,
            port = self.port,
            user = %self.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());
        let handler = SshClientHandler;

        let mut session = client::connect(config, (&self.addr[..], self.port), handler)
            .await
            .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        match &self.credential {
            Some(Credential::Password(password)) => {
                let auth_res = session
                    .authenticate_password(&self.user, password)
                    .await
                    .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

                if !auth_res.success() {
                    return Err(ExecError::AuthenticationFailed(
                        "password authentication failed".to_string(),
                    ));
                }
            }
            Some(Credential::Key { path, passphrase }) => {
                Self::authenticate_key(&mut session, &self.user, path, passphrase.as_deref())
                    .await?;
            }
            None => {
                // Passwordless identity: fall back to the default key files.
                let key_path = default_key_path().ok_or_else(|| {
                    ExecError::AuthenticationFailed(
                        "no credential and no default key file".to_string(),
                    )
                })?;
                Self::authenticate_key(&mut session, &self.user, &key_path, None).await?;
            }
        }

        info!(host = %self.addr, "SSH connected and authenticated");

        *session_lock = Some(session);
        Ok(())
    }

    async fn authenticate_key(
        session: &mut client::Handle<SshClientHandler>,
        user: &str,
        path: &Path,
        passphrase: Option<&str>,
    ) -> Result<(), ExecError> {
        validate_key_permissions(path)?;

        let key_pair =
            load_secret_key(path, passphrase).map_err(|e| ExecError::KeyError(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let auth_res = session
            .authenticate_publickey(
                user,
                PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
            )
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(
                "public key authentication failed".to_string(),
            ));
        }

        Ok(())
    }

    /// Execute the literal command string on the remote session.
    ///
    /// `stdin_line`, when present, is written to the channel after a
    /// short settle delay (sudo password injection).
    #[instrument(skip(self, cmd, stdin_line), fields(host = %self.addr))]
    async fn execute_remote(
        &self,
        cmd: &str,
        stdin_line: Option<&str>,
    ) -> Result<CommandResult, ExecError> {
        let mut session_lock = self.session.lock().await;
        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, "executing remote command");

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        if let Some(line) = stdin_line {
            tokio::time::sleep(SUDO_SETTLE).await;
            channel
                .data(format!("{line}\n").as_bytes())
                .await
                .map_err(|e| ExecError::Io(e.to_string()))?;
            channel
                .eof()
                .await
                .map_err(|e| ExecError::Io(e.to_string()))?;
        }

        let mut exit_code = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            let msg = channel.wait().await;

            match msg {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        // stderr
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = exit_status.cast_signed();
                }
                Some(ChannelMsg::Eof) | None => break,
                _ => {}
            }
        }

        debug!(command = %cmd, exit_code, "remote command completed");

        // Exit 127 is the only way an exec channel can signal an
        // unresolvable command.
        if exit_code == 127 {
            return Err(ExecError::CommandNotFound(first_token(cmd)));
        }

        Ok(CommandResult::from_raw(exit_code, &stdout, &stderr))
    }

    /// Tear down the session.
    ///
    /// # Errors
    /// Returns `ExecError::Io` if disconnection fails
    pub async fn disconnect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::Io(e.to_string()))?;
            info!(host = %self.addr, "SSH disconnected");
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for SshExecutor {
    #[instrument(skip(self), fields(host = %self.addr))]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.connect().await?;
        self.execute_remote(cmd, None).await
    }

    #[instrument(skip(self, opts), fields(host = %self.addr))]
    async fn sudo(&self, cmd: &str, opts: &SudoOptions) -> Result<CommandResult, ExecError> {
        self.connect().await?;

        let cmd = sudo_command(cmd, opts);
        let session = self.credential.as_ref().and_then(Credential::password);
        let password = resolve_password(opts, session);

        let mut result = self.execute_remote(&cmd, password).await?;
        strip_sudo_prompt(&mut result.stderr);
        Ok(result)
    }

    #[instrument(skip(self), fields(host = %self.addr))]
    async fn upload(&self, src: &Path, dest: &str) -> Result<(), ExecError> {
        self.connect().await?;

        let data = tokio::fs::read(src)
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let mut session_lock = self.session.lock().await;
        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let mut remote_file = sftp
            .create(dest)
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;
        remote_file
            .write_all(&data)
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;
        remote_file
            .shutdown()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        debug!(src = %src.display(), dest = %dest, bytes = data.len(), "uploaded file");

        sftp.close()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "ssh"
    }
}

/// First token of a command line, for `CommandNotFound` reporting.
fn first_token(cmd: &str) -> String {
    shell_words::split(cmd)
        .ok()
        .and_then(|argv| argv.into_iter().next())
        .unwrap_or_else(|| cmd.to_string())
}

fn default_key_path() -> Option<std::path::PathBuf> {
    let home = std::env::var_os("HOME")?;
    let ssh_dir = Path::new(&home).join(".ssh");

    ["id_ed25519", "id_rsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_token_respects_quoting() {
        assert_eq!(first_token("'my command' --flag"), "my command");
        assert_eq!(first_token("uptime"), "uptime");
    }

    // Connection-level behavior requires an SSH server.
    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn ssh_connection() {}
}
