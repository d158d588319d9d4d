//! Local command execution using `tokio::process`

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::credential::Credential;
use crate::error::ExecError;
use crate::result::CommandResult;
use crate::sudo::{SudoOptions, resolve_password, strip_sudo_prompt, sudo_command};
use crate::traits::Executor;

/// Executes commands on the calling machine as child processes.
///
/// The command line is tokenized with POSIX quoting rules and the child
/// is spawned directly from the argv list; no shell ever re-interprets
/// the arguments.
#[derive(Debug, Default)]
pub struct LocalExecutor {
    credential: Option<Credential>,
}

impl LocalExecutor {
    /// Create a new local executor
    #[must_use]
    pub fn new(credential: Option<Credential>) -> Self {
        Self { credential }
    }

    fn split(cmd: &str) -> Result<Vec<String>, ExecError> {
        let argv =
            shell_words::split(cmd).map_err(|e| ExecError::SpawnError(e.to_string()))?;
        if argv.is_empty() {
            return Err(ExecError::SpawnError("empty command".to_string()));
        }
        Ok(argv)
    }

    #[instrument(skip(self, stdin_line), level = "debug")]
    async fn execute(
        &self,
        cmd: &str,
        stdin_line: Option<&str>,
    ) -> Result<CommandResult, ExecError> {
        let argv = Self::split(cmd)?;

        debug!(command = %cmd, "executing local command");

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(if stdin_line.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecError::CommandNotFound(argv[0].clone())
            } else {
                ExecError::SpawnError(e.to_string())
            }
        })?;

        // Written immediately after launch; the pipe closes when the
        // handle drops so the child never waits on stdin.
        if let Some(line) = stdin_line
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(format!("{line}\n").as_bytes())
                .await
                .map_err(|e| ExecError::Io(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let result = CommandResult::from_raw(exit_code, &output.stdout, &output.stderr);

        debug!(command = %cmd, exit_code, "command completed");

        Ok(result)
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    #[instrument(skip(self), level = "debug")]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.execute(cmd, None).await
    }

    #[instrument(skip(self, opts), level = "debug")]
    async fn sudo(&self, cmd: &str, opts: &SudoOptions) -> Result<CommandResult, ExecError> {
        let cmd = sudo_command(cmd, opts);
        let session = self.credential.as_ref().and_then(Credential::password);
        let password = resolve_password(opts, session);

        let mut result = self.execute(&cmd, password).await?;
        strip_sudo_prompt(&mut result.stderr);
        Ok(result)
    }

    #[instrument(skip(self), level = "debug")]
    async fn upload(&self, src: &Path, dest: &str) -> Result<(), ExecError> {
        tokio::fs::copy(src, dest)
            .await
            .map(|_| ())
            .map_err(|e| ExecError::Io(e.to_string()))
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_success() {
        let executor = LocalExecutor::default();
        let result = executor.run("echo hello").await.unwrap();

        assert!(result.success());
        assert_eq!(result.stdout, vec!["hello"]);
    }

    #[tokio::test]
    async fn run_preserves_quoted_arguments() {
        let executor = LocalExecutor::default();
        let result = executor.run("echo 'hello world' second").await.unwrap();

        assert_eq!(result.stdout, vec!["hello world second"]);
    }

    #[tokio::test]
    async fn run_nonzero_exit() {
        let executor = LocalExecutor::default();
        let result = executor.run("sh -c 'exit 42'").await.unwrap();

        assert!(!result.success());
        assert_eq!(result.exit_code, 42);
    }

    #[tokio::test]
    async fn run_captures_stderr() {
        let executor = LocalExecutor::default();
        let result = executor.run("sh -c 'echo oops >&2'").await.unwrap();

        assert!(result.success());
        assert_eq!(result.stderr, vec!["oops"]);
    }

    #[tokio::test]
    async fn unresolvable_executable_is_command_not_found() {
        let executor = LocalExecutor::default();
        let err = executor
            .run("definitely-not-a-command --version")
            .await
            .unwrap_err();

        match err {
            ExecError::CommandNotFound(name) => {
                assert_eq!(name, "definitely-not-a-command");
            }
            other => panic!("expected CommandNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn arguments_are_not_shell_interpreted() {
        let executor = LocalExecutor::default();
        // A shell would expand this; direct spawn must not.
        let result = executor.run("echo '$(touch /tmp/pwned)'").await.unwrap();

        assert_eq!(result.stdout, vec!["$(touch /tmp/pwned)"]);
    }
}
