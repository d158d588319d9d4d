//! The executor trait

use std::path::Path;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;
use crate::sudo::SudoOptions;

/// A bound command execution backend.
///
/// Exactly one executor is attached to a host for the host's entire
/// lifetime. An executor is not safe for concurrent invocation: two
/// simultaneous calls on the same executor must be serialized by the
/// caller.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a command as the session user and capture its output.
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command under sudo, optionally as another user.
    ///
    /// A wrong or missing password surfaces as sudo's own nonzero exit
    /// code, never as a distinct error.
    async fn sudo(&self, cmd: &str, opts: &SudoOptions) -> Result<CommandResult, ExecError>;

    /// Copy a file from the calling machine to `dest` on the bound machine.
    async fn upload(&self, src: &Path, dest: &str) -> Result<(), ExecError>;

    /// Backend name for logging
    fn backend(&self) -> &'static str;
}
