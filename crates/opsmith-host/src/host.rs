//! The host facade

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use opsmith_exec::credential::Credential;
use opsmith_exec::error::ExecError;
use opsmith_exec::local::LocalExecutor;
use opsmith_exec::result::CommandResult;
use opsmith_exec::ssh::SshExecutor;
use opsmith_exec::sudo::SudoOptions;
use opsmith_exec::traits::Executor;

use crate::error::HostError;
use crate::password;

/// Options for [`Host::useradd`]
#[derive(Debug, Clone)]
pub struct UseraddOptions {
    /// Password for the new account. When unset, a random one is
    /// generated and returned to the caller.
    pub password: Option<String>,
    /// Create the home directory (`useradd -m`)
    pub create_home: bool,
}

impl Default for UseraddOptions {
    fn default() -> Self {
        Self {
            password: None,
            create_home: true,
        }
    }
}

/// Options for [`Host::mktemp`]
#[derive(Debug, Clone, Default)]
pub struct MktempOptions {
    /// Create a directory instead of a file
    pub directory: bool,
    /// Parent directory for the temporary path (`mktemp -p`)
    pub tmpdir: Option<String>,
    /// Run under sudo
    pub elevate: bool,
}

/// A permission change for [`Host::set_permissions`]
#[derive(Debug, Clone)]
pub enum PermissionChange {
    /// Single chmod of the path itself
    Mode(String),
    /// Recursive change with independent directory and file modes
    Recursive {
        /// Mode applied to directories
        dir_mode: String,
        /// Mode applied to regular files
        file_mode: String,
    },
}

/// A machine, local or remote, bound to exactly one executor.
///
/// The binding is fixed at construction and never rebound; operating on
/// a different machine means constructing a new `Host`. The facade does
/// no internal locking: simultaneous calls on one `Host` must be
/// serialized by the caller.
pub struct Host {
    user: String,
    addr: Option<String>,
    executor: Box<dyn Executor>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("user", &self.user)
            .field("addr", &self.addr)
            .field("backend", &self.executor.backend())
            .finish()
    }
}

impl Host {
    /// Bind to the calling machine
    #[must_use]
    pub fn local(user: impl Into<String>, credential: Option<Credential>) -> Self {
        Self {
            user: user.into(),
            addr: None,
            executor: Box::new(LocalExecutor::new(credential)),
        }
    }

    /// Bind to a remote machine over SSH
    #[must_use]
    pub fn remote(
        addr: impl Into<String>,
        user: impl Into<String>,
        credential: Option<Credential>,
    ) -> Self {
        let addr = addr.into();
        let user = user.into();
        let executor = Box::new(SshExecutor::new(addr.clone(), user.clone(), credential));
        Self {
            user,
            addr: Some(addr),
            executor,
        }
    }

    /// Bind to a caller-supplied executor
    #[must_use]
    pub fn with_executor(
        user: impl Into<String>,
        addr: Option<String>,
        executor: Box<dyn Executor>,
    ) -> Self {
        Self {
            user: user.into(),
            addr,
            executor,
        }
    }

    /// The bound user name
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The bound address; `None` means the calling machine
    #[must_use]
    pub fn addr(&self) -> Option<&str> {
        self.addr.as_deref()
    }

    /// Whether this host is the calling machine
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.addr.is_none()
    }

    /// Run a command as the bound user
    ///
    /// # Errors
    /// Propagates execution-layer errors, including `CommandNotFound`
    /// for an unresolvable executable.
    pub async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.executor.run(cmd).await
    }

    /// Run a command under sudo
    ///
    /// # Errors
    /// Propagates execution-layer errors. A wrong or missing password is
    /// sudo's own nonzero exit code, not an error.
    pub async fn sudo(&self, cmd: &str, opts: &SudoOptions) -> Result<CommandResult, ExecError> {
        self.executor.sudo(cmd, opts).await
    }

    async fn call(&self, cmd: &str, elevate: bool) -> Result<CommandResult, ExecError> {
        if elevate {
            self.sudo(cmd, &SudoOptions::default()).await
        } else {
            self.run(cmd).await
        }
    }

    /// Check if `path` exists and is a directory.
    ///
    /// # Errors
    /// Transport and execution errors propagate; they are never
    /// downgraded to `false`.
    pub async fn directory_exists(&self, path: &str) -> Result<bool, HostError> {
        let cmd = format!("test -d {}", shell_words::quote(path));
        Ok(self.run(&cmd).await?.success())
    }

    /// Check if `path` exists and is a regular file.
    ///
    /// # Errors
    /// Transport and execution errors propagate; they are never
    /// downgraded to `false`.
    pub async fn file_exists(&self, path: &str) -> Result<bool, HostError> {
        let cmd = format!("test -f {}", shell_words::quote(path));
        Ok(self.run(&cmd).await?.success())
    }

    /// Name of the user commands run as.
    ///
    /// Empty output yields the empty string, never an error.
    pub async fn whoami(&self) -> Result<String, HostError> {
        let result = self.run("whoami").await?;
        Ok(result.first_stdout().to_string())
    }

    /// Name of the user sudo'd commands run as (normally `root`).
    pub async fn whoami_sudo(&self) -> Result<String, HostError> {
        let result = self.sudo("whoami", &SudoOptions::default()).await?;
        Ok(result.first_stdout().to_string())
    }

    /// Check if a user account exists.
    ///
    /// Matches the account list on an exact `name:` prefix, so `foo`
    /// never matches an account named `foobar`.
    ///
    /// # Errors
    /// Transport and execution errors propagate.
    pub async fn user_exists(&self, user: &str) -> Result<bool, HostError> {
        let result = self.run("cat /etc/passwd").await?;
        let needle = format!("{user}:");
        Ok(result.stdout.iter().any(|line| line.starts_with(&needle)))
    }

    /// Create a user account.
    ///
    /// The password is never sent in plaintext: a freshly salted
    /// SHA-512-crypt hash is passed to `useradd -p`. Returns the
    /// generated password when none was supplied.
    ///
    /// # Errors
    /// `UserExists` if the account is already present (checked before
    /// any mutating command); `Exec(CommandFailed)` on nonzero exit.
    #[instrument(skip(self, opts))]
    pub async fn useradd(
        &self,
        user: &str,
        opts: &UseraddOptions,
    ) -> Result<Option<String>, HostError> {
        if self.user_exists(user).await? {
            return Err(HostError::UserExists(user.to_string()));
        }

        let (password, generated) = match &opts.password {
            Some(password) => (password.clone(), None),
            None => {
                let password = password::generate();
                (password.clone(), Some(password))
            }
        };
        let hash = password::crypt(&password)?;

        let mut cmd = String::from("useradd");
        if opts.create_home {
            cmd.push_str(" -m");
        }
        cmd.push_str(&format!(" -p {} {}", shell_words::quote(&hash), user));

        ensure_success(self.sudo(&cmd, &SudoOptions::default()).await?)?;

        info!(user = %user, "user created");
        Ok(generated)
    }

    /// Remove a user account and its home directory.
    ///
    /// # Errors
    /// `NoSuchUser` if the account is absent (checked before any
    /// mutating command); `Exec(CommandFailed)` on nonzero exit.
    #[instrument(skip(self))]
    pub async fn userdel(&self, user: &str) -> Result<(), HostError> {
        if !self.user_exists(user).await? {
            return Err(HostError::NoSuchUser(user.to_string()));
        }

        let cmd = format!("userdel -r {user}");
        ensure_success(self.sudo(&cmd, &SudoOptions::default()).await?)?;

        info!(user = %user, "user removed");
        Ok(())
    }

    /// Create a directory (and parents), returning the exit code.
    pub async fn mkdir(&self, path: &str) -> Result<i32, HostError> {
        let cmd = format!("mkdir -p {}", shell_words::quote(path));
        Ok(self.run(&cmd).await?.exit_code)
    }

    /// Remove a directory, returning the exit code.
    ///
    /// `recursive` switches from `rmdir` to a forced recursive removal.
    pub async fn rmdir(&self, path: &str, recursive: bool) -> Result<i32, HostError> {
        let quoted = shell_words::quote(path);
        let cmd = if recursive {
            format!("rm -rf {quoted}")
        } else {
            format!("rmdir {quoted}")
        };
        Ok(self.run(&cmd).await?.exit_code)
    }

    /// Read a file's content.
    ///
    /// Captured lines are rejoined with `\n`, which normalizes (and can
    /// lose) the exact trailing-newline state of the file.
    ///
    /// # Errors
    /// `Exec(CommandFailed)` when the file cannot be read.
    pub async fn read_file(&self, path: &str) -> Result<String, HostError> {
        let cmd = format!("cat {}", shell_words::quote(path));
        let result = ensure_success(self.run(&cmd).await?)?;
        Ok(result.stdout.join("\n"))
    }

    /// Write `content` to a file, replacing it.
    ///
    /// Goes through a quoted `sh -c 'printf … > path'` redirect so both
    /// backends behave identically.
    ///
    /// # Errors
    /// `Exec(CommandFailed)` when the redirect fails.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), HostError> {
        let script = format!(
            "printf '%s' {} > {}",
            shell_words::quote(content),
            shell_words::quote(path)
        );
        let cmd = format!("sh -c {}", shell_words::quote(&script));
        ensure_success(self.run(&cmd).await?)?;
        Ok(())
    }

    /// File mode of a path, octal (`644`) or human-readable
    /// (`-rw-r--r--`).
    ///
    /// # Errors
    /// `Exec(CommandFailed)` when stat fails.
    pub async fn permissions(&self, path: &str, human_readable: bool) -> Result<String, HostError> {
        let fmt = if human_readable { "%A" } else { "%a" };
        let cmd = format!("stat -c {fmt} {}", shell_words::quote(path));
        let result = ensure_success(self.run(&cmd).await?)?;
        Ok(result.first_stdout().to_string())
    }

    /// Apply a permission change; `true` only when every underlying
    /// chmod succeeded.
    ///
    /// # Errors
    /// Transport and execution errors propagate.
    #[instrument(skip(self, change))]
    pub async fn set_permissions(
        &self,
        path: &str,
        change: &PermissionChange,
        elevate: bool,
    ) -> Result<bool, HostError> {
        let quoted = shell_words::quote(path).into_owned();
        match change {
            PermissionChange::Mode(mode) => {
                let cmd = format!("chmod {mode} {quoted}");
                Ok(self.call(&cmd, elevate).await?.success())
            }
            PermissionChange::Recursive {
                dir_mode,
                file_mode,
            } => {
                let dirs = format!("find {quoted} -type d -exec chmod {dir_mode} {{}} +");
                let dirs_ok = self.call(&dirs, elevate).await?.success();

                let files = format!("find {quoted} -type f -exec chmod {file_mode} {{}} +");
                let files_ok = self.call(&files, elevate).await?.success();

                if !(dirs_ok && files_ok) {
                    warn!(path = %path, "recursive permission change incomplete");
                }
                Ok(dirs_ok && files_ok)
            }
        }
    }

    /// Create a temporary file or directory and return its path.
    ///
    /// # Errors
    /// `Exec(CommandFailed)` carrying captured stderr when mktemp fails.
    pub async fn mktemp(&self, opts: &MktempOptions) -> Result<String, HostError> {
        let mut cmd = String::from("mktemp");
        if opts.directory {
            cmd.push_str(" -d");
        }
        if let Some(tmpdir) = &opts.tmpdir {
            cmd.push_str(&format!(" -p {}", shell_words::quote(tmpdir)));
        }

        let result = ensure_success(self.call(&cmd, opts.elevate).await?)?;
        Ok(result.first_stdout().to_string())
    }

    /// SHA-512 digest of a file, as printed by `sha512sum`.
    ///
    /// # Errors
    /// `Exec(CommandFailed)` when the file cannot be hashed.
    pub async fn checksum(&self, path: &str, elevate: bool) -> Result<String, HostError> {
        let cmd = format!("sha512sum {}", shell_words::quote(path));
        let result = ensure_success(self.call(&cmd, elevate).await?)?;
        let digest = result
            .first_stdout()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        Ok(digest)
    }

    /// Value of the `ID=` field of `/etc/os-release`, or `None` when
    /// the file does not exist.
    ///
    /// # Errors
    /// Transport and execution errors propagate.
    pub async fn distro(&self) -> Result<Option<String>, HostError> {
        if !self.file_exists("/etc/os-release").await? {
            return Ok(None);
        }

        let result = self.run("cat /etc/os-release").await?;
        for line in &result.stdout {
            if let Some(value) = line.strip_prefix("ID=") {
                return Ok(Some(value.trim_matches('"').to_string()));
            }
        }
        debug!("os-release present but carries no ID field");
        Ok(None)
    }

    /// Kernel name as reported by `uname -s`.
    pub async fn uname(&self) -> Result<String, HostError> {
        let result = self.run("uname -s").await?;
        Ok(result.first_stdout().to_string())
    }

    pub(crate) async fn upload(&self, src: &Path, dest: &str) -> Result<(), ExecError> {
        self.executor.upload(src, dest).await
    }
}

/// Turn an unexpected nonzero exit into `CommandFailed` carrying the
/// captured stderr.
fn ensure_success(result: CommandResult) -> Result<CommandResult, ExecError> {
    if result.success() {
        Ok(result)
    } else {
        Err(ExecError::CommandFailed {
            exit_code: result.exit_code,
            stderr: result.stderr_joined(),
        })
    }
}
