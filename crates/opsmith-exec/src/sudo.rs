//! Privilege escalation shared by both backends

/// Options for a sudo invocation
#[derive(Debug, Clone, Default)]
pub struct SudoOptions {
    /// Run as this user instead of root
    pub as_user: Option<String>,
    /// Password fed to sudo's stdin prompt. When unset, the executor's
    /// session credential is used; when that is also absent, nothing is
    /// written.
    pub password: Option<String>,
}

impl SudoOptions {
    /// Sudo as a specific user
    #[must_use]
    pub fn as_user(user: impl Into<String>) -> Self {
        Self {
            as_user: Some(user.into()),
            password: None,
        }
    }

    /// Set an explicit password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Rewrite `cmd` to run under sudo.
///
/// `-S` makes sudo read its password from stdin, which is where both
/// backends inject it.
pub(crate) fn sudo_command(cmd: &str, opts: &SudoOptions) -> String {
    match &opts.as_user {
        Some(user) => format!("sudo -S -u {user} {cmd}"),
        None => format!("sudo -S {cmd}"),
    }
}

/// Resolve the password to feed sudo: explicit option first, then the
/// session-level credential.
pub(crate) fn resolve_password<'a>(
    opts: &'a SudoOptions,
    session: Option<&'a str>,
) -> Option<&'a str> {
    opts.password.as_deref().or(session)
}

/// Drop the first stderr line if it is the sudo prompt echo.
pub(crate) fn strip_sudo_prompt(stderr: &mut Vec<String>) {
    if stderr.first().is_some_and(|line| line.starts_with("[sudo]")) {
        stderr.remove(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_plain_sudo() {
        let opts = SudoOptions::default();
        assert_eq!(sudo_command("whoami", &opts), "sudo -S whoami");
    }

    #[test]
    fn rewrites_sudo_as_user() {
        let opts = SudoOptions::as_user("postgres");
        assert_eq!(sudo_command("whoami", &opts), "sudo -S -u postgres whoami");
    }

    #[test]
    fn explicit_password_wins_over_session() {
        let opts = SudoOptions::default().with_password("explicit");
        assert_eq!(resolve_password(&opts, Some("session")), Some("explicit"));
    }

    #[test]
    fn session_password_is_the_fallback() {
        let opts = SudoOptions::default();
        assert_eq!(resolve_password(&opts, Some("session")), Some("session"));
        assert_eq!(resolve_password(&opts, None), None);
    }

    #[test]
    fn strips_only_the_prompt_echo() {
        let mut stderr = vec![
            "[sudo] password for carol: ".to_string(),
            "real error".to_string(),
        ];
        strip_sudo_prompt(&mut stderr);
        assert_eq!(stderr, vec!["real error"]);

        let mut stderr = vec!["real error".to_string()];
        strip_sudo_prompt(&mut stderr);
        assert_eq!(stderr, vec!["real error"]);
    }
}
