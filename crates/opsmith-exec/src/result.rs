//! Result types for command execution

use serde::{Deserialize, Serialize};

/// Result of a single command invocation
///
/// Every execution call, on either backend, produces one of these.
/// Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub exit_code: i32,
    /// Captured stdout, split into lines
    pub stdout: Vec<String>,
    /// Captured stderr, split into lines
    pub stderr: Vec<String>,
}

impl CommandResult {
    /// Build a result from raw captured byte streams.
    ///
    /// Output is decoded as UTF-8 (lossily) and split into lines.
    #[must_use]
    pub fn from_raw(exit_code: i32, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            exit_code,
            stdout: split_lines(stdout),
            stderr: split_lines(stderr),
        }
    }

    /// Check if the command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// First stdout line, or the empty string if there was no output
    #[must_use]
    pub fn first_stdout(&self) -> &str {
        self.stdout.first().map_or("", String::as_str)
    }

    /// Stderr rejoined into one newline-separated string
    #[must_use]
    pub fn stderr_joined(&self) -> String {
        self.stderr.join("\n")
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_output_into_lines() {
        let result = CommandResult::from_raw(0, b"one\ntwo\n", b"");
        assert!(result.success());
        assert_eq!(result.stdout, vec!["one", "two"]);
        assert!(result.stderr.is_empty());
    }

    #[test]
    fn first_stdout_is_empty_without_output() {
        let result = CommandResult::from_raw(1, b"", b"boom\n");
        assert!(!result.success());
        assert_eq!(result.first_stdout(), "");
        assert_eq!(result.stderr_joined(), "boom");
    }

    #[test]
    fn carriage_returns_are_stripped() {
        let result = CommandResult::from_raw(0, b"a\r\nb\r\n", b"");
        assert_eq!(result.stdout, vec!["a", "b"]);
    }
}
