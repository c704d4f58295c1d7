//! The current user as known to git

use serde::Serialize;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const UNKNOWN_USER: &str = "Unknown User";

const GIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub name: String,
    pub email: String,
}

impl Default for UserIdentity {
    fn default() -> Self {
        Self {
            name: UNKNOWN_USER.to_string(),
            email: String::new(),
        }
    }
}

/// Reads `user.name` and `user.email` from git config
///
/// A missing git binary, unset keys, a git call running past five seconds or
/// any other failure fall back to "Unknown User" with an empty email.
pub fn current_user() -> UserIdentity {
    let fallback = UserIdentity::default();
    UserIdentity {
        name: git_config("user.name").unwrap_or(fallback.name),
        email: git_config("user.email").unwrap_or(fallback.email),
    }
}

fn git_config(key: &str) -> Option<String> {
    let mut command = Command::new("git");
    command.args(["config", key]);
    let output = output_within(command, GIT_TIMEOUT)?;
    if !output.status.success() {
        tracing::debug!(key, "git config lookup failed");
        return None;
    }
    non_empty(&String::from_utf8_lossy(&output.stdout))
}

/// Runs `command` and collects its output, killing it once `timeout` passes
fn output_within(mut command: Command, timeout: Duration) -> Option<Output> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return child.wait_with_output().ok(),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "git did not answer in time");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Err(e) => {
                tracing::debug!(error = %e, "waiting for git failed");
                return None;
            }
        }
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_identity() {
        let user = UserIdentity::default();
        assert_eq!(user.name, "Unknown User");
        assert!(user.email.is_empty());
    }

    #[test]
    fn test_output_is_trimmed() {
        assert_eq!(non_empty("Jane Doe\n"), Some("Jane Doe".to_string()));
        assert_eq!(non_empty("  \n"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_command_is_abandoned() {
        let mut command = Command::new("sh");
        command.args(["-c", "sleep 5"]);
        let started = Instant::now();
        assert!(output_within(command, Duration::from_millis(100)).is_none());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_fast_command_output_is_collected() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo dhf"]);
        let output = output_within(command, Duration::from_secs(5)).unwrap();
        assert!(output.status.success());
        assert_eq!(non_empty(&String::from_utf8_lossy(&output.stdout)), Some("dhf".to_string()));
    }

    #[test]
    fn test_current_user_never_fails() {
        let user = current_user();
        assert!(!user.name.is_empty());
    }
}
