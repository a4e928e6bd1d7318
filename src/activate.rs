//! Handing a chosen entry over to an external viewer.

use std::process::Stdio;

use parking_lot::Mutex;
use tokio::process::Command;
use tokio::runtime::Handle;

use crate::{Error, Result};

/// Receives the path of an entry the user chose to open.
pub trait Activator: Send + Sync {
    /// Open `path`. The path is passed through unmodified.
    ///
    /// # Errors
    ///
    /// Returns an error if the path could not be handed over.
    fn activate(&self, path: &str) -> Result<()>;
}

/// Runs a configured program with the entry path as its last argument.
///
/// The program is started detached; activation does not wait for it. A
/// task on the current Tokio runtime reaps it and logs a failed exit.
#[derive(Debug, Clone)]
pub struct CommandActivator {
    program: String,
    args: Vec<String>,
}

impl CommandActivator {
    /// Create an activator for `program` with leading `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated command line such as `"regedit /m"`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the command line is empty.
    pub fn parse(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::config("open command must not be empty"))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// Program to run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list for `path`.
    #[must_use]
    pub fn args_for(&self, path: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(path.to_string());
        args
    }
}

impl Activator for CommandActivator {
    fn activate(&self, path: &str) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| Error::Activation {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let mut child = Command::new(&self.program)
            .args(self.args_for(path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Activation {
                path: path.to_string(),
                reason: format!("failed to launch '{}': {e}", self.program),
            })?;

        tracing::info!(program = %self.program, path = %path, pid = child.id(), "Opened entry");

        let program = self.program.clone();
        runtime.spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::warn!(program = %program, code = ?status.code(), "Open command failed");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(program = %program, error = %e, "Open command lost"),
            }
        });
        Ok(())
    }
}

/// Logs activations and remembers the last path. Used when no open
/// command is configured.
#[derive(Debug, Default)]
pub struct LogActivator {
    last: Mutex<Option<String>>,
}

impl LogActivator {
    /// Create a logging activator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the most recent activation.
    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.last.lock().clone()
    }
}

impl Activator for LogActivator {
    fn activate(&self, path: &str) -> Result<()> {
        tracing::info!(path = %path, "Entry activated");
        *self.last.lock() = Some(path.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        let activator = CommandActivator::parse("regedit  /m").unwrap();
        assert_eq!(activator.program(), "regedit");
        assert_eq!(
            activator.args_for("HKEY_CURRENT_USER\\Software"),
            vec!["/m", "HKEY_CURRENT_USER\\Software"]
        );
    }

    #[test]
    fn test_parse_empty_command() {
        assert!(matches!(
            CommandActivator::parse("   "),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let activator = CommandActivator::new("regfind-no-such-program", Vec::new());
        let err = activator.activate("HKEY_USERS").unwrap_err();
        assert!(matches!(err, Error::Activation { ref path, .. } if path == "HKEY_USERS"));
    }

    #[test]
    fn test_command_needs_a_runtime() {
        let activator = CommandActivator::new("true", Vec::new());
        let err = activator.activate("HKEY_USERS").unwrap_err();
        assert!(matches!(err, Error::Activation { ref path, .. } if path == "HKEY_USERS"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runs_with_path_argument() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("opened");
        let activator = CommandActivator::new(
            "sh",
            vec![
                "-c".to_string(),
                format!("printf '%s' \"$1\" > '{}'", out.display()),
                "sh".to_string(),
            ],
        );

        activator.activate("HKEY_USERS\\S-1-5-18").unwrap();

        let written = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if let Ok(text) = tokio::fs::read_to_string(&out).await {
                    if !text.is_empty() {
                        return text;
                    }
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(written, "HKEY_USERS\\S-1-5-18");
    }

    #[test]
    fn test_log_activator_passes_path_through() {
        let activator = LogActivator::new();
        assert!(activator.last().is_none());
        activator.activate("HKEY_USERS\\S-1-5-18 \\x").unwrap();
        assert_eq!(activator.last().as_deref(), Some("HKEY_USERS\\S-1-5-18 \\x"));
    }
}
