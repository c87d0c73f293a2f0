//! Static site generator adapter.
//!
//! Runs the configured generator (`hugo` in the site directory by default, or
//! e.g. `sigal build src _build`) as a subprocess. Only the exit status
//! matters; output is captured for the error message.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::SiteSettings;

/// Errors from a site rebuild
#[derive(Debug, Error)]
pub enum RegenerationError {
    #[error("Failed to spawn site generator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Site generator '{program}' failed with exit code {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Site generator '{program}' timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("Failed to wait for site generator '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Rebuilds the published site
#[async_trait]
pub trait SiteGenerator: Send + Sync {
    /// Human-readable generator name
    fn name(&self) -> &str;

    /// Rebuild the whole site
    async fn regenerate(&self) -> Result<(), RegenerationError>;
}

/// Site generator run as a subprocess
#[derive(Debug, Clone)]
pub struct CommandSiteGenerator {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl CommandSiteGenerator {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
            timeout,
        }
    }

    /// Build from settings; the first command element is the program
    pub fn from_config(settings: &SiteSettings, timeout: Duration) -> Self {
        let mut command = settings.command.iter().cloned();
        let program = command.next().unwrap_or_else(|| "hugo".to_string());
        Self::new(program, command.collect(), &settings.working_dir, timeout)
    }
}

#[async_trait]
impl SiteGenerator for CommandSiteGenerator {
    fn name(&self) -> &str {
        &self.program
    }

    async fn regenerate(&self) -> Result<(), RegenerationError> {
        tracing::debug!(
            program = %self.program,
            args = ?self.args,
            cwd = %self.working_dir.display(),
            "Running site generator"
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RegenerationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Wait for completion with timeout
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RegenerationError::Timeout {
                program: self.program.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| RegenerationError::Wait {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RegenerationError::Failed {
                program: self.program.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_config_splits_program() {
        let settings = SiteSettings {
            command: vec![
                "sigal".to_string(),
                "build".to_string(),
                "src".to_string(),
                "_build".to_string(),
            ],
            working_dir: PathBuf::from("site"),
            manifest: None,
        };

        let generator = CommandSiteGenerator::from_config(&settings, Duration::from_secs(5));
        assert_eq!(generator.name(), "sigal");
        assert_eq!(generator.args, vec!["build", "src", "_build"]);
        assert_eq!(generator.working_dir, PathBuf::from("site"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides() {
        let temp = TempDir::new().unwrap();

        let ok = CommandSiteGenerator::new("true", vec![], temp.path(), Duration::from_secs(5));
        assert!(ok.regenerate().await.is_ok());

        let failing =
            CommandSiteGenerator::new("false", vec![], temp.path(), Duration::from_secs(5));
        assert!(matches!(
            failing.regenerate().await,
            Err(RegenerationError::Failed { code: 1, .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let temp = TempDir::new().unwrap();
        let slow = CommandSiteGenerator::new(
            "sleep",
            vec!["5".to_string()],
            temp.path(),
            Duration::from_millis(50),
        );

        assert!(matches!(
            slow.regenerate().await,
            Err(RegenerationError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let temp = TempDir::new().unwrap();
        let missing = CommandSiteGenerator::new(
            "/nonexistent/site-generator",
            vec![],
            temp.path(),
            Duration::from_secs(5),
        );

        assert!(matches!(
            missing.regenerate().await,
            Err(RegenerationError::Spawn { .. })
        ));
    }
}
