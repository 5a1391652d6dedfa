use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::OnceLock,
    time::Duration,
};

use regex::Regex;
use tokio::process::Command;

use crate::{agent::AgentError, console::ConsoleReporter};

pub const DEFAULT_SCRATCH_DIR: &str = "/app/scripts";

/// What a script printed, plus the failure message if it did not exit cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub stdout: String,
    pub error: Option<String>,
}

impl ScriptOutput {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Writes model-generated shell scripts to a scratch directory and runs them
/// with `bash`. Scripts are not sandboxed.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    scratch_dir: PathBuf,
    timeout: Duration,
    reporter: ConsoleReporter,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            timeout: Duration::from_secs(60),
            reporter: ConsoleReporter::default(),
        }
    }
}

impl ScriptExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_reporter(mut self, reporter: ConsoleReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn script_path(&self, file_name: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}.sh", file_name))
    }

    /// Write `code` to `<scratch_dir>/<file_name>.sh` and run it.
    ///
    /// Only a failure to write the script is an error; a failing or hanging
    /// script is reported through [`ScriptOutput::error`].
    pub async fn execute(&self, code: &str, file_name: &str) -> Result<ScriptOutput, AgentError> {
        let path = self.script_path(file_name);
        self.reporter.executing(code);
        self.write_script(&path, code).await?;

        let run = Command::new("bash")
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                if output.status.success() {
                    ScriptOutput {
                        stdout,
                        error: None,
                    }
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    ScriptOutput {
                        stdout,
                        error: Some(format!(
                            "Command 'bash {}' returned non-zero exit status {}. {}",
                            path.display(),
                            output.status.code().unwrap_or(-1),
                            stderr.trim()
                        )),
                    }
                }
            }
            Ok(Err(e)) => ScriptOutput {
                stdout: String::new(),
                error: Some(format!("Failed to run bash: {}", e)),
            },
            Err(_) => ScriptOutput {
                stdout: String::new(),
                error: Some(format!(
                    "Command 'bash {}' timed out after {} seconds",
                    path.display(),
                    self.timeout.as_secs_f64()
                )),
            },
        };

        match &output.error {
            None => self.reporter.script_output(&output.stdout),
            Some(error) => {
                log::warn!("Script {} failed: {}", path.display(), error);
                self.reporter.failure(error);
            }
        }
        Ok(output)
    }

    async fn write_script(&self, path: &Path, code: &str) -> Result<(), AgentError> {
        let write_error =
            |e: std::io::Error| AgentError::ScriptExecutionError(format!("{}: {}", path.display(), e));

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(write_error)?;
        tokio::fs::write(path, code).await.map_err(write_error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))
                .await
                .map_err(write_error)?;
        }
        Ok(())
    }
}

fn code_block_regex() -> &'static Regex {
    static CODE_BLOCK: OnceLock<Regex> = OnceLock::new();
    CODE_BLOCK.get_or_init(|| {
        Regex::new(r"(?s)```(?:(?i:bash|shell|sh|zsh)[ \t]*\n)?(.*?)```")
            .expect("Invalid code block regex")
    })
}

/// Inner text of the first fenced code block. A shell language tag on the
/// opening fence is dropped; any other first line is kept.
pub fn extract_code_block(reply: &str) -> Option<String> {
    code_block_regex()
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(dir: &Path) -> ScriptExecutor {
        ScriptExecutor::new()
            .with_scratch_dir(dir)
            .with_reporter(ConsoleReporter::quiet())
    }

    #[test]
    fn test_extract_code_block() {
        let reply = "Run this:\n```bash\necho hi\n```\nand then\n```\nls\n```";
        assert_eq!(extract_code_block(reply), Some("echo hi\n".to_string()));
        assert_eq!(extract_code_block("```uname -a```"), Some("uname -a".to_string()));
        assert_eq!(extract_code_block("no code here"), None);
    }

    #[test]
    fn test_extract_code_block_keeps_first_command() {
        assert_eq!(
            extract_code_block("```pwd\nls -la\n```"),
            Some("pwd\nls -la\n".to_string())
        );
        assert_eq!(
            extract_code_block("```Shell\nls\n```"),
            Some("ls\n".to_string())
        );
        assert_eq!(
            extract_code_block("```python\nprint(1)\n```"),
            Some("python\nprint(1)\n".to_string())
        );
    }

    #[test]
    fn test_defaults() {
        let executor = ScriptExecutor::new();
        assert_eq!(executor.scratch_dir(), Path::new("/app/scripts"));
        assert_eq!(executor.script_path("temp"), PathBuf::from("/app/scripts/temp.sh"));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let dir = tempfile::tempdir().unwrap();
        let output = executor(dir.path())
            .execute("echo hello", "greet")
            .await
            .unwrap();

        assert_eq!(output.stdout, "hello\n");
        assert!(output.is_success());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join("greet.sh"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o777);
        }
    }

    #[tokio::test]
    async fn test_execute_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let output = executor(dir.path())
            .execute("echo partial\nexit 3", "fail")
            .await
            .unwrap();

        assert_eq!(output.stdout, "partial\n");
        let error = output.error.unwrap();
        assert!(error.contains("exit status 3"), "{}", error);
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let output = executor(dir.path())
            .with_timeout(Duration::from_millis(200))
            .execute("sleep 5", "slow")
            .await
            .unwrap();

        assert!(output.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_write_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();

        let err = executor(&blocker).execute("echo hi", "x").await.unwrap_err();
        assert!(matches!(err, AgentError::ScriptExecutionError(_)));
    }
}
