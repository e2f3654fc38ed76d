//! ClamAV command-line engine.
//!
//! This module provides an engine that runs the `clamscan` executable
//! against the file and classifies its exit status and summary output.
//!
//! # Requirements
//!
//! - `clamscan` (or a compatible command) on `PATH`, or an absolute path in
//!   the configuration
//!
//! # Classification
//!
//! - A summary line `Infected files: N` with `N >= 1` means Infected
//! - Exit status 0 means Clean
//! - Anything else is an engine failure

use crate::core::{Detection, Engine, EngineError, FileRef};

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const ENGINE_NAME: &str = "clamscan";
const INFECTED_MARKER: &str = "Infected files:";

/// Configuration for [`ClamscanEngine`].
#[derive(Debug, Clone)]
pub struct ClamscanConfig {
    /// Executable to run.
    pub command: String,

    /// Extra arguments placed before the file path.
    pub args: Vec<String>,

    /// Maximum run time before the process is killed.
    pub timeout: Duration,
}

impl Default for ClamscanConfig {
    fn default() -> Self {
        Self {
            command: ENGINE_NAME.to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ClamscanConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the executable.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Sets the extra arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Sets the process timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Local-process engine that shells out to `clamscan`.
///
/// # Example
///
/// ```rust,ignore
/// use scanwatch::engines::{ClamscanConfig, ClamscanEngine};
/// use std::time::Duration;
///
/// let engine = ClamscanEngine::new(
///     ClamscanConfig::new().with_timeout(Duration::from_secs(60)),
/// );
/// ```
#[derive(Debug)]
pub struct ClamscanEngine {
    config: ClamscanConfig,
}

impl ClamscanEngine {
    /// Creates a new engine with the given configuration.
    pub fn new(config: ClamscanConfig) -> Self {
        Self { config }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ClamscanConfig::default())
    }
}

#[async_trait]
impl Engine for ClamscanEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn detect(&self, file: &FileRef) -> Result<Detection, EngineError> {
        let child = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::unavailable(
                    ENGINE_NAME,
                    format!("failed to start '{}': {}", self.config.command, e),
                )
            })?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                EngineError::timeout(
                    ENGINE_NAME,
                    format!("process did not finish within {:?}", self.config.timeout),
                )
            })?
            .map_err(|e| EngineError::unavailable(ENGINE_NAME, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(
            file = %file.name(),
            status = ?output.status.code(),
            "clamscan finished"
        );

        classify(output.status.code(), &stdout, &stderr)
    }
}

/// Maps a finished `clamscan` run to a detection.
pub fn classify(
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<Detection, EngineError> {
    if let Some(count) = infected_count(stdout) {
        if count >= 1 {
            let threats = threat_names(stdout);
            let detail = if threats.is_empty() {
                format!("{} infected file(s)", count)
            } else {
                threats.join(", ")
            };
            return Ok(Detection::infected(detail));
        }
    }

    match exit_code {
        Some(0) => Ok(Detection::clean("OK")),
        Some(1) => Err(EngineError::parse(
            ENGINE_NAME,
            "exit status 1 without an infected-files summary",
        )),
        Some(code) => Err(EngineError::unavailable(
            ENGINE_NAME,
            format!("exit status {}: {}", code, last_line(stderr)),
        )),
        None => Err(EngineError::unavailable(
            ENGINE_NAME,
            "process terminated by signal",
        )),
    }
}

fn infected_count(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix(INFECTED_MARKER))
        .and_then(|rest| rest.trim().parse().ok())
}

/// Extracts names from lines like `/tmp/x: Eicar-Test-Signature FOUND`.
fn threat_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_suffix("FOUND"))
        .filter_map(|line| line.rsplit_once(": ").map(|(_, name)| name.trim().to_string()))
        .filter(|name| !name.is_empty())
        .collect()
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no diagnostic output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EngineErrorKind, EngineVerdict};

    const INFECTED_OUTPUT: &str = "\
/tmp/scanwatch-x-eicar.com: Win.Test.EICAR_HDB-1 FOUND

----------- SCAN SUMMARY -----------
Known viruses: 8698245
Scanned files: 1
Infected files: 1
Time: 9.512 sec (0 m 9 s)
";

    const CLEAN_OUTPUT: &str = "\
/tmp/scanwatch-x-report.pdf: OK

----------- SCAN SUMMARY -----------
Scanned files: 1
Infected files: 0
";

    #[test]
    fn test_classify_infected() {
        let detection = classify(Some(1), INFECTED_OUTPUT, "").unwrap();
        assert_eq!(detection, Detection::infected("Win.Test.EICAR_HDB-1"));
    }

    #[test]
    fn test_classify_clean() {
        let detection = classify(Some(0), CLEAN_OUTPUT, "").unwrap();
        assert_eq!(detection, Detection::clean("OK"));
    }

    #[test]
    fn test_classify_error_exit() {
        let err = classify(Some(2), "", "ERROR: Can't open file\n").unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Unavailable);
        assert!(err.to_string().contains("Can't open file"));
    }

    #[test]
    fn test_classify_exit_one_without_marker() {
        let err = classify(Some(1), "garbage", "").unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Parse);
    }

    #[test]
    fn test_infected_count_without_names() {
        let detection = classify(Some(1), "Infected files: 3\n", "").unwrap();
        assert_eq!(detection, Detection::infected("3 infected file(s)"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = FileRef::from_upload_in(dir.path(), "a.txt", b"hello").unwrap();
        let engine = ClamscanEngine::new(
            ClamscanConfig::new().with_command("/nonexistent/scanwatch-clamscan"),
        );

        let result = engine.scan(&file).await;
        assert_eq!(result.verdict, EngineVerdict::Error);
        assert_eq!(result.error_kind, Some(EngineErrorKind::Unavailable));
    }
}
