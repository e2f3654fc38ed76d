//! Submit-then-poll driver shared by the remote engines.
//!
//! A remote engine uploads the file, receives a job identifier and then
//! polls a status endpoint at a fixed interval until the job reaches a
//! terminal state or the [`PollPolicy`] budget runs out. Vendors only
//! implement [`RemoteProvider`]; [`RemoteEngine`] owns the loop.

use crate::core::{Detection, Engine, EngineError, FileRef, ScanError};

use async_trait::async_trait;
use secrecy::SecretString;
use std::fmt::Debug;
use std::time::Duration;

/// How often and how many times a remote job is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait before each poll.
    pub interval: Duration,

    /// Maximum number of polls before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 15,
        }
    }
}

impl PollPolicy {
    /// Creates a policy.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Sets the interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the maximum number of polls.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Returns the longest time the polling phase can take.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// State of a remote job after one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// The job has not finished yet.
    Pending,
    /// The job finished with a verdict.
    Done(Detection),
}

/// A vendor API that accepts a file and reports on it asynchronously.
#[async_trait]
pub trait RemoteProvider: Send + Sync + Debug {
    /// Returns the stable identifier of this provider.
    fn name(&self) -> &str;

    /// Uploads the file and returns the job identifier to poll.
    async fn submit(&self, file: &FileRef) -> Result<String, EngineError>;

    /// Checks the job once.
    async fn poll(&self, job_id: &str) -> Result<PollStatus, EngineError>;
}

/// Connection settings shared by the remote providers.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// API key (kept secret).
    pub api_key: SecretString,

    /// Base URL for the API.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Polling schedule.
    pub poll: PollPolicy,
}

impl RemoteConfig {
    /// Creates a configuration with a 60s request timeout and the default
    /// poll policy.
    pub fn new(api_key: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            timeout: Duration::from_secs(60),
            poll: PollPolicy::default(),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the poll policy.
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Returns the base URL without a trailing slash.
    pub fn endpoint(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ScanError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ScanError::configuration(format!("Failed to create HTTP client: {}", e)))
    }
}

/// Engine adapter that drives a [`RemoteProvider`] to a verdict.
#[derive(Debug)]
pub struct RemoteEngine<P> {
    provider: P,
    policy: PollPolicy,
}

impl<P: RemoteProvider> RemoteEngine<P> {
    /// Wraps a provider with a poll policy.
    pub fn new(provider: P, policy: PollPolicy) -> Self {
        Self { provider, policy }
    }

    /// Returns the poll policy.
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Returns the wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Rebuilds the engine around a modified provider.
    pub fn map_provider<Q, F>(self, f: F) -> RemoteEngine<Q>
    where
        F: FnOnce(P) -> Q,
    {
        RemoteEngine {
            provider: f(self.provider),
            policy: self.policy,
        }
    }
}

#[async_trait]
impl<P: RemoteProvider> Engine for RemoteEngine<P> {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn detect(&self, file: &FileRef) -> Result<Detection, EngineError> {
        let job_id = self.provider.submit(file).await?;
        tracing::debug!(
            engine = self.provider.name(),
            file = %file.name(),
            job_id = %job_id,
            "Remote job submitted"
        );

        for attempt in 1..=self.policy.max_attempts {
            tokio::time::sleep(self.policy.interval).await;

            match self.provider.poll(&job_id).await? {
                PollStatus::Done(detection) => return Ok(detection),
                PollStatus::Pending => {
                    tracing::trace!(
                        engine = self.provider.name(),
                        job_id = %job_id,
                        attempt = attempt,
                        max_attempts = self.policy.max_attempts,
                        "Remote job still pending"
                    );
                }
            }
        }

        Err(EngineError::timeout(
            self.provider.name(),
            format!("poll budget of {} attempts exhausted", self.policy.max_attempts),
        ))
    }
}

/// Classifies a transport failure.
pub(crate) fn transport_error(engine: &str, err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::timeout(engine, err.to_string())
    } else if err.is_decode() {
        EngineError::parse(engine, err.to_string())
    } else {
        EngineError::unavailable(engine, err.to_string())
    }
}

/// Turns a non-success HTTP status into an `Unavailable` error.
pub(crate) fn ensure_success(
    engine: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(EngineError::unavailable(
            engine,
            format!("API error: {}", status),
        ))
    }
}

/// Reads a JSON body, mapping decode failures to `Parse`.
pub(crate) async fn json_body(
    engine: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, EngineError> {
    response
        .json()
        .await
        .map_err(|e| EngineError::parse(engine, e.to_string()))
}

/// Reads the file for upload, mapping I/O failures to `Unavailable`.
pub(crate) async fn read_upload(engine: &str, file: &FileRef) -> Result<Vec<u8>, EngineError> {
    file.read()
        .await
        .map_err(|e| EngineError::unavailable(engine, format!("cannot read file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    #[derive(Debug)]
    struct ScriptedProvider {
        pending_polls: u32,
        polls: AtomicU32,
        fail_submit: bool,
    }

    impl ScriptedProvider {
        fn new(pending_polls: u32) -> Self {
            Self {
                pending_polls,
                polls: AtomicU32::new(0),
                fail_submit: false,
            }
        }
    }

    #[async_trait]
    impl RemoteProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn submit(&self, _file: &FileRef) -> Result<String, EngineError> {
            if self.fail_submit {
                return Err(EngineError::unavailable("scripted", "connection refused"));
            }
            Ok("job-1".to_string())
        }

        async fn poll(&self, job_id: &str) -> Result<PollStatus, EngineError> {
            assert_eq!(job_id, "job-1");
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.pending_polls {
                Ok(PollStatus::Done(Detection::infected("3 malicious")))
            } else {
                Ok(PollStatus::Pending)
            }
        }
    }

    fn sample(dir: &TempDir) -> FileRef {
        FileRef::from_upload_in(dir.path(), "sample.exe", b"MZ").unwrap()
    }

    #[test]
    fn test_poll_policy_budget() {
        let policy = PollPolicy::new(Duration::from_secs(2), 15);
        assert_eq!(policy.budget(), Duration::from_secs(30));
        assert_eq!(PollPolicy::new(Duration::from_secs(1), 0).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_state_within_budget() {
        let dir = TempDir::new().unwrap();
        let engine = RemoteEngine::new(
            ScriptedProvider::new(2),
            PollPolicy::new(Duration::from_secs(5), 15),
        );

        let result = engine.scan(&sample(&dir)).await;
        assert!(result.is_infected());
        assert_eq!(engine.provider().polls.load(Ordering::SeqCst), 3);
        assert!(result.latency >= Duration::from_secs(15));
        assert!(result.latency < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_is_timeout() {
        let dir = TempDir::new().unwrap();
        let engine = RemoteEngine::new(
            ScriptedProvider::new(u32::MAX),
            PollPolicy::new(Duration::from_secs(2), 15),
        );

        let result = engine.scan(&sample(&dir)).await;
        assert!(result.is_error());
        assert_eq!(result.error_kind, Some(EngineErrorKind::Timeout));
        assert_eq!(engine.provider().polls.load(Ordering::SeqCst), 15);
        assert!(result.detail.contains("15 attempts"));
    }

    #[tokio::test]
    async fn test_submit_failure_skips_polling() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider {
            fail_submit: true,
            ..ScriptedProvider::new(0)
        };
        let engine = RemoteEngine::new(provider, PollPolicy::default());

        let result = engine.scan(&sample(&dir)).await;
        assert_eq!(result.error_kind, Some(EngineErrorKind::Unavailable));
        assert_eq!(engine.provider().polls.load(Ordering::SeqCst), 0);
    }
}
