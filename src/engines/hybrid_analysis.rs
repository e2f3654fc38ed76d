//! Hybrid Analysis (Falcon Sandbox) engine.
//!
//! Submission is a multipart `POST /submit/file` with an `environment_id`
//! field. The returned `job_id` is polled at `GET /report/{job}/state`; once
//! the state is `SUCCESS` the verdict is read from `GET /report/{job}/summary`.

use crate::core::{Detection, EngineError, FileRef, ScanError};
use crate::engines::remote::{
    ensure_success, json_body, read_upload, transport_error, PollStatus, RemoteConfig,
    RemoteEngine, RemoteProvider,
};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;

const ENGINE_NAME: &str = "hybrid_analysis";
const USER_AGENT: &str = "Falcon Sandbox";

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://www.hybrid-analysis.com/api/v2";

/// Sandbox environment used when none is configured (Windows 7 32-bit).
pub const DEFAULT_ENVIRONMENT_ID: u32 = 100;

/// Hybrid Analysis provider.
#[derive(Debug)]
pub struct HybridAnalysisProvider {
    config: RemoteConfig,
    environment_id: u32,
    client: reqwest::Client,
}

impl HybridAnalysisProvider {
    /// Creates a new provider with the given configuration.
    pub fn new(config: RemoteConfig) -> Result<Self, ScanError> {
        let client = config.http_client()?;
        Ok(Self {
            config,
            environment_id: DEFAULT_ENVIRONMENT_ID,
            client,
        })
    }

    /// Sets the sandbox environment.
    pub fn with_environment_id(mut self, environment_id: u32) -> Self {
        self.environment_id = environment_id;
        self
    }

    /// Creates a ready-to-dispatch engine using the configured poll policy.
    pub fn engine(config: RemoteConfig) -> Result<RemoteEngine<Self>, ScanError> {
        let policy = config.poll;
        Ok(RemoteEngine::new(Self::new(config)?, policy))
    }

    fn get(&self, path: String) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.config.endpoint(), path))
            .header("api-key", self.config.api_key.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
    }
}

#[async_trait]
impl RemoteProvider for HybridAnalysisProvider {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn submit(&self, file: &FileRef) -> Result<String, EngineError> {
        let data = read_upload(ENGINE_NAME, file).await?;
        let part = reqwest::multipart::Part::bytes(data).file_name(file.name().to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("environment_id", self.environment_id.to_string());

        let response = self
            .client
            .post(format!("{}/submit/file", self.config.endpoint()))
            .header("api-key", self.config.api_key.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(ENGINE_NAME, e))?;

        let body = json_body(ENGINE_NAME, ensure_success(ENGINE_NAME, response)?).await?;
        parse_submission(&body)
    }

    async fn poll(&self, job_id: &str) -> Result<PollStatus, EngineError> {
        let response = self
            .get(format!("/report/{}/state", job_id))
            .send()
            .await
            .map_err(|e| transport_error(ENGINE_NAME, e))?;
        let state = json_body(ENGINE_NAME, ensure_success(ENGINE_NAME, response)?).await?;

        match parse_state(&state)? {
            JobState::Running => Ok(PollStatus::Pending),
            JobState::Succeeded => {
                let response = self
                    .get(format!("/report/{}/summary", job_id))
                    .send()
                    .await
                    .map_err(|e| transport_error(ENGINE_NAME, e))?;
                let summary =
                    json_body(ENGINE_NAME, ensure_success(ENGINE_NAME, response)?).await?;
                parse_summary(&summary).map(PollStatus::Done)
            }
        }
    }
}

/// Sandbox job state after one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Queued or running.
    Running,
    /// The report is ready.
    Succeeded,
}

/// Extracts the job id from a submission response.
pub fn parse_submission(body: &Value) -> Result<String, EngineError> {
    let submitted = body
        .get("submission_id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !submitted {
        return Err(EngineError::parse(ENGINE_NAME, "missing submission_id"));
    }

    body.get("job_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::parse(ENGINE_NAME, "missing job_id"))
}

/// Interprets a `/state` response. `ERROR` and `FAILED` end the scan.
pub fn parse_state(body: &Value) -> Result<JobState, EngineError> {
    match body.get("state").and_then(Value::as_str) {
        Some("SUCCESS") => Ok(JobState::Succeeded),
        Some(state @ ("ERROR" | "FAILED")) => Err(EngineError::unavailable(
            ENGINE_NAME,
            format!("sandbox analysis ended in state {}", state),
        )),
        _ => Ok(JobState::Running),
    }
}

/// Maps the summary `verdict` field. `malicious` and `suspicious` are threats.
pub fn parse_summary(body: &Value) -> Result<Detection, EngineError> {
    let verdict = body
        .get("verdict")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::parse(ENGINE_NAME, "missing verdict in summary"))?;

    Ok(match verdict {
        "malicious" | "suspicious" => Detection::infected(verdict),
        other => Detection::clean(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_submission() {
        let body = json!({"job_id": "5f1b2c", "submission_id": "5f1b2d", "environment_id": 100, "sha256": "ab"});
        assert_eq!(parse_submission(&body).unwrap(), "5f1b2c");

        let no_submission = json!({"job_id": "5f1b2c", "submission_id": ""});
        assert_eq!(
            parse_submission(&no_submission).unwrap_err().kind(),
            EngineErrorKind::Parse
        );
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state(&json!({"state": "IN_QUEUE"})).unwrap(), JobState::Running);
        assert_eq!(parse_state(&json!({"state": "IN_PROGRESS"})).unwrap(), JobState::Running);
        assert_eq!(parse_state(&json!({"state": "SUCCESS"})).unwrap(), JobState::Succeeded);

        let err = parse_state(&json!({"state": "ERROR", "error": "sandbox crashed"})).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Unavailable);
        assert!(parse_state(&json!({"state": "FAILED"})).is_err());
    }

    #[test]
    fn test_parse_summary() {
        assert_eq!(
            parse_summary(&json!({"verdict": "suspicious", "threat_score": 55})).unwrap(),
            Detection::infected("suspicious")
        );
        assert_eq!(
            parse_summary(&json!({"verdict": "no specific threat"})).unwrap(),
            Detection::clean("no specific threat")
        );
        assert_eq!(
            parse_summary(&json!({"threat_score": 0})).unwrap_err().kind(),
            EngineErrorKind::Parse
        );
    }
}
