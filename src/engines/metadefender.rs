//! MetaDefender Cloud engine.
//!
//! The file body is posted raw to `POST /file` with `apikey` and `filename`
//! headers; the response carries a `data_id` that is polled at
//! `GET /file/{data_id}` until `scan_results.scan_all_result_a` leaves
//! `In Progress`.

use crate::core::{Detection, EngineError, FileRef, ScanError};
use crate::engines::remote::{
    ensure_success, json_body, read_upload, transport_error, PollStatus, RemoteConfig,
    RemoteEngine, RemoteProvider,
};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;

const ENGINE_NAME: &str = "metadefender";
const CLEAN_RESULT: &str = "No Threat Detected";
const IN_PROGRESS_RESULT: &str = "In Progress";

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.metadefender.com/v4";

/// MetaDefender provider.
#[derive(Debug)]
pub struct MetaDefenderProvider {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl MetaDefenderProvider {
    /// Creates a new provider with the given configuration.
    pub fn new(config: RemoteConfig) -> Result<Self, ScanError> {
        let client = config.http_client()?;
        Ok(Self { config, client })
    }

    /// Creates a ready-to-dispatch engine using the configured poll policy.
    pub fn engine(config: RemoteConfig) -> Result<RemoteEngine<Self>, ScanError> {
        let policy = config.poll;
        Ok(RemoteEngine::new(Self::new(config)?, policy))
    }
}

#[async_trait]
impl RemoteProvider for MetaDefenderProvider {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn submit(&self, file: &FileRef) -> Result<String, EngineError> {
        let data = read_upload(ENGINE_NAME, file).await?;

        let response = self
            .client
            .post(format!("{}/file", self.config.endpoint()))
            .header("apikey", self.config.api_key.expose_secret())
            .header("filename", file.name())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| transport_error(ENGINE_NAME, e))?;

        let body = json_body(ENGINE_NAME, ensure_success(ENGINE_NAME, response)?).await?;
        parse_submission(&body)
    }

    async fn poll(&self, job_id: &str) -> Result<PollStatus, EngineError> {
        let response = self
            .client
            .get(format!("{}/file/{}", self.config.endpoint(), job_id))
            .header("apikey", self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| transport_error(ENGINE_NAME, e))?;

        // The report endpoint answers 404 until the upload is indexed.
        if !response.status().is_success() {
            tracing::debug!(
                job_id = %job_id,
                status = %response.status(),
                "MetaDefender report not ready"
            );
            return Ok(PollStatus::Pending);
        }

        let body = json_body(ENGINE_NAME, response).await?;
        Ok(parse_report(&body))
    }
}

/// Extracts the `data_id` from an upload response.
pub fn parse_submission(body: &Value) -> Result<String, EngineError> {
    body.get("data_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::parse(ENGINE_NAME, "missing data_id in upload response"))
}

/// Interprets a file report.
///
/// A report without `scan_results.scan_all_result_a` is still being built
/// and counts as pending.
pub fn parse_report(body: &Value) -> PollStatus {
    match body
        .pointer("/scan_results/scan_all_result_a")
        .and_then(Value::as_str)
    {
        None | Some(IN_PROGRESS_RESULT) => PollStatus::Pending,
        Some(CLEAN_RESULT) => PollStatus::Done(Detection::clean(CLEAN_RESULT)),
        Some(other) => PollStatus::Done(Detection::infected(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_submission() {
        let body = json!({"data_id": "bzIwMDMxOEJ5Vk5aUjBBUklCeEJZZ3hhSjFrTFU", "status": "inqueue"});
        assert_eq!(
            parse_submission(&body).unwrap(),
            "bzIwMDMxOEJ5Vk5aUjBBUklCeEJZZ3hhSjFrTFU"
        );

        let err = parse_submission(&json!({"status": "inqueue"})).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Parse);
    }

    #[test]
    fn test_parse_report_states() {
        let pending = json!({"scan_results": {"scan_all_result_a": "In Progress", "progress_percentage": 40}});
        assert_eq!(parse_report(&pending), PollStatus::Pending);

        let not_indexed = json!({"file_info": {}});
        assert_eq!(parse_report(&not_indexed), PollStatus::Pending);

        let clean = json!({"scan_results": {"scan_all_result_a": "No Threat Detected"}});
        assert_eq!(
            parse_report(&clean),
            PollStatus::Done(Detection::clean("No Threat Detected"))
        );

        let infected = json!({"scan_results": {"scan_all_result_a": "Infected"}});
        assert_eq!(
            parse_report(&infected),
            PollStatus::Done(Detection::infected("Infected"))
        );
    }
}
