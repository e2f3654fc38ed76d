//! VirusTotal engine.
//!
//! This module provides a [`RemoteProvider`] for the VirusTotal v3 API.
//!
//! # Requirements
//!
//! - VirusTotal API key
//! - Network access to www.virustotal.com
//!
//! # API Usage
//!
//! 1. Upload the file with a multipart `POST /files`; the response carries
//!    the analysis id in `data.id`
//! 2. Poll `GET /analyses/{id}` until `data.attributes.status` is
//!    `completed`
//! 3. Read `data.attributes.stats.malicious`

use crate::core::{Detection, EngineError, FileRef, ScanError};
use crate::engines::remote::{
    ensure_success, json_body, read_upload, transport_error, PollStatus, RemoteConfig,
    RemoteEngine, RemoteProvider,
};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::Value;

const ENGINE_NAME: &str = "virustotal";

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://www.virustotal.com/api/v3";

/// VirusTotal provider.
///
/// # Example
///
/// ```rust,ignore
/// use scanwatch::engines::{RemoteConfig, VirusTotalProvider};
/// use scanwatch::engines::virustotal::DEFAULT_BASE_URL;
///
/// let config = RemoteConfig::new(api_key, DEFAULT_BASE_URL);
/// let engine = VirusTotalProvider::engine(config)?;
/// ```
#[derive(Debug)]
pub struct VirusTotalProvider {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl VirusTotalProvider {
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
impl RemoteProvider for VirusTotalProvider {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn submit(&self, file: &FileRef) -> Result<String, EngineError> {
        let data = read_upload(ENGINE_NAME, file).await?;
        let part = reqwest::multipart::Part::bytes(data).file_name(file.name().to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/files", self.config.endpoint()))
            .header("x-apikey", self.config.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(ENGINE_NAME, e))?;

        let body = json_body(ENGINE_NAME, ensure_success(ENGINE_NAME, response)?).await?;
        parse_submission(&body)
    }

    async fn poll(&self, job_id: &str) -> Result<PollStatus, EngineError> {
        let response = self
            .client
            .get(format!("{}/analyses/{}", self.config.endpoint(), job_id))
            .header("x-apikey", self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| transport_error(ENGINE_NAME, e))?;

        let body = json_body(ENGINE_NAME, ensure_success(ENGINE_NAME, response)?).await?;
        parse_analysis(&body)
    }
}

/// Extracts the analysis id from an upload response.
pub fn parse_submission(body: &Value) -> Result<String, EngineError> {
    body.pointer("/data/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::parse(ENGINE_NAME, "missing data.id in upload response"))
}

/// Interprets an analysis object.
pub fn parse_analysis(body: &Value) -> Result<PollStatus, EngineError> {
    let attributes = body
        .pointer("/data/attributes")
        .ok_or_else(|| EngineError::parse(ENGINE_NAME, "missing data.attributes"))?;

    let status = attributes
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::parse(ENGINE_NAME, "missing analysis status"))?;
    if status != "completed" {
        return Ok(PollStatus::Pending);
    }

    let stats = attributes
        .get("stats")
        .ok_or_else(|| EngineError::parse(ENGINE_NAME, "missing analysis stats"))?;
    let malicious = stats
        .get("malicious")
        .and_then(Value::as_u64)
        .ok_or_else(|| EngineError::parse(ENGINE_NAME, "missing stats.malicious"))?;
    let total: u64 = stats
        .as_object()
        .map(|m| m.values().filter_map(Value::as_u64).sum())
        .unwrap_or(malicious);

    let detail = format!("{}/{} engines flagged the file", malicious, total);
    Ok(PollStatus::Done(if malicious > 0 {
        Detection::infected(detail)
    } else {
        Detection::clean(detail)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EngineErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_submission() {
        let body = json!({"data": {"type": "analysis", "id": "NjY0MjRlOTFjMDIyYTkyNWM0NjU2NWQzYWNlMzFmZmI6MTQ3NTA0ODI3Nw=="}});
        assert!(parse_submission(&body).unwrap().starts_with("NjY0"));

        let err = parse_submission(&json!({"error": {"code": "QuotaExceededError"}})).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Parse);
    }

    #[test]
    fn test_parse_analysis_queued() {
        let body = json!({"data": {"attributes": {"status": "queued", "stats": {}}}});
        assert_eq!(parse_analysis(&body).unwrap(), PollStatus::Pending);
    }

    #[test]
    fn test_parse_analysis_malicious() {
        let body = json!({"data": {"attributes": {
            "status": "completed",
            "stats": {"malicious": 3, "suspicious": 0, "undetected": 67, "harmless": 0}
        }}});
        assert_eq!(
            parse_analysis(&body).unwrap(),
            PollStatus::Done(Detection::infected("3/70 engines flagged the file"))
        );
    }

    #[test]
    fn test_parse_analysis_clean() {
        let body = json!({"data": {"attributes": {
            "status": "completed",
            "stats": {"malicious": 0, "undetected": 72}
        }}});
        assert!(matches!(
            parse_analysis(&body).unwrap(),
            PollStatus::Done(Detection::Clean { .. })
        ));
    }

    #[test]
    fn test_parse_analysis_missing_malicious() {
        let body = json!({"data": {"attributes": {"status": "completed", "stats": {"undetected": 72}}}});
        let err = parse_analysis(&body).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Parse);
    }
}
