//! Outbound threat alerts.
//!
//! On an Infected verdict the orchestrator hands an [`Alert`] to an
//! [`AlertSink`] in a detached task. Delivery is best effort: a failure is
//! logged and never affects the scan.

use crate::core::error::AlertError;
use crate::core::{ScanAction, ScanRecord};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Debug;
use std::time::Duration;

/// What an alert says about an infected file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    /// Declared name of the file.
    pub file_name: String,
    /// When the scan completed.
    pub timestamp: DateTime<Utc>,
    /// What was done with the file.
    pub action: ScanAction,
    /// Engines that reported the threat.
    pub detected_by: Vec<String>,
}

impl Alert {
    /// Builds an alert from an infected record.
    pub fn from_record(record: &ScanRecord) -> Self {
        Self {
            file_name: record.file_name.clone(),
            timestamp: record.timestamp,
            action: record.action,
            detected_by: record
                .detecting_engines()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    /// Renders the alert as one human-readable line.
    pub fn message(&self) -> String {
        let action = match self.action {
            ScanAction::Quarantined => "file quarantined",
            ScanAction::None => "file left in place",
        };
        format!(
            "Threat detected in '{}' by {} at {} ({})",
            self.file_name,
            if self.detected_by.is_empty() {
                "unknown engine".to_string()
            } else {
                self.detected_by.join(", ")
            },
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            action
        )
    }
}

/// Destination for alerts.
#[async_trait]
pub trait AlertSink: Send + Sync + Debug {
    /// Delivers one alert.
    async fn send(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// Posts alerts to a chat webhook as `{"content": "<message>"}`.
#[derive(Debug)]
pub struct WebhookAlertSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookAlertSink {
    /// Creates a sink for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertError::Delivery {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "content": alert.message() }))
            .send()
            .await
            .map_err(|e| AlertError::Delivery {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AlertError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}
