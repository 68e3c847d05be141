use reqwest::{Client, Error as ReqwestError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

pub const TIMEOUT_MESSAGE: &str = "リクエストがタイムアウトしました";
pub const CONNECTION_MESSAGE: &str =
    "サーバー接続エラー: プロキシサーバーが起動していないか、ネットワーク接続に問題があります";
pub const IMPORT_FAILED_MESSAGE: &str = "録音データの取り込みに失敗しました";

#[derive(Error, Debug)]
pub enum AcrError {
    #[error("Request to {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },
    #[error("Could not connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: ReqwestError,
    },
    #[error("API call failed ({status}): {path} - {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AcrError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AcrError::Timeout { .. } => TIMEOUT_MESSAGE,
            AcrError::Connection { .. } => CONNECTION_MESSAGE,
            _ => IMPORT_FAILED_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessAllResponse {
    pub to_process: u64,
    pub processed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResponse {
    pub polled: u64,
    #[serde(rename = "startPageToken", skip_serializing_if = "Option::is_none")]
    pub start_page_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

/// Client for the remote bulk-processing API
#[derive(Clone)]
pub struct AcrClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl AcrClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` as JSON to `path` and decode the JSON reply
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, AcrError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("AcrClient: POST {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let err = if e.is_timeout() {
                    AcrError::Timeout {
                        path: path.to_string(),
                        timeout: self.timeout,
                    }
                } else if e.is_connect() {
                    AcrError::Connection {
                        url: url.clone(),
                        source: e,
                    }
                } else {
                    AcrError::Request(e)
                };
                error!("API call failed: {}", err);
                err
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let err = AcrError::Status {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            };
            error!("{}", err);
            return Err(err);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Queue every unprocessed recording
    pub async fn process_all(&self) -> Result<ProcessAllResponse, AcrError> {
        self.call("/process_all", json!({})).await
    }

    /// Check for recordings processed since `start_page_token`
    pub async fn poll(&self, start_page_token: Option<&str>) -> Result<PollResponse, AcrError> {
        let body = match start_page_token {
            Some(token) => json!({ "startPageToken": token }),
            None => json!({}),
        };
        self.call("/poll", body).await
    }

    pub async fn trigger_webhook(
        &self,
        file_id: &str,
        file_name: &str,
    ) -> Result<WebhookResponse, AcrError> {
        self.call("/webhook", json!({ "fileId": file_id, "fileName": file_name }))
            .await
    }
}
