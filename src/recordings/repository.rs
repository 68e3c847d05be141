use crate::recordings::models::Recording;
use crate::recordings::storage::StorageError;
use reqwest::Error as ReqwestError;
use thiserror::Error;

pub const DATA_LOAD_FAILED_MESSAGE: &str = "データの読み込みに失敗しました。";

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),
    #[error("Document store returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Not signed in")]
    Unauthenticated,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RepositoryError {
    pub fn user_message(&self) -> &'static str {
        DATA_LOAD_FAILED_MESSAGE
    }
}

/// Read access to recording metadata
#[async_trait::async_trait]
pub trait RecordRepository: Send + Sync {
    /// Most recent recordings first
    async fn list_recent(&self, limit: usize) -> Result<Vec<Recording>, RepositoryError>;

    /// `Ok(None)` when the document does not exist or cannot be converted
    async fn get_by_id(&self, id: &str) -> Result<Option<Recording>, RepositoryError>;

    /// Recordings whose phone number starts with `term`
    async fn search_by_phone_prefix(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Recording>, RepositoryError>;
}
