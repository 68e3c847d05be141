use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{presigning::PresigningConfig, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("S3 SDK error: {0}")]
    SdkError(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// S3 configuration for an S3-compatible object store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>, // For MinIO/S3-compatible services
}

impl S3Config {
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.bucket_name.trim().is_empty() {
            return Err(StorageError::Config(
                "Bucket name cannot be empty".to_string(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(StorageError::Config("Region cannot be empty".to_string()));
        }
        if self.access_key_id.trim().is_empty() {
            return Err(StorageError::Config(
                "Access key ID cannot be empty".to_string(),
            ));
        }
        if self.secret_access_key.trim().is_empty() {
            return Err(StorageError::Config(
                "Secret access key cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolves stored audio objects into URLs the audio engine can open
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn playable_url(&self, path: &str) -> Result<String, StorageError>;
}

/// Firebase Storage, addressed through its REST endpoint
pub struct FirebaseStorage {
    client: reqwest::Client,
    bucket: String,
    id_token: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    download_tokens: Option<String>,
}

impl FirebaseStorage {
    pub fn new(bucket: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bucket,
            id_token: None,
            base_url: "https://firebasestorage.googleapis.com/v0".to_string(),
        }
    }

    /// Authorize metadata lookups as the signed-in user
    pub fn with_id_token(mut self, id_token: Option<String>) -> Self {
        self.id_token = id_token;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            urlencoding::encode(path)
        )
    }
}

#[async_trait::async_trait]
impl ObjectStore for FirebaseStorage {
    async fn playable_url(&self, path: &str) -> Result<String, StorageError> {
        let url = self.object_url(path);
        debug!("FirebaseStorage: resolving {}", path);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.id_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let metadata: ObjectMetadata = response.error_for_status()?.json().await?;

        let download_token = metadata
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .filter(|token| !token.is_empty());

        Ok(match download_token {
            Some(token) => format!("{}?alt=media&token={}", url, token),
            None => format!("{}?alt=media", url),
        })
    }
}

/// S3-compatible store handing out presigned GET URLs
pub struct S3ObjectStore {
    client: Client,
    bucket_name: String,
    expires_in: Duration,
}

impl S3ObjectStore {
    pub async fn new(config: S3Config) -> Result<Self, StorageError> {
        config.validate()?;

        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None, // session_token
            None, // expiration
            "acr-s3-config",
        );

        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);

        if let Some(endpoint) = config.endpoint_url {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;

        Ok(S3ObjectStore {
            client: Client::new(&aws_config),
            bucket_name: config.bucket_name,
            expires_in: Duration::from_secs(60 * 60),
        })
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn playable_url(&self, path: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(self.expires_in)
            .map_err(|e| StorageError::Config(format!("Invalid presign expiry: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(path)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::SdkError(format!("Presign failed: {}", e)))?;

        Ok(request.uri().to_string())
    }
}

/// Shared handle to whichever object store is configured
#[derive(Clone)]
pub struct ObjectStoreManager {
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for ObjectStoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreManager")
            .field("store", &"<dyn ObjectStore>")
            .finish()
    }
}

impl ObjectStoreManager {
    pub fn from_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn s3(config: S3Config) -> Result<Self, StorageError> {
        let store = S3ObjectStore::new(config).await?;
        Ok(Self::from_store(Arc::new(store)))
    }

    pub fn firebase(bucket: String, id_token: Option<String>) -> Self {
        Self::from_store(Arc::new(FirebaseStorage::new(bucket).with_id_token(id_token)))
    }

    pub async fn playable_url(&self, path: &str) -> Result<String, StorageError> {
        self.store.playable_url(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_encodes_path() {
        let storage = FirebaseStorage::new("acr-bucket".to_string());
        assert_eq!(
            storage.object_url("recordings/abc.mp3"),
            "https://firebasestorage.googleapis.com/v0/b/acr-bucket/o/recordings%2Fabc.mp3"
        );
    }

    #[test]
    fn test_s3_config_validation() {
        let config = S3Config {
            bucket_name: "recordings".to_string(),
            region: " ".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            endpoint_url: None,
        };
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn test_firebase_download_url_uses_first_token() {
        use axum::{routing::get, Json, Router};

        let app = Router::new().route(
            "/v0/b/acr-bucket/o/:object",
            get(|| async { Json(serde_json::json!({ "downloadTokens": "tok1,tok2" })) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let storage = FirebaseStorage::new("acr-bucket".to_string())
            .with_base_url(format!("http://{}/v0", addr));
        let url = storage.playable_url("recordings/abc.mp3").await.unwrap();

        assert_eq!(
            url,
            format!(
                "http://{}/v0/b/acr-bucket/o/recordings%2Fabc.mp3?alt=media&token=tok1",
                addr
            )
        );
    }
}
