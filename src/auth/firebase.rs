use crate::auth::{AuthError, IdentityProvider, User};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    local_id: String,
    email: Option<String>,
    id_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Firebase Authentication over the Identity Toolkit REST API
#[derive(Clone)]
pub struct FirebaseAuth {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FirebaseAuth {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call(
        &self,
        endpoint: &str,
        body: &CredentialsRequest<'_>,
        is_anonymous: bool,
    ) -> Result<User, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);
        debug!("FirebaseAuth: calling accounts:{}", endpoint);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await?;
            let reason = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or(text);
            return Err(AuthError::Rejected(reason));
        }

        let token: TokenResponse = response.json().await?;
        Ok(User {
            uid: token.local_id,
            email: token.email.filter(|e| !e.is_empty()),
            is_anonymous,
            id_token: token.id_token,
            refresh_token: token.refresh_token,
        })
    }
}

#[async_trait::async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let body = CredentialsRequest {
            email: Some(email),
            password: Some(password),
            return_secure_token: true,
        };
        self.call("signInWithPassword", &body, false).await
    }

    async fn sign_in_anonymously(&self) -> Result<User, AuthError> {
        let body = CredentialsRequest {
            email: None,
            password: None,
            return_secure_token: true,
        };
        self.call("signUp", &body, true).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let body = CredentialsRequest {
            email: Some(email),
            password: Some(password),
            return_secure_token: true,
        };
        self.call("signUp", &body, false).await
    }

    async fn sign_out(&self, user: &User) -> Result<(), AuthError> {
        // ID tokens are stateless; dropping them locally ends the session
        debug!("FirebaseAuth: signing out {}", user.uid);
        Ok(())
    }
}
