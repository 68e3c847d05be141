pub mod firebase;

use crate::subscription::Subscribers;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{error, info};

pub use firebase::FirebaseAuth;

pub const LOGIN_FAILED_MESSAGE: &str =
    "ログインに失敗しました。メールアドレスとパスワードを確認してください。";
pub const SIGNUP_FAILED_MESSAGE: &str =
    "アカウント作成に失敗しました。別のメールアドレスを試してください。";
pub const SIGNOUT_FAILED_MESSAGE: &str = "ログアウトに失敗しました。";
pub const ANONYMOUS_LOGIN_FAILED_MESSAGE: &str = "匿名ログインに失敗しました。";

/// A signed-in user
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    pub is_anonymous: bool,
    pub id_token: String,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("is_anonymous", &self.is_anonymous)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    SignIn,
    SignUp,
    SignOut,
    SignInAnonymously,
}

impl AuthOperation {
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthOperation::SignIn => LOGIN_FAILED_MESSAGE,
            AuthOperation::SignUp => SIGNUP_FAILED_MESSAGE,
            AuthOperation::SignOut => SIGNOUT_FAILED_MESSAGE,
            AuthOperation::SignInAnonymously => ANONYMOUS_LOGIN_FAILED_MESSAGE,
        }
    }
}

/// An identity provider error tagged with the operation that produced it
#[derive(Error, Debug)]
#[error("{operation:?} failed: {source}")]
pub struct AuthFailure {
    pub operation: AuthOperation,
    #[source]
    pub source: AuthError,
}

impl AuthFailure {
    pub fn user_message(&self) -> &'static str {
        self.operation.user_message()
    }
}

/// Managed identity platform
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;
    async fn sign_in_anonymously(&self) -> Result<User, AuthError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError>;
    async fn sign_out(&self, user: &User) -> Result<(), AuthError>;
}

/// The current session, owned by the app and handed to screens explicitly
#[derive(Clone)]
pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    current: Arc<Mutex<Option<User>>>,
    last_error: Arc<Mutex<Option<&'static str>>>,
    changes: Subscribers<Option<User>>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            current: Arc::new(Mutex::new(None)),
            last_error: Arc::new(Mutex::new(None)),
            changes: Subscribers::new(),
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.current.lock().unwrap().clone()
    }

    /// ID token of the signed-in user, for authorizing data requests
    pub fn id_token(&self) -> Option<String> {
        self.current_user().map(|user| user.id_token)
    }

    /// User-facing message of the last failed operation
    pub fn error(&self) -> Option<&'static str> {
        *self.last_error.lock().unwrap()
    }

    /// Receive the current user now and on every change
    pub fn on_auth_change(&self) -> tokio_mpsc::UnboundedReceiver<Option<User>> {
        self.changes.subscribe_with(self.current_user())
    }

    fn set_user(&self, user: Option<User>) {
        *self.current.lock().unwrap() = user.clone();
        self.changes.publish(user);
    }

    fn begin(&self) {
        *self.last_error.lock().unwrap() = None;
    }

    fn failed(&self, operation: AuthOperation, source: AuthError) -> AuthFailure {
        error!("{:?} failed: {}", operation, source);
        *self.last_error.lock().unwrap() = Some(operation.user_message());
        AuthFailure { operation, source }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthFailure> {
        self.begin();
        let user = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(|e| self.failed(AuthOperation::SignIn, e))?;
        info!("Signed in as {}", user.uid);
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthFailure> {
        self.begin();
        let user = self
            .provider
            .sign_up(email, password)
            .await
            .map_err(|e| self.failed(AuthOperation::SignUp, e))?;
        info!("Created account {}", user.uid);
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    pub async fn sign_in_anonymously(&self) -> Result<User, AuthFailure> {
        self.begin();
        let user = self
            .provider
            .sign_in_anonymously()
            .await
            .map_err(|e| self.failed(AuthOperation::SignInAnonymously, e))?;
        info!("Signed in anonymously as {}", user.uid);
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    pub async fn sign_out(&self) -> Result<(), AuthFailure> {
        self.begin();
        let Some(user) = self.current_user() else {
            return Ok(());
        };
        self.provider
            .sign_out(&user)
            .await
            .map_err(|e| self.failed(AuthOperation::SignOut, e))?;
        info!("Signed out {}", user.uid);
        self.set_user(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockIdentityProvider;

    #[tokio::test]
    async fn test_auth_changes_are_delivered() {
        let session = AuthSession::new(Arc::new(MockIdentityProvider::new()));
        let mut changes = session.on_auth_change();

        assert_eq!(changes.recv().await, Some(None));

        let user = session.sign_in("a@example.com", "secret").await.unwrap();
        assert_eq!(changes.recv().await, Some(Some(user)));

        session.sign_out().await.unwrap();
        assert_eq!(changes.recv().await, Some(None));
        assert!(session.current_user().is_none());
    }

    #[tokio::test]
    async fn test_failures_map_to_operation_messages() {
        let provider = Arc::new(MockIdentityProvider::new());
        provider.reject_all();
        let session = AuthSession::new(provider);

        let err = session.sign_in("a@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.user_message(), LOGIN_FAILED_MESSAGE);
        assert_eq!(session.error(), Some(LOGIN_FAILED_MESSAGE));

        let err = session.sign_up("a@example.com", "pw").await.unwrap_err();
        assert_eq!(err.user_message(), SIGNUP_FAILED_MESSAGE);

        let err = session.sign_in_anonymously().await.unwrap_err();
        assert_eq!(err.user_message(), ANONYMOUS_LOGIN_FAILED_MESSAGE);
        assert!(session.current_user().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_failure_keeps_user() {
        let provider = Arc::new(MockIdentityProvider::new());
        let session = AuthSession::new(provider.clone());
        session.sign_in_anonymously().await.unwrap();

        provider.reject_all();
        let err = session.sign_out().await.unwrap_err();

        assert_eq!(err.user_message(), SIGNOUT_FAILED_MESSAGE);
        assert!(session.current_user().is_some());
    }

    #[tokio::test]
    async fn test_success_clears_previous_error() {
        let provider = Arc::new(MockIdentityProvider::new());
        let session = AuthSession::new(provider.clone());
        provider.reject_all();
        let _ = session.sign_in("a@example.com", "pw").await;

        provider.accept_all();
        session.sign_in("a@example.com", "pw").await.unwrap();

        assert_eq!(session.error(), None);
    }
}
