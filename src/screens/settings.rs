use crate::auth::AuthSession;
use crate::recordings::CachedRepository;
use serde::Serialize;
use tracing::{error, info};

pub const CLEAR_CACHE_PROMPT: &str =
    "オフラインキャッシュを削除しますか？\nこの操作は元に戻せません。";
pub const CLEAR_CACHE_DONE_TEXT: &str = "キャッシュを削除しました";
pub const SIGN_OUT_PROMPT: &str = "ログアウトしますか？";

/// An action waiting for the user to confirm it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PendingAction {
    ClearCache,
    SignOut,
}

impl PendingAction {
    pub fn prompt(&self) -> &'static str {
        match self {
            PendingAction::ClearCache => CLEAR_CACHE_PROMPT,
            PendingAction::SignOut => SIGN_OUT_PROMPT,
        }
    }
}

/// App settings: high contrast, cache clearing, sign-out and the version line.
///
/// Clearing the cache and signing out both ask for confirmation first.
pub struct SettingsScreen {
    session: AuthSession,
    repository: CachedRepository,
    high_contrast: bool,
    pending: Option<PendingAction>,
    is_clearing: bool,
    notice: Option<&'static str>,
}

impl SettingsScreen {
    pub fn new(session: AuthSession, repository: CachedRepository) -> Self {
        Self {
            session,
            repository,
            high_contrast: false,
            pending: None,
            is_clearing: false,
            notice: None,
        }
    }

    pub fn high_contrast(&self) -> bool {
        self.high_contrast
    }

    pub fn toggle_high_contrast(&mut self) {
        self.high_contrast = !self.high_contrast;
    }

    pub fn pending(&self) -> Option<PendingAction> {
        self.pending
    }

    pub fn is_clearing(&self) -> bool {
        self.is_clearing
    }

    pub fn version_label(&self) -> String {
        format!("バージョン: {}", env!("CARGO_PKG_VERSION"))
    }

    /// Ask before clearing; ignored while a clear is running
    pub fn request_clear_cache(&mut self) {
        if !self.is_clearing {
            self.pending = Some(PendingAction::ClearCache);
        }
    }

    pub fn request_sign_out(&mut self) {
        self.pending = Some(PendingAction::SignOut);
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Run the pending action, if any
    pub async fn confirm(&mut self) {
        match self.pending.take() {
            Some(PendingAction::ClearCache) => {
                self.is_clearing = true;
                self.repository.invalidate().await;
                self.is_clearing = false;
                info!("Cleared recording cache");
                self.notice = Some(CLEAR_CACHE_DONE_TEXT);
            }
            Some(PendingAction::SignOut) => {
                if let Err(e) = self.session.sign_out().await {
                    error!("Sign-out failed: {}", e);
                    self.notice = Some(e.user_message());
                }
            }
            None => {}
        }
    }

    /// Take the message of the last completed or failed action
    pub fn take_notice(&mut self) -> Option<&'static str> {
        self.notice.take()
    }
}
