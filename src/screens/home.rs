use crate::format::format_date;
use crate::recordings::{CachedRepository, RecordRepository, Recording};
use serde::Serialize;
use tracing::{debug, error};

pub const RECENT_LIMIT: usize = 20;
pub const SEARCH_LIMIT: usize = 20;

pub const SEARCH_PLACEHOLDER: &str = "電話番号で検索";
pub const LOADING_TEXT: &str = "データを読み込み中...";
pub const LIST_ERROR_TEXT: &str =
    "データの読み込みに失敗しました。 下にスワイプして再読み込みしてください。";
pub const NO_RECORDINGS_TEXT: &str = "録音データがありません";
pub const NO_RESULTS_TEXT: &str = "検索結果が見つかりませんでした";

/// One row of the recordings list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingItem {
    pub id: String,
    pub phone_number: String,
    pub recorded_at: String,
    pub summary: Option<String>,
}

impl From<&Recording> for RecordingItem {
    fn from(recording: &Recording) -> Self {
        Self {
            id: recording.id.clone(),
            phone_number: recording.phone_number.clone(),
            recorded_at: format_date(&recording.recorded_at),
            summary: recording.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HomeView {
    Loading,
    Error { message: &'static str },
    Empty { message: &'static str },
    Items(Vec<RecordingItem>),
}

/// Recent recordings, or phone-number search results while a term is entered
pub struct HomeScreen {
    repository: CachedRepository,
    query: String,
    view: HomeView,
}

impl HomeScreen {
    pub fn new(repository: CachedRepository) -> Self {
        Self {
            repository,
            query: String::new(),
            view: HomeView::Loading,
        }
    }

    pub fn view(&self) -> &HomeView {
        &self.view
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_searching(&self) -> bool {
        !self.query.is_empty()
    }

    /// Fetch whatever the current query calls for
    pub async fn load(&mut self) -> &HomeView {
        self.view = HomeView::Loading;

        let result = if self.is_searching() {
            self.repository
                .search_by_phone_prefix(&self.query, SEARCH_LIMIT)
                .await
        } else {
            self.repository.list_recent(RECENT_LIMIT).await
        };

        self.view = match result {
            Ok(recordings) if recordings.is_empty() => HomeView::Empty {
                message: if self.is_searching() {
                    NO_RESULTS_TEXT
                } else {
                    NO_RECORDINGS_TEXT
                },
            },
            Ok(recordings) => {
                debug!("Showing {} recordings", recordings.len());
                HomeView::Items(recordings.iter().map(RecordingItem::from).collect())
            }
            Err(e) => {
                error!("Failed to load recordings: {}", e);
                HomeView::Error {
                    message: LIST_ERROR_TEXT,
                }
            }
        };
        &self.view
    }

    pub async fn set_query(&mut self, query: &str) -> &HomeView {
        self.query = query.to_string();
        self.load().await
    }

    /// Pull-to-refresh: drop cached results and fetch again
    pub async fn refresh(&mut self) -> &HomeView {
        self.repository.invalidate().await;
        self.load().await
    }
}
