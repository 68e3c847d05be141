use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the processing pipeline is with a recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Other(String),
    Unknown,
}

impl ProcessingStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" => ProcessingStatus::Unknown,
            "pending" | "queued" => ProcessingStatus::Pending,
            "processing" | "in_progress" => ProcessingStatus::Processing,
            "completed" | "done" | "processed" => ProcessingStatus::Completed,
            "failed" | "error" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Other(raw.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ProcessingStatus::Pending => "待機中",
            ProcessingStatus::Processing => "処理中",
            ProcessingStatus::Completed => "処理済み",
            ProcessingStatus::Failed => "処理失敗",
            ProcessingStatus::Other(raw) => raw,
            ProcessingStatus::Unknown => "不明",
        }
    }
}

/// A call recording as stored in the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub phone_number: String,
    pub recorded_at: DateTime<Utc>,
    /// Duration hint in seconds, as written by the processing pipeline
    pub duration: f64,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub file_name: String,
    pub status: ProcessingStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl Recording {
    /// Object store path of the recording's audio
    pub fn audio_object_path(&self) -> String {
        audio_object_path(&self.id)
    }
}

pub fn audio_object_path(recording_id: &str) -> String {
    format!("recordings/{}.mp3", recording_id)
}
