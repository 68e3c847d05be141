use crate::format::{format_date, format_duration};
use crate::playback::{AudioEngine, PlaybackController, PlaybackPhase, PlayerConfig};
use crate::recordings::repository::DATA_LOAD_FAILED_MESSAGE;
use crate::recordings::{RecordRepository, Recording};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, info, warn};

/// Seconds skipped by the forward and back buttons
pub const SKIP_SECONDS: f64 = 10.0;

pub const NO_AUDIO_TEXT: &str = "音声ファイルがありません";
pub const NO_TRANSCRIPT_TEXT: &str = "文字起こしがありません";
pub const NO_SUMMARY_TEXT: &str = "要約がありません";

#[derive(Debug, Clone, PartialEq)]
pub enum RecordView {
    Loading,
    /// Fetch failed or the record does not exist; retry is offered
    Failed { message: &'static str },
    Loaded(Recording),
}

/// Transport controls, derived from the controller snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub is_playing: bool,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub position_label: String,
    pub duration_label: String,
    /// Upper bound of the slider; 1 until the duration is known
    pub slider_max: f64,
    pub slider_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AudioView {
    Loading,
    /// Load failed; a reload is offered
    Failed { message: String },
    NoAudio,
    Controls(PlayerView),
}

/// Record header, player and texts of a single recording.
///
/// Owns the [`PlaybackController`] for as long as the screen is open.
pub struct RecordingDetailScreen {
    recording_id: String,
    repository: Arc<dyn RecordRepository>,
    controller: PlaybackController,
    notices: tokio_mpsc::UnboundedReceiver<String>,
    record: RecordView,
    audio_url: Option<String>,
    notice: Option<String>,
}

impl RecordingDetailScreen {
    pub fn new(
        recording_id: impl Into<String>,
        repository: Arc<dyn RecordRepository>,
        engine: Arc<dyn AudioEngine>,
        config: PlayerConfig,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        let controller = PlaybackController::new(engine, config, runtime_handle);
        let notices = controller.subscribe_notices();
        Self {
            recording_id: recording_id.into(),
            repository,
            controller,
            notices,
            record: RecordView::Loading,
            audio_url: None,
            notice: None,
        }
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn record(&self) -> &RecordView {
        &self.record
    }

    pub fn recording(&self) -> Option<&Recording> {
        match &self.record {
            RecordView::Loaded(recording) => Some(recording),
            _ => None,
        }
    }

    /// Fetch the record, then bring the player in line with its audio URL
    pub async fn refresh(&mut self) {
        self.record = RecordView::Loading;
        let url = match self.repository.get_by_id(&self.recording_id).await {
            Ok(Some(recording)) => {
                let url = recording.audio_url.clone();
                self.record = RecordView::Loaded(recording);
                url
            }
            Ok(None) => {
                warn!("Recording {} not found", self.recording_id);
                self.record = RecordView::Failed {
                    message: DATA_LOAD_FAILED_MESSAGE,
                };
                None
            }
            Err(e) => {
                error!("Failed to load recording {}: {}", self.recording_id, e);
                self.record = RecordView::Failed {
                    message: e.user_message(),
                };
                return;
            }
        };
        self.sync_audio(url).await;
    }

    /// Load on a new URL, release when it disappears, keep the player otherwise
    async fn sync_audio(&mut self, url: Option<String>) {
        if url == self.audio_url {
            return;
        }
        self.audio_url = url.clone();
        match url {
            Some(url) => {
                if let Err(e) = self.controller.load(&url).await {
                    error!("Audio load for recording {} failed: {}", self.recording_id, e);
                }
            }
            None => {
                debug!("Recording {} has no audio, releasing player", self.recording_id);
                self.controller.release().await;
            }
        }
    }

    /// Retry whatever failed: the record fetch first, else the audio load
    pub async fn retry(&mut self) {
        if matches!(self.record, RecordView::Failed { .. }) {
            info!("Retrying recording {}", self.recording_id);
            self.refresh().await;
        } else if self.controller.phase() == PlaybackPhase::Failed {
            info!("Reloading audio for recording {}", self.recording_id);
            if let Err(e) = self.controller.reload().await {
                error!("Audio reload failed: {}", e);
            }
        }
    }

    pub async fn toggle_playback(&mut self) {
        let _ = self.controller.toggle_playback().await;
    }

    pub async fn skip_forward(&mut self) {
        let _ = self.controller.seek_relative(SKIP_SECONDS).await;
    }

    pub async fn skip_backward(&mut self) {
        let _ = self.controller.seek_relative(-SKIP_SECONDS).await;
    }

    /// Slider released at `seconds`
    pub async fn slide_to(&mut self, seconds: f64) {
        let _ = self.controller.seek_from_slider(seconds).await;
    }

    /// Take the latest transient notice (a failed play, pause or seek)
    pub fn take_notice(&mut self) -> Option<String> {
        while let Ok(message) = self.notices.try_recv() {
            self.notice = Some(message);
        }
        self.notice.take()
    }

    pub fn audio_view(&self) -> AudioView {
        let snapshot = self.controller.snapshot();
        match self.controller.phase() {
            PlaybackPhase::Loading => AudioView::Loading,
            PlaybackPhase::Failed => AudioView::Failed {
                message: snapshot.load_error.unwrap_or_default(),
            },
            PlaybackPhase::Idle if self.audio_url.is_some() => AudioView::Loading,
            PlaybackPhase::Idle => AudioView::NoAudio,
            PlaybackPhase::Ready => AudioView::Controls(PlayerView {
                is_playing: snapshot.is_playing,
                position_seconds: snapshot.position_seconds,
                duration_seconds: snapshot.duration_seconds,
                position_label: format_duration(snapshot.position_seconds),
                duration_label: format_duration(snapshot.duration_seconds),
                slider_max: if snapshot.duration_seconds > 0.0 {
                    snapshot.duration_seconds
                } else {
                    1.0
                },
                slider_enabled: snapshot.can_seek(),
            }),
        }
    }

    pub fn recorded_at_label(&self) -> Option<String> {
        self.recording().map(|r| format_date(&r.recorded_at))
    }

    pub fn transcript_text(&self) -> Option<&str> {
        self.recording()
            .map(|r| r.transcript.as_deref().unwrap_or(NO_TRANSCRIPT_TEXT))
    }

    pub fn summary_text(&self) -> Option<&str> {
        self.recording()
            .map(|r| r.summary.as_deref().unwrap_or(NO_SUMMARY_TEXT))
    }

    /// The screen is going away; the player is unmounted and its handle released
    pub async fn close(self) {
        self.controller.unmount().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_recording, MockAudioEngine, MockRecordRepository};
    use std::time::Duration;

    fn screen(
        repository: &Arc<MockRecordRepository>,
        engine: &Arc<MockAudioEngine>,
    ) -> RecordingDetailScreen {
        RecordingDetailScreen::new(
            "a",
            repository.clone(),
            engine.clone(),
            PlayerConfig {
                settle_delay: Duration::ZERO,
                ..Default::default()
            },
            tokio::runtime::Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_missing_texts_use_placeholders() {
        let mut recording = sample_recording("a", "0901");
        recording.transcript = None;
        recording.summary = None;
        recording.audio_url = None;
        let repository = Arc::new(MockRecordRepository::with_recordings(vec![recording]));
        let engine = Arc::new(MockAudioEngine::new());
        let mut detail = screen(&repository, &engine);

        detail.refresh().await;

        assert_eq!(detail.transcript_text(), Some(NO_TRANSCRIPT_TEXT));
        assert_eq!(detail.summary_text(), Some(NO_SUMMARY_TEXT));
        assert_eq!(detail.audio_view(), AudioView::NoAudio);
        assert!(engine.created_urls().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_url_does_not_reload() {
        let repository = Arc::new(MockRecordRepository::with_recordings(vec![sample_recording(
            "a", "0901",
        )]));
        let engine = Arc::new(MockAudioEngine::new());
        let mut detail = screen(&repository, &engine);

        detail.refresh().await;
        detail.refresh().await;

        assert_eq!(engine.created_urls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_offers_retry() {
        let repository = Arc::new(MockRecordRepository::default());
        let engine = Arc::new(MockAudioEngine::new());
        let mut detail = screen(&repository, &engine);

        detail.refresh().await;
        assert_eq!(
            detail.record(),
            &RecordView::Failed {
                message: DATA_LOAD_FAILED_MESSAGE
            }
        );

        repository.update(sample_recording("a", "0901"));
        detail.retry().await;

        assert!(detail.recording().is_some());
        assert!(matches!(detail.audio_view(), AudioView::Controls(_)));
    }

    #[tokio::test]
    async fn test_engine_updates_do_not_queue_on_the_screen() {
        let repository = Arc::new(MockRecordRepository::with_recordings(vec![sample_recording(
            "a", "0901",
        )]));
        let engine = Arc::new(MockAudioEngine::new());
        let mut detail = screen(&repository, &engine);
        detail.refresh().await;
        let handle = engine.last_handle().unwrap();

        for i in 0..7_200 {
            handle.emit(crate::playback::EngineStatus::loaded(
                (i % 60) as f64 * 1000.0,
                Some(60_000.0),
                true,
            ));
        }

        assert!(matches!(detail.audio_view(), AudioView::Controls(_)));
        assert_eq!(detail.notices.len(), 0);
        assert_eq!(detail.take_notice(), None);
    }

    #[tokio::test]
    async fn test_slider_range_before_duration_is_known() {
        let repository = Arc::new(MockRecordRepository::with_recordings(vec![sample_recording(
            "a", "0901",
        )]));
        let engine = Arc::new(MockAudioEngine::new());
        engine.set_initial_status(crate::playback::EngineStatus::loaded(0.0, None, false));
        let mut detail = screen(&repository, &engine);

        detail.refresh().await;

        match detail.audio_view() {
            AudioView::Controls(player) => {
                assert_eq!(player.slider_max, 1.0);
                assert!(!player.slider_enabled);
                assert_eq!(player.duration_label, "0:00");
            }
            other => panic!("expected controls, got {:?}", other),
        }
    }
}
