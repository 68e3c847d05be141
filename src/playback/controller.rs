use crate::playback::engine::{
    AudioEngine, CreateOptions, EngineError, EngineHandle, EngineStatus, ListenerId,
    StatusListener,
};
use crate::playback::progress::{PlaybackPhase, PlaybackProgress};
use crate::playback::snapshot::{seconds_to_millis, PlaybackSnapshot};
use crate::subscription::Subscribers;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, info, warn};

pub const LOAD_FAILED_MESSAGE: &str = "音声ファイルの読み込みに失敗しました";
pub const PLAYBACK_FAILED_MESSAGE: &str = "音声の再生に失敗しました";
pub const PLAYER_CLOSED_MESSAGE: &str = "プレーヤーは終了しています";

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Audio load failed: {0}")]
    Load(#[source] EngineError),
    #[error("Audio load timed out after {0:?}")]
    LoadTimeout(Duration),
    #[error("Engine created the handle but reports it as not loaded")]
    NotLoaded,
    #[error("Playback operation failed: {0}")]
    Transport(#[source] EngineError),
    #[error("Player has been closed")]
    Closed,
}

impl PlaybackError {
    pub fn user_message(&self) -> &'static str {
        match self {
            PlaybackError::Load(_) | PlaybackError::LoadTimeout(_) | PlaybackError::NotLoaded => {
                LOAD_FAILED_MESSAGE
            }
            PlaybackError::Transport(_) => PLAYBACK_FAILED_MESSAGE,
            PlaybackError::Closed => PLAYER_CLOSED_MESSAGE,
        }
    }
}

/// What a slider seek does to the play/pause state once the seek lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfterSeek {
    /// Re-impose pause if the player was paused before the seek
    #[default]
    KeepState,
    Pause,
    Resume,
}

impl FromStr for AfterSeek {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keep" | "keep_state" => Ok(AfterSeek::KeepState),
            "pause" => Ok(AfterSeek::Pause),
            "resume" | "play" => Ok(AfterSeek::Resume),
            other => Err(format!("Unknown after-seek policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Upper bound on handle creation; expiry surfaces as a load failure
    pub load_timeout: Duration,
    /// Pause before re-querying the engine for metadata after creation
    pub settle_delay: Duration,
    pub progress_update_interval: Duration,
    pub after_seek: AfterSeek,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(100),
            progress_update_interval: Duration::from_millis(500),
            after_seek: AfterSeek::default(),
        }
    }
}

struct ControllerState {
    phase: PlaybackPhase,
    snapshot: PlaybackSnapshot,
    handle: Option<Arc<dyn EngineHandle>>,
    listener: Option<ListenerId>,
    /// Bumped on every load and release; listeners and in-flight loads
    /// carrying an older generation are ignored.
    generation: u64,
    mounted: bool,
    url: Option<String>,
}

struct Shared {
    state: Mutex<ControllerState>,
    progress: Subscribers<PlaybackProgress>,
    /// Transport failure messages only
    notices: Subscribers<String>,
    runtime: tokio::runtime::Handle,
}

impl Shared {
    fn publish_state(&self, state: &ControllerState) {
        self.progress.publish(PlaybackProgress::StateChanged {
            phase: state.phase,
            snapshot: state.snapshot.clone(),
        });
    }

    fn apply_update(&self, generation: u64, status: EngineStatus) {
        let rewind = {
            let mut state = self.state.lock().unwrap();
            // A listener from a released or superseded handle can still fire
            // once before the engine drops it
            if state.generation != generation || state.phase != PlaybackPhase::Ready {
                debug!("Ignoring engine update from a detached handle");
                return;
            }

            state.snapshot.apply(&status);

            // No looping: stop at the start
            let rewind = if status.is_loaded && status.did_just_finish {
                state.snapshot.position_seconds = 0.0;
                state.snapshot.is_playing = false;
                state.handle.clone()
            } else {
                None
            };

            self.publish_state(&state);
            rewind
        };

        if let Some(handle) = rewind {
            info!("Playback finished, rewinding to start");
            self.progress.publish(PlaybackProgress::TrackCompleted);
            self.runtime.spawn(async move {
                if let Err(e) = handle.seek(0).await {
                    warn!("Failed to rewind after playback finished: {}", e);
                }
            });
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if let Some(handle) = state.handle.take() {
                if let Some(id) = state.listener.take() {
                    handle.remove_listener(id);
                }
                self.runtime.spawn(async move {
                    unload_quietly(&handle).await;
                });
            }
        }
    }
}

async fn unload_quietly(handle: &Arc<dyn EngineHandle>) {
    if let Err(e) = handle.unload().await {
        warn!("Failed to unload audio handle: {}", e);
    }
}

/// Owns at most one engine handle and republishes engine state as
/// [`PlaybackSnapshot`]s.
///
/// Clones share the same handle and state. The owning screen calls
/// [`PlaybackController::unmount`] when it goes away.
#[derive(Clone)]
pub struct PlaybackController {
    engine: Arc<dyn AudioEngine>,
    config: PlayerConfig,
    shared: Arc<Shared>,
}

impl PlaybackController {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        config: PlayerConfig,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        Self {
            engine,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState {
                    phase: PlaybackPhase::Idle,
                    snapshot: PlaybackSnapshot::default(),
                    handle: None,
                    listener: None,
                    generation: 0,
                    mounted: true,
                    url: None,
                }),
                progress: Subscribers::new(),
                notices: Subscribers::new(),
                runtime: runtime_handle,
            }),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.shared.state.lock().unwrap().snapshot.clone()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.shared.state.lock().unwrap().phase
    }

    /// URL of the most recent load
    pub fn url(&self) -> Option<String> {
        self.shared.state.lock().unwrap().url.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.state.lock().unwrap().mounted
    }

    /// Subscribe to state changes, starting with the current state
    pub fn subscribe_progress(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        let state = self.shared.state.lock().unwrap();
        self.shared
            .progress
            .subscribe_with(PlaybackProgress::StateChanged {
                phase: state.phase,
                snapshot: state.snapshot.clone(),
            })
    }

    /// Subscribe to user-facing messages of failed play, pause and seek
    /// commands only
    pub fn subscribe_notices(&self) -> tokio_mpsc::UnboundedReceiver<String> {
        self.shared.notices.subscribe()
    }

    /// Release any open handle, then open `url`.
    ///
    /// A load that completes after it was superseded (by another load, a
    /// release or an unmount) unloads its own handle and commits nothing.
    pub async fn load(&self, url: &str) -> Result<(), PlaybackError> {
        self.release().await;

        let generation = {
            let mut state = self.shared.state.lock().unwrap();
            if !state.mounted {
                return Err(PlaybackError::Closed);
            }
            state.generation += 1;
            state.phase = PlaybackPhase::Loading;
            state.snapshot = PlaybackSnapshot::default();
            state.url = Some(url.to_string());
            self.shared.publish_state(&state);
            state.generation
        };

        info!("Loading audio: {}", url);

        let options = CreateOptions {
            should_play: false,
            progress_update_interval: self.config.progress_update_interval,
        };
        let (handle, initial) = match tokio::time::timeout(
            self.config.load_timeout,
            self.engine.create(url, options),
        )
        .await
        {
            Ok(Ok(created)) => created,
            Ok(Err(e)) => {
                error!("Failed to create audio handle: {}", e);
                return self.fail_load(generation, PlaybackError::Load(e));
            }
            Err(_) => {
                error!(
                    "Audio handle creation timed out after {:?}",
                    self.config.load_timeout
                );
                return self.fail_load(
                    generation,
                    PlaybackError::LoadTimeout(self.config.load_timeout),
                );
            }
        };

        let snapshot = match self.settle(&handle, initial).await {
            Some(snapshot) => snapshot,
            None => {
                unload_quietly(&handle).await;
                return self.fail_load(generation, PlaybackError::NotLoaded);
            }
        };

        // Commit only if nothing superseded this load while it was in flight;
        // otherwise the handle belongs to no one and is unloaded here
        let committed = {
            let mut state = self.shared.state.lock().unwrap();
            if state.mounted && state.generation == generation {
                let listener_id = handle.add_listener(self.listener_for(generation));
                state.handle = Some(handle.clone());
                state.listener = Some(listener_id);
                state.phase = PlaybackPhase::Ready;
                state.snapshot = snapshot;
                self.shared.publish_state(&state);
                true
            } else {
                false
            }
        };

        if committed {
            info!("Audio ready: {}", url);
        } else {
            info!("Discarding audio handle that finished loading after it was superseded");
            unload_quietly(&handle).await;
        }

        Ok(())
    }

    /// Load the most recent URL again
    pub async fn reload(&self) -> Result<(), PlaybackError> {
        match self.url() {
            Some(url) => self.load(&url).await,
            None => Ok(()),
        }
    }

    /// Build the first snapshot from the creation status and a one-shot
    /// re-query, which often carries the duration the creation status lacked.
    async fn settle(
        &self,
        handle: &Arc<dyn EngineHandle>,
        initial: EngineStatus,
    ) -> Option<PlaybackSnapshot> {
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let latest = match handle.status().await {
            Ok(status) => status,
            Err(e) => {
                debug!("Status re-query after load failed: {}", e);
                initial.clone()
            }
        };

        if !latest.is_loaded && !initial.is_loaded {
            warn!("Engine created a handle that never reported loaded");
            return None;
        }

        let mut snapshot = PlaybackSnapshot::from_initial(&initial);
        if latest.is_loaded {
            snapshot.apply(&latest);
        }
        Some(snapshot)
    }

    fn fail_load(&self, generation: u64, err: PlaybackError) -> Result<(), PlaybackError> {
        let mut state = self.shared.state.lock().unwrap();
        if state.mounted && state.generation == generation {
            state.phase = PlaybackPhase::Failed;
            state.snapshot = PlaybackSnapshot::failed(err.user_message());
            self.shared.publish_state(&state);
        }
        Err(err)
    }

    fn listener_for(&self, generation: u64) -> StatusListener {
        let shared = Arc::downgrade(&self.shared);
        Arc::new(move |status| {
            if let Some(shared) = shared.upgrade() {
                shared.apply_update(generation, status);
            }
        })
    }

    /// Ingress point for engine status reports against the current handle
    pub fn on_engine_update(&self, status: EngineStatus) {
        let generation = self.shared.state.lock().unwrap().generation;
        self.shared.apply_update(generation, status);
    }

    fn ready_handle(&self) -> Option<(Arc<dyn EngineHandle>, PlaybackSnapshot, u64)> {
        let state = self.shared.state.lock().unwrap();
        if state.phase != PlaybackPhase::Ready {
            return None;
        }
        state
            .handle
            .clone()
            .map(|handle| (handle, state.snapshot.clone(), state.generation))
    }

    fn transport_failed(&self, operation: &str, e: EngineError) -> PlaybackError {
        error!("Failed to {}: {}", operation, e);
        let err = PlaybackError::Transport(e);
        let message = err.user_message().to_string();
        self.shared.notices.publish(message.clone());
        self.shared
            .progress
            .publish(PlaybackProgress::OperationFailed { message });
        err
    }

    /// Resume when paused, pause when playing. The snapshot changes only
    /// when the engine reports back.
    pub async fn toggle_playback(&self) -> Result<(), PlaybackError> {
        let Some((handle, snapshot, _)) = self.ready_handle() else {
            debug!("Toggle ignored, player not ready");
            return Ok(());
        };

        let result = if snapshot.is_playing {
            handle.pause().await
        } else {
            handle.play().await
        };
        result.map_err(|e| self.transport_failed("toggle playback", e))
    }

    /// Skip by `delta_seconds`, clamped into the clip
    pub async fn seek_relative(&self, delta_seconds: f64) -> Result<(), PlaybackError> {
        if !delta_seconds.is_finite() {
            warn!("Ignoring relative seek by non-finite delta {}", delta_seconds);
            return Ok(());
        }
        let Some((handle, snapshot, generation)) = self.ready_handle() else {
            return Ok(());
        };
        if !snapshot.can_seek() {
            return Ok(());
        }

        let target = snapshot.clamp(snapshot.position_seconds + delta_seconds);
        self.issue_seek(handle, generation, target).await
    }

    pub async fn seek_absolute(&self, target_seconds: f64) -> Result<(), PlaybackError> {
        if !target_seconds.is_finite() {
            warn!("Ignoring seek to non-finite position {}", target_seconds);
            return Ok(());
        }
        let Some((handle, snapshot, generation)) = self.ready_handle() else {
            return Ok(());
        };

        let target = snapshot.clamp(target_seconds);
        self.issue_seek(handle, generation, target).await
    }

    /// Seek from the position slider, then apply the configured [`AfterSeek`] policy
    pub async fn seek_from_slider(&self, target_seconds: f64) -> Result<(), PlaybackError> {
        if !target_seconds.is_finite() {
            warn!("Ignoring slider seek to non-finite position {}", target_seconds);
            return Ok(());
        }
        let Some((handle, snapshot, generation)) = self.ready_handle() else {
            return Ok(());
        };

        let target = snapshot.clamp(target_seconds);
        self.issue_seek(handle.clone(), generation, target).await?;

        let result = match self.config.after_seek {
            AfterSeek::KeepState if snapshot.is_playing => return Ok(()),
            AfterSeek::KeepState | AfterSeek::Pause => handle.pause().await,
            AfterSeek::Resume => handle.play().await,
        };
        result.map_err(|e| self.transport_failed("apply after-seek state", e))
    }

    async fn issue_seek(
        &self,
        handle: Arc<dyn EngineHandle>,
        generation: u64,
        target_seconds: f64,
    ) -> Result<(), PlaybackError> {
        debug!("Seeking to {:.3}s", target_seconds);
        handle
            .seek(seconds_to_millis(target_seconds))
            .await
            .map_err(|e| self.transport_failed("seek", e))?;

        let mut state = self.shared.state.lock().unwrap();
        if state.generation == generation && state.phase == PlaybackPhase::Ready {
            state.snapshot.position_seconds = state.snapshot.clamp(target_seconds);
            self.shared.publish_state(&state);
        }
        Ok(())
    }

    /// Detach the listener, then unload the handle. Idempotent; unload
    /// failures are only logged.
    pub async fn release(&self) {
        let detached = {
            let mut state = self.shared.state.lock().unwrap();
            state.generation += 1;
            let handle = state.handle.take();
            let listener = state.listener.take();
            if state.phase != PlaybackPhase::Idle {
                state.phase = PlaybackPhase::Idle;
                state.snapshot = PlaybackSnapshot::default();
                self.shared.publish_state(&state);
            }
            handle.map(|handle| (handle, listener))
        };

        if let Some((handle, listener)) = detached {
            if let Some(id) = listener {
                handle.remove_listener(id);
            }
            unload_quietly(&handle).await;
            debug!("Audio handle released");
        }
    }

    /// The owning screen is going away. Pending loads will discard their
    /// handles and further loads are refused.
    pub async fn unmount(&self) {
        self.shared.state.lock().unwrap().mounted = false;
        self.release().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockAudioEngine;

    fn test_config() -> PlayerConfig {
        PlayerConfig {
            settle_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    async fn ready_controller(
        status: EngineStatus,
    ) -> (PlaybackController, Arc<MockAudioEngine>) {
        let engine = Arc::new(MockAudioEngine::new());
        engine.set_initial_status(status);
        let controller = PlaybackController::new(
            engine.clone(),
            test_config(),
            tokio::runtime::Handle::current(),
        );
        controller.load("https://example.com/a.mp3").await.unwrap();
        (controller, engine)
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_load_reaches_ready_paused() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;

        assert_eq!(controller.phase(), PlaybackPhase::Ready);
        let snapshot = controller.snapshot();
        assert!(snapshot.is_loaded);
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.duration_seconds, 60.0);
        assert_eq!(snapshot.load_error, None);
        assert_eq!(engine.created_urls(), vec!["https://example.com/a.mp3"]);
    }

    #[tokio::test]
    async fn test_seek_back_at_start_stays_at_zero() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;

        controller.seek_relative(-10.0).await.unwrap();

        assert_eq!(controller.snapshot().position_seconds, 0.0);
        assert_eq!(engine.last_handle().unwrap().seeks(), vec![0]);
    }

    #[tokio::test]
    async fn test_two_forward_skips() {
        let (controller, _engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;

        controller.seek_relative(10.0).await.unwrap();
        controller.seek_relative(10.0).await.unwrap();

        assert_eq!(controller.snapshot().position_seconds, 20.0);
    }

    #[tokio::test]
    async fn test_forward_skip_clamps_to_duration() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(55_000.0, Some(60_000.0), false)).await;

        controller.seek_relative(10.0).await.unwrap();

        assert_eq!(controller.snapshot().position_seconds, 60.0);
        assert_eq!(engine.last_handle().unwrap().seeks(), vec![60_000]);
    }

    #[tokio::test]
    async fn test_skips_stay_within_clip() {
        let (controller, _engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(25_000.0), false)).await;

        for delta in [10.0, 10.0, 10.0, -4.0, -30.0, 7.5, 100.0, -0.5] {
            controller.seek_relative(delta).await.unwrap();
            let snapshot = controller.snapshot();
            assert!(snapshot.position_seconds >= 0.0);
            assert!(snapshot.position_seconds <= snapshot.duration_seconds);
        }
    }

    #[tokio::test]
    async fn test_relative_seek_ignored_without_duration() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(f64::NAN), false)).await;

        controller.seek_relative(10.0).await.unwrap();

        assert!(engine.last_handle().unwrap().seeks().is_empty());
    }

    #[tokio::test]
    async fn test_nan_duration_update_keeps_duration() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;

        engine
            .last_handle()
            .unwrap()
            .emit(EngineStatus::loaded(5_000.0, Some(f64::NAN), false));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.duration_seconds, 60.0);
        assert_eq!(snapshot.position_seconds, 5.0);
    }

    #[tokio::test]
    async fn test_toggle_before_load_issues_nothing() {
        let engine = Arc::new(MockAudioEngine::new());
        let controller = PlaybackController::new(
            engine.clone(),
            test_config(),
            tokio::runtime::Handle::current(),
        );
        let before = controller.snapshot();

        controller.toggle_playback().await.unwrap();

        assert!(engine.last_handle().is_none());
        assert_eq!(controller.snapshot(), before);
    }

    #[tokio::test]
    async fn test_toggle_waits_for_engine_report() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;
        let handle = engine.last_handle().unwrap();

        controller.toggle_playback().await.unwrap();
        assert!(!controller.snapshot().is_playing);
        assert_eq!(handle.play_count(), 1);

        handle.emit(EngineStatus::loaded(500.0, Some(60_000.0), true));
        assert!(controller.snapshot().is_playing);

        controller.toggle_playback().await.unwrap();
        assert_eq!(handle.pause_count(), 1);
    }

    #[tokio::test]
    async fn test_finish_rewinds_and_stops() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(59_000.0, Some(60_000.0), true)).await;
        let handle = engine.last_handle().unwrap();

        handle.emit(EngineStatus::finished(60_000.0));
        tick().await;

        assert_eq!(handle.seeks(), vec![0]);
        handle.emit(EngineStatus::loaded(0.0, Some(60_000.0), false));

        let snapshot = controller.snapshot();
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.position_seconds, 0.0);
    }

    #[tokio::test]
    async fn test_released_listener_is_inert() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;
        let handle = engine.last_handle().unwrap();
        let listener = handle.captured_listener().unwrap();

        controller.release().await;
        let after_release = controller.snapshot();
        listener(EngineStatus::loaded(42_000.0, Some(90_000.0), true));

        assert_eq!(controller.snapshot(), after_release);
        assert_eq!(controller.phase(), PlaybackPhase::Idle);
        assert_eq!(handle.listener_count(), 0);
        assert!(handle.is_unloaded());
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_swallows_unload_errors() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;
        let handle = engine.last_handle().unwrap();
        handle.fail_unload();

        controller.release().await;
        controller.release().await;

        assert_eq!(handle.unload_count(), 1);
    }

    #[tokio::test]
    async fn test_load_release_load_keeps_one_handle() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;

        controller.release().await;
        controller.load("https://example.com/a.mp3").await.unwrap();

        assert_eq!(engine.open_handle_count(), 1);
        assert_eq!(controller.phase(), PlaybackPhase::Ready);
    }

    #[tokio::test]
    async fn test_load_failure_is_retryable() {
        let engine = Arc::new(MockAudioEngine::new());
        engine.fail_next_create("404");
        let controller = PlaybackController::new(
            engine.clone(),
            test_config(),
            tokio::runtime::Handle::current(),
        );

        let err = controller.load("https://example.com/missing.mp3").await.unwrap_err();
        assert_eq!(err.user_message(), LOAD_FAILED_MESSAGE);
        assert_eq!(controller.phase(), PlaybackPhase::Failed);
        let snapshot = controller.snapshot();
        assert!(!snapshot.is_loaded);
        assert_eq!(snapshot.load_error.as_deref(), Some(LOAD_FAILED_MESSAGE));
        assert_eq!(engine.open_handle_count(), 0);

        controller.reload().await.unwrap();
        assert_eq!(controller.phase(), PlaybackPhase::Ready);
        assert_eq!(controller.snapshot().load_error, None);
    }

    #[tokio::test]
    async fn test_load_times_out() {
        let engine = Arc::new(MockAudioEngine::new());
        engine.set_create_delay(Duration::from_millis(200));
        let controller = PlaybackController::new(
            engine.clone(),
            PlayerConfig {
                load_timeout: Duration::from_millis(20),
                ..test_config()
            },
            tokio::runtime::Handle::current(),
        );

        let err = controller.load("https://example.com/slow.mp3").await.unwrap_err();

        assert!(matches!(err, PlaybackError::LoadTimeout(_)));
        assert_eq!(controller.phase(), PlaybackPhase::Failed);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_phase() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;
        let mut progress = controller.subscribe_progress();
        let mut notices = controller.subscribe_notices();
        engine.last_handle().unwrap().fail_transport();

        let err = controller.toggle_playback().await.unwrap_err();

        assert_eq!(err.user_message(), PLAYBACK_FAILED_MESSAGE);
        assert_eq!(controller.phase(), PlaybackPhase::Ready);
        let mut saw_notice = false;
        while let Ok(update) = progress.try_recv() {
            if let PlaybackProgress::OperationFailed { message } = update {
                assert_eq!(message, PLAYBACK_FAILED_MESSAGE);
                saw_notice = true;
            }
        }
        assert!(saw_notice);
        assert_eq!(notices.try_recv().ok().as_deref(), Some(PLAYBACK_FAILED_MESSAGE));
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_finite_absolute_seek_is_ignored() {
        let (controller, engine) =
            ready_controller(EngineStatus::loaded(0.0, Some(60_000.0), false)).await;

        controller.seek_absolute(f64::NAN).await.unwrap();
        controller.seek_absolute(f64::INFINITY).await.unwrap();

        assert!(engine.last_handle().unwrap().seeks().is_empty());
    }

    #[tokio::test]
    async fn test_slider_seek_policies() {
        for (policy, playing, expect_pause, expect_play) in [
            (AfterSeek::KeepState, false, 1, 0),
            (AfterSeek::KeepState, true, 0, 0),
            (AfterSeek::Pause, true, 1, 0),
            (AfterSeek::Resume, false, 0, 1),
        ] {
            let engine = Arc::new(MockAudioEngine::new());
            engine.set_initial_status(EngineStatus::loaded(0.0, Some(60_000.0), playing));
            let controller = PlaybackController::new(
                engine.clone(),
                PlayerConfig {
                    after_seek: policy,
                    ..test_config()
                },
                tokio::runtime::Handle::current(),
            );
            controller.load("https://example.com/a.mp3").await.unwrap();
            let handle = engine.last_handle().unwrap();

            controller.seek_from_slider(30.0).await.unwrap();

            assert_eq!(handle.seeks(), vec![30_000], "{:?}", policy);
            assert_eq!(handle.pause_count(), expect_pause, "{:?}", policy);
            assert_eq!(handle.play_count(), expect_play, "{:?}", policy);
            assert_eq!(controller.snapshot().position_seconds, 30.0);
        }
    }

    #[tokio::test]
    async fn test_late_load_after_unmount_is_released() {
        let engine = Arc::new(MockAudioEngine::new());
        engine.set_create_delay(Duration::from_millis(50));
        let controller = PlaybackController::new(
            engine.clone(),
            test_config(),
            tokio::runtime::Handle::current(),
        );

        let loading = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.load("https://example.com/a.mp3").await })
        };
        tick().await;
        controller.unmount().await;
        loading.await.unwrap().unwrap();

        assert_eq!(controller.phase(), PlaybackPhase::Idle);
        assert_eq!(engine.open_handle_count(), 0);
        assert!(engine.last_handle().unwrap().is_unloaded());
        assert!(matches!(
            controller.load("https://example.com/a.mp3").await,
            Err(PlaybackError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_overlapping_loads_leave_one_handle() {
        let engine = Arc::new(MockAudioEngine::new());
        engine.set_create_delay(Duration::from_millis(20));
        let controller = PlaybackController::new(
            engine.clone(),
            test_config(),
            tokio::runtime::Handle::current(),
        );

        let first = controller.load("https://example.com/a.mp3");
        let second = controller.load("https://example.com/b.mp3");
        let (first, second) = tokio::join!(first, second);
        first.unwrap();
        second.unwrap();

        assert_eq!(engine.open_handle_count(), 1);
        assert_eq!(controller.phase(), PlaybackPhase::Ready);
    }

    #[test]
    fn test_after_seek_parsing() {
        assert_eq!("keep".parse::<AfterSeek>(), Ok(AfterSeek::KeepState));
        assert_eq!("Pause".parse::<AfterSeek>(), Ok(AfterSeek::Pause));
        assert_eq!("resume".parse::<AfterSeek>(), Ok(AfterSeek::Resume));
        assert!("loop".parse::<AfterSeek>().is_err());
    }
}
