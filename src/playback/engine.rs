use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Failed to load audio: {0}")]
    Load(String),
    #[error("Engine command failed: {0}")]
    Command(String),
    #[error("Failed to unload audio: {0}")]
    Unload(String),
}

/// Raw status reported by the audio engine.
///
/// Times are in engine units (milliseconds). The engine is free to report
/// NaN or zero for the duration while it is still buffering.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub is_loaded: bool,
    pub is_playing: bool,
    pub position_millis: f64,
    pub duration_millis: Option<f64>,
    pub did_just_finish: bool,
}

impl EngineStatus {
    pub fn loaded(position_millis: f64, duration_millis: Option<f64>, is_playing: bool) -> Self {
        Self {
            is_loaded: true,
            is_playing,
            position_millis,
            duration_millis,
            did_just_finish: false,
        }
    }

    pub fn not_loaded() -> Self {
        Self {
            is_loaded: false,
            is_playing: false,
            position_millis: 0.0,
            duration_millis: None,
            did_just_finish: false,
        }
    }

    pub fn finished(duration_millis: f64) -> Self {
        Self {
            is_loaded: true,
            is_playing: false,
            position_millis: duration_millis,
            duration_millis: Some(duration_millis),
            did_just_finish: true,
        }
    }
}

/// Options passed to [`AudioEngine::create`]
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub should_play: bool,
    pub progress_update_interval: Duration,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            should_play: false,
            progress_update_interval: Duration::from_millis(500),
        }
    }
}

pub type StatusListener = Arc<dyn Fn(EngineStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Platform playback library entry point
#[async_trait::async_trait]
pub trait AudioEngine: Send + Sync {
    /// Open `url` and return the handle together with its first status
    async fn create(
        &self,
        url: &str,
        options: CreateOptions,
    ) -> Result<(Arc<dyn EngineHandle>, EngineStatus), EngineError>;
}

/// One loaded, playable asset
#[async_trait::async_trait]
pub trait EngineHandle: Send + Sync {
    async fn play(&self) -> Result<(), EngineError>;
    async fn pause(&self) -> Result<(), EngineError>;
    async fn seek(&self, position_millis: u64) -> Result<(), EngineError>;
    async fn status(&self) -> Result<EngineStatus, EngineError>;

    /// Register a status listener. Implementations must not invoke the
    /// listener from inside this call.
    fn add_listener(&self, listener: StatusListener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);

    async fn unload(&self) -> Result<(), EngineError>;
}
