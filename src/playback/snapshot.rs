use crate::playback::engine::EngineStatus;
use serde::Serialize;

/// Engine time units to seconds
pub fn millis_to_seconds(millis: f64) -> f64 {
    millis / 1000.0
}

/// Seconds to the whole milliseconds the engine seeks by
pub fn seconds_to_millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

/// A duration report is usable only when finite and positive
fn valid_duration_seconds(duration_millis: Option<f64>) -> Option<f64> {
    duration_millis
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .map(millis_to_seconds)
}

/// UI-facing projection of the engine state
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlaybackSnapshot {
    pub position_seconds: f64,
    /// 0 until the engine reports a finite, positive duration
    pub duration_seconds: f64,
    pub is_playing: bool,
    pub is_loaded: bool,
    pub load_error: Option<String>,
}

impl PlaybackSnapshot {
    /// Snapshot for a freshly created handle
    pub fn from_initial(status: &EngineStatus) -> Self {
        let mut snapshot = PlaybackSnapshot {
            is_loaded: true,
            ..Default::default()
        };
        snapshot.apply(status);
        snapshot
    }

    pub fn failed(message: impl Into<String>) -> Self {
        PlaybackSnapshot {
            load_error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Fold an engine report into the snapshot.
    ///
    /// A "not loaded" report only stops playback. Invalid durations never
    /// replace a known one.
    pub fn apply(&mut self, status: &EngineStatus) {
        if !status.is_loaded {
            self.is_playing = false;
            return;
        }

        self.is_playing = status.is_playing;
        if let Some(duration) = valid_duration_seconds(status.duration_millis) {
            self.duration_seconds = duration;
        }
        if status.position_millis.is_finite() {
            self.position_seconds = self.clamp(millis_to_seconds(status.position_millis));
        }
    }

    /// Clamp a target into `[0, duration]` (only the lower bound while the duration is unknown)
    pub fn clamp(&self, seconds: f64) -> f64 {
        if self.duration_seconds > 0.0 {
            seconds.clamp(0.0, self.duration_seconds)
        } else {
            seconds.max(0.0)
        }
    }

    /// Seek bar and skip buttons are enabled only with a known duration
    pub fn can_seek(&self) -> bool {
        self.is_loaded && self.duration_seconds > 0.0
    }
}
