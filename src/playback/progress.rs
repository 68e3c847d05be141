use crate::playback::snapshot::PlaybackSnapshot;

/// Phase of the controller's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// No engine handle
    Idle,
    /// Handle creation in flight
    Loading,
    /// Handle loaded, playing or paused
    Ready,
    /// Load rejected; retry with `load`
    Failed,
}

/// Updates published by the playback controller
#[derive(Debug, Clone)]
pub enum PlaybackProgress {
    StateChanged {
        phase: PlaybackPhase,
        snapshot: PlaybackSnapshot,
    },
    TrackCompleted,
    /// A transport command failed; the phase is unchanged
    OperationFailed {
        message: String,
    },
}
