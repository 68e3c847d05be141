pub mod controller;
pub mod engine;
pub mod progress;
pub mod snapshot;

pub use controller::{AfterSeek, PlaybackController, PlaybackError, PlayerConfig};
pub use engine::{AudioEngine, CreateOptions, EngineError, EngineHandle, EngineStatus};
pub use progress::{PlaybackPhase, PlaybackProgress};
pub use snapshot::PlaybackSnapshot;
