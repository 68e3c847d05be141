pub mod detail;
pub mod home;
pub mod settings;

pub use detail::{AudioView, PlayerView, RecordView, RecordingDetailScreen, SKIP_SECONDS};
pub use home::{HomeScreen, HomeView, RecordingItem};
pub use settings::{PendingAction, SettingsScreen};
