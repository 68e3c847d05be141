// Test support utilities for both unit and integration tests

use crate::auth::{AuthError, IdentityProvider, User};
use crate::playback::engine::{
    AudioEngine, CreateOptions, EngineError, EngineHandle, EngineStatus, ListenerId,
    StatusListener,
};
use crate::recordings::models::{ProcessingStatus, Recording};
use crate::recordings::repository::{RecordRepository, RepositoryError};
use crate::recordings::storage::{ObjectStore, StorageError};
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct HandleState {
    status: EngineStatus,
    listeners: Vec<(ListenerId, StatusListener)>,
    last_listener: Option<StatusListener>,
    seeks: Vec<u64>,
    play_count: usize,
    pause_count: usize,
    unload_count: usize,
    unloaded: bool,
    fail_unload: bool,
    fail_transport: bool,
}

/// In-memory engine handle that records every command it receives.
///
/// Status reports are delivered only when a test calls [`MockEngineHandle::emit`].
pub struct MockEngineHandle {
    state: Mutex<HandleState>,
    next_listener: AtomicU64,
}

impl MockEngineHandle {
    fn new(status: EngineStatus) -> Self {
        Self {
            state: Mutex::new(HandleState {
                status,
                listeners: Vec::new(),
                last_listener: None,
                seeks: Vec::new(),
                play_count: 0,
                pause_count: 0,
                unload_count: 0,
                unloaded: false,
                fail_unload: false,
                fail_transport: false,
            }),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Deliver `status` to every registered listener
    pub fn emit(&self, status: EngineStatus) {
        let listeners: Vec<StatusListener> = {
            let mut state = self.state.lock().unwrap();
            state.status = status.clone();
            state.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in listeners {
            listener(status.clone());
        }
    }

    /// The most recently registered listener, even if it has been removed since
    pub fn captured_listener(&self) -> Option<StatusListener> {
        self.state.lock().unwrap().last_listener.clone()
    }

    pub fn seeks(&self) -> Vec<u64> {
        self.state.lock().unwrap().seeks.clone()
    }

    pub fn play_count(&self) -> usize {
        self.state.lock().unwrap().play_count
    }

    pub fn pause_count(&self) -> usize {
        self.state.lock().unwrap().pause_count
    }

    pub fn unload_count(&self) -> usize {
        self.state.lock().unwrap().unload_count
    }

    pub fn is_unloaded(&self) -> bool {
        self.state.lock().unwrap().unloaded
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap().listeners.len()
    }

    /// Make `unload` report an error (the handle is still torn down)
    pub fn fail_unload(&self) {
        self.state.lock().unwrap().fail_unload = true;
    }

    /// Make play, pause and seek report errors
    pub fn fail_transport(&self) {
        self.state.lock().unwrap().fail_transport = true;
    }

    fn transport(&self, apply: impl FnOnce(&mut HandleState)) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_transport {
            return Err(EngineError::Command("mock transport failure".to_string()));
        }
        if state.unloaded {
            return Err(EngineError::Command("handle is unloaded".to_string()));
        }
        apply(&mut state);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EngineHandle for MockEngineHandle {
    async fn play(&self) -> Result<(), EngineError> {
        self.transport(|state| {
            state.play_count += 1;
            state.status.is_playing = true;
        })
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.transport(|state| {
            state.pause_count += 1;
            state.status.is_playing = false;
        })
    }

    async fn seek(&self, position_millis: u64) -> Result<(), EngineError> {
        self.transport(|state| {
            state.seeks.push(position_millis);
            state.status.position_millis = position_millis as f64;
            state.status.did_just_finish = false;
        })
    }

    async fn status(&self) -> Result<EngineStatus, EngineError> {
        let state = self.state.lock().unwrap();
        if state.unloaded {
            return Ok(EngineStatus::not_loaded());
        }
        Ok(state.status.clone())
    }

    fn add_listener(&self, listener: StatusListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        let mut state = self.state.lock().unwrap();
        state.last_listener = Some(listener.clone());
        state.listeners.push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.state
            .lock()
            .unwrap()
            .listeners
            .retain(|(listener_id, _)| *listener_id != id);
    }

    async fn unload(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.unload_count += 1;
        state.unloaded = true;
        state.status = EngineStatus::not_loaded();
        if state.fail_unload {
            return Err(EngineError::Unload("mock unload failure".to_string()));
        }
        Ok(())
    }
}

struct EngineState {
    initial_status: EngineStatus,
    fail_next: Option<String>,
    create_delay: Duration,
    created_urls: Vec<String>,
    handles: Vec<Arc<MockEngineHandle>>,
}

/// Mock audio engine
///
/// Hands out [`MockEngineHandle`]s that start in the configured initial status.
pub struct MockAudioEngine {
    state: Mutex<EngineState>,
}

impl Default for MockAudioEngine {
    fn default() -> Self {
        MockAudioEngine {
            state: Mutex::new(EngineState {
                initial_status: EngineStatus::loaded(0.0, Some(60_000.0), false),
                fail_next: None,
                create_delay: Duration::ZERO,
                created_urls: Vec::new(),
                handles: Vec::new(),
            }),
        }
    }
}

impl MockAudioEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_initial_status(&self, status: EngineStatus) {
        self.state.lock().unwrap().initial_status = status;
    }

    /// Make the next `create` fail with `message`
    pub fn fail_next_create(&self, message: &str) {
        self.state.lock().unwrap().fail_next = Some(message.to_string());
    }

    pub fn set_create_delay(&self, delay: Duration) {
        self.state.lock().unwrap().create_delay = delay;
    }

    pub fn created_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().created_urls.clone()
    }

    pub fn last_handle(&self) -> Option<Arc<MockEngineHandle>> {
        self.state.lock().unwrap().handles.last().cloned()
    }

    /// Handles created and not yet unloaded
    pub fn open_handle_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .handles
            .iter()
            .filter(|handle| !handle.is_unloaded())
            .count()
    }
}

#[async_trait::async_trait]
impl AudioEngine for MockAudioEngine {
    async fn create(
        &self,
        url: &str,
        _options: CreateOptions,
    ) -> Result<(Arc<dyn EngineHandle>, EngineStatus), EngineError> {
        let delay = self.state.lock().unwrap().create_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_next.take() {
            return Err(EngineError::Load(message));
        }

        let initial = state.initial_status.clone();
        let handle = Arc::new(MockEngineHandle::new(initial.clone()));
        state.created_urls.push(url.to_string());
        state.handles.push(handle.clone());
        Ok((handle, initial))
    }
}

/// A completed recording with a playable URL, recorded 2024-05-01 06:30 UTC
pub fn sample_recording(id: &str, phone_number: &str) -> Recording {
    Recording {
        id: id.to_string(),
        phone_number: phone_number.to_string(),
        recorded_at: Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap(),
        duration: 60.0,
        audio_url: Some(format!("https://storage.example.com/{}.mp3", id)),
        transcript: Some("お電話ありがとうございます。".to_string()),
        summary: Some("予約の確認".to_string()),
        file_name: format!("{}.mp3", id),
        status: ProcessingStatus::Completed,
        created_at: None,
    }
}

/// In-memory record repository that counts the queries it serves
#[derive(Default)]
pub struct MockRecordRepository {
    recordings: Mutex<Vec<Recording>>,
    queries: AtomicUsize,
    failing: AtomicBool,
}

impl MockRecordRepository {
    pub fn with_recordings(recordings: Vec<Recording>) -> Self {
        Self {
            recordings: Mutex::new(recordings),
            ..Default::default()
        }
    }

    pub fn set_recordings(&self, recordings: Vec<Recording>) {
        *self.recordings.lock().unwrap() = recordings;
    }

    /// Replace a single recording by id
    pub fn update(&self, recording: Recording) {
        let mut recordings = self.recordings.lock().unwrap();
        match recordings.iter_mut().find(|r| r.id == recording.id) {
            Some(existing) => *existing = recording,
            None => recordings.push(recording),
        }
    }

    /// Make every query fail with a server error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn begin_query(&self) -> Result<(), RepositoryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Api {
                status: 500,
                message: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordRepository for MockRecordRepository {
    async fn list_recent(&self, limit: usize) -> Result<Vec<Recording>, RepositoryError> {
        self.begin_query()?;
        let mut recordings = self.recordings.lock().unwrap().clone();
        recordings.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        recordings.truncate(limit);
        Ok(recordings)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Recording>, RepositoryError> {
        self.begin_query()?;
        Ok(self
            .recordings
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn search_by_phone_prefix(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Recording>, RepositoryError> {
        self.begin_query()?;
        Ok(self
            .recordings
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.phone_number.starts_with(term))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Object store resolving every path under a fixed origin
pub struct MockObjectStore {
    failing: bool,
    requests: Mutex<Vec<String>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            failing: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_paths(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn playable_url(&self, path: &str) -> Result<String, StorageError> {
        self.requests.lock().unwrap().push(path.to_string());
        if self.failing {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(format!("https://storage.example.com/{}", path))
    }
}

/// Identity provider that accepts every credential until told otherwise
#[derive(Default)]
pub struct MockIdentityProvider {
    rejecting: AtomicBool,
    anonymous_counter: AtomicU64,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_all(&self) {
        self.rejecting.store(true, Ordering::SeqCst);
    }

    pub fn accept_all(&self) {
        self.rejecting.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AuthError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(AuthError::Rejected("MOCK_REJECTED".to_string()));
        }
        Ok(())
    }

    fn user(uid: String, email: Option<&str>) -> User {
        User {
            id_token: format!("token-{}", uid),
            uid,
            email: email.map(str::to_string),
            is_anonymous: email.is_none(),
            refresh_token: None,
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_in(&self, email: &str, _password: &str) -> Result<User, AuthError> {
        self.check()?;
        Ok(Self::user(format!("uid-{}", email), Some(email)))
    }

    async fn sign_in_anonymously(&self) -> Result<User, AuthError> {
        self.check()?;
        let n = self.anonymous_counter.fetch_add(1, Ordering::SeqCst);
        Ok(Self::user(format!("anon-{}", n), None))
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<User, AuthError> {
        self.check()?;
        Ok(Self::user(format!("uid-{}", email), Some(email)))
    }

    async fn sign_out(&self, _user: &User) -> Result<(), AuthError> {
        self.check()
    }
}
