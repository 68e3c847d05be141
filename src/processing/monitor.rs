use crate::processing::client::{AcrClient, AcrError, ProcessAllResponse};
use crate::recordings::cache::CachedRepository;
use crate::subscription::Subscribers;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Progress of the current bulk-processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProcessingProgress {
    pub to_process: u64,
    pub processed: u64,
}

impl ProcessingProgress {
    /// Completed share in 0.0..=1.0; zero when there is nothing to process
    pub fn fraction(&self) -> f64 {
        if self.to_process == 0 {
            return 0.0;
        }
        self.processed as f64 / self.to_process as f64
    }

    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }
}

impl From<ProcessAllResponse> for ProcessingProgress {
    fn from(response: ProcessAllResponse) -> Self {
        Self {
            to_process: response.to_process,
            processed: response.processed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Started(ProcessingProgress),
    AlreadyRunning,
    /// A poll found `polled` newly processed recordings
    Updated { polled: u64 },
    Failed { message: String },
}

#[derive(Default)]
struct MonitorState {
    is_processing: bool,
    progress: Option<ProcessingProgress>,
    error: Option<&'static str>,
    last_token: Option<String>,
    polling: Option<JoinHandle<()>>,
}

struct Inner {
    client: AcrClient,
    cache: Option<CachedRepository>,
    state: Mutex<MonitorState>,
    events: Subscribers<MonitorEvent>,
}

impl Inner {
    async fn poll_once(&self) -> Result<u64, AcrError> {
        let token = self.state.lock().unwrap().last_token.clone();
        let response = self.client.poll(token.as_deref()).await?;

        if let Some(next) = response.start_page_token {
            self.state.lock().unwrap().last_token = Some(next);
        }

        if response.polled > 0 {
            info!("{} recordings were processed since the last poll", response.polled);
            if let Some(cache) = &self.cache {
                cache.invalidate().await;
            }
            self.events.publish(MonitorEvent::Updated {
                polled: response.polled,
            });
        }
        Ok(response.polled)
    }
}

/// Starts bulk processing runs and polls for their results.
///
/// Dropping the monitor stops polling.
pub struct ProcessingMonitor {
    inner: Arc<Inner>,
    poll_interval: Duration,
    runtime: tokio::runtime::Handle,
}

impl ProcessingMonitor {
    pub fn new(
        client: AcrClient,
        cache: Option<CachedRepository>,
        poll_interval: Duration,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                cache,
                state: Mutex::new(MonitorState::default()),
                events: Subscribers::new(),
            }),
            poll_interval,
            runtime: runtime_handle,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().unwrap().is_processing
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state.lock().unwrap().polling.is_some()
    }

    pub fn progress(&self) -> Option<ProcessingProgress> {
        self.inner.state.lock().unwrap().progress
    }

    /// User-facing message of the last failed run
    pub fn error(&self) -> Option<&'static str> {
        self.inner.state.lock().unwrap().error
    }

    pub fn last_token(&self) -> Option<String> {
        self.inner.state.lock().unwrap().last_token.clone()
    }

    pub fn subscribe(&self) -> tokio_mpsc::UnboundedReceiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    /// Start a run. Returns `Ok(None)` without calling the API when a run
    /// is already in progress.
    pub async fn process_all(&self) -> Result<Option<ProcessingProgress>, AcrError> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.is_processing {
                drop(state);
                info!("Processing is already running");
                self.inner.events.publish(MonitorEvent::AlreadyRunning);
                return Ok(None);
            }
            state.is_processing = true;
            state.error = None;
        }

        let response = match self.inner.client.process_all().await {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to start processing: {}", e);
                {
                    let mut state = self.inner.state.lock().unwrap();
                    state.is_processing = false;
                    state.error = Some(e.user_message());
                }
                self.inner.events.publish(MonitorEvent::Failed {
                    message: e.user_message().to_string(),
                });
                return Err(e);
            }
        };

        let progress = ProcessingProgress::from(response);
        info!(
            "Processing started: {}/{}",
            progress.processed, progress.to_process
        );
        self.inner.state.lock().unwrap().progress = Some(progress);
        self.inner.events.publish(MonitorEvent::Started(progress));

        if progress.to_process > 0 {
            self.start_polling();
        } else {
            self.inner.state.lock().unwrap().is_processing = false;
        }
        Ok(Some(progress))
    }

    /// Poll every `poll_interval` until stopped. No-op when already polling.
    pub fn start_polling(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.polling.is_some() {
            return;
        }

        let inner = self.inner.clone();
        let period = self.poll_interval.max(Duration::from_millis(1));
        debug!("Polling processing status every {:?}", period);
        state.polling = Some(self.runtime.spawn(async move {
            // First tick one period from now; the run was just started
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                // A failed poll is retried on the next tick
                if let Err(e) = inner.poll_once().await {
                    warn!("Polling processing status failed: {}", e);
                }
            }
        }));
    }

    pub fn stop_polling(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(task) = state.polling.take() {
            task.abort();
            state.is_processing = false;
            debug!("Stopped polling processing status");
        }
    }

    /// Poll once now, outside the timer
    pub async fn poll_now(&self) -> Result<u64, AcrError> {
        self.inner.poll_once().await
    }
}

impl Drop for ProcessingMonitor {
    fn drop(&mut self) {
        // The task holds its own `Arc<Inner>`, so it must be aborted here
        if let Ok(mut state) = self.inner.state.lock() {
            if let Some(task) = state.polling.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recordings::RecordRepository;
    use crate::test_support::{sample_recording, MockRecordRepository};
    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::{json, Value};

    #[derive(Clone, Default)]
    struct StubApi {
        to_process: u64,
        tokens: Arc<Mutex<Vec<Option<String>>>>,
        process_calls: Arc<Mutex<usize>>,
    }

    async fn spawn_api(api: StubApi) -> String {
        let app = Router::new()
            .route(
                "/process_all",
                post(|State(api): State<StubApi>| async move {
                    *api.process_calls.lock().unwrap() += 1;
                    Json(json!({ "to_process": api.to_process, "processed": 0 }))
                }),
            )
            .route(
                "/poll",
                post(|State(api): State<StubApi>, Json(body): Json<Value>| async move {
                    let token = body
                        .get("startPageToken")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    let mut tokens = api.tokens.lock().unwrap();
                    tokens.push(token);
                    Json(json!({ "polled": 1, "startPageToken": format!("t{}", tokens.len()) }))
                }),
            )
            .with_state(api);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn monitor(base_url: String, cache: Option<CachedRepository>, interval: Duration) -> ProcessingMonitor {
        ProcessingMonitor::new(
            AcrClient::new(base_url, Duration::from_secs(5)),
            cache,
            interval,
            tokio::runtime::Handle::current(),
        )
    }

    #[test]
    fn test_progress_fraction() {
        let none = ProcessingProgress::default();
        let some = ProcessingProgress {
            to_process: 3,
            processed: 2,
        };

        assert_eq!(none.fraction(), 0.0);
        assert_eq!(none.percent(), 0);
        assert_eq!(some.percent(), 67);
    }

    #[tokio::test]
    async fn test_nothing_to_process_skips_polling() {
        let base = spawn_api(StubApi::default()).await;
        let monitor = monitor(base, None, Duration::from_millis(10));

        let progress = monitor.process_all().await.unwrap().unwrap();

        assert_eq!(progress.to_process, 0);
        assert!(!monitor.is_polling());
        assert!(!monitor.is_processing());
    }

    #[tokio::test]
    async fn test_second_run_is_refused_while_polling() {
        let api = StubApi {
            to_process: 2,
            ..Default::default()
        };
        let base = spawn_api(api.clone()).await;
        let monitor = monitor(base, None, Duration::from_secs(60));
        let mut events = monitor.subscribe();

        monitor.process_all().await.unwrap();
        assert!(monitor.is_polling());
        assert_eq!(monitor.process_all().await.unwrap(), None);

        assert_eq!(*api.process_calls.lock().unwrap(), 1);
        assert!(matches!(events.recv().await, Some(MonitorEvent::Started(_))));
        assert_eq!(events.recv().await, Some(MonitorEvent::AlreadyRunning));

        monitor.stop_polling();
        assert!(!monitor.is_polling());
        assert!(!monitor.is_processing());
    }

    #[tokio::test]
    async fn test_poll_threads_token_and_invalidates_cache() {
        let api = StubApi::default();
        let base = spawn_api(api.clone()).await;
        let repository = Arc::new(MockRecordRepository::with_recordings(vec![sample_recording(
            "a", "0901",
        )]));
        let cache = CachedRepository::new(repository.clone());
        cache.list_recent(20).await.unwrap();
        let monitor = monitor(base, Some(cache.clone()), Duration::from_secs(60));

        assert_eq!(monitor.poll_now().await.unwrap(), 1);
        assert_eq!(monitor.poll_now().await.unwrap(), 1);

        assert_eq!(
            *api.tokens.lock().unwrap(),
            vec![None, Some("t1".to_string())]
        );
        assert_eq!(monitor.last_token().as_deref(), Some("t2"));

        cache.list_recent(20).await.unwrap();
        assert_eq!(repository.query_count(), 2);
    }

    #[tokio::test]
    async fn test_timer_polls_until_stopped() {
        let api = StubApi {
            to_process: 1,
            ..Default::default()
        };
        let base = spawn_api(api.clone()).await;
        let monitor = monitor(base, None, Duration::from_millis(20));

        monitor.process_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        monitor.stop_polling();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let polls = api.tokens.lock().unwrap().len();
        assert!(polls >= 2, "polled {} times", polls);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(api.tokens.lock().unwrap().len(), polls);
    }

    #[tokio::test]
    async fn test_dropping_monitor_stops_polling() {
        let api = StubApi {
            to_process: 1,
            ..Default::default()
        };
        let base = spawn_api(api.clone()).await;
        let monitor = monitor(base, None, Duration::from_millis(20));

        monitor.process_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        drop(monitor);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let polls = api.tokens.lock().unwrap().len();
        assert!(polls >= 1, "polled {} times", polls);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(api.tokens.lock().unwrap().len(), polls);
    }

    #[tokio::test]
    async fn test_failed_start_records_message() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let monitor = monitor(format!("http://{}", addr), None, Duration::from_secs(60));

        assert!(monitor.process_all().await.is_err());

        assert!(!monitor.is_processing());
        assert_eq!(monitor.error(), Some(crate::processing::client::CONNECTION_MESSAGE));
    }
}
