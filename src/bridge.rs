use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, TransportErrorKind};
use crate::request::TransportRequest;
use crate::response::{Response, TransportResponse};
use crate::transport::{
    AuthChallenge, ChallengeDisposition, DelayedRequestDisposition, TaskId, TaskMetrics,
    TransportDelegate, TransportObserver, TransportSession, TransportTaskError,
};
use crate::Result;

type Completion = oneshot::Sender<Result<Response<Bytes>>>;

struct TaskEntry {
    buffer: BytesMut,
    completion: Option<Completion>,
    observer: Option<Arc<dyn TransportObserver>>,
}

/// Bridges the one-shot, callback-driven transport task into a single
/// awaitable result.
///
/// One registry entry exists per in-flight task: created before the task
/// starts (so an early completion callback can never miss it) and removed
/// exactly once on the terminal callback. Every non-terminal transport event
/// is forwarded to the task's observer and answered with the default
/// disposition.
pub struct TaskBridge {
    registry: Mutex<HashMap<TaskId, TaskEntry>>,
    next_task: AtomicU64,
}

impl Default for TaskBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBridge {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            next_task: AtomicU64::new(1),
        }
    }

    /// Number of tasks currently awaiting their terminal callback.
    pub fn active_tasks(&self) -> usize {
        self.lock_registry().len()
    }

    /// Starts one transport task and waits for its terminal callback.
    ///
    /// Dropping the returned future cancels the underlying task best-effort
    /// and discards any partial payload along with the registry entry.
    pub async fn run_task(
        self: Arc<Self>,
        session: &Arc<dyn TransportSession>,
        request: TransportRequest,
        observer: Option<Arc<dyn TransportObserver>>,
    ) -> Result<Response<Bytes>> {
        let task = TaskId(self.next_task.fetch_add(1, Ordering::Relaxed));
        let (completion, resolved) = oneshot::channel();

        self.lock_registry().insert(
            task,
            TaskEntry {
                buffer: BytesMut::new(),
                completion: Some(completion),
                observer,
            },
        );
        debug!(%task, url = %request.url, "starting transport task");
        session.start_task(task, request, Arc::clone(&self) as Arc<dyn TransportDelegate>);

        let mut guard = CancelOnDrop {
            bridge: Arc::clone(&self),
            session: Arc::clone(session),
            task,
            armed: true,
        };
        let outcome = resolved.await;
        guard.armed = false;
        drop(guard);

        match outcome {
            Ok(result) => result,
            // The sender was dropped without a terminal callback; treat it as
            // a transport-side abort.
            Err(_) => Err(Error::Transport {
                kind: TransportErrorKind::Other,
                message: "transport task ended without a terminal callback".to_owned(),
            }),
        }
    }

    fn lock_registry(&self) -> MutexGuard<'_, HashMap<TaskId, TaskEntry>> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn observer_for(&self, task: TaskId) -> Option<Arc<dyn TransportObserver>> {
        self.lock_registry()
            .get(&task)
            .and_then(|entry| entry.observer.clone())
    }
}

struct CancelOnDrop {
    bridge: Arc<TaskBridge>,
    session: Arc<dyn TransportSession>,
    task: TaskId,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.session.cancel_task(self.task);
        self.bridge.lock_registry().remove(&self.task);
        debug!(task = %self.task, "cancelled in-flight transport task");
    }
}

impl TransportDelegate for TaskBridge {
    fn on_data(&self, task: TaskId, chunk: Bytes) {
        let mut registry = self.lock_registry();
        if let Some(entry) = registry.get_mut(&task) {
            entry.buffer.extend_from_slice(&chunk);
        }
    }

    fn on_complete(
        &self,
        task: TaskId,
        response: Option<TransportResponse>,
        error: Option<TransportTaskError>,
    ) {
        let Some(mut entry) = self.lock_registry().remove(&task) else {
            return;
        };
        let Some(completion) = entry.completion.take() else {
            return;
        };

        if let Some(observer) = &entry.observer {
            observer.on_task_complete(task, error.as_ref());
        }

        let result = match error {
            Some(error) if error.kind == TransportErrorKind::Cancelled => Err(Error::Cancelled),
            Some(error) => Err(Error::Transport {
                kind: error.kind,
                message: error.message,
            }),
            None => match response {
                Some(response) => {
                    let data = entry.buffer.freeze();
                    Ok(Response::new(data, response, task))
                }
                None => Err(Error::MissingTransportResponse),
            },
        };
        // The receiver may be gone if the caller was cancelled first.
        let _ = completion.send(result);
    }

    fn on_redirect(
        &self,
        task: TaskId,
        response: &TransportResponse,
        new_request: TransportRequest,
    ) -> Option<TransportRequest> {
        if let Some(observer) = self.observer_for(task) {
            observer.on_redirect(task, response, &new_request);
        }
        Some(new_request)
    }

    fn on_challenge(&self, task: TaskId, challenge: &AuthChallenge) -> ChallengeDisposition {
        if let Some(observer) = self.observer_for(task) {
            observer.on_challenge(task, challenge);
        }
        ChallengeDisposition::PerformDefaultHandling
    }

    fn on_cache_response(&self, task: TaskId, proposed: &TransportResponse) -> bool {
        if let Some(observer) = self.observer_for(task) {
            observer.on_cache_response(task, proposed);
        }
        true
    }

    fn on_metrics(&self, task: TaskId, metrics: &TaskMetrics) {
        if let Some(observer) = self.observer_for(task) {
            observer.on_metrics(task, metrics);
        }
    }

    fn on_waiting_for_connectivity(&self, task: TaskId) {
        if let Some(observer) = self.observer_for(task) {
            observer.on_waiting_for_connectivity(task);
        }
    }

    fn on_delayed_request(
        &self,
        task: TaskId,
        request: &TransportRequest,
    ) -> DelayedRequestDisposition {
        if let Some(observer) = self.observer_for(task) {
            observer.on_delayed_request(task, request);
        }
        DelayedRequestDisposition::ContinueLoading
    }

    fn on_upload_progress(
        &self,
        task: TaskId,
        bytes_sent: u64,
        total_bytes_sent: u64,
        total_bytes_expected: Option<u64>,
    ) {
        if let Some(observer) = self.observer_for(task) {
            observer.on_upload_progress(task, bytes_sent, total_bytes_sent, total_bytes_expected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    fn request() -> TransportRequest {
        TransportRequest::new(
            Url::parse("https://api.example.com/v1/items").expect("url should parse"),
            Method::GET,
        )
    }

    /// Transport that never completes on its own; tests drive the delegate
    /// callbacks directly and only observe starts and cancels.
    #[derive(Default)]
    struct InertSession {
        cancelled: Mutex<Vec<TaskId>>,
        started: AtomicUsize,
    }

    impl TransportSession for InertSession {
        fn start_task(
            &self,
            _task: TaskId,
            _request: TransportRequest,
            _delegate: Arc<dyn TransportDelegate>,
        ) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn cancel_task(&self, task: TaskId) {
            self.cancelled.lock().expect("lock").push(task);
        }
    }

    fn setup() -> (Arc<TaskBridge>, Arc<InertSession>, Arc<dyn TransportSession>) {
        let bridge = Arc::new(TaskBridge::new());
        let inert = Arc::new(InertSession::default());
        let session: Arc<dyn TransportSession> = inert.clone();
        (bridge, inert, session)
    }

    #[tokio::test]
    async fn accumulated_chunks_form_the_response_payload() {
        let (bridge, _, session) = setup();
        let pending = bridge.clone().run_task(&session, request(), None);
        tokio::pin!(pending);
        // Poll once so the task registers and starts.
        futures::poll!(pending.as_mut());

        let task = TaskId(1);
        bridge.on_data(task, Bytes::from_static(b"hello "));
        bridge.on_data(task, Bytes::from_static(b"world"));
        bridge.on_complete(task, Some(TransportResponse::new(StatusCode::OK)), None);

        let response = pending.await.expect("task should succeed");
        assert_eq!(&response.data[..], b"hello world");
        assert_eq!(response.status, Some(StatusCode::OK));
        assert_eq!(bridge.active_tasks(), 0);
    }

    #[tokio::test]
    async fn completion_without_response_is_an_error() {
        let (bridge, _, session) = setup();
        let pending = bridge.clone().run_task(&session, request(), None);
        tokio::pin!(pending);
        futures::poll!(pending.as_mut());

        bridge.on_complete(TaskId(1), None, None);
        let error = pending.await.expect_err("no response object");
        assert!(matches!(error, Error::MissingTransportResponse));
    }

    #[tokio::test]
    async fn transport_error_resolves_the_call() {
        let (bridge, _, session) = setup();
        let pending = bridge.clone().run_task(&session, request(), None);
        tokio::pin!(pending);
        futures::poll!(pending.as_mut());

        bridge.on_complete(
            TaskId(1),
            None,
            Some(TransportTaskError::new(
                TransportErrorKind::Connect,
                "connection refused",
            )),
        );
        let error = pending.await.expect_err("transport failure");
        match error {
            Error::Transport { kind, message } => {
                assert_eq!(kind, TransportErrorKind::Connect);
                assert_eq!(message, "connection refused");
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[tokio::test]
    async fn data_after_completion_is_ignored() {
        let (bridge, _, session) = setup();
        let pending = bridge.clone().run_task(&session, request(), None);
        tokio::pin!(pending);
        futures::poll!(pending.as_mut());

        let task = TaskId(1);
        bridge.on_complete(task, Some(TransportResponse::new(StatusCode::OK)), None);
        // Late callbacks for a removed entry must be no-ops.
        bridge.on_data(task, Bytes::from_static(b"late"));
        bridge.on_complete(task, Some(TransportResponse::new(StatusCode::OK)), None);

        let response = pending.await.expect("task should succeed");
        assert!(response.data.is_empty());
        assert_eq!(bridge.active_tasks(), 0);
    }

    #[tokio::test]
    async fn dropping_the_call_cancels_the_task_and_clears_the_registry() {
        let (bridge, inert, session) = setup();
        {
            let pending = bridge.clone().run_task(&session, request(), None);
            tokio::pin!(pending);
            futures::poll!(pending.as_mut());
            assert_eq!(bridge.active_tasks(), 1);
        }
        assert_eq!(bridge.active_tasks(), 0);
        assert_eq!(inert.cancelled.lock().expect("lock").as_slice(), &[TaskId(1)]);
    }

    #[tokio::test]
    async fn concurrent_tasks_have_independent_entries() {
        let (bridge, _, session) = setup();

        let first = bridge.clone().run_task(&session, request(), None);
        let second = bridge.clone().run_task(&session, request(), None);
        tokio::pin!(first);
        tokio::pin!(second);
        futures::poll!(first.as_mut());
        futures::poll!(second.as_mut());
        assert_eq!(bridge.active_tasks(), 2);

        bridge.on_data(TaskId(1), Bytes::from_static(b"one"));
        bridge.on_data(TaskId(2), Bytes::from_static(b"two"));
        bridge.on_complete(TaskId(2), Some(TransportResponse::new(StatusCode::OK)), None);
        bridge.on_complete(
            TaskId(1),
            None,
            Some(TransportTaskError::new(TransportErrorKind::Read, "reset")),
        );

        assert!(first.await.is_err());
        let second = second.await.expect("second task should succeed");
        assert_eq!(&second.data[..], b"two");
        assert_eq!(bridge.active_tasks(), 0);
    }

    #[tokio::test]
    async fn cancelled_transport_error_maps_to_cancelled() {
        let (bridge, _, session) = setup();
        let pending = bridge.clone().run_task(&session, request(), None);
        tokio::pin!(pending);
        futures::poll!(pending.as_mut());

        bridge.on_complete(
            TaskId(1),
            None,
            Some(TransportTaskError::new(
                TransportErrorKind::Cancelled,
                "cancelled",
            )),
        );
        assert!(matches!(pending.await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn lifecycle_events_reach_the_observer_and_get_default_dispositions() {
        #[derive(Default)]
        struct CountingObserver {
            redirects: AtomicUsize,
            challenges: AtomicUsize,
            cache_proposals: AtomicUsize,
            completions: AtomicUsize,
        }

        impl TransportObserver for CountingObserver {
            fn on_redirect(
                &self,
                _task: TaskId,
                _response: &TransportResponse,
                _new_request: &TransportRequest,
            ) {
                self.redirects.fetch_add(1, Ordering::SeqCst);
            }

            fn on_challenge(&self, _task: TaskId, _challenge: &AuthChallenge) {
                self.challenges.fetch_add(1, Ordering::SeqCst);
            }

            fn on_cache_response(&self, _task: TaskId, _proposed: &TransportResponse) {
                self.cache_proposals.fetch_add(1, Ordering::SeqCst);
            }

            fn on_task_complete(&self, _task: TaskId, _error: Option<&TransportTaskError>) {
                self.completions.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (bridge, _, session) = setup();
        let observer = Arc::new(CountingObserver::default());
        let pending = bridge.clone().run_task(&session, request(), Some(observer.clone()));
        tokio::pin!(pending);
        futures::poll!(pending.as_mut());

        let task = TaskId(1);
        let redirect = bridge.on_redirect(task, &TransportResponse::new(StatusCode::FOUND), request());
        assert!(redirect.is_some(), "default disposition follows the redirect");
        let challenge = bridge.on_challenge(
            task,
            &AuthChallenge {
                method: "basic".to_owned(),
                host: "api.example.com".to_owned(),
                realm: None,
            },
        );
        assert_eq!(challenge, ChallengeDisposition::PerformDefaultHandling);
        assert!(bridge.on_cache_response(task, &TransportResponse::new(StatusCode::OK)));
        bridge.on_complete(task, Some(TransportResponse::new(StatusCode::OK)), None);

        pending.await.expect("task should succeed");
        assert_eq!(observer.redirects.load(Ordering::SeqCst), 1);
        assert_eq!(observer.challenges.load(Ordering::SeqCst), 1);
        assert_eq!(observer.cache_proposals.load(Ordering::SeqCst), 1);
        assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
    }
}
