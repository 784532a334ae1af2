use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::TransportErrorKind;
use crate::request::TransportRequest;
use crate::response::TransportResponse;

/// Identity of one in-flight transport task. Allocated by the bridge before
/// the task starts and used to route delegate callbacks back to the awaiting
/// caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "task-{}", self.0)
    }
}

/// A terminal failure reported by the transport for one task.
#[derive(Clone, Debug)]
pub struct TransportTaskError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportTaskError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportTaskError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for TransportTaskError {}

/// A server authentication challenge surfaced mid-task.
#[derive(Clone, Debug)]
pub struct AuthChallenge {
    pub method: String,
    pub host: String,
    pub realm: Option<String>,
}

/// How the transport should answer an [`AuthChallenge`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChallengeDisposition {
    #[default]
    PerformDefaultHandling,
    CancelAuthenticationChallenge,
    RejectProtectionSpace,
}

/// How the transport should proceed with a delayed request.
#[derive(Clone, Debug, Default)]
pub enum DelayedRequestDisposition {
    #[default]
    ContinueLoading,
    Cancel,
}

/// Timing data collected by the transport for one finished task.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskMetrics {
    pub task_interval: Duration,
    pub redirect_count: u32,
}

/// The one-shot, callback-driven transport primitive this crate orchestrates.
///
/// Implementations own connection management, TLS, caching, and scheduling.
/// The contract is small: `start_task` begins exactly one task which reports
/// progress through the given [`TransportDelegate`] and ends with at most one
/// terminal `on_complete` callback; `cancel_task` is a best-effort request to
/// stop early, which the transport acknowledges through the normal terminal
/// callback with a cancellation error.
pub trait TransportSession: Send + Sync + 'static {
    fn start_task(
        &self,
        task: TaskId,
        request: TransportRequest,
        delegate: Arc<dyn TransportDelegate>,
    );

    fn cancel_task(&self, task: TaskId);
}

/// Callbacks the transport invokes while a task runs.
///
/// Methods returning a disposition must be answered for the task to make
/// progress; the bridge always answers with the default disposition after
/// notifying the external observer.
pub trait TransportDelegate: Send + Sync {
    /// A chunk of response payload arrived.
    fn on_data(&self, task: TaskId, chunk: Bytes);

    /// The terminal callback. At most one per task; `error` and `response`
    /// are mutually exclusive on well-behaved transports.
    fn on_complete(
        &self,
        task: TaskId,
        response: Option<TransportResponse>,
        error: Option<TransportTaskError>,
    );

    /// The server answered with a redirect; returning `None` stops following.
    fn on_redirect(
        &self,
        task: TaskId,
        response: &TransportResponse,
        new_request: TransportRequest,
    ) -> Option<TransportRequest>;

    /// The server issued an authentication challenge.
    fn on_challenge(&self, task: TaskId, challenge: &AuthChallenge) -> ChallengeDisposition;

    /// The transport proposes caching the response; returning `false` skips it.
    fn on_cache_response(&self, task: TaskId, proposed: &TransportResponse) -> bool;

    /// Timing data for the finished task.
    fn on_metrics(&self, task: TaskId, metrics: &TaskMetrics);

    /// The task is paused waiting for network connectivity.
    fn on_waiting_for_connectivity(&self, task: TaskId);

    /// The transport delayed the request (e.g. resource constraints) and asks
    /// how to proceed.
    fn on_delayed_request(
        &self,
        task: TaskId,
        request: &TransportRequest,
    ) -> DelayedRequestDisposition;

    /// Upload progress for the request body.
    fn on_upload_progress(
        &self,
        task: TaskId,
        bytes_sent: u64,
        total_bytes_sent: u64,
        total_bytes_expected: Option<u64>,
    );
}

/// External observer of transport lifecycle events for one task.
///
/// Every delegate event except data accumulation is forwarded here before the
/// bridge answers the transport with the default disposition. All methods
/// default to no-ops so observers implement only what they care about.
pub trait TransportObserver: Send + Sync {
    fn on_redirect(
        &self,
        _task: TaskId,
        _response: &TransportResponse,
        _new_request: &TransportRequest,
    ) {
    }

    fn on_challenge(&self, _task: TaskId, _challenge: &AuthChallenge) {}

    fn on_cache_response(&self, _task: TaskId, _proposed: &TransportResponse) {}

    fn on_metrics(&self, _task: TaskId, _metrics: &TaskMetrics) {}

    fn on_waiting_for_connectivity(&self, _task: TaskId) {}

    fn on_delayed_request(&self, _task: TaskId, _request: &TransportRequest) {}

    fn on_upload_progress(
        &self,
        _task: TaskId,
        _bytes_sent: u64,
        _total_bytes_sent: u64,
        _total_bytes_expected: Option<u64>,
    ) {
    }

    fn on_task_complete(&self, _task: TaskId, _error: Option<&TransportTaskError>) {}
}
