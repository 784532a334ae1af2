use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::StatusCode;
use rand::Rng;
use tracing::warn;

use crate::error::Error;
use crate::response::Response;

/// Reusable backoff schedule: how many retries and how long to wait between
/// them.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicyStrategy {
    /// Fixed delay between attempts.
    Constant { retry: u32, duration: Duration },
    /// Delay grows by `multiplier` per attempt, capped at `max_duration`,
    /// with up to `jitter` of random extra delay added on top.
    Exponential {
        retry: u32,
        multiplier: f64,
        duration: Duration,
        max_duration: Duration,
        jitter: Duration,
    },
}

impl RetryPolicyStrategy {
    /// The stock policy: five retries, one second apart.
    pub fn default_constant() -> Self {
        Self::Constant {
            retry: 5,
            duration: Duration::from_secs(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            Self::Constant { retry, .. } | Self::Exponential { retry, .. } => *retry,
        }
    }

    /// Delay before re-running after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Constant { duration, .. } => *duration,
            Self::Exponential {
                multiplier,
                duration,
                max_duration,
                jitter,
                ..
            } => {
                // Clamp before leaving the float domain; the raw product can
                // exceed what Duration can represent.
                let scaled = (duration.as_secs_f64() * multiplier.powi(attempt as i32))
                    .min(max_duration.as_secs_f64());
                let base = Duration::from_secs_f64(scaled);
                if jitter.is_zero() {
                    base
                } else {
                    base + rand::thread_rng().gen_range(Duration::ZERO..*jitter)
                }
            }
        }
    }
}

/// Processor-level retry selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RetryStrategy {
    /// Single attempt, no retry loop.
    #[default]
    None,
    /// [`RetryPolicyStrategy::default_constant`].
    Default,
    Custom(RetryPolicyStrategy),
}

impl RetryStrategy {
    pub(crate) fn policy(&self) -> Option<RetryPolicyStrategy> {
        match self {
            Self::None => None,
            Self::Default => Some(RetryPolicyStrategy::default_constant()),
            Self::Custom(policy) => Some(policy.clone()),
        }
    }
}

/// Why a single attempt did not produce a final response.
///
/// `RedoAfterRefresh` is a control signal, not an error: the credential was
/// refreshed after an authentication failure and the attempt should simply run
/// again. It only degrades into an error when no attempts remain.
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    RedoAfterRefresh { status: Option<StatusCode> },
    Error(Error),
}

impl AttemptFailure {
    pub(crate) fn into_error(self) -> Error {
        match self {
            Self::RedoAfterRefresh { status } => Error::Validation {
                status: status.map(|status| status.as_u16()),
                message: "authentication failed after credential refresh".to_owned(),
            },
            Self::Error(error) => error,
        }
    }

    fn is_retryable(&self, should_retry: &(dyn for<'a> Fn(&'a Error) -> bool + Send + Sync)) -> bool {
        match self {
            Self::RedoAfterRefresh { .. } => true,
            Self::Error(error) => should_retry(error),
        }
    }
}

/// How the retry loop ended without a response.
#[derive(Debug)]
pub(crate) enum RetryError {
    LimitExceeded { attempts: u32, source: Error },
    NotRetryable(Error),
}

pub(crate) type AttemptFn<'a> =
    Box<dyn FnMut() -> BoxFuture<'a, Result<Response<Bytes>, AttemptFailure>> + Send + 'a>;

/// Drives a fallible attempt under a backoff schedule.
#[async_trait]
pub(crate) trait RetryPolicyService: Send + Sync {
    async fn run(
        &self,
        policy: &RetryPolicyStrategy,
        should_retry: &(dyn for<'a> Fn(&'a Error) -> bool + Send + Sync),
        operation: AttemptFn<'_>,
    ) -> Result<Response<Bytes>, RetryError>;
}

/// Default [`RetryPolicyService`]: sleeps the policy delay between attempts
/// and gives up after `max_retries` re-runs.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BackoffRetryService;

#[async_trait]
impl RetryPolicyService for BackoffRetryService {
    async fn run(
        &self,
        policy: &RetryPolicyStrategy,
        should_retry: &(dyn for<'a> Fn(&'a Error) -> bool + Send + Sync),
        mut operation: AttemptFn<'_>,
    ) -> Result<Response<Bytes>, RetryError> {
        let max_retries = policy.max_retries();
        for attempt in 0..=max_retries {
            match operation().await {
                Ok(response) => return Ok(response),
                Err(failure) => {
                    if !failure.is_retryable(should_retry) {
                        return Err(RetryError::NotRetryable(failure.into_error()));
                    }
                    if attempt == max_retries {
                        return Err(RetryError::LimitExceeded {
                            attempts: attempt + 1,
                            source: failure.into_error(),
                        });
                    }
                    let delay = policy.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        unreachable!("retry loop returns from within");
    }
}
