use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{debug, info_span, Instrument};

use crate::auth::RequestInterceptor;
use crate::builder::{ConfigureRequest, RequestBuilder};
use crate::bridge::TaskBridge;
use crate::descriptor::RequestDescriptor;
use crate::error::Error;
use crate::request::TransportRequest;
use crate::response::{truncate_body, Response};
use crate::retry::{
    AttemptFailure, AttemptFn, BackoffRetryService, RetryError, RetryPolicyService, RetryStrategy,
};
use crate::transport::{TransportObserver, TransportSession};
use crate::Result;

/// Caller-supplied retry gate. Returning `false` stops the loop for that
/// error.
pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Hooks into the attempt pipeline. All methods have working defaults.
#[async_trait]
pub trait ProcessorDelegate: Send + Sync {
    /// Last look at the request before it goes to the transport.
    async fn will_send_request(&self, _request: &mut TransportRequest) -> Result<()> {
        Ok(())
    }

    /// Decides whether a completed attempt counts as a success. The default
    /// accepts 2xx statuses and responses without a status line.
    async fn validate_response(&self, response: &Response<Bytes>) -> Result<()> {
        default_validate(response)
    }
}

pub(crate) fn default_validate(response: &Response<Bytes>) -> Result<()> {
    match response.status {
        Some(status) if !status.is_success() => Err(Error::Validation {
            status: Some(status.as_u16()),
            message: truncate_body(&response.data),
        }),
        _ => Ok(()),
    }
}

/// Per-call overrides for a single `send`.
#[derive(Clone, Default)]
pub struct SendOptions {
    retry_strategy: Option<RetryStrategy>,
    observer: Option<Arc<dyn TransportObserver>>,
    configure: Option<Arc<ConfigureRequest>>,
    should_retry: Option<RetryPredicate>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the processor-wide retry strategy for this call.
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    /// Receives transport lifecycle notifications for this call's tasks.
    pub fn observer(mut self, observer: Arc<dyn TransportObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runs last during every build of this call's request.
    pub fn configure(mut self, configure: Arc<ConfigureRequest>) -> Self {
        self.configure = Some(configure);
        self
    }

    /// Extra retry gate for this call, combined with the processor-wide one.
    pub fn should_retry(mut self, predicate: RetryPredicate) -> Self {
        self.should_retry = Some(predicate);
        self
    }
}

/// Executes descriptors end to end: build, authenticate, send, validate, and
/// retry until a final response or error.
///
/// Every attempt rebuilds the request from the descriptor, so a credential
/// refreshed between attempts is picked up by the next one.
pub struct RequestProcessor {
    builder: RequestBuilder,
    session: Arc<dyn TransportSession>,
    bridge: Arc<TaskBridge>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    delegate: Option<Arc<dyn ProcessorDelegate>>,
    retry_strategy: RetryStrategy,
    retry_service: Arc<dyn RetryPolicyService>,
    retry_evaluator: Option<RetryPredicate>,
}

/// Assembles a [`RequestProcessor`]. Only the session is required.
pub struct RequestProcessorBuilder {
    session: Arc<dyn TransportSession>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    delegate: Option<Arc<dyn ProcessorDelegate>>,
    retry_strategy: RetryStrategy,
    retry_service: Arc<dyn RetryPolicyService>,
    retry_evaluator: Option<RetryPredicate>,
}

impl RequestProcessorBuilder {
    pub fn new(session: Arc<dyn TransportSession>) -> Self {
        Self {
            session,
            interceptor: None,
            delegate: None,
            retry_strategy: RetryStrategy::None,
            retry_service: Arc::new(BackoffRetryService),
            retry_evaluator: None,
        }
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn ProcessorDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Processor-wide retry gate applied to every call.
    pub fn retry_evaluator(mut self, evaluator: RetryPredicate) -> Self {
        self.retry_evaluator = Some(evaluator);
        self
    }

    pub(crate) fn retry_service(mut self, service: Arc<dyn RetryPolicyService>) -> Self {
        self.retry_service = service;
        self
    }

    pub fn build(self) -> RequestProcessor {
        RequestProcessor {
            builder: RequestBuilder::new(),
            session: self.session,
            bridge: Arc::new(TaskBridge::new()),
            interceptor: self.interceptor,
            delegate: self.delegate,
            retry_strategy: self.retry_strategy,
            retry_service: self.retry_service,
            retry_evaluator: self.retry_evaluator,
        }
    }
}

impl RequestProcessor {
    pub fn builder(session: Arc<dyn TransportSession>) -> RequestProcessorBuilder {
        RequestProcessorBuilder::new(session)
    }

    /// Sends the descriptor and decodes the payload as JSON.
    pub async fn send<M, D>(&self, descriptor: &D, options: SendOptions) -> Result<Response<M>>
    where
        M: DeserializeOwned,
        D: RequestDescriptor + ?Sized,
    {
        let raw = self.send_raw(descriptor, options).await?;
        let decoded = raw.json::<M>()?;
        Ok(raw.map(|_| decoded))
    }

    /// Sends the descriptor and returns the raw payload.
    pub async fn send_raw<D>(&self, descriptor: &D, options: SendOptions) -> Result<Response<Bytes>>
    where
        D: RequestDescriptor + ?Sized,
    {
        let span = info_span!(
            "send",
            method = %descriptor.method(),
            path = %descriptor.path(),
        );
        self.perform(descriptor, &options).instrument(span).await
    }

    async fn perform<D>(&self, descriptor: &D, options: &SendOptions) -> Result<Response<Bytes>>
    where
        D: RequestDescriptor + ?Sized,
    {
        let strategy = options
            .retry_strategy
            .clone()
            .unwrap_or_else(|| self.retry_strategy.clone());
        let configure = options.configure.as_deref();
        let observer = options.observer.clone();

        let policy = match strategy.policy() {
            Some(policy) => policy,
            None => {
                return self
                    .attempt(descriptor, observer, configure)
                    .await
                    .map_err(AttemptFailure::into_error)
            }
        };

        let global = self.retry_evaluator.clone();
        let local = options.should_retry.clone();
        let should_retry = move |error: &Error| {
            if error.is_build_failure() {
                return false;
            }
            global.as_ref().map_or(true, |gate| gate(error))
                && local.as_ref().map_or(true, |gate| gate(error))
        };

        let operation: AttemptFn<'_> = Box::new(move || {
            let observer = observer.clone();
            Box::pin(self.attempt(descriptor, observer, configure))
        });

        match self.retry_service.run(&policy, &should_retry, operation).await {
            Ok(response) => Ok(response),
            Err(RetryError::NotRetryable(error)) => Err(error),
            Err(RetryError::LimitExceeded { attempts, source }) => {
                Err(Error::RetryLimitExceeded {
                    attempts,
                    source: Box::new(source),
                })
            }
        }
    }

    /// One full attempt. Authentication failures that were answered with a
    /// credential refresh surface as `RedoAfterRefresh` so the loop re-runs.
    async fn attempt<D>(
        &self,
        descriptor: &D,
        observer: Option<Arc<dyn TransportObserver>>,
        configure: Option<&ConfigureRequest>,
    ) -> std::result::Result<Response<Bytes>, AttemptFailure>
    where
        D: RequestDescriptor + ?Sized,
    {
        let mut request = self
            .builder
            .build(descriptor, configure)
            .map_err(AttemptFailure::Error)?;

        if descriptor.requires_authentication() {
            let interceptor = self
                .interceptor
                .as_ref()
                .ok_or(AttemptFailure::Error(Error::MissingCredential))?;
            interceptor
                .adapt(&mut request, &self.session)
                .await
                .map_err(AttemptFailure::Error)?;
        }

        if let Some(delegate) = &self.delegate {
            delegate
                .will_send_request(&mut request)
                .await
                .map_err(AttemptFailure::Error)?;
        }

        debug!(url = %request.url, "dispatching transport task");
        let sent = request.clone();
        let response = Arc::clone(&self.bridge)
            .run_task(&self.session, request, observer)
            .await
            .map_err(AttemptFailure::Error)?;

        if descriptor.requires_authentication() {
            if let Some(interceptor) = &self.interceptor {
                if interceptor.requires_refresh(&sent, &response.response) {
                    interceptor
                        .refresh(&sent, &response.response, &self.session)
                        .await
                        .map_err(AttemptFailure::Error)?;
                    debug!(status = ?response.status, "credential refreshed, attempt will re-run");
                    return Err(AttemptFailure::RedoAfterRefresh {
                        status: response.status,
                    });
                }
            }
        }

        // Validation is a delegate concern; without one, any completed
        // response is handed back as-is.
        if let Some(delegate) = &self.delegate {
            delegate
                .validate_response(&response)
                .await
                .map_err(AttemptFailure::Error)?;
        }

        Ok(response)
    }
}
