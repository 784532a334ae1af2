//! Request execution engine over a pluggable byte transport.
//!
//! `reqproc` turns declarative request descriptors into transport requests,
//! decorates them with credentials, bridges callback-style transport tasks
//! into awaitable results, and retries failed attempts under a backoff
//! policy. It does not ship a transport: callers plug one in through the
//! [`TransportSession`] trait, which makes the whole pipeline testable with
//! scripted sessions.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use http::Method;
//! use reqproc::{
//!     RequestDescriptor, RequestProcessor, RetryStrategy, SendOptions, TransportSession,
//! };
//!
//! struct ListItems;
//!
//! impl RequestDescriptor for ListItems {
//!     fn domain_name(&self) -> String {
//!         "https://api.example.com".to_owned()
//!     }
//!
//!     fn path(&self) -> String {
//!         "v1/items".to_owned()
//!     }
//!
//!     fn method(&self) -> Method {
//!         Method::GET
//!     }
//! }
//!
//! # async fn run(session: Arc<dyn TransportSession>) -> reqproc::Result<()> {
//! let processor = RequestProcessor::builder(session)
//!     .retry_strategy(RetryStrategy::Default)
//!     .build();
//! let items: reqproc::Response<Vec<String>> =
//!     processor.send(&ListItems, SendOptions::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod bridge;
pub mod builder;
pub mod descriptor;
mod encode;
pub mod error;
pub mod processor;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use auth::{
    AuthenticationCredential, AuthenticationInterceptor, Authenticator, RequestInterceptor,
};
pub use bridge::TaskBridge;
pub use builder::{ConfigureRequest, RequestBuilder};
pub use descriptor::{CachePolicy, RequestBody, RequestDescriptor};
pub use error::{Error, TransportErrorKind};
pub use processor::{
    ProcessorDelegate, RequestProcessor, RequestProcessorBuilder, RetryPredicate, SendOptions,
};
pub use request::TransportRequest;
pub use response::{Response, TransportResponse};
pub use retry::{RetryPolicyStrategy, RetryStrategy};
pub use transport::{
    AuthChallenge, ChallengeDisposition, DelayedRequestDisposition, TaskId, TaskMetrics,
    TransportDelegate, TransportObserver, TransportSession, TransportTaskError,
};

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
