use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classifies failures reported by the transport primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    TimedOut,
    Cancelled,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// `Error` is the error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("descriptor does not form a valid request url: {url}")]
    BadUrl { url: String },
    #[error("authentication required but no credential is set")]
    MissingCredential,
    #[error("transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    #[error("request was cancelled")]
    Cancelled,
    #[error("transport task completed without a response")]
    MissingTransportResponse,
    #[error("invalid header name: {name}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to serialize request payload: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("response rejected by validator (status {status:?}): {message}")]
    Validation {
        status: Option<u16>,
        message: String,
    },
    #[error("authentication failure: {source}")]
    Auth {
        #[source]
        source: BoxError,
    },
    #[error("retry limit exceeded after {attempts} attempts: {source}")]
    RetryLimitExceeded {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },
    #[error("failed to decode response payload: {source}; body={body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl Error {
    /// Build-time failures are terminal for a send call: every attempt would
    /// rebuild the request from the same descriptor and fail identically.
    pub(crate) const fn is_build_failure(&self) -> bool {
        matches!(
            self,
            Self::BadUrl { .. }
                | Self::InvalidHeaderName { .. }
                | Self::InvalidHeaderValue { .. }
                | Self::Serialize { .. }
        )
    }
}
