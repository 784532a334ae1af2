use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::Result;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Supported shapes for a request payload.
#[derive(Clone, Debug)]
pub enum RequestBody {
    /// Raw bytes used directly as the request body.
    Raw(Bytes),
    /// A JSON value serialized before sending. Typed payloads enter through
    /// [`RequestBody::json`].
    Json(Value),
    /// A string-keyed map serialized as a JSON object with sorted keys.
    Map(BTreeMap<String, Value>),
}

impl RequestBody {
    /// Captures any serializable value as a JSON body.
    pub fn json<T>(payload: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(payload).map_err(|source| Error::Serialize { source })?;
        Ok(Self::Json(value))
    }
}

/// Caching directives carried on the transport request. The transport
/// collaborator decides how (or whether) to honor them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    #[default]
    UseProtocolCachePolicy,
    ReloadIgnoringLocalCacheData,
    ReturnCacheDataElseLoad,
    ReturnCacheDataDontLoad,
}

/// A type to which all request descriptors must conform.
///
/// A descriptor is an immutable, application-level description of what to
/// send. The processor rebuilds the transport request from the descriptor on
/// every attempt, so descriptors must stay cheap to read repeatedly.
pub trait RequestDescriptor: Send + Sync {
    /// The base address for the resource, e.g. `https://api.example.com`.
    fn domain_name(&self) -> String;

    /// The endpoint path appended to the domain.
    fn path(&self) -> String;

    /// The HTTP method.
    fn method(&self) -> Method;

    /// Headers copied onto the transport request.
    fn headers(&self) -> Option<BTreeMap<String, String>> {
        None
    }

    /// Query parameters appended to the request url.
    fn query_parameters(&self) -> Option<BTreeMap<String, Value>> {
        None
    }

    /// Whether the authentication interceptor must adapt the request.
    fn requires_authentication(&self) -> bool {
        false
    }

    /// Per-request timeout handed to the transport.
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// The request payload, if any.
    fn body(&self) -> Option<RequestBody> {
        None
    }

    /// Cache directive handed to the transport.
    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::default()
    }
}
