use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;

use crate::descriptor::CachePolicy;

/// The protocol-level request handed to the transport primitive.
///
/// Built fresh from the descriptor on every attempt and never patched across
/// attempts, so a credential change can never leave a stale header behind.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Duration,
    pub cache_policy: CachePolicy,
}

impl TransportRequest {
    pub fn new(url: Url, method: Method) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_secs(60),
            cache_policy: CachePolicy::default(),
        }
    }

    /// Inserts a header, replacing any previous value for the same name.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Returns the header value as text, if present and valid UTF-8.
    pub fn header_text(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
