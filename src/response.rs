use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::transport::TaskId;
use crate::Result;

/// The raw protocol-level result reported by the transport.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub url: Option<Url>,
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
}

impl TransportResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            url: None,
            status: Some(status),
            headers: HeaderMap::new(),
        }
    }
}

/// One completed attempt's result: accumulated payload plus the raw transport
/// response and the identity of the task that produced it.
#[derive(Clone, Debug)]
pub struct Response<T> {
    pub data: T,
    pub response: TransportResponse,
    pub task: TaskId,
    pub status: Option<StatusCode>,
}

impl<T> Response<T> {
    pub fn new(data: T, response: TransportResponse, task: TaskId) -> Self {
        let status = response.status;
        Self {
            data,
            response,
            task,
            status,
        }
    }

    /// Transforms the payload while keeping the envelope.
    pub fn map<U, F>(self, transform: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: transform(self.data),
            response: self.response,
            task: self.task,
            status: self.status,
        }
    }
}

const MAX_ERROR_BODY_LEN: usize = 2048;

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

impl Response<Bytes> {
    /// Decodes the payload as JSON into the caller's type.
    pub fn json<M>(&self) -> Result<M>
    where
        M: DeserializeOwned,
    {
        serde_json::from_slice(&self.data).map_err(|source| Error::Decode {
            source,
            body: truncate_body(&self.data),
        })
    }

    /// Lossy text view of the payload.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
