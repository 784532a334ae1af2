use std::collections::BTreeMap;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;

use crate::descriptor::RequestBody;
use crate::error::Error;
use crate::request::TransportRequest;
use crate::Result;

/// Characters percent-encoded in query components. Reserved and otherwise
/// unsafe characters, including space (so `a b` becomes `a%20b`, never `a+b`).
const QUERY_RESTRICTED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b':')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'!')
    .add(b'$')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b';')
    .add(b'=')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'%')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'~')
    .add(b'`');

/// Turns raw descriptor parameters into percent-encoded `(key, value)` pairs.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct QueryParametersFormatter;

impl QueryParametersFormatter {
    pub(crate) fn format(&self, parameters: &BTreeMap<String, Value>) -> Vec<(String, String)> {
        parameters
            .iter()
            .map(|(key, value)| (encode_component(key), self.format_value(value)))
            .collect()
    }

    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::String(text) => encode_component(text),
            Value::Array(_) | Value::Object(_) => encode_component(&canonical_json(value)),
            Value::Null => encode_component("null"),
            other => encode_component(&other.to_string()),
        }
    }
}

fn encode_component(component: &str) -> String {
    utf8_percent_encode(component, QUERY_RESTRICTED).to_string()
}

/// Serializes a JSON value with object keys in sorted order, so structurally
/// equal values produce byte-identical text regardless of construction order.
pub(crate) fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(key, _)| *key);
            out.push('{');
            for (index, (key, entry)) in entries.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(entry, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Applies already-encoded query pairs to the request url.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RequestParametersEncoder;

impl RequestParametersEncoder {
    pub(crate) fn encode(&self, pairs: &[(String, String)], request: &mut TransportRequest) {
        if pairs.is_empty() {
            return;
        }
        let query = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        request.url.set_query(Some(&query));
    }
}

/// Encodes the descriptor body onto the request.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RequestBodyEncoder;

impl RequestBodyEncoder {
    pub(crate) fn encode(&self, body: &RequestBody, request: &mut TransportRequest) -> Result<()> {
        match body {
            RequestBody::Raw(data) => {
                request.body = Some(data.clone());
            }
            RequestBody::Json(value) => {
                let encoded =
                    serde_json::to_vec(value).map_err(|source| Error::Serialize { source })?;
                request.body = Some(Bytes::from(encoded));
                self.set_json_content_type(request);
            }
            RequestBody::Map(map) => {
                let encoded =
                    serde_json::to_vec(map).map_err(|source| Error::Serialize { source })?;
                request.body = Some(Bytes::from(encoded));
                self.set_json_content_type(request);
            }
        }
        Ok(())
    }

    fn set_json_content_type(&self, request: &mut TransportRequest) {
        if !request.headers.contains_key(CONTENT_TYPE) {
            request
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
    }
}
