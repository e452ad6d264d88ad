//! Buffered view of an inbound request.
//!
//! The body is read once and classified up front so that query extraction and
//! telemetry can inspect the request without touching hyper types.

use http::header::{CONTENT_TYPE, HeaderMap};
use http::request::Parts;
use http::Method;
use hyper::body::Bytes;
use serde_json::Value;
use std::collections::HashMap;

/// Request body after content-type sniffing
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Empty,
    /// Declared as JSON and parsed successfully, or a form body turned into
    /// an object of string fields
    Json(Value),
    /// Anything else, decoded lossily as UTF-8
    Raw(String),
}

impl RequestBody {
    pub fn from_bytes(content_type: Option<&str>, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return RequestBody::Empty;
        }

        if content_type.is_some_and(is_json_content_type)
            && let Ok(value) = serde_json::from_slice(bytes)
        {
            return RequestBody::Json(value);
        }

        if content_type.is_some_and(is_form_content_type) {
            let fields = parse_params(std::str::from_utf8(bytes).ok())
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
            return RequestBody::Json(Value::Object(fields));
        }

        RequestBody::Raw(String::from_utf8_lossy(bytes).into_owned())
    }

    /// JSON rendering used when echoing the body back to the caller.
    pub fn to_value(&self) -> Value {
        match self {
            RequestBody::Empty => Value::Null,
            RequestBody::Json(value) => value.clone(),
            RequestBody::Raw(raw) => Value::String(raw.clone()),
        }
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    essence(content_type).eq_ignore_ascii_case("application/json")
}

fn is_form_content_type(content_type: &str) -> bool {
    essence(content_type).eq_ignore_ascii_case("application/x-www-form-urlencoded")
}

fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

#[derive(Clone, Debug)]
pub struct IncomingRequest {
    method: Method,
    body: RequestBody,
    params: HashMap<String, String>,
    headers: HeaderMap,
}

impl IncomingRequest {
    pub fn new(
        method: Method,
        body: RequestBody,
        params: HashMap<String, String>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            method,
            body,
            params,
            headers,
        }
    }

    pub fn from_parts(parts: &Parts, bytes: &Bytes) -> Self {
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());

        Self {
            method: parts.method.clone(),
            body: RequestBody::from_bytes(content_type, bytes),
            params: parse_params(parts.uri.query()),
            headers: parts.headers.clone(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Header value as a string; names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

// Repeated parameters keep their first value.
fn parse_params(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
    }
    params
}
