//! Query resolution
//!
//! A query can arrive in three places. They are checked in this order and the
//! first non-empty string wins:
//!
//! 1. `query` field of a JSON object body
//! 2. `query` URL parameter
//! 3. `query` field of a raw string body that happens to contain JSON
//!
//! When none of them yields a query, [`DEFAULT_QUERY`] is used. Extraction
//! never fails: bodies that do not parse are treated as carrying no query.

use serde_json::Value;

use crate::request::{IncomingRequest, RequestBody};

/// The 30 most recently created products with their minimum price.
pub const DEFAULT_QUERY: &str = r#"{
  products(first: 30, sortKey: CREATED_AT, reverse: true) {
    edges {
      node {
        id
        title
        handle
        priceRange {
          minVariantPrice {
            amount
            currencyCode
          }
        }
      }
    }
  }
}"#;

/// Where a resolved query came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryOrigin {
    Body,
    QueryParam,
    RawBody,
    Default,
}

impl QueryOrigin {
    pub const fn as_str(&self) -> &'static str {
        match self {
            QueryOrigin::Body => "body",
            QueryOrigin::QueryParam => "query_param",
            QueryOrigin::RawBody => "raw_body",
            QueryOrigin::Default => "default",
        }
    }
}

/// A non-empty GraphQL query ready to be sent upstream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedQuery {
    text: String,
    origin: QueryOrigin,
}

impl ResolvedQuery {
    pub fn default_query() -> Self {
        Self {
            text: DEFAULT_QUERY.to_string(),
            origin: QueryOrigin::Default,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> QueryOrigin {
        self.origin
    }

    pub fn is_default(&self) -> bool {
        self.origin == QueryOrigin::Default
    }
}

/// Finds a caller-supplied query, if there is one.
pub fn extract_query(request: &IncomingRequest) -> Option<ResolvedQuery> {
    let found = |text: &str, origin| {
        Some(ResolvedQuery {
            text: text.to_string(),
            origin,
        })
    };

    if let RequestBody::Json(body) = request.body()
        && let Some(text) = query_field(body)
    {
        return found(text, QueryOrigin::Body);
    }

    if let Some(text) = request.param("query").filter(|text| !text.is_empty()) {
        return found(text, QueryOrigin::QueryParam);
    }

    let raw = match request.body() {
        RequestBody::Raw(raw) => Some(raw.as_str()),
        // A JSON body that decoded to a string is itself an encoded payload
        RequestBody::Json(Value::String(raw)) => Some(raw.as_str()),
        _ => None,
    };

    if let Some(raw) = raw
        && let Ok(parsed) = serde_json::from_str::<Value>(raw)
        && let Some(text) = query_field(&parsed)
    {
        return found(text, QueryOrigin::RawBody);
    }

    None
}

/// Like [`extract_query`], falling back to [`DEFAULT_QUERY`].
pub fn resolve_query(request: &IncomingRequest) -> ResolvedQuery {
    extract_query(request).unwrap_or_else(ResolvedQuery::default_query)
}

fn query_field(value: &Value) -> Option<&str> {
    value
        .as_object()?
        .get("query")?
        .as_str()
        .filter(|text| !text.is_empty())
}
