use hyper::body::Bytes;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::StorefrontConfig;
use crate::errors::{RelayError, Result};
use crate::query::ResolvedQuery;

pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Storefront-Access-Token";

#[derive(Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
}

/// Result of the single call made to the Storefront API
#[derive(Clone, Debug, PartialEq)]
pub enum UpstreamResult {
    /// The upstream answered with JSON. `body` holds the bytes exactly as
    /// received so they can be forwarded untouched.
    Response { body: Bytes, payload: Value },
    /// Transport failure or a body that is not JSON
    Failed(String),
}

/// What the relay learned from an [`UpstreamResult`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamOutcome {
    pub success: bool,
    pub product_count: u64,
    pub error_message: Option<String>,
}

impl UpstreamResult {
    /// Classifies the result.
    ///
    /// A payload with a top-level `errors` array is a failure even though the
    /// transport succeeded. Otherwise the product count comes from
    /// `data.products.edges`, or is 1 for a `data.product` lookup, or 0.
    pub fn outcome(&self) -> UpstreamOutcome {
        let payload = match self {
            UpstreamResult::Response { payload, .. } => payload,
            UpstreamResult::Failed(message) => {
                return UpstreamOutcome {
                    success: false,
                    product_count: 0,
                    error_message: Some(message.clone()),
                };
            }
        };

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            let message = errors
                .first()
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown GraphQL error");
            return UpstreamOutcome {
                success: false,
                product_count: 0,
                error_message: Some(message.to_string()),
            };
        }

        let data = payload.get("data");
        let product_count = if let Some(edges) = data
            .and_then(|data| data.pointer("/products/edges"))
            .and_then(Value::as_array)
        {
            edges.len() as u64
        } else if data
            .and_then(|data| data.get("product"))
            .is_some_and(Value::is_object)
        {
            1
        } else {
            0
        };

        UpstreamOutcome {
            success: true,
            product_count,
            error_message: None,
        }
    }
}

/// Client for the configured Storefront GraphQL endpoint
#[derive(Clone)]
pub struct StorefrontClient {
    client: reqwest::Client,
    url: Url,
    access_token: String,
}

impl StorefrontClient {
    pub fn new(config: &StorefrontConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &StorefrontConfig) -> Self {
        StorefrontClient {
            client,
            url: config.url.clone(),
            access_token: config.access_token.clone(),
        }
    }

    /// Sends `query` upstream once and buffers the full response.
    ///
    /// Never retries. Failures are captured in the result rather than returned.
    pub async fn execute(&self, query: &ResolvedQuery) -> UpstreamResult {
        match self.send(query.text()).await {
            Ok((body, payload)) => UpstreamResult::Response { body, payload },
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Storefront request failed");
                let message = match e {
                    RelayError::UpstreamRequestFailed(message) => message,
                    other => other.to_string(),
                };
                UpstreamResult::Failed(message)
            }
        }
    }

    async fn send(&self, query: &str) -> Result<(Bytes, Value)> {
        let response = self
            .client
            .post(self.url.clone())
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&GraphQLRequest { query })
            .send()
            .await
            .map_err(|e| RelayError::UpstreamRequestFailed(e.to_string()))?;

        tracing::debug!(status = %response.status(), "Storefront responded");

        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::UpstreamRequestFailed(e.to_string()))?;
        let payload = serde_json::from_slice(&body)?;

        Ok((body, payload))
    }
}
