use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    HeaderMap, HeaderValue,
};
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes};
use hyper::service::Service;
use hyper::{Request, Response};
use serde_json::json;
use shared::http::{boxed, make_json_response};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use crate::classifier::classify;
use crate::config::Config;
use crate::errors::RelayError;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS, UPSTREAM_QUERIES};
use crate::query::{ResolvedQuery, extract_query};
use crate::request::IncomingRequest;
use crate::telemetry::{RequestMetadata, RestTelemetrySink, TelemetryEmitter, TelemetryRecord};
use crate::upstream::{StorefrontClient, UpstreamResult};

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";
const ALLOWED_HEADERS_WITH_AGENT: &str = "Content-Type, X-Agent-ID";
const USAGE: &str = r#"POST {"query": "<graphql>"} or GET ?query=<graphql>"#;

/// Relays storefront queries received on the main listener
///
/// Every path is handled the same way. `OPTIONS` answers preflight, `GET` and
/// `POST` are relayed, anything else is rejected with 405.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayServiceInner>,
}

struct RelayServiceInner {
    storefront: StorefrontClient,
    telemetry: Option<TelemetryEmitter>,
    require_query: bool,
}

impl RelayService {
    pub fn new(config: &Config) -> Self {
        let telemetry = config.telemetry.as_ref().map(|telemetry| {
            TelemetryEmitter::new(Arc::new(RestTelemetrySink::new(telemetry)))
        });

        Self::from_parts(
            StorefrontClient::new(&config.storefront),
            telemetry,
            config.require_query,
        )
    }

    pub fn from_parts(
        storefront: StorefrontClient,
        telemetry: Option<TelemetryEmitter>,
        require_query: bool,
    ) -> Self {
        RelayService {
            inner: Arc::new(RelayServiceInner {
                storefront,
                telemetry,
                require_query,
            }),
        }
    }

    /// Handles one request end to end.
    ///
    /// Returns as soon as the upstream has answered. Telemetry submission is
    /// left running in the background.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Bytes>
    where
        B: Body,
        B::Error: Display,
    {
        let started = Instant::now();
        let method = request.method().clone();

        let mut response = if method == Method::OPTIONS {
            Response::new(Bytes::new())
        } else if method == Method::GET || method == Method::POST {
            self.relay(request, started).await
        } else {
            make_json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &json!({"error": "Method not allowed"}),
            )
        };

        self.apply_cors(response.headers_mut());

        shared::counter!(REQUESTS, "status" => response.status().as_str().to_owned())
            .increment(1);
        shared::histogram!(REQUEST_DURATION, "method" => method_tag(&method))
            .record(started.elapsed().as_secs_f64());

        response
    }

    async fn relay<B>(&self, request: Request<B>, started: Instant) -> Response<Bytes>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = request.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let error = RelayError::RequestBodyError(e.to_string());
                tracing::warn!(error = %error, "Could not read request body");
                return make_json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": "Invalid request body", "message": error.to_string()}),
                );
            }
        };
        let request = IncomingRequest::from_parts(&parts, &bytes);

        let query = match extract_query(&request) {
            Some(query) => query,
            None if self.inner.require_query => return missing_query_response(&request),
            None => ResolvedQuery::default_query(),
        };
        let category = classify(&query);

        let result = self.inner.storefront.execute(&query).await;
        let outcome = result.outcome();
        let elapsed = started.elapsed();

        shared::counter!(
            UPSTREAM_QUERIES,
            "query_type" => category.as_str(),
            "success" => if outcome.success { "true" } else { "false" },
        )
        .increment(1);

        tracing::info!(
            method = %parts.method,
            origin = query.origin().as_str(),
            query_type = %category,
            success = outcome.success,
            product_count = outcome.product_count,
            elapsed_ms = elapsed.as_millis() as u64,
            error = outcome.error_message.as_deref(),
            "Relayed storefront query"
        );

        if let Some(emitter) = &self.inner.telemetry {
            let record = TelemetryRecord::build(
                RequestMetadata::from_request(&request),
                &query,
                category,
                &outcome,
                elapsed,
            );
            // Not joined
            drop(emitter.emit(record));
        }

        match result {
            UpstreamResult::Response { body, .. } => json_passthrough(body),
            UpstreamResult::Failed(message) => make_json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({"error": "Gateway error", "message": message}),
            ),
        }
    }

    fn apply_cors(&self, headers: &mut HeaderMap) {
        let allowed_headers = if self.inner.telemetry.is_some() {
            ALLOWED_HEADERS_WITH_AGENT
        } else {
            ALLOWED_HEADERS
        };

        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(allowed_headers),
        );
    }
}

// Extension methods share one tag.
fn method_tag(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::OPTIONS => "OPTIONS",
        _ => "other",
    }
}

/// Forwards upstream JSON bytes untouched with status 200.
fn json_passthrough(body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn missing_query_response(request: &IncomingRequest) -> Response<Bytes> {
    tracing::info!(method = %request.method(), "Rejected request without query");
    make_json_response(
        StatusCode::BAD_REQUEST,
        &json!({
            "error": "Missing query",
            "usage": USAGE,
            "received": {
                "method": request.method().as_str(),
                "body": request.body().to_value(),
            },
        }),
    )
}

impl<B> Service<Request<B>> for RelayService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Display + Send,
{
    type Response = Response<BoxBody<Bytes, RelayError>>;
    type Error = RelayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, request: Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move {
            let (parts, body) = service.handle(request).await.into_parts();
            Ok(Response::from_parts(parts, boxed(body)))
        })
    }
}
