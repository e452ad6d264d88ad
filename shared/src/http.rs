use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accepts connections on `host:port` and serves each one with `service`.
///
/// Only returns if binding or accepting fails.
pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host, port, "Listening");
    let service_arc = Arc::new(service);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(%peer_addr, error = %e, "Connection closed with error");
            }
        });
    }
}

/// Plain-text response carrying the canonical reason phrase of `status`.
pub fn make_error_response(status: StatusCode) -> Response<Bytes> {
    let reason = status.canonical_reason().unwrap_or("Unknown error");
    let mut response = Response::new(Bytes::from(format!("{reason}\n")));
    *response.status_mut() = status;
    response
}

pub fn make_boxed_error_response<E: 'static>(status: StatusCode) -> Response<BoxBody<Bytes, E>> {
    let (parts, body) = make_error_response(status).into_parts();
    Response::from_parts(parts, boxed(body))
}

/// Serializes `value` into a JSON response with the given status.
///
/// Falls back to a bare 500 if the value cannot be serialized.
pub fn make_json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Bytes> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = Response::new(Bytes::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response body");
            make_error_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Wraps buffered bytes in a body type that can be returned from any service.
pub fn boxed<E: 'static>(bytes: Bytes) -> BoxBody<Bytes, E> {
    Full::new(bytes)
        .map_err(|e: Infallible| match e {})
        .boxed()
}
