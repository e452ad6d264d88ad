use crate::http::{boxed, make_boxed_error_response};
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// Liveness and readiness probes, served on a listener separate from traffic.
///
/// `/health` always answers `ok`. `/ready` answers `ok` only while `is_ready`
/// returns true.
pub struct AdminService<F, E> {
    is_ready: F,
    _error: PhantomData<fn() -> E>,
}

impl<F, E> AdminService<F, E>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F) -> Self {
        Self {
            is_ready,
            _error: PhantomData,
        }
    }

    fn respond(&self, method: &Method, path: &str) -> Response<BoxBody<Bytes, E>>
    where
        E: 'static,
    {
        if method != Method::GET {
            return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }

        let ok = || Response::new(boxed(Bytes::from_static(b"ok\n")));

        match path {
            "/health" => ok(),
            "/ready" if (self.is_ready)() => ok(),
            "/ready" => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
            _ => make_boxed_error_response(StatusCode::NOT_FOUND),
        }
    }
}

impl<F, E, B> Service<Request<B>> for AdminService<F, E>
where
    F: Fn() -> bool,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let response = self.respond(req.method(), req.uri().path());
        Box::pin(async move { Ok(response) })
    }
}
