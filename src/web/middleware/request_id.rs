//! Per-request tracing spans and request ids.
//!
//! Reuses an inbound `X-Request-Id` when the caller supplies a sane one, otherwise
//! generates a ULID. The resolved id is echoed back in the response header.

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;

use crate::utils::fmt_duration;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inbound ids longer than this, or with odd characters, are replaced.
const MAX_INBOUND_ID_LEN: usize = 64;

fn inbound_id(req: &Request) -> Option<String> {
    let value = req.headers().get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    let acceptable = !value.is_empty()
        && value.len() <= MAX_INBOUND_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    acceptable.then(|| value.to_owned())
}

fn log_response(method: &str, path: &str, status: StatusCode, start: Instant) {
    let duration = fmt_duration(start.elapsed());
    let status = status.as_u16();
    match status {
        200..=399 => tracing::debug!(method, path, status, duration, "Response"),
        400..=499 => tracing::info!(method, path, status, duration, "Response"),
        _ => tracing::warn!(method, path, status, duration, "Response"),
    }
}

#[derive(Clone)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, B> Service<Request> for RequestIdService<S>
where
    S: Service<Request, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let req_id = inbound_id(&req).unwrap_or_else(|| ulid::Ulid::new().to_string());

        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let span = tracing::info_span!("request", req_id = %req_id);
        let header_value = HeaderValue::from_str(&req_id).ok();
        let start = Instant::now();

        let future = self.inner.call(req);

        Box::pin(
            async move {
                let mut result = future.await;

                match result {
                    Ok(ref mut response) => {
                        log_response(&method, &path, response.status(), start);
                        if let Some(value) = header_value {
                            response.headers_mut().insert(REQUEST_ID_HEADER, value);
                        }
                    }
                    Err(ref e) => {
                        tracing::error!(method = %method, path = %path, error = ?e, "Request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
