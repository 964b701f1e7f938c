//! Extractor capturing where a request came from, for audit records.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, OriginalUri};
use axum::http::header::USER_AGENT;
use http::request::Parts;

use crate::audit::principal::Provenance;
use crate::web::middleware::client_ip;

/// Method, URL, client address and user agent of the current request.
pub struct RequestMeta(pub Provenance);

impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Nested routers strip their prefix from `parts.uri`.
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or(&parts.uri);
        let url = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let ip = client_ip::resolve(parts).map(|ip| ip.to_string());

        Ok(RequestMeta(Provenance::new(
            parts.method.as_str(),
            url,
            ip,
            user_agent,
        )))
    }
}
