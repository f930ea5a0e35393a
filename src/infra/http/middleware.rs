use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

const TARGET: &str = "pagegate::http::response";

/// Per-request data shared with handlers through request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    request.extensions_mut().insert(RequestContext {
        request_id: Uuid::new_v4().to_string(),
    });
    next.run(request).await
}

/// Log 4xx and 5xx responses along with any error report the handler attached.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let failure = Failure::from_report(
        status,
        response.extensions_mut().remove::<ErrorReport>(),
        started.elapsed().as_millis(),
    );
    if status.is_server_error() {
        error!(
            target = TARGET,
            status = failure.status,
            method = %method,
            path = %path,
            elapsed_ms = failure.elapsed_ms,
            source = failure.source,
            detail = %failure.detail,
            chain = ?failure.chain,
            request_id = %request_id,
            "Page request failed"
        );
    } else {
        warn!(
            target = TARGET,
            status = failure.status,
            method = %method,
            path = %path,
            elapsed_ms = failure.elapsed_ms,
            source = failure.source,
            detail = %failure.detail,
            request_id = %request_id,
            "Page request rejected"
        );
    }

    response
}

struct Failure {
    status: u16,
    elapsed_ms: u128,
    source: &'static str,
    detail: String,
    chain: Vec<String>,
}

impl Failure {
    fn from_report(status: StatusCode, report: Option<ErrorReport>, elapsed_ms: u128) -> Self {
        let (source, chain) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = chain.first().cloned().unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("no diagnostic available")
                .to_string()
        });
        Self {
            status: status.as_u16(),
            elapsed_ms,
            source,
            detail,
            chain,
        }
    }
}
