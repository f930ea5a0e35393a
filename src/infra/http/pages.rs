use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use tracing::instrument;

use crate::{
    application::{
        error::HttpError,
        render::{MarkdownPipeline, RenderError},
    },
    cache::{CacheGate, PageRequest, PageResponse},
    presentation::views::render_not_found_response,
};

use super::middleware::{RequestContext, log_responses, set_request_context};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub gate: Arc<CacheGate>,
    pub pipeline: Arc<MarkdownPipeline>,
}

impl HttpState {
    pub fn new(gate: CacheGate, pipeline: MarkdownPipeline) -> Self {
        Self {
            gate: Arc::new(gate),
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Every GET is a page lookup through the cache gate.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/{*path}", get(serve_page))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn serve_index(
    State(state): State<HttpState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
) -> Response {
    lookup_page(state, ctx, String::from("/"), &headers).await
}

/// The wildcard capture arrives percent-decoded, so `/my%20page` resolves
/// `my page.md`. Dot segments are rejected later by the pipeline.
async fn serve_page(
    State(state): State<HttpState>,
    Extension(ctx): Extension<RequestContext>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    lookup_page(state, ctx, format!("/{path}"), &headers).await
}

#[instrument(skip_all, fields(request_id = %ctx.request_id, path = %path))]
async fn lookup_page(
    state: HttpState,
    ctx: RequestContext,
    path: String,
    headers: &HeaderMap,
) -> Response {
    let request = PageRequest {
        path,
        if_modified_since: headers
            .get(IF_MODIFIED_SINCE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };

    let gate = Arc::clone(&state.gate);
    let pipeline = Arc::clone(&state.pipeline);
    let outcome = tokio::task::spawn_blocking(move || {
        let response = gate.handle(pipeline.as_ref(), &request);
        (request, response)
    })
    .await;

    match outcome {
        Ok((_, Ok(response))) => page_response(response),
        Ok((request, Err(RenderError::NotFound { .. }))) => {
            render_not_found_response(state.pipeline.site_title(), &request.path)
        }
        Ok((_, Err(err))) => HttpError::from(err).into_response(),
        Err(err) => HttpError::new(
            "infra::http::lookup_page",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            format!("page task failed: {err}"),
        )
        .into_response(),
    }
}

fn page_response(response: PageResponse) -> Response {
    match response {
        PageResponse::NotModified { last_modified } => {
            with_last_modified(StatusCode::NOT_MODIFIED.into_response(), &last_modified)
        }
        PageResponse::Cached(page) => {
            with_last_modified(html_response(page.body), &page.last_modified)
        }
        PageResponse::Rendered { body } => html_response(body),
    }
}

fn html_response(body: Bytes) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE))],
        body,
    )
        .into_response()
}

fn with_last_modified(mut response: Response, last_modified: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(last_modified) {
        response.headers_mut().insert(LAST_MODIFIED, value);
    }
    response
}
