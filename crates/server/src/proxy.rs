//! `/api/chat/:sessionId/*` passthrough to the session's chat agent.
//!
//! The request is forwarded with its method, headers, query and body to
//! `{agent_url}/agents/{sessionId}/{rest}`. The upstream response body is
//! streamed back unchanged so token streams reach the client as they arrive.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use cognicore_protocol::ApiResponse;
use tracing::{debug, error, warn};

use crate::state::AppState;

const AGENT_ROUTING_FAILED: &str = "Agent routing failed";

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::HOST
        || name == header::CONNECTION
        || name == header::CONTENT_LENGTH
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
        || name.as_str() == "keep-alive"
}

fn routing_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error(AGENT_ROUTING_FAILED)),
    )
        .into_response()
}

pub async fn proxy_chat(
    State(state): State<Arc<AppState>>,
    Path((session_id, rest)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let mut url = state.agent_endpoint(&session_id, &rest);
    if let Some(query) = query {
        url.push('?');
        url.push_str(&query);
    }

    let mut forwarded = HeaderMap::new();
    for (name, value) in headers.iter() {
        if !is_hop_by_hop(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }

    let mut request = state
        .agent_client
        .request(method.clone(), &url)
        .headers(forwarded);
    if method != Method::GET && method != Method::DELETE {
        request = request.body(body);
    }

    let upstream = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            error!(
                component = "proxy",
                event = "proxy.routing_failed",
                session_id = %session_id,
                url = %url,
                error = %e,
                "Agent routing error"
            );
            return routing_failed();
        }
    };

    debug!(
        component = "proxy",
        event = "proxy.forwarded",
        session_id = %session_id,
        method = %method,
        rest = %rest,
        status = %upstream.status(),
        "Forwarded chat request"
    );

    if method == Method::POST && rest == "chat" {
        if let Err(e) = state.store.touch(&session_id).await {
            warn!(
                component = "proxy",
                event = "proxy.touch_failed",
                session_id = %session_id,
                error = %e,
                "Failed to mark session active"
            );
        }
    }

    let mut response = Response::builder().status(upstream.status());
    if let Some(out) = response.headers_mut() {
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                out.append(name.clone(), value.clone());
            }
        }
    }
    match response.body(Body::from_stream(upstream.bytes_stream())) {
        Ok(response) => response,
        Err(e) => {
            error!(
                component = "proxy",
                event = "proxy.response_failed",
                session_id = %session_id,
                error = %e,
                "Failed to relay agent response"
            );
            routing_failed()
        }
    }
}
