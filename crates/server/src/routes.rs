//! REST surface of the session registry.
//!
//! Every endpoint answers with the `{success, data?, error?}` envelope.
//! Failures are logged here and mapped to a status plus a fixed message.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{any, delete, get, post, put};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::Local;
use cognicore_protocol::naming::{first_message_title, untitled_session_title};
use cognicore_protocol::{
    new_id, ApiResponse, ClearedPayload, CreateSessionRequest, CreatedSessionPayload,
    DeletedPayload, Session, SessionStats, TitlePayload, UpdateTitleRequest,
};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::prompt_builder::PromptError;
use crate::proxy::proxy_chat;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ApiResponse::error(message)))
}

fn internal(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, message)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/sessions", get(list_sessions).post(create_session).delete(clear_sessions))
        .route("/api/sessions/stats", get(session_stats))
        .route("/api/sessions/{session_id}", delete(delete_session))
        .route("/api/sessions/{session_id}/title", put(update_title))
        .route("/api/generate-prompt", post(generate_prompt))
        .route("/api/chat/{session_id}/{*rest}", any(proxy_chat))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

async fn list_sessions(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Session>> {
    let sessions = state.store.list().await.map_err(|e| {
        error!(
            component = "routes",
            event = "sessions.list_failed",
            error = %e,
            "Failed to list sessions"
        );
        internal("Failed to retrieve sessions")
    })?;
    Ok(Json(ApiResponse::ok(sessions)))
}

/// A malformed body is treated as empty.
async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<CreatedSessionPayload> {
    let request: CreateSessionRequest = serde_json::from_slice(&body).unwrap_or_default();
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(new_id);

    let now = Local::now();
    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            request
                .first_message
                .as_deref()
                .and_then(|m| first_message_title(m, &now))
        })
        .unwrap_or_else(|| untitled_session_title(&now));

    let session = state.store.create(&session_id, &title).await.map_err(|e| {
        error!(
            component = "routes",
            event = "session.create_failed",
            session_id = %session_id,
            error = %e,
            "Failed to create session"
        );
        internal("Failed to create session")
    })?;

    info!(
        component = "routes",
        event = "session.created",
        session_id = %session.id,
        title = %session.title,
        "Session registered"
    );
    Ok(Json(ApiResponse::ok(CreatedSessionPayload {
        session_id: session.id,
        title: session.title,
    })))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<DeletedPayload> {
    let deleted = state.store.delete(&session_id).await.map_err(|e| {
        error!(
            component = "routes",
            event = "session.delete_failed",
            session_id = %session_id,
            error = %e,
            "Failed to delete session"
        );
        internal("Failed to delete session")
    })?;
    if !deleted {
        return Err(api_error(StatusCode::NOT_FOUND, "Session not found"));
    }

    info!(
        component = "routes",
        event = "session.deleted",
        session_id = %session_id,
        "Session unregistered"
    );
    Ok(Json(ApiResponse::ok(DeletedPayload { deleted: true })))
}

/// An explicit title wins; otherwise the title is derived from `firstMessage`.
async fn update_title(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> ApiResult<TitlePayload> {
    let invalid = || {
        api_error(
            StatusCode::BAD_REQUEST,
            "A valid title or firstMessage is required",
        )
    };
    let request: UpdateTitleRequest = serde_json::from_slice(&body).map_err(|_| invalid())?;

    let title = request
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            request
                .first_message
                .as_deref()
                .and_then(|m| first_message_title(m, &Local::now()))
        })
        .ok_or_else(invalid)?;

    let updated = state
        .store
        .update_title(&session_id, &title)
        .await
        .map_err(|e| {
            error!(
                component = "routes",
                event = "session.rename_failed",
                session_id = %session_id,
                error = %e,
                "Failed to update session title"
            );
            internal("Failed to update session title")
        })?;
    if !updated {
        return Err(api_error(StatusCode::NOT_FOUND, "Session not found"));
    }

    info!(
        component = "routes",
        event = "session.renamed",
        session_id = %session_id,
        title = %title,
        "Session title updated"
    );
    Ok(Json(ApiResponse::ok(TitlePayload { title })))
}

async fn session_stats(State(state): State<Arc<AppState>>) -> ApiResult<SessionStats> {
    let total_sessions = state.store.count().await.map_err(|e| {
        error!(
            component = "routes",
            event = "sessions.stats_failed",
            error = %e,
            "Failed to count sessions"
        );
        internal("Failed to retrieve session stats")
    })?;
    Ok(Json(ApiResponse::ok(SessionStats { total_sessions })))
}

async fn clear_sessions(State(state): State<Arc<AppState>>) -> ApiResult<ClearedPayload> {
    let deleted_count = state.store.clear().await.map_err(|e| {
        error!(
            component = "routes",
            event = "sessions.clear_failed",
            error = %e,
            "Failed to clear sessions"
        );
        internal("Failed to clear all sessions")
    })?;

    info!(
        component = "routes",
        event = "sessions.cleared",
        deleted_count,
        "All sessions cleared"
    );
    Ok(Json(ApiResponse::ok(ClearedPayload { deleted_count })))
}

// ---------------------------------------------------------------------------
// Prompt builder
// ---------------------------------------------------------------------------

async fn generate_prompt(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Vec<String>> {
    let body: Value =
        serde_json::from_slice(&body).map_err(|_| internal("Failed to generate prompts"))?;
    let goal = body
        .get("goal")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Goal is required"))?;

    match state.prompts.generate(goal).await {
        Ok(prompts) => Ok(Json(ApiResponse::ok(prompts))),
        Err(PromptError::InvalidReply(reply)) => {
            error!(
                component = "routes",
                event = "prompts.invalid_reply",
                reply = %reply,
                "Failed to parse AI response for prompt generation"
            );
            Err(internal(
                "The AI returned an invalid response. Please try rephrasing your goal.",
            ))
        }
        Err(e) => {
            error!(
                component = "routes",
                event = "prompts.failed",
                error = %e,
                "Failed to generate prompts"
            );
            Err(internal("Failed to generate prompts"))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::{get, post};
    use serde_json::json;

    use super::*;
    use crate::prompt_builder::{PromptBuilder, DEFAULT_PROMPT_MODEL};
    use crate::registry::SessionStore;

    struct TestServer {
        base: String,
        client: reqwest::Client,
        _dir: tempfile::TempDir,
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}")
    }

    async fn start(agent_url: &str, ai_base_url: Option<String>) -> TestServer {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::open(dir.path().join("registry.db")).expect("open store");
        let prompts = PromptBuilder::new(
            ai_base_url,
            Some("test-key".to_string()),
            DEFAULT_PROMPT_MODEL.to_string(),
        );
        let base = serve(router(AppState::new(store, prompts, agent_url))).await;
        TestServer {
            base,
            client: reqwest::Client::new(),
            _dir: dir,
        }
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn json(&self, req: reqwest::RequestBuilder) -> (u16, Value) {
            let resp = req.send().await.expect("send");
            let status = resp.status().as_u16();
            (status, resp.json().await.expect("json body"))
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let server = start("http://127.0.0.1:9", None).await;
        let body = server
            .client
            .get(server.url("/health"))
            .send()
            .await
            .expect("send")
            .text()
            .await
            .expect("text");
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn session_crud_round_trip() {
        let server = start("http://127.0.0.1:9", None).await;
        let c = &server.client;

        let (status, created) = server
            .json(c.post(server.url("/api/sessions")).json(&json!({
                "title": "New Chat",
                "sessionId": "s-1"
            })))
            .await;
        assert_eq!(status, 200);
        assert_eq!(created, json!({"success": true, "data": {"sessionId": "s-1", "title": "New Chat"}}));

        let (_, listed) = server.json(c.get(server.url("/api/sessions"))).await;
        assert_eq!(listed["data"][0]["id"], "s-1");
        assert_eq!(listed["data"][0]["title"], "New Chat");
        assert!(listed["data"][0]["lastActive"].is_i64());

        let (status, renamed) = server
            .json(c.put(server.url("/api/sessions/s-1/title")).json(&json!({"title": "Ownership"})))
            .await;
        assert_eq!(status, 200);
        assert_eq!(renamed["data"]["title"], "Ownership");

        let (_, stats) = server.json(c.get(server.url("/api/sessions/stats"))).await;
        assert_eq!(stats["data"]["totalSessions"], 1);

        let (status, deleted) = server.json(c.delete(server.url("/api/sessions/s-1"))).await;
        assert_eq!(status, 200);
        assert_eq!(deleted["data"]["deleted"], true);

        let (status, missing) = server.json(c.delete(server.url("/api/sessions/s-1"))).await;
        assert_eq!(status, 404);
        assert_eq!(missing, json!({"success": false, "error": "Session not found"}));
    }

    #[tokio::test]
    async fn create_derives_titles_when_none_given() {
        let server = start("http://127.0.0.1:9", None).await;
        let c = &server.client;

        let (_, from_message) = server
            .json(c.post(server.url("/api/sessions")).json(&json!({
                "firstMessage": "  What   is a lifetime? "
            })))
            .await;
        let title = from_message["data"]["title"].as_str().expect("title");
        assert!(title.starts_with("What is a lifetime? • "), "{title}");
        assert!(!from_message["data"]["sessionId"].as_str().expect("id").is_empty());

        let (_, untitled) = server
            .json(c.post(server.url("/api/sessions")).body("not json"))
            .await;
        let title = untitled["data"]["title"].as_str().expect("title");
        assert!(title.starts_with("Chat "), "{title}");
    }

    #[tokio::test]
    async fn title_update_validates_input() {
        let server = start("http://127.0.0.1:9", None).await;
        let c = &server.client;
        server
            .json(c.post(server.url("/api/sessions")).json(&json!({"sessionId": "s-1"})))
            .await;

        let (status, body) = server
            .json(c.put(server.url("/api/sessions/s-1/title")).json(&json!({})))
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "A valid title or firstMessage is required");

        let (status, body) = server
            .json(
                c.put(server.url("/api/sessions/s-1/title"))
                    .json(&json!({"firstMessage": "Tell me about traits"})),
            )
            .await;
        assert_eq!(status, 200);
        assert!(body["data"]["title"]
            .as_str()
            .expect("title")
            .starts_with("Tell me about traits • "));

        let (status, body) = server
            .json(c.put(server.url("/api/sessions/nope/title")).json(&json!({"title": "x"})))
            .await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "Session not found");
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let server = start("http://127.0.0.1:9", None).await;
        let c = &server.client;
        for id in ["a", "b", "c"] {
            server
                .json(c.post(server.url("/api/sessions")).json(&json!({"sessionId": id})))
                .await;
        }

        let (_, cleared) = server.json(c.delete(server.url("/api/sessions"))).await;
        assert_eq!(cleared["data"]["deletedCount"], 3);
        let (_, listed) = server.json(c.get(server.url("/api/sessions"))).await;
        assert_eq!(listed["data"], json!([]));
    }

    async fn fake_ai(reply: &'static str) -> String {
        serve(Router::new().route(
            "/chat/completions",
            post(move || async move {
                Json(json!({"choices": [{"message": {"role": "assistant", "content": reply}}]}))
            }),
        ))
        .await
    }

    #[tokio::test]
    async fn generate_prompt_accepts_fenced_json() {
        let ai = fake_ai("```json\n[\"p1\", \"p2\", \"p3\"]\n```").await;
        let server = start("http://127.0.0.1:9", Some(ai)).await;

        let (status, body) = server
            .json(
                server
                    .client
                    .post(server.url("/api/generate-prompt"))
                    .json(&json!({"goal": "learn rust"})),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"], json!(["p1", "p2", "p3"]));
    }

    #[tokio::test]
    async fn generate_prompt_rejects_missing_goal_and_bad_replies() {
        let ai = fake_ai("Sure! Here are three prompts.").await;
        let server = start("http://127.0.0.1:9", Some(ai)).await;
        let c = &server.client;

        let (status, body) = server
            .json(c.post(server.url("/api/generate-prompt")).json(&json!({"goal": "  "})))
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Goal is required");

        let (status, body) = server
            .json(c.post(server.url("/api/generate-prompt")).json(&json!({"goal": "learn rust"})))
            .await;
        assert_eq!(status, 500);
        assert_eq!(
            body["error"],
            "The AI returned an invalid response. Please try rephrasing your goal."
        );
    }

    #[tokio::test]
    async fn generate_prompt_without_gateway_fails() {
        let server = start("http://127.0.0.1:9", None).await;
        let (status, body) = server
            .json(
                server
                    .client
                    .post(server.url("/api/generate-prompt"))
                    .json(&json!({"goal": "learn rust"})),
            )
            .await;
        assert_eq!(status, 500);
        assert_eq!(body["error"], "Failed to generate prompts");
    }

    #[tokio::test]
    async fn chat_requests_are_proxied_to_the_session_agent() {
        let agent = serve(
            Router::new()
                .route(
                    "/agents/{id}/messages",
                    get(|Path(id): Path<String>| async move {
                        Json(json!({"messages": [], "model": format!("model-for-{id}")}))
                    }),
                )
                .route(
                    "/agents/{id}/chat",
                    post(|body: String| async move { format!("echo:{body}") }),
                ),
        )
        .await;
        let server = start(&agent, None).await;
        let c = &server.client;
        server
            .json(c.post(server.url("/api/sessions")).json(&json!({"sessionId": "s-1"})))
            .await;

        let (status, history) = server.json(c.get(server.url("/api/chat/s-1/messages"))).await;
        assert_eq!(status, 200);
        assert_eq!(history["model"], "model-for-s-1");

        let streamed = c
            .post(server.url("/api/chat/s-1/chat"))
            .body("hi")
            .send()
            .await
            .expect("send")
            .text()
            .await
            .expect("text");
        assert_eq!(streamed, "echo:hi");
    }

    #[tokio::test]
    async fn unreachable_agent_yields_routing_failure() {
        let server = start("http://127.0.0.1:9", None).await;
        let (status, body) = server
            .json(server.client.get(server.url("/api/chat/s-1/messages")))
            .await;
        assert_eq!(status, 500);
        assert_eq!(body, json!({"success": false, "error": "Agent routing failed"}));
    }
}
