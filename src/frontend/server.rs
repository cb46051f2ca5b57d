use crate::{
    agent::tool::State as SessionState,
    auth::{
        middleware::{cookie_header, require_auth, AgentContext},
        session::clear_session_cookie,
        AuthClient, AuthMiddleware,
    },
    config::{DemoConfig, FrontendConfig},
    error::{Result, ShoppingError},
    frontend::{
        render::{extract_response_text, render_agent_html},
        runtime_client::RuntimeClient,
        templates::CHAT_PAGE,
    },
    model::{anonymous_agent_id, ActionResponse, ChatReply, ChatRequest},
    shopping::tools::keys,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const EMPTY_REPLY: &str = "I received your message but couldn't generate a response.";
const ERROR_REPLY: &str = "Sorry, I encountered an error processing your request.";

#[derive(Clone)]
pub struct FrontendState {
    pub middleware: Arc<AuthMiddleware>,
    pub runtime: Arc<RuntimeClient>,
    // `{username}_{user_id}` to runtime session id.
    pub active_sessions: Arc<Mutex<HashMap<String, String>>>,
    pub wallet_address: String,
}

impl FrontendState {
    pub fn new(config: &FrontendConfig, demo: &DemoConfig) -> Result<Self> {
        let auth_client = Arc::new(AuthClient::new(config.auth_server_url.clone())?);
        Ok(Self {
            middleware: Arc::new(AuthMiddleware::new(auth_client)),
            runtime: Arc::new(RuntimeClient::new(config)?),
            active_sessions: Arc::new(Mutex::new(HashMap::new())),
            wallet_address: demo.wallet_address.clone(),
        })
    }

    // Session state the agents read the user's identity and limits from.
    pub fn initial_state(&self, context: &AgentContext) -> SessionState {
        let mut state = SessionState::new();
        state.insert(keys::USERNAME.to_string(), json!(context.username));
        state.insert(keys::AGENT_ID.to_string(), json!(context.agent_id));
        if let Some(email) = &context.email {
            state.insert(keys::USER_EMAIL.to_string(), json!(email));
        }
        if let Some(config) = &context.agent_config {
            state.insert(keys::MAX_BUDGET.to_string(), json!(config.max_budget));
            state.insert(
                keys::EXPIRATION_TIME.to_string(),
                json!(config.expiration_time.to_rfc3339()),
            );
        }
        state.insert(keys::WALLET_ADDRESS.to_string(), json!(self.wallet_address));
        state
    }

    async fn session_for(&self, key: &str, user_id: &str, context: &AgentContext) -> Result<String> {
        // Reuse the session this browser user already has
        if let Some(session_id) = self.active_sessions.lock().get(key).cloned() {
            return Ok(session_id);
        }
        let session_id = self
            .runtime
            .create_session(user_id, self.initial_state(context))
            .await?;
        self.active_sessions
            .lock()
            .insert(key.to_string(), session_id.clone());
        Ok(session_id)
    }

    // Sends one message, recreating the runtime session once if the
    // runtime no longer knows it.
    pub async fn converse(&self, request: &ChatRequest, context: &AgentContext) -> Result<String> {
        let key = format!("{}_{}", context.username, request.user_id);
        let session_id = self.session_for(&key, &request.user_id, context).await?;

        let events = match self
            .runtime
            .run(&request.user_id, &session_id, &request.message)
            .await
        {
            Err(ShoppingError::SessionNotFound(_)) => {
                tracing::warn!(session_id, "runtime session vanished, creating a new one");
                self.active_sessions.lock().remove(&key);
                let session_id = self.session_for(&key, &request.user_id, context).await?;
                self.runtime
                    .run(&request.user_id, &session_id, &request.message)
                    .await?
            }
            other => other?,
        };

        Ok(extract_response_text(&events))
    }
}

pub fn router(state: FrontendState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/chat", post(chat))
        .route("/auth/status", get(auth_status))
        .route("/auth/logout", get(logout_redirect).post(logout_json))
        .route("/api/agent/context", get(agent_context))
        .route("/api/agent/authorize/:agent_id", get(authorize_agent))
        .route("/api/payment/limits", get(spending_limits))
        .route("/health", get(health_check))
        .layer(middleware::from_fn_with_state(
            state.middleware.clone(),
            require_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index(State(state): State<FrontendState>, headers: HeaderMap) -> Html<String> {
    Html(
        state
            .middleware
            .inject_auth_widget(CHAT_PAGE, cookie_header(&headers))
            .await,
    )
}

async fn chat(
    State(state): State<FrontendState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => {
            tracing::warn!("Rejected chat request: {}", e.body_text());
            return (StatusCode::BAD_REQUEST, Json(error_reply())).into_response();
        }
    };

    // Resolve auth status with the browser's own cookies
    let context = state.middleware.agent_context(cookie_header(&headers)).await;
    tracing::info!(
        username = %context.username,
        authenticated = context.authenticated,
        "chat message received"
    );

    match state.converse(&request, &context).await {
        Ok(text) => {
            let text = if text.is_empty() { EMPTY_REPLY.to_string() } else { text };
            Json(ChatReply {
                response: render_agent_html(&text),
                agent_id: context.agent_id,
                authenticated: context.authenticated,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("Chat failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error_reply())).into_response()
        }
    }
}

fn error_reply() -> ChatReply {
    ChatReply {
        response: ERROR_REPLY.to_string(),
        agent_id: anonymous_agent_id(),
        authenticated: false,
    }
}

async fn auth_status(State(state): State<FrontendState>, headers: HeaderMap) -> Response {
    Json(state.middleware.status(cookie_header(&headers)).await).into_response()
}

async fn forward_logout(state: &FrontendState, headers: &HeaderMap) -> bool {
    match cookie_header(headers) {
        Some(cookies) => state.middleware.client().logout_with_cookies(cookies).await,
        None => state.middleware.client().logout().await,
    }
}

async fn logout_redirect(
    State(state): State<FrontendState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    forward_logout(&state, &headers).await;
    (clear_session_cookie(jar), Redirect::to("/")).into_response()
}

async fn logout_json(
    State(state): State<FrontendState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let reply = if forward_logout(&state, &headers).await {
        ActionResponse {
            success: true,
            message: "Logged out successfully".to_string(),
            redirect_url: Some("/".to_string()),
        }
    } else {
        ActionResponse::fail("Logout failed")
    };
    (clear_session_cookie(jar), Json(reply)).into_response()
}

async fn agent_context(State(state): State<FrontendState>, headers: HeaderMap) -> Response {
    Json(state.middleware.agent_context(cookie_header(&headers)).await).into_response()
}

async fn authorize_agent(
    State(state): State<FrontendState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let decision = state
        .middleware
        .validate_agent_authorization(&agent_id, cookie_header(&headers))
        .await;
    Json(decision).into_response()
}

#[derive(Debug, Deserialize)]
struct LimitsQuery {
    #[serde(default)]
    amount: f64,
}

async fn spending_limits(
    State(state): State<FrontendState>,
    Query(query): Query<LimitsQuery>,
    headers: HeaderMap,
) -> Response {
    let decision = state
        .middleware
        .check_spending_limits(query.amount, cookie_header(&headers))
        .await;
    Json(decision).into_response()
}

async fn health_check() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{agent_id_for, AgentConfig, AgentStatus};
    use axum::{body::Body, http::Request};
    use chrono::{Duration, Utc};
    use tower::ServiceExt;

    fn state() -> FrontendState {
        let config = FrontendConfig {
            auth_server_url: "http://127.0.0.1:9".to_string(),
            runtime_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        FrontendState::new(&config, &DemoConfig::default()).unwrap()
    }

    #[test]
    fn test_initial_state_carries_agent_context() {
        let expires = Utc::now() + Duration::hours(2);
        let context = AgentContext {
            authenticated: true,
            agent_id: agent_id_for("shopper"),
            username: "shopper".to_string(),
            email: Some("bugsbunny@gmail.com".to_string()),
            agent_config: Some(AgentConfig {
                agent_id: agent_id_for("shopper"),
                username: "shopper".to_string(),
                session_name: "s".to_string(),
                max_budget: 300.0,
                expiration_time: expires,
                created_at: Utc::now(),
                status: AgentStatus::Active,
            }),
            spending_limits: crate::model::SpendingLimits::none(),
        };

        let initial = state().initial_state(&context);
        assert_eq!(initial[keys::USERNAME], "shopper");
        assert_eq!(initial[keys::AGENT_ID], "BuyWhenReady-gemini-shopper");
        assert_eq!(initial[keys::USER_EMAIL], "bugsbunny@gmail.com");
        assert_eq!(initial[keys::MAX_BUDGET], 300.0);
        assert_eq!(initial[keys::EXPIRATION_TIME], expires.to_rfc3339());
        assert_eq!(initial[keys::WALLET_ADDRESS], "0x742d35Cc6634C0532925a3b8D");
    }

    #[tokio::test]
    async fn test_protected_route_requires_login() {
        // Nothing listens on the auth port, so the status resolves to anonymous.
        let response = router(state())
            .oneshot(
                Request::builder()
                    .uri("/api/agent/context")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_reports_runtime_failure() {
        let response = router(state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message":"shoes"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let reply: ChatReply = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply.response, ERROR_REPLY);
        assert_eq!(reply.agent_id, "BuyWhenReady-gemini-anonymous");
    }
}
