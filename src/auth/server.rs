use crate::{
    auth::{
        session::{SessionCodec, SessionData},
        store::AuthStore,
        templates,
    },
    config::AuthServerConfig,
    error::ShoppingError,
    model::{
        agent_id_for, is_six_digit_code, ActionResponse, AgentConfig, AgentStatus, AuthStatus,
        ConfigureRequest, UserRecord,
    },
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

const FALLBACK_EMAIL: &str = "user@example.com";

#[derive(Clone)]
pub struct AuthServerState {
    pub store: Arc<AuthStore>,
    pub sessions: SessionCodec,
    pub config: Arc<AuthServerConfig>,
}

impl AuthServerState {
    pub fn new(config: AuthServerConfig) -> Self {
        Self {
            store: Arc::new(AuthStore::new()),
            sessions: SessionCodec::new(&config.secret_key),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AuthServerState) -> Router {
    Router::new()
        .route("/auth/login", get(login_page))
        .route("/auth/email", post(handle_email))
        .route("/auth/verify", get(verify_page).post(verify_otp))
        .route("/auth/configure", get(configure_page).post(configure_agent))
        .route("/auth/complete", get(auth_complete))
        .route("/auth/status", get(auth_status))
        .route("/auth/logo/kite", get(kite_logo))
        .route("/auth/logo/privy", get(privy_logo))
        .route("/auth/logout", get(logout_redirect).post(logout_json))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct EmailRequest {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OtpRequest {
    otp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigureQuery {
    username: Option<String>,
}

fn fail(message: &str) -> Response {
    Json(ActionResponse::fail(message)).into_response()
}

fn respond_with_session(
    state: &AuthServerState,
    jar: CookieJar,
    session: &SessionData,
    body: ActionResponse,
    failure_message: &str,
) -> Response {
    match state.sessions.write(jar, session) {
        Ok(jar) => (jar, Json(body)).into_response(),
        Err(e) => {
            tracing::error!("Failed to write session cookie: {}", e);
            fail(failure_message)
        }
    }
}

async fn login_page() -> Html<String> {
    Html(templates::login_page())
}

async fn handle_email(
    State(state): State<AuthServerState>,
    jar: CookieJar,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Response {
    const FAILURE: &str = "Email processing failed. Please try again.";

    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => {
            tracing::error!("Email error: {}", e);
            return fail(FAILURE);
        }
    };

    let Some(email) = request.email.filter(|email| !email.trim().is_empty()) else {
        return fail("Email is required");
    };

    let mut session = state.sessions.read(&jar);
    session.email = Some(email);
    session.username = Some(state.config.default_username.clone());

    respond_with_session(
        &state,
        jar,
        &session,
        ActionResponse::ok("Email received", "/auth/verify"),
        FAILURE,
    )
}

async fn verify_page() -> Html<String> {
    Html(templates::verify_page())
}

async fn verify_otp(
    State(state): State<AuthServerState>,
    jar: CookieJar,
    payload: Result<Json<OtpRequest>, JsonRejection>,
) -> Response {
    const FAILURE: &str = "Verification failed. Please try again.";

    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => {
            tracing::error!("Verification error: {}", e);
            return fail(FAILURE);
        }
    };

    let Some(otp) = request.otp.filter(|otp| !otp.is_empty()) else {
        return fail("OTP is required");
    };

    if !is_six_digit_code(&otp) {
        return fail("Invalid OTP. Please enter a 6-digit number.");
    }

    // Create user record
    let mut session = state.sessions.read(&jar);
    let user = UserRecord {
        user_id: Uuid::new_v4().to_string(),
        username: session
            .username
            .clone()
            .unwrap_or_else(|| state.config.default_username.clone()),
        email: session.email.clone().unwrap_or_else(|| FALLBACK_EMAIL.to_string()),
        login_time: Utc::now(),
    };
    tracing::info!(user_id = %user.user_id, username = %user.username, "user verified");

    session.user_id = Some(user.user_id.clone());
    let redirect_url = format!(
        "/auth/configure?username={}",
        urlencoding::encode(&user.username)
    );
    state.store.insert_user(user);

    respond_with_session(
        &state,
        jar,
        &session,
        ActionResponse::ok("Verification successful", redirect_url),
        FAILURE,
    )
}

async fn configure_page(
    State(state): State<AuthServerState>,
    Query(query): Query<ConfigureQuery>,
) -> Html<String> {
    let username = query
        .username
        .filter(|username| !username.is_empty())
        .unwrap_or_else(|| state.config.default_username.clone());
    Html(templates::configure_page(&username))
}

async fn configure_agent(
    State(state): State<AuthServerState>,
    jar: CookieJar,
    payload: Result<Json<ConfigureRequest>, JsonRejection>,
) -> Response {
    const FAILURE: &str = "Configuration failed. Please try again.";

    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return fail(FAILURE);
        }
    };

    let Some(username) = request.username.clone().filter(|username| !username.is_empty()) else {
        return fail("Username is required");
    };

    if let Err(e) = request.validate() {
        return match e {
            ShoppingError::Validation(message) => fail(&message),
            other => {
                tracing::error!("Configuration error: {}", other);
                fail(FAILURE)
            }
        };
    }

    // Calculate expiration time
    let now = Utc::now();
    let expiration_time = match request.resolve_expiration(now) {
        Ok(expiration_time) => expiration_time,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return fail(FAILURE);
        }
    };

    let agent_id = agent_id_for(&username);
    let session_name = request
        .session_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("{}-{}", agent_id, &suffix[..8])
        });

    let agent_config = AgentConfig {
        agent_id: agent_id.clone(),
        username,
        session_name,
        max_budget: request.max_budget.unwrap_or_default(),
        expiration_time,
        created_at: now,
        status: AgentStatus::Active,
    };
    tracing::info!(
        agent_id = %agent_config.agent_id,
        max_budget = agent_config.max_budget,
        expiration = %agent_config.expiration_time,
        "agent configured"
    );
    state.store.upsert_agent_config(agent_config.clone());

    let mut session = state.sessions.read(&jar);
    session.agent_id = Some(agent_id);
    session.agent_config = Some(agent_config);

    respond_with_session(
        &state,
        jar,
        &session,
        ActionResponse::ok("Agent configured successfully", "/auth/complete"),
        FAILURE,
    )
}

async fn auth_complete(State(state): State<AuthServerState>, jar: CookieJar) -> Response {
    let session = state.sessions.read(&jar);
    match (session.agent_id.as_ref(), session.username.as_deref()) {
        (Some(_), Some(username)) => Html(templates::complete_page(
            username,
            &state.config.shopping_agent_url,
        ))
        .into_response(),
        _ => Redirect::to("/auth/login").into_response(),
    }
}

async fn auth_status(State(state): State<AuthServerState>, jar: CookieJar) -> Json<AuthStatus> {
    let session = state.sessions.read(&jar);
    if !session.is_authenticated() {
        return Json(AuthStatus::anonymous());
    }

    // Prefer the stored configuration, fall back to the session copy
    let agent_config = session
        .agent_id
        .as_deref()
        .and_then(|agent_id| state.store.agent_config(agent_id))
        .or(session.agent_config);

    Json(AuthStatus {
        authenticated: true,
        username: session.username,
        agent_id: session.agent_id,
        email: session.email,
        agent_config,
    })
}

async fn serve_logo(state: &AuthServerState, file_name: &str, mime: &'static str) -> Response {
    match tokio::fs::read(state.config.assets_dir.join(file_name)).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, mime)], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Logo not found").into_response(),
    }
}

async fn kite_logo(State(state): State<AuthServerState>) -> Response {
    serve_logo(&state, "kite.png", "image/png").await
}

async fn privy_logo(State(state): State<AuthServerState>) -> Response {
    serve_logo(&state, "privy.svg", "image/svg+xml").await
}

async fn logout_redirect(State(state): State<AuthServerState>, jar: CookieJar) -> Response {
    let jar = state.sessions.clear(jar);
    (jar, Redirect::to(&state.config.shopping_agent_url)).into_response()
}

async fn logout_json(State(state): State<AuthServerState>, jar: CookieJar) -> Response {
    let jar = state.sessions.clear(jar);
    (
        jar,
        Json(ActionResponse {
            success: true,
            message: "Logged out successfully".to_string(),
            redirect_url: None,
        }),
    )
        .into_response()
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}
