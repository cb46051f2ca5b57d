use crate::{
    agent::{runner::Runner, session::Content, tool::State},
    error::ShoppingError,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone, Default)]
pub struct RuntimeState {
    runners: Arc<HashMap<String, Arc<Runner>>>,
}

impl RuntimeState {
    pub fn new(runners: impl IntoIterator<Item = Runner>) -> Self {
        let runners = runners
            .into_iter()
            .map(|runner| (runner.app_name().to_string(), Arc::new(runner)))
            .collect();
        Self {
            runners: Arc::new(runners),
        }
    }

    fn runner(&self, app_name: &str) -> Result<Arc<Runner>, ShoppingError> {
        self.runners
            .get(app_name)
            .cloned()
            .ok_or_else(|| ShoppingError::AppNotFound(app_name.to_string()))
    }

    pub fn app_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.runners.keys().cloned().collect();
        names.sort();
        names
    }
}

pub fn router(state: RuntimeState) -> Router {
    Router::new()
        .route("/list-apps", get(list_apps))
        .route(
            "/apps/:app_name/users/:user_id/sessions",
            get(list_sessions).post(create_session),
        )
        .route(
            "/apps/:app_name/users/:user_id/sessions/:session_id",
            get(get_session)
                .post(create_session_with_id)
                .delete(delete_session),
        )
        .route("/run", post(run_agent))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    state: Option<State>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub new_message: Content,
    #[serde(default)]
    pub streaming: bool,
}

fn error_response(error: ShoppingError) -> Response {
    let status = match &error {
        ShoppingError::AppNotFound(_)
        | ShoppingError::SessionNotFound(_)
        | ShoppingError::AgentNotFound(_) => StatusCode::NOT_FOUND,
        ShoppingError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Agent runtime error: {}", error);
    }
    (status, Json(json!({"detail": error.to_string()}))).into_response()
}

async fn list_apps(AxumState(state): AxumState<RuntimeState>) -> Json<Vec<String>> {
    Json(state.app_names())
}

async fn list_sessions(
    AxumState(state): AxumState<RuntimeState>,
    Path((app_name, user_id)): Path<(String, String)>,
) -> Response {
    match state.runner(&app_name) {
        Ok(runner) => Json(runner.sessions().list_sessions(&app_name, &user_id)).into_response(),
        Err(e) => error_response(e),
    }
}

fn create(
    state: &RuntimeState,
    app_name: &str,
    user_id: &str,
    session_id: Option<String>,
    body: Option<Json<CreateSessionRequest>>,
) -> Response {
    let initial_state = body.and_then(|Json(request)| request.state);
    let created = state
        .runner(app_name)
        .and_then(|runner| runner.sessions().create_session(app_name, user_id, initial_state, session_id));
    match created {
        Ok(session) => Json(session).into_response(),
        Err(e) => error_response(e),
    }
}

async fn create_session(
    AxumState(state): AxumState<RuntimeState>,
    Path((app_name, user_id)): Path<(String, String)>,
    body: Option<Json<CreateSessionRequest>>,
) -> Response {
    create(&state, &app_name, &user_id, None, body)
}

async fn create_session_with_id(
    AxumState(state): AxumState<RuntimeState>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
    body: Option<Json<CreateSessionRequest>>,
) -> Response {
    create(&state, &app_name, &user_id, Some(session_id), body)
}

async fn get_session(
    AxumState(state): AxumState<RuntimeState>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> Response {
    let found = state.runner(&app_name).and_then(|runner| {
        runner
            .sessions()
            .get_session(&app_name, &user_id, &session_id)
            .ok_or(ShoppingError::SessionNotFound(session_id.clone()))
    });
    match found {
        Ok(session) => Json(session).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_session(
    AxumState(state): AxumState<RuntimeState>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> Response {
    match state.runner(&app_name) {
        Ok(runner) => {
            runner.sessions().delete_session(&app_name, &user_id, &session_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn run_agent(
    AxumState(state): AxumState<RuntimeState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => return error_response(ShoppingError::Validation(e.body_text())),
    };
    if request.streaming {
        tracing::debug!("streaming requested; answering with the full event list");
    }

    let runner = match state.runner(&request.app_name) {
        Ok(runner) => runner,
        Err(e) => return error_response(e),
    };
    match runner
        .run(&request.user_id, &request.session_id, request.new_message)
        .await
    {
        Ok(events) => Json(events).into_response(),
        Err(e) => error_response(e),
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}
