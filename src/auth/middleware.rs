use crate::{
    auth::{client::AuthClient, templates::escape_html},
    model::{anonymous_agent_id, AgentConfig, AuthStatus, SpendingLimits, UserInfo, ANONYMOUS_USERNAME},
};
use axum::{
    extract::{Request, State},
    http::{header::COOKIE, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const PROTECTED_PREFIXES: [&str; 4] = ["/api/shop", "/api/payment", "/api/checkout", "/api/agent"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotAuthenticated,
    AgentNotAuthorized,
    AgentExpired,
    ExceedsBudget,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorizationDecision {
    pub authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<AgentConfig>,
}

impl AuthorizationDecision {
    fn deny(reason: DenialReason, message: String) -> Self {
        Self {
            authorized: false,
            reason: Some(reason),
            message: Some(message),
            user_info: None,
            agent_config: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpendingDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub limits: SpendingLimits,
}

impl SpendingDecision {
    pub fn evaluate(amount: f64, limits: SpendingLimits) -> Self {
        if amount > limits.remaining_budget {
            return Self {
                allowed: false,
                reason: Some(DenialReason::ExceedsBudget),
                message: Some(format!(
                    "Amount ${:.2} exceeds remaining budget ${:.2}",
                    amount, limits.remaining_budget
                )),
                limits,
            };
        }
        Self {
            allowed: true,
            reason: None,
            message: None,
            limits,
        }
    }
}

// What the agent runtime needs to know about the user behind a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentContext {
    pub authenticated: bool,
    pub agent_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<AgentConfig>,
    pub spending_limits: SpendingLimits,
}

impl AgentContext {
    pub fn from_status(status: &AuthStatus) -> Self {
        match status.user_info() {
            Some(info) => Self {
                authenticated: true,
                spending_limits: SpendingLimits::from_config(info.agent_config.as_ref()),
                agent_id: info.agent_id,
                username: info.username,
                email: info.email,
                agent_config: info.agent_config,
            },
            None => Self {
                authenticated: false,
                agent_id: anonymous_agent_id(),
                username: ANONYMOUS_USERNAME.to_string(),
                email: None,
                agent_config: None,
                spending_limits: SpendingLimits::none(),
            },
        }
    }
}

pub fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(COOKIE).and_then(|value| value.to_str().ok())
}

pub struct AuthMiddleware {
    client: Arc<AuthClient>,
}

impl AuthMiddleware {
    pub fn new(client: Arc<AuthClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    pub fn check_auth_required(&self, path: &str) -> bool {
        PROTECTED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
    }

    // With cookies the browser's own session is checked, otherwise the
    // client's server-side session.
    pub async fn status(&self, cookies: Option<&str>) -> AuthStatus {
        self.client.status(cookies).await
    }

    pub fn auth_widget_html(&self, username: Option<&str>) -> String {
        let logo_url = escape_html(&self.client.logo_url());
        match username {
            Some(username) => format!(
                r#"
<div id="auth-widget" style="position: fixed; top: 20px; right: 20px; z-index: 1000;">
    <div style="display: flex; align-items: center; gap: 8px; background: white; padding: 8px 16px; border-radius: 20px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); border: 1px solid #dee8c2;">
        <img src="{logo}" alt="Kite Logo" style="width: 20px; height: 20px;">
        <span style="font-weight: 500; color: #485b10;">{username}</span>
        <button id="logoutBtn" onclick="logout()" style="background: #485b10; color: white; border: none; padding: 6px 12px; border-radius: 12px; cursor: pointer; font-size: 12px; font-weight: 500;">Logout</button>
    </div>
</div>
<script>
    function logout() {{
        const logoutBtn = document.getElementById('logoutBtn');
        logoutBtn.textContent = 'Logging out...';
        logoutBtn.disabled = true;
        logoutBtn.style.background = '#9ca3af';
        window.location.href = '{logout}';
    }}
</script>
"#,
                logo = logo_url,
                username = escape_html(username),
                logout = escape_html(&self.client.logout_url()),
            ),
            None => format!(
                r#"
<div id="auth-widget" style="position: fixed; top: 20px; right: 20px; z-index: 1000;">
    <a href="{login}" style="display: flex; align-items: center; gap: 8px; background: #485b10; color: white; padding: 8px 16px; border-radius: 20px; text-decoration: none; box-shadow: 0 2px 8px rgba(0,0,0,0.1);">
        <div style="width: 20px; height: 20px; background: white; border-radius: 4px; display: flex; align-items: center; justify-content: center;">
            <img src="{logo}" alt="Kite Logo" style="width: 16px; height: 16px;">
        </div>
        <span style="font-weight: 500;">Login</span>
    </a>
</div>
"#,
                login = escape_html(&self.client.auth_url()),
                logo = logo_url,
            ),
        }
    }

    // Places the widget right after `<body>`, or in front of the document
    // when there is no body tag.
    pub fn inject_widget_for(&self, html: &str, username: Option<&str>) -> String {
        let widget = self.auth_widget_html(username);
        if html.contains("<body>") {
            html.replacen("<body>", &format!("<body>{}", widget), 1)
        } else {
            format!("{}{}", widget, html)
        }
    }

    pub async fn inject_auth_widget(&self, html: &str, cookies: Option<&str>) -> String {
        let status = self.status(cookies).await;
        let username = if status.authenticated {
            status.username.as_deref()
        } else {
            None
        };
        self.inject_widget_for(html, username)
    }

    pub async fn validate_agent_authorization(
        &self,
        agent_id: &str,
        cookies: Option<&str>,
    ) -> AuthorizationDecision {
        let status = self.status(cookies).await;
        Self::authorize(&status, agent_id, Utc::now())
    }

    pub fn authorize(status: &AuthStatus, agent_id: &str, now: DateTime<Utc>) -> AuthorizationDecision {
        let Some(user_info) = status.user_info() else {
            return AuthorizationDecision::deny(
                DenialReason::NotAuthenticated,
                "User not authenticated".to_string(),
            );
        };

        if user_info.agent_id != agent_id {
            return AuthorizationDecision::deny(
                DenialReason::AgentNotAuthorized,
                format!(
                    "Agent {} not authorized for user {}",
                    agent_id, user_info.username
                ),
            );
        }

        let expired = user_info
            .agent_config
            .as_ref()
            .map(|config| config.is_expired(now))
            .unwrap_or(true);
        if expired {
            return AuthorizationDecision::deny(
                DenialReason::AgentExpired,
                "Agent authorization has expired".to_string(),
            );
        }

        AuthorizationDecision {
            authorized: true,
            reason: None,
            message: None,
            agent_config: user_info.agent_config.clone(),
            user_info: Some(user_info),
        }
    }

    pub async fn check_spending_limits(&self, amount: f64, cookies: Option<&str>) -> SpendingDecision {
        SpendingDecision::evaluate(amount, self.client.spending_limits(cookies).await)
    }

    pub async fn agent_context(&self, cookies: Option<&str>) -> AgentContext {
        AgentContext::from_status(&self.status(cookies).await)
    }
}

// Rejects unauthenticated requests to protected paths with a 401.
pub async fn require_auth(
    State(middleware): State<Arc<AuthMiddleware>>,
    request: Request,
    next: Next,
) -> Response {
    if !middleware.check_auth_required(request.uri().path()) {
        return next.run(request).await;
    }

    let status = middleware.status(cookie_header(request.headers())).await;
    if !status.authenticated {
        tracing::info!(path = %request.uri().path(), "rejecting unauthenticated request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "authenticated": false,
                "reason": DenialReason::NotAuthenticated,
                "login_url": middleware.client().auth_url(),
            })),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{agent_id_for, AgentStatus};
    use chrono::Duration;

    fn middleware() -> AuthMiddleware {
        AuthMiddleware::new(Arc::new(AuthClient::new("http://localhost:8004").unwrap()))
    }

    fn status(expires_in: Duration, budget: f64) -> AuthStatus {
        let now = Utc::now();
        AuthStatus {
            authenticated: true,
            username: Some("shopper".to_string()),
            agent_id: Some(agent_id_for("shopper")),
            email: Some("bugsbunny@gmail.com".to_string()),
            agent_config: Some(AgentConfig {
                agent_id: agent_id_for("shopper"),
                username: "shopper".to_string(),
                session_name: "BuyWhenReady-gemini-shopper-abc123".to_string(),
                max_budget: budget,
                expiration_time: now + expires_in,
                created_at: now,
                status: AgentStatus::Active,
            }),
        }
    }

    #[test]
    fn test_protected_prefixes() {
        let middleware = middleware();
        assert!(middleware.check_auth_required("/api/shop/items"));
        assert!(middleware.check_auth_required("/api/agent/context"));
        assert!(middleware.check_auth_required("/api/payment"));
        assert!(!middleware.check_auth_required("/api/chat"));
        assert!(!middleware.check_auth_required("/"));
    }

    #[test]
    fn test_widget_variants() {
        let middleware = middleware();
        let logged_in = middleware.auth_widget_html(Some("shopper"));
        assert!(logged_in.contains(">shopper</span>"));
        assert!(logged_in.contains("http://localhost:8004/auth/logout"));

        let anonymous = middleware.auth_widget_html(None);
        assert!(anonymous.contains("href=\"http://localhost:8004/auth/login\""));
        assert!(anonymous.contains("Login"));
    }

    #[test]
    fn test_widget_injection_position() {
        let middleware = middleware();
        let html = middleware.inject_widget_for("<html><body><p>hi</p></body></html>", None);
        assert!(html.starts_with("<html><body>\n<div id=\"auth-widget\""));

        let fragment = middleware.inject_widget_for("<p>hi</p>", None);
        assert!(fragment.starts_with("\n<div id=\"auth-widget\""));
        assert!(fragment.ends_with("<p>hi</p>"));
    }

    #[test]
    fn test_authorize_reasons() {
        let now = Utc::now();
        let denied = AuthMiddleware::authorize(&AuthStatus::anonymous(), "x", now);
        assert_eq!(denied.reason, Some(DenialReason::NotAuthenticated));

        let active = status(Duration::hours(1), 100.0);
        let wrong_agent = AuthMiddleware::authorize(&active, "BuyWhenReady-gemini-other", now);
        assert_eq!(wrong_agent.reason, Some(DenialReason::AgentNotAuthorized));

        let expired = status(Duration::hours(-1), 100.0);
        let decision = AuthMiddleware::authorize(&expired, &agent_id_for("shopper"), now);
        assert_eq!(decision.reason, Some(DenialReason::AgentExpired));

        let decision = AuthMiddleware::authorize(&active, &agent_id_for("shopper"), now);
        assert!(decision.authorized);
        assert_eq!(decision.user_info.unwrap().username, "shopper");
    }

    #[test]
    fn test_spending_decision() {
        let limits = SpendingLimits::from_config(status(Duration::hours(1), 100.0).agent_config.as_ref());
        assert!(SpendingDecision::evaluate(99.99, limits.clone()).allowed);

        let denied = SpendingDecision::evaluate(150.0, limits);
        assert_eq!(denied.reason, Some(DenialReason::ExceedsBudget));
        assert_eq!(
            denied.message.as_deref(),
            Some("Amount $150.00 exceeds remaining budget $100.00")
        );
    }

    #[test]
    fn test_agent_context() {
        let anonymous = AgentContext::from_status(&AuthStatus::anonymous());
        assert_eq!(anonymous.agent_id, "BuyWhenReady-gemini-anonymous");
        assert_eq!(anonymous.spending_limits.max_budget, 0.0);

        let context = AgentContext::from_status(&status(Duration::hours(1), 250.0));
        assert!(context.authenticated);
        assert_eq!(context.spending_limits.remaining_budget, 250.0);
    }
}
