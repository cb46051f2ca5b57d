use crate::{
    error::{Result, ShoppingError},
    model::{AgentConfig, AuthStatus, SpendingLimits, UserInfo},
};
use chrono::Utc;
use reqwest::{header::COOKIE, Client};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// Client for the Kite auth server. `client` keeps a cookie jar for the
// service's own session; browser requests go out on `forwarding_client`
// with the browser's Cookie header so sessions never mix.
pub struct AuthClient {
    base_url: String,
    client: Client,
    forwarding_client: Client,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let forwarding_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            forwarding_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/login", self.base_url)
    }

    pub fn logout_url(&self) -> String {
        format!("{}/auth/logout", self.base_url)
    }

    pub fn logo_url(&self) -> String {
        format!("{}/auth/logo/kite", self.base_url)
    }

    pub async fn auth_status(&self) -> AuthStatus {
        self.status(None).await
    }

    pub async fn auth_status_with_cookies(&self, cookies: &str) -> AuthStatus {
        self.status(Some(cookies)).await
    }

    // Every lookup is a fresh request; nothing is remembered between callers.
    pub async fn status(&self, cookies: Option<&str>) -> AuthStatus {
        match self.fetch_status(cookies).await {
            Ok(status) if status.authenticated => status,
            Ok(_) => AuthStatus::anonymous(),
            Err(e) => {
                tracing::error!("Auth status check failed: {}", e);
                AuthStatus::anonymous()
            }
        }
    }

    async fn fetch_status(&self, cookies: Option<&str>) -> Result<AuthStatus> {
        let url = format!("{}/auth/status", self.base_url);
        let request = match cookies {
            Some(cookies) => self.forwarding_client.get(&url).header(COOKIE, cookies),
            None => self.client.get(&url),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ShoppingError::Upstream {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    pub async fn user_info(&self, cookies: Option<&str>) -> Option<UserInfo> {
        self.status(cookies).await.user_info()
    }

    pub async fn agent_config(&self, cookies: Option<&str>) -> Option<AgentConfig> {
        self.user_info(cookies).await.and_then(|info| info.agent_config)
    }

    pub async fn is_agent_authorized(&self, agent_id: &str, cookies: Option<&str>) -> bool {
        self.user_info(cookies)
            .await
            .map(|info| info.agent_id == agent_id)
            .unwrap_or(false)
    }

    pub async fn spending_limits(&self, cookies: Option<&str>) -> SpendingLimits {
        SpendingLimits::from_config(self.agent_config(cookies).await.as_ref())
    }

    // missing configuration counts as expired
    pub async fn is_agent_expired(&self, cookies: Option<&str>) -> bool {
        match self.agent_config(cookies).await {
            Some(config) => config.is_expired(Utc::now()),
            None => true,
        }
    }

    pub async fn logout(&self) -> bool {
        let result = self.client.post(self.logout_url()).send().await;
        self.finish_logout(result)
    }

    pub async fn logout_with_cookies(&self, cookies: &str) -> bool {
        let result = self
            .forwarding_client
            .post(self.logout_url())
            .header(COOKIE, cookies)
            .send()
            .await;
        self.finish_logout(result)
    }

    fn finish_logout(&self, result: reqwest::Result<reqwest::Response>) -> bool {
        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!("Logout rejected with status {}", response.status());
                false
            }
            Err(e) => {
                tracing::error!("Logout failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{agent_id_for, AgentStatus};
    use axum::{http::HeaderMap, routing::get, Json, Router};
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_urls_trim_trailing_slash() {
        let client = AuthClient::new("http://localhost:8004/").unwrap();
        assert_eq!(client.auth_url(), "http://localhost:8004/auth/login");
        assert_eq!(client.logout_url(), "http://localhost:8004/auth/logout");
    }

    #[tokio::test]
    async fn test_unreachable_server_reads_as_anonymous() {
        let client = AuthClient::new("http://127.0.0.1:9").unwrap();
        let status = client.auth_status_with_cookies("session=abc").await;
        assert!(!status.authenticated);
        assert!(client.is_agent_expired(Some("session=abc")).await);
        assert_eq!(client.spending_limits(None).await.max_budget, 0.0);
    }

    // Answers /auth/status with whichever user the `session` cookie names.
    async fn status_for_cookie(headers: HeaderMap) -> Json<AuthStatus> {
        let cookie = headers
            .get("cookie")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let Some(username) = cookie.strip_prefix("session=") else {
            return Json(AuthStatus::anonymous());
        };
        let now = Utc::now();
        Json(AuthStatus {
            authenticated: true,
            username: Some(username.to_string()),
            agent_id: Some(agent_id_for(username)),
            email: Some(format!("{}@example.com", username)),
            agent_config: Some(AgentConfig {
                agent_id: agent_id_for(username),
                username: username.to_string(),
                session_name: "test".to_string(),
                max_budget: if username == "alice" { 100.0 } else { 250.0 },
                expiration_time: now + ChronoDuration::hours(1),
                created_at: now,
                status: AgentStatus::Active,
            }),
        })
    }

    #[tokio::test]
    async fn test_lookups_follow_the_callers_cookies() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/auth/status", get(status_for_cookie));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = AuthClient::new(format!("http://{}", addr)).unwrap();

        let alice = client.user_info(Some("session=alice")).await.unwrap();
        assert_eq!(alice.username, "alice");
        let bob = client.user_info(Some("session=bob")).await.unwrap();
        assert_eq!(bob.username, "bob");

        // Asking for alice after bob must not answer with bob's data.
        assert_eq!(client.spending_limits(Some("session=alice")).await.max_budget, 100.0);
        assert!(client.is_agent_authorized(&agent_id_for("alice"), Some("session=alice")).await);
        assert!(!client.is_agent_authorized(&agent_id_for("bob"), Some("session=alice")).await);
        assert!(!client.is_agent_expired(Some("session=bob")).await);

        // The service's own jar has no session, so it stays anonymous.
        assert!(client.user_info(None).await.is_none());
        assert!(client.is_agent_expired(None).await);
    }
}
