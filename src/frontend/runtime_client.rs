use crate::{
    agent::{
        session::{Content, Event, Session},
        tool::State,
    },
    config::FrontendConfig,
    error::{Result, ShoppingError},
    runtime::RunRequest,
};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;

// HTTP client for the agent runtime's session and `/run` endpoints.
pub struct RuntimeClient {
    base_url: String,
    app_name: String,
    client: Client,
    session_timeout: Duration,
    run_timeout: Duration,
}

impl RuntimeClient {
    pub fn new(config: &FrontendConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.runtime_url.trim_end_matches('/').to_string(),
            app_name: config.app_name.clone(),
            client: Client::builder().build()?,
            session_timeout: Duration::from_secs(config.session_timeout_seconds),
            run_timeout: Duration::from_secs(config.run_timeout_seconds),
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    // Creates a runtime session seeded with `state` and returns its id.
    pub async fn create_session(&self, user_id: &str, state: State) -> Result<String> {
        let url = format!(
            "{}/apps/{}/users/{}/sessions",
            self.base_url, self.app_name, user_id
        );
        let response = self
            .client
            .post(&url)
            .json(&json!({"state": state}))
            .timeout(self.session_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ShoppingError::Upstream {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let session: Session = response.json().await?;
        tracing::info!(session_id = %session.id, user_id, "created runtime session");
        Ok(session.id)
    }

    pub async fn run(&self, user_id: &str, session_id: &str, text: &str) -> Result<Vec<Event>> {
        let request = RunRequest {
            app_name: self.app_name.clone(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            new_message: Content::user_text(text),
            streaming: false,
        };
        let response = self
            .client
            .post(format!("{}/run", self.base_url))
            .json(&request)
            .timeout(self.run_timeout)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let events: Vec<Event> = response.json().await?;
                tracing::info!(session_id, events = events.len(), "runtime returned events");
                Ok(events)
            }
            StatusCode::NOT_FOUND => Err(ShoppingError::SessionNotFound(session_id.to_string())),
            status => Err(ShoppingError::Upstream {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
