use crate::{
    agent::tool::State,
    error::{Result, ShoppingError},
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

pub fn now_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::default()
        }
    }

    pub fn function_response(response: FunctionResponse) -> Self {
        Self {
            function_response: Some(response),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: "model".to_string(),
            parts,
        }
    }

    // Text parts joined with newlines; `None` when there are none.
    pub fn joined_text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventActions {
    #[serde(default, skip_serializing_if = "State::is_empty")]
    pub state_delta: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default)]
    pub actions: EventActions,
    pub timestamp: f64,
}

impl Event {
    pub fn new(invocation_id: &str, author: &str, content: Option<Content>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.to_string(),
            author: author.to_string(),
            content,
            actions: EventActions::default(),
            timestamp: now_seconds(),
        }
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.content
            .iter()
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.function_call.as_ref())
    }

    pub fn function_responses(&self) -> impl Iterator<Item = &FunctionResponse> {
        self.content
            .iter()
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.function_response.as_ref())
    }

    pub fn text(&self) -> Option<String> {
        self.content.as_ref().and_then(Content::joined_text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent: Option<String>,
    pub last_update_time: f64,
}

type SessionKey = (String, String, String);

fn key(app_name: &str, user_id: &str, session_id: &str) -> SessionKey {
    (app_name.to_string(), user_id.to_string(), session_id.to_string())
}

// In-memory session storage keyed by app, user and session id.
#[derive(Default)]
pub struct SessionService {
    sessions: RwLock<HashMap<SessionKey, Session>>,
    // one async lock per session, held for a whole run
    run_locks: Mutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>,
}

impl SessionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<State>,
        session_id: Option<String>,
    ) -> Result<Session> {
        let id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut sessions = self.sessions.write();
        let session_key = key(app_name, user_id, &id);
        if sessions.contains_key(&session_key) {
            return Err(ShoppingError::Validation(format!("Session already exists: {}", id)));
        }

        let session = Session {
            id,
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state: state.unwrap_or_default(),
            events: Vec::new(),
            active_agent: None,
            last_update_time: now_seconds(),
        };
        sessions.insert(session_key, session.clone());
        tracing::info!(app_name, user_id, session_id = %session.id, "session created");
        Ok(session)
    }

    pub fn get_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Option<Session> {
        self.sessions
            .read()
            .get(&key(app_name, user_id, session_id))
            .cloned()
    }

    // Sessions for one user, oldest first.
    pub fn list_sessions(&self, app_name: &str, user_id: &str) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .values()
            .filter(|session| session.app_name == app_name && session.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.last_update_time.total_cmp(&b.last_update_time));
        sessions
    }

    pub fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str) -> bool {
        let session_key = key(app_name, user_id, session_id);
        self.run_locks.lock().remove(&session_key);
        self.sessions.write().remove(&session_key).is_some()
    }

    // Waits until no other run holds this session; `None` for an unknown
    // session. A run's load-modify-save cycle happens under the guard.
    pub async fn lock_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Option<OwnedMutexGuard<()>> {
        let session_key = key(app_name, user_id, session_id);
        if !self.sessions.read().contains_key(&session_key) {
            return None;
        }
        let lock = Arc::clone(self.run_locks.lock().entry(session_key).or_default());
        Some(lock.lock_owned().await)
    }

    pub fn save_session(&self, mut session: Session) {
        session.last_update_time = now_seconds();
        let session_key = key(&session.app_name, &session.user_id, &session.id);
        self.sessions.write().insert(session_key, session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_get_delete() {
        let service = SessionService::new();
        let mut state = State::new();
        state.insert("username".to_string(), json!("shopper"));

        let session = service
            .create_session("shopping_agent", "u1", Some(state), None)
            .unwrap();
        let loaded = service.get_session("shopping_agent", "u1", &session.id).unwrap();
        assert_eq!(loaded.state["username"], "shopper");
        assert!(service.get_session("shopping_agent", "u2", &session.id).is_none());

        assert!(service.delete_session("shopping_agent", "u1", &session.id));
        assert!(!service.delete_session("shopping_agent", "u1", &session.id));
    }

    #[test]
    fn test_explicit_id_must_be_unique() {
        let service = SessionService::new();
        service
            .create_session("app", "u1", None, Some("s1".to_string()))
            .unwrap();
        let duplicate = service.create_session("app", "u1", None, Some("s1".to_string()));
        assert!(matches!(duplicate, Err(ShoppingError::Validation(_))));
        assert_eq!(service.list_sessions("app", "u1").len(), 1);
    }

    #[tokio::test]
    async fn test_session_lock_is_per_session() {
        let service = SessionService::new();
        for id in ["s1", "s2"] {
            service
                .create_session("app", "u1", None, Some(id.to_string()))
                .unwrap();
        }
        let wait = std::time::Duration::from_millis(50);

        let held = service.lock_session("app", "u1", "s1").await.unwrap();
        let other = tokio::time::timeout(wait, service.lock_session("app", "u1", "s2")).await;
        assert!(other.unwrap().is_some());

        let same = tokio::time::timeout(wait, service.lock_session("app", "u1", "s1")).await;
        assert!(same.is_err());

        drop(held);
        let again = tokio::time::timeout(wait, service.lock_session("app", "u1", "s1")).await;
        assert!(again.unwrap().is_some());

        assert!(service.lock_session("app", "u1", "missing").await.is_none());
    }

    #[test]
    fn test_event_wire_format() {
        let mut event = Event::new(
            "e-1",
            "root_agent",
            Some(Content::model(vec![Part::function_call(FunctionCall {
                id: Some("call_1".to_string()),
                name: "get_payment_methods".to_string(),
                args: json!({}),
            })])),
        );
        event.actions.transfer_to_agent = Some("shopper".to_string());

        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["invocationId"], "e-1");
        assert_eq!(wire["content"]["parts"][0]["functionCall"]["name"], "get_payment_methods");
        assert_eq!(wire["actions"]["transferToAgent"], "shopper");
        assert!(wire["content"]["parts"][0].get("text").is_none());
        assert_eq!(event.function_calls().count(), 1);
        assert_eq!(event.text(), None);
    }
}
