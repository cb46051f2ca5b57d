use crate::model::{AgentConfig, UserRecord};
use parking_lot::RwLock;
use std::collections::HashMap;

// Process-local user and agent-configuration tables. Nothing is persisted.
#[derive(Default)]
pub struct AuthStore {
    users: RwLock<HashMap<String, UserRecord>>,
    agent_configs: RwLock<HashMap<String, AgentConfig>>,
}

impl AuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users.write().insert(user.user_id.clone(), user);
    }

    pub fn user(&self, user_id: &str) -> Option<UserRecord> {
        self.users.read().get(user_id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }

    // Replaces any previous configuration for the same agent id.
    pub fn upsert_agent_config(&self, config: AgentConfig) {
        self.agent_configs.write().insert(config.agent_id.clone(), config);
    }

    pub fn agent_config(&self, agent_id: &str) -> Option<AgentConfig> {
        self.agent_configs.read().get(agent_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{agent_id_for, AgentStatus};
    use chrono::{Duration, Utc};

    #[test]
    fn test_agent_config_upsert_replaces() {
        let store = AuthStore::new();
        let mut config = AgentConfig {
            agent_id: agent_id_for("shopper"),
            username: "shopper".to_string(),
            session_name: "first".to_string(),
            max_budget: 100.0,
            expiration_time: Utc::now() + Duration::hours(1),
            created_at: Utc::now(),
            status: AgentStatus::Active,
        };
        store.upsert_agent_config(config.clone());
        config.session_name = "second".to_string();
        store.upsert_agent_config(config);

        let stored = store.agent_config("BuyWhenReady-gemini-shopper").unwrap();
        assert_eq!(stored.session_name, "second");
        assert!(store.agent_config("BuyWhenReady-gemini-nobody").is_none());
    }

    #[test]
    fn test_users() {
        let store = AuthStore::new();
        store.insert_user(UserRecord {
            user_id: "u-1".to_string(),
            username: "shopper".to_string(),
            email: "a@b.c".to_string(),
            login_time: Utc::now(),
        });
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.user("u-1").unwrap().email, "a@b.c");
    }
}
