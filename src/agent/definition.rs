use crate::{
    agent::tool::{Tool, ToolRegistry},
    error::Result,
};
use std::{future::Future, sync::Arc, time::Duration};

// Retries a failed model call, sleeping before each retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay_between_calls: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay_between_calls: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay_seconds: f64) -> Self {
        Self {
            max_retries,
            delay_between_calls: Duration::from_secs_f64(delay_seconds.max(0.0)),
        }
    }

    pub async fn run<T, F, Fut>(&self, agent_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        agent = agent_name,
                        attempt,
                        max_retries = self.max_retries,
                        "model call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.delay_between_calls).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub struct LlmAgent {
    pub name: String,
    pub model: String,
    pub description: String,
    pub instruction: String,
    pub tools: ToolRegistry,
    pub sub_agents: Vec<Arc<LlmAgent>>,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools.names())
            .field(
                "sub_agents",
                &self.sub_agents.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            )
            .field("retry", &self.retry)
            .finish()
    }
}

impl LlmAgent {
    pub fn builder(name: impl Into<String>) -> LlmAgentBuilder {
        LlmAgentBuilder::new(name)
    }

    // Depth-first search of this agent's tree, including itself.
    pub fn find_agent(self: &Arc<Self>, name: &str) -> Option<Arc<LlmAgent>> {
        if self.name == name {
            return Some(self.clone());
        }
        self.sub_agents.iter().find_map(|sub| sub.find_agent(name))
    }

    pub fn parent_of(self: &Arc<Self>, name: &str) -> Option<Arc<LlmAgent>> {
        if self.sub_agents.iter().any(|sub| sub.name == name) {
            return Some(self.clone());
        }
        self.sub_agents.iter().find_map(|sub| sub.parent_of(name))
    }

    // Agents `agent_name` may hand the conversation to: its sub-agents,
    // then its parent. `self` is the tree root.
    pub fn transfer_targets(self: &Arc<Self>, agent_name: &str) -> Vec<Arc<LlmAgent>> {
        let Some(agent) = self.find_agent(agent_name) else {
            return Vec::new();
        };
        let mut targets = agent.sub_agents.clone();
        if let Some(parent) = self.parent_of(agent_name) {
            targets.push(parent);
        }
        targets
    }
}

pub struct LlmAgentBuilder {
    name: String,
    model: String,
    description: String,
    instruction: String,
    tools: ToolRegistry,
    sub_agents: Vec<Arc<LlmAgent>>,
    retry: RetryPolicy,
}

impl LlmAgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: String::new(),
            description: String::new(),
            instruction: String::new(),
            tools: ToolRegistry::new(),
            sub_agents: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        for tool in tools {
            self.tools.register(tool);
        }
        self
    }

    pub fn sub_agent(mut self, agent: Arc<LlmAgent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn retry(mut self, max_retries: u32, delay_seconds: f64) -> Self {
        self.retry = RetryPolicy::new(max_retries, delay_seconds);
        self
    }

    pub fn build(self) -> Arc<LlmAgent> {
        Arc::new(LlmAgent {
            name: self.name,
            model: self.model,
            description: self.description,
            instruction: self.instruction,
            tools: self.tools,
            sub_agents: self.sub_agents,
            retry: self.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShoppingError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tree() -> Arc<LlmAgent> {
        let leaf = LlmAgent::builder("leaf").build();
        let middle = LlmAgent::builder("middle").sub_agent(leaf).build();
        let sibling = LlmAgent::builder("sibling").build();
        LlmAgent::builder("root")
            .sub_agent(middle)
            .sub_agent(sibling)
            .build()
    }

    #[test]
    fn test_tree_lookups() {
        let root = tree();
        assert_eq!(root.find_agent("leaf").unwrap().name, "leaf");
        assert!(root.find_agent("nobody").is_none());
        assert_eq!(root.parent_of("leaf").unwrap().name, "middle");
        assert!(root.parent_of("root").is_none());

        let names = |targets: Vec<Arc<LlmAgent>>| {
            targets.iter().map(|a| a.name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(root.transfer_targets("root")), ["middle", "sibling"]);
        assert_eq!(names(root.transfer_targets("middle")), ["leaf", "root"]);
        assert_eq!(names(root.transfer_targets("leaf")), ["middle"]);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let policy = RetryPolicy::new(2, 0.0);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = policy
            .run("root", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ShoppingError::Llm("unavailable".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let policy = RetryPolicy::new(1, 0.0);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = policy
            .run("root", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ShoppingError::Llm("unavailable".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
