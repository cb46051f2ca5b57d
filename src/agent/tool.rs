use crate::{
    agent::llm::ToolSpec,
    error::{Result, ShoppingError},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use std::{collections::HashMap, sync::Arc};

// Session state shared between tools of one session.
pub type State = Map<String, Value>;

// What a tool may see and change while it runs.
pub struct ToolContext<'a> {
    pub agent_name: &'a str,
    pub invocation_id: &'a str,
    pub state: &'a mut State,
}

impl<'a> ToolContext<'a> {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.state.get(key).and_then(Value::as_str)
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        self.state.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key)
            .ok_or_else(|| ShoppingError::Tool(format!("No {} found in session state", key)))
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Value;

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

// Shape a tool failure the way the model expects to read it.
pub fn error_response(message: impl std::fmt::Display) -> Value {
    json!({"status": "error", "message": message.to_string()})
}

pub fn arg_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn required_arg(args: &Value, key: &str) -> Result<String> {
    arg_str(args, key).ok_or_else(|| ShoppingError::Tool(format!("Missing required argument `{}`", key)))
}

// JSON schema for a tool taking only string arguments.
pub fn string_params(params: &[(&str, &str)], required: &[&str]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|(name, description)| {
            (
                name.to_string(),
                json!({"type": "string", "description": description}),
            )
        })
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&position) => self.tools[position] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&position| self.tools[position].clone())
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<Arc<dyn Tool>> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for tool in iter {
            registry.register(tool);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its input"
        }

        fn parameters(&self) -> Value {
            string_params(&[("text", "Text to echo")], &["text"])
        }

        async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
            let text = required_arg(&args, "text")?;
            ctx.set("last_echo", &text)?;
            Ok(json!({"echo": text}))
        }
    }

    #[tokio::test]
    async fn test_tool_writes_state() {
        let registry: ToolRegistry = [Arc::new(Echo) as Arc<dyn Tool>].into_iter().collect();
        let tool = registry.get("echo").unwrap();
        let mut state = State::new();
        let mut ctx = ToolContext {
            agent_name: "root_agent",
            invocation_id: "e-1",
            state: &mut state,
        };

        let output = tool.call(json!({"text": "hi"}), &mut ctx).await.unwrap();
        assert_eq!(output["echo"], "hi");
        assert_eq!(ctx.get_str("last_echo"), Some("hi"));

        let missing = tool.call(json!({}), &mut ctx).await;
        assert!(matches!(missing, Err(ShoppingError::Tool(_))));
    }

    #[test]
    fn test_registry_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(Echo));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.specs()[0].parameters["required"][0], "text");
    }

    #[test]
    fn test_arg_str_ignores_blank() {
        let args = json!({"a": "  ", "b": " x "});
        assert_eq!(arg_str(&args, "a"), None);
        assert_eq!(arg_str(&args, "b").as_deref(), Some("x"));
        assert_eq!(
            error_response("boom"),
            json!({"status": "error", "message": "boom"})
        );
    }
}
