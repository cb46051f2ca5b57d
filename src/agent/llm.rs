use crate::{
    config::LlmConfig,
    error::{Result, ShoppingError},
};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON text as produced by the model.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: &str, arguments: serde_json::Value) -> Self {
        Self {
            text: None,
            tool_calls: vec![ToolCall {
                id: format!("call_{}", name),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse>;
}

/// Chat-completions backend for any OpenAI-compatible endpoint, including
/// Gemini's `/v1beta/openai` surface.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    temperature: Option<f32>,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Self {
        let mut openai_config = OpenAIConfig::new();
        if let Some(api_key) = &config.api_key {
            openai_config = openai_config.with_api_key(api_key.clone());
        }
        if let Some(api_base) = &config.api_base {
            openai_config = openai_config.with_api_base(api_base.trim_end_matches('/').to_string());
        }

        Self {
            client: Client::with_config(openai_config),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds.unwrap_or(30)),
        }
    }
}

fn to_openai_message(message: &ChatMessage) -> std::result::Result<ChatCompletionRequestMessage, OpenAIError> {
    let converted: ChatCompletionRequestMessage = match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.clone())
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.clone())
            .build()?
            .into(),
        Role::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !message.content.is_empty() {
                args.content(message.content.clone());
            }
            if !message.tool_calls.is_empty() {
                let calls: Vec<ChatCompletionMessageToolCall> = message
                    .tool_calls
                    .iter()
                    .map(|call| ChatCompletionMessageToolCall {
                        id: call.id.clone(),
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect();
                args.tool_calls(calls);
            }
            args.build()?.into()
        }
        Role::Tool => ChatCompletionRequestToolMessageArgs::default()
            .content(message.content.clone())
            .tool_call_id(message.tool_call_id.clone().unwrap_or_default())
            .build()?
            .into(),
    };
    Ok(converted)
}

fn to_openai_tool(spec: &ToolSpec) -> std::result::Result<ChatCompletionTool, OpenAIError> {
    ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(
            FunctionObjectArgs::default()
                .name(spec.name.clone())
                .description(spec.description.clone())
                .parameters(spec.parameters.clone())
                .build()?,
        )
        .build()
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let messages = request
            .messages
            .iter()
            .map(to_openai_message)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let tools = request
            .tools
            .iter()
            .map(to_openai_tool)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model.clone()).messages(messages);
        if !tools.is_empty() {
            args.tools(tools);
        }
        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }
        let openai_request = args.build()?;

        tracing::debug!(model = %request.model, messages = request.messages.len(), "calling chat completions");
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(openai_request))
            .await
            .map_err(|_| ShoppingError::Llm(format!("model call timed out after {:?}", self.timeout)))??;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ShoppingError::Llm("completion returned no choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, call)| ToolCall {
                id: if call.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    call.id
                },
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(LlmResponse {
            text: choice.message.content.filter(|text| !text.trim().is_empty()),
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_conversion() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "get_payment_methods".to_string(),
            arguments: "{}".to_string(),
        };
        let messages = [
            ChatMessage::system("be helpful"),
            ChatMessage::user("hi"),
            ChatMessage::assistant_with_tool_calls("", vec![call]),
            ChatMessage::tool_result("call_1", "[\"Kite User Wallet\"]"),
        ];
        for message in &messages {
            assert!(to_openai_message(message).is_ok());
        }
    }

    #[test]
    fn test_tool_conversion() {
        let spec = ToolSpec {
            name: "store_buywhenready_conditions".to_string(),
            description: "Stores conditions".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        };
        let tool = to_openai_tool(&spec).unwrap();
        assert_eq!(tool.function.name, "store_buywhenready_conditions");
    }
}
