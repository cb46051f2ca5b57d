use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShoppingError>;

#[derive(Error, Debug)]
pub enum ShoppingError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Payment error: {0}")]
    Payment(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("App not found: {0}")]
    AppNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Upstream service returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

impl From<serde_json::Error> for ShoppingError {
    fn from(err: serde_json::Error) -> Self {
        ShoppingError::Serialization(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ShoppingError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ShoppingError::Auth(err.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for ShoppingError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        ShoppingError::Llm(err.to_string())
    }
}

impl From<std::io::Error> for ShoppingError {
    fn from(err: std::io::Error) -> Self {
        ShoppingError::Io(err.to_string())
    }
}
