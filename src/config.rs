use crate::error::{Result, ShoppingError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub auth: AuthServerConfig,
    pub frontend: FrontendConfig,
    pub runtime: RuntimeConfig,
    pub llm: LlmConfig,
    pub demo: DemoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct AuthServerConfig {
    pub host: String,
    pub port: u16,
    pub secret_key: String,
    /// Username assigned to every email login.
    pub default_username: String,
    /// Where the completion page and logout send the browser.
    pub shopping_agent_url: String,
    pub assets_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct FrontendConfig {
    pub host: String,
    pub port: u16,
    pub auth_server_url: String,
    pub runtime_url: String,
    pub app_name: String,
    pub session_timeout_seconds: u64,
    pub run_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    pub app_name: String,
    pub max_steps: usize,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct DemoConfig {
    pub user_email: String,
    pub wallet_address: String,
    pub wallet_balance: f64,
    pub currency: String,
    pub default_shipping_address: String,
    pub merchant_name: String,
    pub merchant_secret: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: Option<String>,
}

impl Default for AuthServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8004,
            secret_key: "kite-auth-secret-key-2025".to_string(),
            default_username: "shopper".to_string(),
            shopping_agent_url: "http://localhost:8000".to_string(),
            assets_dir: PathBuf::from("assets"),
        }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            auth_server_url: "http://localhost:8004".to_string(),
            runtime_url: "http://localhost:8001".to_string(),
            app_name: "shopping_agent".to_string(),
            session_timeout_seconds: 10,
            run_timeout_seconds: 30,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            app_name: "shopping_agent".to_string(),
            max_steps: 24,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            api_base: Some("https://generativelanguage.googleapis.com/v1beta/openai".to_string()),
            temperature: Some(0.7),
            timeout_seconds: Some(30),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            user_email: "bugsbunny@gmail.com".to_string(),
            wallet_address: "0x742d35Cc6634C0532925a3b8D".to_string(),
            wallet_balance: 2847.32,
            currency: "USD".to_string(),
            default_shipping_address: "123 Main St, San Francisco, CA 94105".to_string(),
            merchant_name: "Kite Demo Store".to_string(),
            merchant_secret: "kite-merchant-demo-key".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| ShoppingError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AppConfig = toml::from_str(&config_str)
            .map_err(|e| ShoppingError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Loads `path` when given, otherwise starts from defaults, then applies
    /// environment overrides.
    pub fn load_with_env_overrides<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("AUTH_SECRET_KEY") {
            self.auth.secret_key = secret;
        }

        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            self.llm.api_key = Some(key);
        } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }

        if let Ok(base) = std::env::var("LLM_API_BASE") {
            self.llm.api_base = Some(base);
        }

        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Ok(email) = std::env::var("DEMO_USER_EMAIL") {
            self.demo.user_email = email;
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.port == 0 || self.frontend.port == 0 || self.runtime.port == 0 {
            return Err(ShoppingError::Config("Server port cannot be 0".to_string()));
        }

        if self.auth.secret_key.is_empty() {
            return Err(ShoppingError::Config("Auth secret key cannot be empty".to_string()));
        }

        if self.frontend.auth_server_url.is_empty() || self.frontend.runtime_url.is_empty() {
            return Err(ShoppingError::Config("Frontend upstream URLs cannot be empty".to_string()));
        }

        if self.runtime.app_name.is_empty() {
            return Err(ShoppingError::Config("Runtime app name cannot be empty".to_string()));
        }

        if self.llm.model.is_empty() {
            return Err(ShoppingError::Config("LLM model cannot be empty".to_string()));
        }

        Ok(())
    }

    pub fn auth_address(&self) -> String {
        format!("{}:{}", self.auth.host, self.auth.port)
    }

    pub fn frontend_address(&self) -> String {
        format!("{}:{}", self.frontend.host, self.frontend.port)
    }

    pub fn runtime_address(&self) -> String {
        format!("{}:{}", self.runtime.host, self.runtime.port)
    }

    pub fn get_llm_api_key(&self) -> Option<&str> {
        self.llm.api_key.as_deref()
    }
}

impl LoggingConfig {
    /// Installs the global tracing subscriber. `RUST_LOG` syntax is accepted in `level`.
    pub fn init(&self) {
        let filter = EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        let result = match self.format.as_deref() {
            Some("json") => builder.json().try_init(),
            _ => builder.try_init(),
        };
        if result.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    }
}

pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let default_config = AppConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| ShoppingError::Config(format!("Failed to serialize default config: {}", e)))?;

    std::fs::write(path, toml_str)
        .map_err(|e| ShoppingError::Config(format!("Failed to write default config file: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.auth.port, 8004);
        assert_eq!(config.frontend.port, 8000);
        assert_eq!(config.runtime.port, 8001);
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.demo.wallet_address, "0x742d35Cc6634C0532925a3b8D");
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.auth.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.secret_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_creation() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        create_default_config_file(path).unwrap();
        assert!(path.exists());

        let loaded_config = AppConfig::load(path).unwrap();
        assert_eq!(loaded_config.frontend.app_name, "shopping_agent");
        assert_eq!(loaded_config.demo.wallet_balance, 2847.32);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "[auth]\nport = 9004\n\n[llm]\nmodel = \"gpt-4o-mini\"\n",
        )
        .unwrap();

        let config = AppConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.auth.port, 9004);
        assert_eq!(config.auth.secret_key, "kite-auth-secret-key-2025");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.runtime.max_steps, 24);
    }
}
