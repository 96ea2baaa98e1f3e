use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;

use crate::errors::{to_env_var, ConfigError};

pub const DEFAULT_BASE_URL: &str = "https://www.iconsolepro.com/oauth";
pub const DEFAULT_ENDPOINT: &str = "/iConsoleProAIApi/AiTest";
pub const DEFAULT_CARD_TITLE: &str = "课程封面";

pub const DEFAULT_FORMAT_HINT: &str = "请使用中文回答，并遵守以下排版：
1) 段落之间空一行；
2) 列举建议时使用“• ”项目符号；
3) 语句简洁，先结论后细节。";

/// Everything the streaming pipeline needs to know about the answer service.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Static credential, sent in both the `Authorization` and `token` headers
    pub token: String,
    #[serde(default = "default_lang_code")]
    pub lang_code: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_format_hint")]
    pub format_hint: String,
    #[serde(default = "default_card_title")]
    pub default_card_title: String,
    #[serde(default)]
    pub allow_insecure_http: bool,
}

impl ChatConfig {
    /// A config with every default applied and the given credential.
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            base_url: default_base_url(),
            endpoint: default_endpoint(),
            token: token.into(),
            lang_code: default_lang_code(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            format_hint: default_format_hint(),
            default_card_title: default_card_title(),
            allow_insecure_http: false,
        }
    }

    /// Load from defaults layered with `XIAOYOU_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_token(None)
    }

    /// Like `load`, but an explicit token wins over `XIAOYOU_TOKEN`.
    pub fn load_with_token(token: Option<String>) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("base_url", default_base_url())?
            .set_default("endpoint", default_endpoint())?
            .set_default("lang_code", default_lang_code())?
            .set_default("timeout_secs", default_timeout_secs())?
            .set_default("max_retries", default_max_retries())?
            .set_default("backoff_base_ms", default_backoff_base_ms())?
            .set_default("default_card_title", default_card_title())?
            .set_default("allow_insecure_http", false)?
            .add_source(
                Environment::with_prefix("XIAOYOU")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("token", token)?
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    pub fn with_format_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.format_hint = hint.into();
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_lang_code() -> String {
    "0".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_format_hint() -> String {
    DEFAULT_FORMAT_HINT.to_string()
}

fn default_card_title() -> String {
    DEFAULT_CARD_TITLE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("XIAOYOU_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("XIAOYOU_TOKEN", "secret");

        let config = ChatConfig::load().unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.token, "secret");
        assert_eq!(config.lang_code, "0");
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff_base(), Duration::from_secs(1));
        assert_eq!(config.default_card_title, "课程封面");
        assert_eq!(config.format_hint, DEFAULT_FORMAT_HINT);
        assert!(!config.allow_insecure_http);

        env::remove_var("XIAOYOU_TOKEN");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("XIAOYOU_TOKEN", "secret");
        env::set_var("XIAOYOU_BASE_URL", "http://localhost:9000");
        env::set_var("XIAOYOU_MAX_RETRIES", "5");
        env::set_var("XIAOYOU_ALLOW_INSECURE_HTTP", "true");

        let config = ChatConfig::load().unwrap();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.max_retries, 5);
        assert!(config.allow_insecure_http);

        env::remove_var("XIAOYOU_TOKEN");
        env::remove_var("XIAOYOU_BASE_URL");
        env::remove_var("XIAOYOU_MAX_RETRIES");
        env::remove_var("XIAOYOU_ALLOW_INSECURE_HTTP");
    }

    #[test]
    #[serial]
    fn test_missing_token() {
        clean_env();

        let err = ChatConfig::load().unwrap_err();
        match err {
            ConfigError::MissingEnvVar { env_var } => assert_eq!(env_var, "XIAOYOU_TOKEN"),
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_explicit_token_wins() {
        clean_env();
        let config = ChatConfig::load_with_token(Some("from-flag".into())).unwrap();
        assert_eq!(config.token, "from-flag");

        env::set_var("XIAOYOU_TOKEN", "from-env");
        let config = ChatConfig::load_with_token(Some("from-flag".into())).unwrap();
        assert_eq!(config.token, "from-flag");
        let config = ChatConfig::load_with_token(None).unwrap();
        assert_eq!(config.token, "from-env");
        env::remove_var("XIAOYOU_TOKEN");
    }

    #[test]
    fn test_builder_helpers() {
        let config = ChatConfig::new("t")
            .with_base_url("http://127.0.0.1:1")
            .with_insecure_http(true)
            .with_backoff_base(Duration::from_millis(10));
        assert_eq!(config.base_url, "http://127.0.0.1:1");
        assert!(config.allow_insecure_http);
        assert_eq!(config.backoff_base_ms, 10);
    }

    #[test]
    fn test_huge_backoff_base_saturates() {
        let config = ChatConfig::new("t").with_backoff_base(Duration::MAX);
        assert_eq!(config.backoff_base_ms, u64::MAX);
    }
}
