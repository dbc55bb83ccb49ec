use crate::error::{ClubChatError, Result};
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubChatConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Custom path for the SQLite database. Defaults to `~/.config/clubchat/clubchat.db`.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_web_host")]
    pub host: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            host: default_web_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret. Usually supplied through `JWT_SECRET_KEY`.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl AuthConfig {
    /// The signing secret, or a configuration error when none is set.
    pub fn require_secret(&self) -> Result<&str> {
        match self.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(ClubChatError::Config(
                "auth.jwt_secret is not set (set JWT_SECRET_KEY)".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub env_var: Option<String>,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,
    /// Upper bound on a single model call.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            env_var: None,
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Valid LLM provider names.
pub const VALID_LLM_PROVIDERS: &[&str] = &["ollama", "openai", "gemini", "anthropic", "claude"];

// -- Defaults --

fn default_web_port() -> u16 {
    8001
}
fn default_web_host() -> String {
    "127.0.0.1".to_string()
}
/// Ten years.
pub const MAX_TOKEN_TTL_HOURS: u64 = 24 * 365 * 10;

fn default_token_ttl_hours() -> u64 {
    24
}
fn default_true() -> bool {
    true
}
fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_llm_max_tokens() -> usize {
    1024
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl ClubChatConfig {
    /// Load configuration with three-layer TOML merge, then environment overrides:
    /// 1. ~/.config/clubchat/config.toml (global)
    /// 2. .clubchat/config.toml (project)
    /// 3. .clubchat/config.local.toml (local, gitignored)
    /// 4. `JWT_SECRET_KEY`, `DATABASE_PATH`, `PORT`
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Layer 1: Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        // Layer 2: Project config
        if let Some(dir) = project_dir {
            let project_config = dir.join(".clubchat").join("config.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }

            // Layer 3: Local config (gitignored)
            let local_config = dir.join(".clubchat").join("config.local.toml");
            if local_config.exists() {
                builder = builder.add_source(File::from(local_config).required(false));
            }
        }

        let config = builder
            .build()
            .map_err(|e| ClubChatError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| ClubChatError::Config(e.to_string()))?;

        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files).
    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig::default(),
            web: WebConfig::default(),
            auth: AuthConfig::default(),
            llm: LlmConfig::default(),
        }
    }

    /// Overlay the deployment environment variables. `lookup` is injected so
    /// tests don't have to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("JWT_SECRET_KEY").filter(|s| !s.is_empty()) {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(path) = lookup("DATABASE_PATH").filter(|s| !s.is_empty()) {
            self.storage.path = Some(path);
        }
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.web.port = p,
                Err(_) => tracing::warn!("config: ignoring non-numeric PORT '{port}'"),
            }
        }
    }

    /// Validate config values, fixing out-of-range values and logging warnings.
    /// Lenient: out-of-range values are fixed, never rejected.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.llm.enabled && !VALID_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            warnings.push(format!(
                "unknown LLM provider '{}', valid: {}",
                self.llm.provider,
                VALID_LLM_PROVIDERS.join(", ")
            ));
        }

        if self.llm.max_tokens == 0 {
            warnings.push("llm.max_tokens = 0, setting to 256".to_string());
            self.llm.max_tokens = 256;
        }
        if self.llm.timeout_secs == 0 {
            warnings.push("llm.timeout_secs = 0, setting to 1".to_string());
            self.llm.timeout_secs = 1;
        }
        if self.auth.token_ttl_hours == 0 {
            warnings.push("auth.token_ttl_hours = 0, setting to 1".to_string());
            self.auth.token_ttl_hours = 1;
        }
        if self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            warnings.push(format!(
                "auth.token_ttl_hours = {} exceeds maximum {}, clamping",
                self.auth.token_ttl_hours, MAX_TOKEN_TTL_HOURS
            ));
            self.auth.token_ttl_hours = MAX_TOKEN_TTL_HOURS;
        }
        if self.web.port == 0 {
            warnings.push(format!(
                "web.port = 0, setting to {}",
                default_web_port()
            ));
            self.web.port = default_web_port();
        }

        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("clubchat").join("config.toml"))
}

/// Resolve an API key: check config field first, then environment variable.
pub fn resolve_api_key(
    api_key: Option<&str>,
    env_var_override: Option<&str>,
    default_env_var: &str,
    provider_name: &str,
) -> Result<String> {
    if let Some(key) = api_key {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    let env_var_name = env_var_override.unwrap_or(default_env_var);

    std::env::var(env_var_name)
        .ok()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ClubChatError::Config(format!(
                "{provider_name} LLM provider requires an API key \
                 (set llm.api_key or {env_var_name})"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ClubChatConfig::default_config();
        assert_eq!(config.web.port, 8001);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.auth.token_ttl_hours, 24);
        assert!(config.auth.jwt_secret.is_none());
        assert!(config.storage.path.is_none());
        assert!(config.llm.enabled);
        assert_eq!(config.llm.provider, "gemini");
    }

    #[test]
    fn test_load_config_no_files() {
        let config = ClubChatConfig::load(Some(Path::new("/nonexistent/path"))).unwrap();
        assert_eq!(config.llm.max_tokens, 1024);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = ClubChatConfig::default_config();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ClubChatConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.web.port, config.web.port);
        assert_eq!(parsed.llm.model, config.llm.model);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
[llm]
provider = "ollama"
model = "llama3.2"
base_url = "http://localhost:11434"
"#;
        let config: ClubChatConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert!(config.llm.enabled);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.web.port, 8001);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("JWT_SECRET_KEY", "s3cret"),
            ("DATABASE_PATH", "/tmp/clubs.db"),
            ("PORT", "9000"),
        ]
        .into_iter()
        .collect();
        let mut config = ClubChatConfig::default_config();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.storage.path.as_deref(), Some("/tmp/clubs.db"));
        assert_eq!(config.web.port, 9000);
    }

    #[test]
    fn test_env_override_bad_port_is_ignored() {
        let mut config = ClubChatConfig::default_config();
        config.apply_env_overrides(|k| (k == "PORT").then(|| "eighty".to_string()));
        assert_eq!(config.web.port, 8001);
    }

    #[test]
    fn test_require_secret() {
        let mut auth = AuthConfig::default();
        assert!(auth.require_secret().is_err());
        auth.jwt_secret = Some(String::new());
        assert!(auth.require_secret().is_err());
        auth.jwt_secret = Some("k".into());
        assert_eq!(auth.require_secret().unwrap(), "k");
    }

    #[test]
    fn test_validate_default_config_no_warnings() {
        let mut config = ClubChatConfig::default_config();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = ClubChatConfig::default_config();
        config.llm.max_tokens = 0;
        config.auth.token_ttl_hours = 0;
        config.llm.timeout_secs = 0;
        config.web.port = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 4);
        assert_eq!(config.llm.max_tokens, 256);
        assert_eq!(config.auth.token_ttl_hours, 1);
        assert_eq!(config.llm.timeout_secs, 1);
        assert_eq!(config.web.port, 8001);
    }

    #[test]
    fn test_validate_clamps_huge_token_ttl() {
        let mut config = ClubChatConfig::default_config();
        config.auth.token_ttl_hours = u64::MAX;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("auth.token_ttl_hours")));
        assert_eq!(config.auth.token_ttl_hours, MAX_TOKEN_TTL_HOURS);
    }

    #[test]
    fn test_validate_unknown_llm_provider() {
        let mut config = ClubChatConfig::default_config();
        config.llm.provider = "banana".to_string();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("unknown LLM provider")));
    }

    #[test]
    fn test_validate_llm_disabled_unknown_provider_no_warning() {
        let mut config = ClubChatConfig::default_config();
        config.llm.enabled = false;
        config.llm.provider = "banana".to_string();
        let warnings = config.validate();
        assert!(!warnings.iter().any(|w| w.contains("LLM provider")));
    }

    #[test]
    fn test_resolve_api_key_from_config() {
        let key = resolve_api_key(Some("config-key"), None, "OPENAI_API_KEY", "openai").unwrap();
        assert_eq!(key, "config-key");
    }

    #[test]
    fn test_resolve_api_key_missing() {
        let err = resolve_api_key(None, Some("CLUBCHAT_TEST_UNSET_KEY"), "X", "gemini")
            .unwrap_err();
        assert!(err.to_string().contains("CLUBCHAT_TEST_UNSET_KEY"));
    }
}
