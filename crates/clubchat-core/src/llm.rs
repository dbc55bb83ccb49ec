use std::time::Duration;

use crate::config::{resolve_api_key, LlmConfig};
use crate::error::{ClubChatError, ModelError, Result};

/// Boundary to the language model: prompt in, text out.
pub trait ModelInvoker: Send + Sync {
    fn invoke(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = std::result::Result<String, ModelError>> + Send;
}

/// A missing model is a deployment that never configured one.
impl<M: ModelInvoker> ModelInvoker for Option<M> {
    async fn invoke(&self, prompt: &str) -> std::result::Result<String, ModelError> {
        match self {
            Some(model) => model.invoke(prompt).await,
            None => Err(ModelError::Unavailable(
                "language model is not configured".into(),
            )),
        }
    }
}

/// LLM text generation over the providers' HTTP APIs.
pub struct LlmService {
    provider: LlmProvider,
    config: LlmConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for LlmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmService")
            .field("provider", &self.provider)
            .field("model", &self.config.model)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum LlmProvider {
    Ollama,
    OpenAI,
    Gemini,
    Anthropic,
}

impl LlmProvider {
    fn label(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
        }
    }

    fn default_env_var(&self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
        }
    }
}

impl LlmService {
    /// Create an LLM service from configuration.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider = match config.provider.as_str() {
            "ollama" => LlmProvider::Ollama,
            "openai" => LlmProvider::OpenAI,
            "gemini" => LlmProvider::Gemini,
            "anthropic" | "claude" => LlmProvider::Anthropic,
            other => {
                return Err(ClubChatError::Config(format!(
                    "unknown LLM provider: '{other}' (expected 'ollama', 'openai', 'gemini', or 'anthropic')"
                )));
            }
        };

        // Validate API key for providers that need one
        if let Some(env_var) = provider.default_env_var() {
            resolve_api_key(
                config.api_key.as_deref(),
                config.env_var.as_deref(),
                env_var,
                provider.label(),
            )?;
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ClubChatError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            provider,
            config: config.clone(),
            client,
        })
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.label()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generate text from a prompt with an optional system message.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> std::result::Result<String, ModelError> {
        let text = match self.provider {
            LlmProvider::Ollama => self.generate_ollama(prompt, system).await,
            LlmProvider::OpenAI => self.generate_openai(prompt, system).await,
            LlmProvider::Gemini => self.generate_gemini(prompt, system).await,
            LlmProvider::Anthropic => self.generate_anthropic(prompt, system).await,
        }?;

        if text.trim().is_empty() {
            return Err(ModelError::GenerationFailed(format!(
                "{} returned an empty response",
                self.provider.label()
            )));
        }
        Ok(text)
    }

    fn api_key(&self) -> std::result::Result<String, ModelError> {
        let env_var = self.provider.default_env_var().unwrap_or_default();
        resolve_api_key(
            self.config.api_key.as_deref(),
            self.config.env_var.as_deref(),
            env_var,
            self.provider.label(),
        )
        .map_err(|e| ModelError::Unavailable(e.to_string()))
    }

    /// Send a request and decode the JSON body, classifying failures.
    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<serde_json::Value, ModelError> {
        let label = self.provider.label();
        let resp = request
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(format!("{label} request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let msg = format!("{label} LLM error {status}: {text}");
            // Rejected credentials mean the deployment is misconfigured.
            return Err(match status.as_u16() {
                401 | 403 => ModelError::Unavailable(msg),
                _ => ModelError::GenerationFailed(msg),
            });
        }

        resp.json()
            .await
            .map_err(|e| ModelError::GenerationFailed(format!("{label} response parse error: {e}")))
    }

    /// Ollama: POST {base_url}/api/generate
    async fn generate_ollama(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> std::result::Result<String, ModelError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("http://localhost:11434");

        let url = format!("{}/api/generate", base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": self.config.max_tokens,
            }
        });

        if let Some(sys) = system {
            body["system"] = serde_json::Value::String(sys.to_string());
        }

        let json = self.send_json(self.client.post(&url).json(&body)).await?;

        json["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ModelError::GenerationFailed("Ollama response missing 'response' field".into())
            })
    }

    /// OpenAI: POST {base_url}/v1/chat/completions
    async fn generate_openai(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> std::result::Result<String, ModelError> {
        let api_key = self.api_key()?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com");

        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));

        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(serde_json::json!({"role": "system", "content": sys}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
        });

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body);
        let json = self.send_json(request).await?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ModelError::GenerationFailed("OpenAI response missing content".into()))
    }

    /// Anthropic: POST {base_url}/v1/messages
    async fn generate_anthropic(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> std::result::Result<String, ModelError> {
        let api_key = self.api_key()?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com");

        let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        if let Some(sys) = system {
            body["system"] = serde_json::Value::String(sys.to_string());
        }

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body);
        let json = self.send_json(request).await?;

        // Anthropic response: {"content": [{"type": "text", "text": "..."}]}
        json["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ModelError::GenerationFailed("Anthropic response missing text content".into())
            })
    }

    /// Gemini: POST generativelanguage.googleapis.com/v1beta/models/{model}:generateContent
    async fn generate_gemini(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> std::result::Result<String, ModelError> {
        let api_key = self.api_key()?;
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com");

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            self.config.model,
        );

        let mut body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "maxOutputTokens": self.config.max_tokens,
            }
        });

        if let Some(sys) = system {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": sys}]});
        }

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &api_key)
            .json(&body);
        let json = self.send_json(request).await?;

        json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ModelError::GenerationFailed("Gemini response missing text".into()))
    }
}

impl ModelInvoker for LlmService {
    async fn invoke(&self, prompt: &str) -> std::result::Result<String, ModelError> {
        self.generate(prompt, None).await
    }
}
