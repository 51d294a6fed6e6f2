//! Text generation backends
//!
//! The manager probes the configured candidate models in order, remembers
//! the first one that answers and caches that verdict for a fixed TTL.

use crate::config::{LlmConfig, LlmProviderKind};
use crate::errors::{ErrorContext, ModelError, ModelResult, SerializationError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PROBE_PROMPT: &str = "Hello";
const PROBE_MAX_TOKENS: u32 = 16;

/// A text generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn backend_name(&self) -> &str;

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> ModelResult<String>;
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

/// Local Ollama server (`/api/generate`)
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl OllamaGenerator {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn backend_name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> ModelResult<String> {
        let url = format!("{}/api/generate", self.endpoint);
        let request = OllamaGenerateRequest {
            model,
            prompt,
            stream: false,
            options: OllamaOptions {
                num_predict: max_tokens,
                temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::unavailable("ollama", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::unavailable(
                "ollama",
                format!("API error {status}: {body}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ModelError::unavailable("ollama", e))?;
        let result: OllamaGenerateResponse = decode_body("ollama", &body)?;
        Ok(result.response)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions endpoint (Groq, vLLM, LM Studio, ...)
pub struct OpenAiCompatibleGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleGenerator {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    fn backend_name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> ModelResult<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::unavailable("openai", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::unavailable(
                "openai",
                format!("API error {status}: {body}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ModelError::unavailable("openai", e))?;
        let result: ChatResponse = decode_body("openai", &body)?;
        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

/// A body that does not decode means the backend is not speaking our API
fn decode_body<T: DeserializeOwned>(backend: &str, body: &[u8]) -> ModelResult<T> {
    serde_json::from_slice(body)
        .map_err(SerializationError::from)
        .with_model_context(backend)
}

#[derive(Debug, Clone)]
struct Availability {
    working_model: Option<String>,
    checked_at: Instant,
}

pub struct LlmManager {
    backend: Option<Arc<dyn TextGenerator>>,
    models: Vec<String>,
    request_timeout: Duration,
    probe_timeout: Duration,
    availability_ttl: Duration,
    max_tokens: u32,
    temperature: f32,
    availability: RwLock<Option<Availability>>,
    probe_lock: tokio::sync::Mutex<()>,
}

impl LlmManager {
    pub fn from_config(config: &LlmConfig) -> Self {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let backend: Option<Arc<dyn TextGenerator>> = match config.provider {
            LlmProviderKind::Disabled => None,
            LlmProviderKind::Ollama => {
                Some(Arc::new(OllamaGenerator::new(&config.endpoint, request_timeout)))
            }
            LlmProviderKind::OpenAi => {
                if config.api_key.is_none() {
                    tracing::warn!(
                        endpoint = %config.endpoint,
                        "No API key configured for the OpenAI-compatible backend"
                    );
                }
                Some(Arc::new(OpenAiCompatibleGenerator::new(
                    &config.endpoint,
                    config.api_key.clone(),
                    request_timeout,
                )))
            }
        };
        Self::build(backend, config)
    }

    /// Manager over an arbitrary backend
    pub fn with_backend(backend: Arc<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self::build(Some(backend), config)
    }

    pub fn disabled() -> Self {
        let config = LlmConfig {
            provider: LlmProviderKind::Disabled,
            ..crate::config::AppConfig::default().llm
        };
        Self::build(None, &config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn build(backend: Option<Arc<dyn TextGenerator>>, config: &LlmConfig) -> Self {
        Self {
            backend,
            models: config.models.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            availability_ttl: Duration::from_secs(config.availability_ttl_secs),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            availability: RwLock::new(None),
            probe_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend
            .as_ref()
            .map(|b| b.backend_name())
            .unwrap_or("disabled")
    }

    /// Last probe verdict if still within the TTL, without probing
    pub fn cached_model(&self) -> Option<Option<String>> {
        self.availability
            .read()
            .as_ref()
            .filter(|a| a.checked_at.elapsed() < self.availability_ttl)
            .map(|a| a.working_model.clone())
    }

    pub async fn is_available(&self) -> bool {
        self.working_model().await.is_some()
    }

    /// First candidate model that answers, probing when the cached verdict expired
    pub async fn working_model(&self) -> Option<String> {
        let backend = self.backend.as_ref()?;
        if let Some(cached) = self.cached_model() {
            return cached;
        }

        let _guard = self.probe_lock.lock().await;
        if let Some(cached) = self.cached_model() {
            return cached;
        }

        let mut working_model = None;
        for model in &self.models {
            let probe = backend.generate(model, PROBE_PROMPT, PROBE_MAX_TOKENS, 0.1);
            match tokio::time::timeout(self.probe_timeout, probe).await {
                Ok(Ok(text)) if !text.trim().is_empty() => {
                    working_model = Some(model.clone());
                    break;
                }
                Ok(Ok(_)) => tracing::debug!(model = %model, "Model probe returned empty output"),
                Ok(Err(e)) => tracing::debug!(model = %model, error = %e, "Model probe failed"),
                Err(_) => tracing::debug!(model = %model, "Model probe timed out"),
            }
        }

        match &working_model {
            Some(model) => tracing::info!(backend = backend.backend_name(), model = %model, "LLM available"),
            None => tracing::warn!(backend = backend.backend_name(), "No working LLM model found"),
        }

        *self.availability.write() = Some(Availability {
            working_model: working_model.clone(),
            checked_at: Instant::now(),
        });
        working_model
    }

    /// Generate text with the working model, bounded by the request timeout
    pub async fn generate_response(&self, prompt: &str) -> ModelResult<String> {
        let backend = self.backend.as_ref().ok_or_else(|| ModelError::NotConfigured {
            backend: "llm".to_string(),
        })?;
        let model = self
            .working_model()
            .await
            .ok_or_else(|| ModelError::unavailable(backend.backend_name(), "no working model"))?;

        let call = backend.generate(&model, prompt, self.max_tokens, self.temperature);
        let text = match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ModelError::Timeout {
                    operation: format!("{}:{}", backend.backend_name(), model),
                    timeout_ms: self.request_timeout.as_millis() as u64,
                })
            }
        };

        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse { model });
        }
        Ok(text)
    }

    /// Forget the cached probe verdict
    pub fn invalidate(&self) {
        *self.availability.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedGenerator {
        working: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn backend_name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            model: &str,
            _prompt: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> ModelResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if model == self.working {
                Ok(format!("answer from {}", model))
            } else {
                Err(ModelError::unavailable("scripted", "model decommissioned"))
            }
        }
    }

    fn config() -> LlmConfig {
        LlmConfig {
            provider: LlmProviderKind::Ollama,
            ..crate::config::AppConfig::default().llm
        }
    }

    #[tokio::test]
    async fn test_probe_selects_first_working_model_and_caches() {
        let backend = Arc::new(ScriptedGenerator {
            working: "gemma2-9b-it",
            calls: AtomicUsize::new(0),
        });
        let manager = LlmManager::with_backend(backend.clone(), &config());

        assert_eq!(manager.working_model().await.as_deref(), Some("gemma2-9b-it"));
        let probes = backend.calls.load(Ordering::SeqCst);
        assert_eq!(probes, 3);

        assert!(manager.is_available().await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), probes);

        let text = manager.generate_response("report please").await.unwrap();
        assert_eq!(text, "answer from gemma2-9b-it");
    }

    #[tokio::test]
    async fn test_disabled_manager_is_unavailable() {
        let manager = LlmManager::disabled();
        assert!(!manager.is_available().await);
        assert_eq!(manager.backend_name(), "disabled");
        assert!(matches!(
            manager.generate_response("x").await,
            Err(ModelError::NotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn test_no_working_model_is_cached_as_unavailable() {
        let backend = Arc::new(ScriptedGenerator {
            working: "none",
            calls: AtomicUsize::new(0),
        });
        let manager = LlmManager::with_backend(backend, &config());
        assert!(!manager.is_available().await);
        assert_eq!(manager.cached_model(), Some(None));
        assert!(matches!(
            manager.generate_response("x").await,
            Err(ModelError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_undecodable_body_marks_backend_unavailable() {
        let ok: OllamaGenerateResponse = decode_body("ollama", br#"{"response":"hi"}"#).unwrap();
        assert_eq!(ok.response, "hi");

        match decode_body::<ChatResponse>("openai", b"<html>502 Bad Gateway</html>") {
            Err(ModelError::Unavailable { backend, reason }) => {
                assert_eq!(backend, "openai");
                assert!(reason.contains("JSON serialization failed"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_unavailable() {
        let mut cfg = config();
        cfg.endpoint = "http://127.0.0.1:9".to_string();
        let manager = LlmManager::from_config(&cfg).with_probe_timeout(Duration::from_millis(500));
        assert!(!manager.is_available().await);
    }
}
