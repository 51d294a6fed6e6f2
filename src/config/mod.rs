//! Configuration management for the analyzer
//!
//! Configuration is layered, later sources overriding earlier ones:
//! - Built-in defaults
//! - An optional TOML file
//! - `ANALYZER_*` environment variables (`__` separates nested keys,
//!   e.g. `ANALYZER_LLM__PROVIDER=ollama`)
//! - A handful of well-known variables such as `GROQ_API_KEY` and
//!   `CORS_ORIGINS`

pub mod constants;

pub use constants::{
    FeedInTariffBand, FinanceConstants, LocationFactor, OrientationFactors, SolarConstants,
};

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for layered overrides
pub const ENV_PREFIX: &str = "ANALYZER";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub solar: SolarConstants,
    pub finance: FinanceConstants,
    pub rag: RagConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Allowed CORS origins; empty allows none
    pub cors_origins: Vec<String>,
    pub worker_threads: usize,
    pub debug: bool,
}

/// Data file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Monthly historical weather CSV
    pub dataset_path: String,
    /// Location used when a requested location has no weather record
    pub default_location: String,
    /// Directory of additional `.txt`/`.md` policy documents
    pub policy_docs_path: String,
    /// Directory holding the persisted vector index
    pub vector_db_path: String,
    /// JSON file holding the current electricity price
    pub electricity_price_path: String,
}

/// Retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Number of policy snippets handed to the report tiers
    pub retrieval_limit: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Capacity of the query embedding LRU cache
    pub query_cache_size: usize,
    /// Use keyword search when the vector index is unavailable
    pub keyword_fallback: bool,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local feature-hashing embedder, no network access
    Hashing,
    /// Ollama `/api/embed`
    Ollama,
    /// Vector search switched off; retrieval falls back to keywords
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub endpoint: String,
    pub dimensions: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Disabled,
    /// Ollama `/api/generate`
    Ollama,
    /// OpenAI-compatible `/chat/completions` (OpenAI, Groq, vLLM, ...)
    OpenAi,
}

/// Text generation backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Candidate models, probed in order
    pub models: Vec<String>,
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// How long an availability probe result is trusted
    pub availability_ttl_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub with_spans: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 5000,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ],
                worker_threads: num_cpus::get(),
                debug: false,
            },
            data: DataConfig {
                dataset_path: "data/renewable_weather.csv".to_string(),
                default_location: "Berlin".to_string(),
                policy_docs_path: "data/policy_documents".to_string(),
                vector_db_path: "data/vector_db".to_string(),
                electricity_price_path: "data/electricity_price.json".to_string(),
            },
            solar: SolarConstants::default(),
            finance: FinanceConstants::default(),
            rag: RagConfig {
                retrieval_limit: 3,
                chunk_size: 500,
                chunk_overlap: 50,
                query_cache_size: 128,
                keyword_fallback: true,
                embedding: EmbeddingConfig {
                    provider: EmbeddingProviderKind::Hashing,
                    model: "hashing-384".to_string(),
                    endpoint: "http://localhost:11434".to_string(),
                    dimensions: 384,
                    request_timeout_secs: 10,
                },
            },
            llm: LlmConfig {
                provider: LlmProviderKind::Disabled,
                endpoint: "https://api.groq.com/openai/v1".to_string(),
                api_key: None,
                models: vec![
                    "llama-3.1-8b-instant".to_string(),
                    "llama-3.3-70b-versatile".to_string(),
                    "gemma2-9b-it".to_string(),
                ],
                request_timeout_secs: 30,
                probe_timeout_secs: 5,
                availability_ttl_secs: 300,
                max_tokens: 2000,
                temperature: 0.3,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Text,
                with_spans: false,
            },
        }
    }
}

impl AppConfig {
    /// Load defaults, an optional TOML file and environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let defaults = config::Config::try_from(&Self::default()).map_err(|e| {
            ConfigurationError::ParsingFailed {
                reason: e.to_string(),
            }
        })?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .with_list_parse_key("llm.models"),
        );

        let mut config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::ParsingFailed {
                reason: e.to_string(),
            })?;

        config.apply_well_known_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::load(None)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigurationError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigurationError::ParsingFailed {
                reason: e.to_string(),
            })?;
        std::fs::write(&path, content).map_err(|_| ConfigurationError::FileNotFound {
            path: path.as_ref().display().to_string(),
        })
    }

    /// Variables shared with the rest of the deployment, outside the prefix
    fn apply_well_known_env(&mut self) -> Result<(), ConfigurationError> {
        if let Ok(path) = std::env::var("DATASET_PATH") {
            self.data.dataset_path = path;
        }

        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        for var in ["LLM_API_KEY", "GROQ_API_KEY"] {
            if self.llm.api_key.is_some() {
                break;
            }
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    self.llm.api_key = Some(key.trim().to_string());
                }
            }
        }

        if let Ok(debug) = std::env::var("DEBUG") {
            self.server.debug = matches!(
                debug.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
            if self.server.debug {
                self.logging.level = "debug".to_string();
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigurationError::EnvironmentVariable {
                    var: "PORT".to_string(),
                    error: e.to_string(),
                })?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        fn invalid(key: &str, value: impl ToString, reason: &str) -> ConfigurationError {
            ConfigurationError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.data.dataset_path.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired {
                key: "data.dataset_path".to_string(),
            });
        }

        if self.data.default_location.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired {
                key: "data.default_location".to_string(),
            });
        }

        let solar = &self.solar;
        if !(solar.panel_efficiency > 0.0 && solar.panel_efficiency <= 1.0) {
            return Err(invalid("solar.panel_efficiency", solar.panel_efficiency, "Must be in (0, 1]"));
        }
        if !(solar.system_losses_factor > 0.0 && solar.system_losses_factor <= 1.0) {
            return Err(invalid(
                "solar.system_losses_factor",
                solar.system_losses_factor,
                "Must be in (0, 1]",
            ));
        }
        if solar.panel_density_kw_per_m2 <= 0.0 {
            return Err(invalid(
                "solar.panel_density_kw_per_m2",
                solar.panel_density_kw_per_m2,
                "Must be positive",
            ));
        }
        if solar.max_roof_area_m2 <= 0.0 {
            return Err(invalid("solar.max_roof_area_m2", solar.max_roof_area_m2, "Must be positive"));
        }
        if solar.latest_window_years == 0 {
            return Err(invalid("solar.latest_window_years", 0, "Must be at least 1"));
        }
        if !(0.0..=1.0).contains(&solar.hybrid_latest_weight) {
            return Err(invalid(
                "solar.hybrid_latest_weight",
                solar.hybrid_latest_weight,
                "Must be between 0.0 and 1.0",
            ));
        }
        for (orientation, factor) in solar.orientation_factors.all() {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(invalid(
                    &format!("solar.orientation_factors.{}", orientation.as_str()),
                    factor,
                    "Must be in (0, 1]",
                ));
            }
        }

        let finance = &self.finance;
        if finance.system_cost_per_kw <= 0.0 {
            return Err(invalid("finance.system_cost_per_kw", finance.system_cost_per_kw, "Must be positive"));
        }
        if finance.system_lifetime_years == 0 {
            return Err(invalid("finance.system_lifetime_years", 0, "Must be at least 1"));
        }
        if !(0.0..=1.0).contains(&finance.feed_in_share) {
            return Err(invalid("finance.feed_in_share", finance.feed_in_share, "Must be between 0.0 and 1.0"));
        }
        if !(0.0..1.0).contains(&finance.degradation_rate) {
            return Err(invalid("finance.degradation_rate", finance.degradation_rate, "Must be in [0, 1)"));
        }
        if finance.fallback_electricity_price <= 0.0 {
            return Err(invalid(
                "finance.fallback_electricity_price",
                finance.fallback_electricity_price,
                "Must be positive",
            ));
        }
        if finance.feed_in_tariffs.is_empty() {
            return Err(ConfigurationError::MissingRequired {
                key: "finance.feed_in_tariffs".to_string(),
            });
        }

        if self.rag.retrieval_limit == 0 {
            return Err(invalid("rag.retrieval_limit", 0, "Must be at least 1"));
        }
        if self.rag.chunk_size == 0 || self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(invalid(
                "rag.chunk_overlap",
                self.rag.chunk_overlap,
                "Must be smaller than rag.chunk_size",
            ));
        }
        if self.rag.embedding.dimensions == 0 {
            return Err(invalid("rag.embedding.dimensions", 0, "Must be at least 1"));
        }

        if self.llm.provider != LlmProviderKind::Disabled {
            if self.llm.models.is_empty() {
                return Err(ConfigurationError::MissingRequired {
                    key: "llm.models".to_string(),
                });
            }
            if self.llm.request_timeout_secs == 0 || self.llm.probe_timeout_secs == 0 {
                return Err(invalid(
                    "llm.request_timeout_secs",
                    self.llm.request_timeout_secs,
                    "Timeouts must be at least 1 second",
                ));
            }
        }

        if self.server.worker_threads == 0 {
            return Err(invalid("server.worker_threads", 0, "Must be at least 1"));
        }

        Ok(())
    }

    pub fn vector_db_path(&self) -> PathBuf {
        PathBuf::from(&self.data.vector_db_path)
    }
}

/// Configuration builder for easier setup
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn dataset_path(mut self, path: impl Into<String>) -> Self {
        self.config.data.dataset_path = path.into();
        self
    }

    pub fn default_location(mut self, location: impl Into<String>) -> Self {
        self.config.data.default_location = location.into();
        self
    }

    pub fn policy_docs_path(mut self, path: impl Into<String>) -> Self {
        self.config.data.policy_docs_path = path.into();
        self
    }

    pub fn vector_db_path(mut self, path: impl Into<String>) -> Self {
        self.config.data.vector_db_path = path.into();
        self
    }

    pub fn electricity_price_path(mut self, path: impl Into<String>) -> Self {
        self.config.data.electricity_price_path = path.into();
        self
    }

    pub fn embedding_provider(mut self, provider: EmbeddingProviderKind) -> Self {
        self.config.rag.embedding.provider = provider;
        self
    }

    pub fn keyword_fallback(mut self, enabled: bool) -> Self {
        self.config.rag.keyword_fallback = enabled;
        self
    }

    pub fn llm_provider(mut self, provider: LlmProviderKind) -> Self {
        self.config.llm.provider = provider;
        self
    }

    pub fn llm_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.llm.endpoint = endpoint.into();
        self
    }

    pub fn llm_timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm.request_timeout_secs = secs;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn solar(mut self, solar: SolarConstants) -> Self {
        self.config.solar = solar;
        self
    }

    pub fn finance(mut self, finance: FinanceConstants) -> Self {
        self.config.finance = finance;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests that read the process environment must not interleave
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rag.retrieval_limit, 3);
        assert_eq!(config.llm.provider, LlmProviderKind::Disabled);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .dataset_path("/tmp/weather.csv")
            .llm_provider(LlmProviderKind::Ollama)
            .llm_endpoint("http://localhost:11434")
            .port(9000)
            .build()
            .unwrap();

        assert_eq!(config.data.dataset_path, "/tmp/weather.csv");
        assert_eq!(config.llm.provider, LlmProviderKind::Ollama);
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_invalid_hybrid_weight_rejected() {
        let mut solar = SolarConstants::default();
        solar.hybrid_latest_weight = 1.5;
        let result = ConfigBuilder::new().solar(solar).build();
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { ref key, .. }) if key == "solar.hybrid_latest_weight"
        ));
    }

    #[test]
    fn test_chunk_overlap_must_be_smaller_than_chunk() {
        let mut config = AppConfig::default();
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let _env = ENV_LOCK.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzer.toml");

        let mut config = AppConfig::default();
        config.data.default_location = "Hamburg".to_string();
        config.finance.system_cost_per_kw = 1650.0;
        config.to_file(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.data.default_location, "Hamburg");
        assert_eq!(loaded.finance.system_cost_per_kw, 1650.0);
        assert_eq!(loaded.finance.feed_in_tariffs.len(), 3);
    }

    #[test]
    fn test_missing_file_reported() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/analyzer.toml")));
        assert!(matches!(result, Err(ConfigurationError::FileNotFound { .. })));
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let _env = ENV_LOCK.lock();
        let vars = [
            ("ANALYZER_LLM__PROVIDER", "ollama"),
            ("ANALYZER_SERVER__PORT", "9123"),
            ("ANALYZER_RAG__RETRIEVAL_LIMIT", "5"),
            ("CORS_ORIGINS", "http://a.example, http://b.example"),
            ("GROQ_API_KEY", "gsk-test"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }

        let loaded = AppConfig::from_env();
        for (key, _) in vars {
            std::env::remove_var(key);
        }

        let config = loaded.unwrap();
        assert_eq!(config.llm.provider, LlmProviderKind::Ollama);
        assert_eq!(config.server.port, 9123);
        assert_eq!(config.rag.retrieval_limit, 5);
        assert_eq!(
            config.server.cors_origins,
            vec!["http://a.example".to_string(), "http://b.example".to_string()]
        );
        assert_eq!(config.llm.api_key.as_deref(), Some("gsk-test"));
    }

    #[test]
    fn test_invalid_port_variable_is_reported() {
        let _env = ENV_LOCK.lock();
        std::env::set_var("PORT", "not-a-port");
        let loaded = AppConfig::from_env();
        std::env::remove_var("PORT");

        assert!(matches!(
            loaded,
            Err(ConfigurationError::EnvironmentVariable { ref var, .. }) if var == "PORT"
        ));
    }
}
