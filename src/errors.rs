//! Error types and handling for the solar feasibility analyzer
//!
//! Errors are grouped by how the caller is expected to react:
//! - Input validation (rejected at the HTTP boundary with field detail)
//! - Weather data availability (recovered locally via location fallback)
//! - Model availability (recovered locally via report tier fallback)
//! - Configuration, price store and serialization failures

use std::fmt;
use thiserror::Error;

/// Main error type for the analyzer
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Weather data error: {0}")]
    Data(#[from] DataError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Electricity price error: {0}")]
    Price(#[from] PriceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Request validation errors, reported per field
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("{} invalid field(s): {}", .0.len(), join_messages(.0))]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        ValidationError::MissingField {
            field: field.to_string(),
        }
    }

    /// Flatten into `(field, message)` pairs for API responses
    pub fn field_errors(&self) -> Vec<(String, String)> {
        match self {
            ValidationError::InvalidField { field, reason } => {
                vec![(field.clone(), reason.clone())]
            }
            ValidationError::MissingField { field } => {
                vec![(field.clone(), "field is required".to_string())]
            }
            ValidationError::Multiple(errors) => {
                errors.iter().flat_map(|e| e.field_errors()).collect()
            }
        }
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Weather dataset errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Weather dataset not found: {path}")]
    DatasetNotFound { path: String },

    #[error("Weather dataset parsing failed: line={line}, reason={reason}")]
    ParsingFailed { line: u64, reason: String },

    #[error("Weather dataset is empty")]
    EmptyDataset,

    #[error("No weather record for location: {location}")]
    LocationNotFound { location: String },

    #[error("Incomplete series for location={location}: {reason}")]
    IncompleteSeries { location: String, reason: String },
}

/// LLM and vector backend errors
///
/// Every variant means "the backend cannot serve this request"; callers
/// degrade to a lower report tier instead of surfacing the error.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model unavailable: backend={backend}, reason={reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Model call timed out: operation={operation}, timeout_ms={timeout_ms}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Model backend not configured: {backend}")]
    NotConfigured { backend: String },

    #[error("Model returned an empty response: model={model}")]
    EmptyResponse { model: String },

    #[error("Embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("Vector index error: {reason}")]
    IndexFailed { reason: String },
}

impl ModelError {
    pub fn unavailable(backend: &str, reason: impl fmt::Display) -> Self {
        ModelError::Unavailable {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Report tier errors
///
/// Never leave the report chain; each one moves generation down a tier.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No policy context retrieved for the enhanced template")]
    MissingPolicyContext,

    #[error("Template fill failed: {reason}")]
    TemplateFill { reason: String },

    #[error("LLM tier failed: {0}")]
    Llm(#[from] ModelError),
}

impl From<fmt::Error> for ReportError {
    fn from(e: fmt::Error) -> Self {
        ReportError::TemplateFill {
            reason: e.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value: key={key}, value={value}, reason={reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Configuration parsing failed: {reason}")]
    ParsingFailed { reason: String },

    #[error("Environment variable error: {var}, error={error}")]
    EnvironmentVariable { var: String, error: String },
}

/// Electricity price store errors
#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Live price fetch failed: {reason}")]
    FetchFailed { reason: String },

    #[error("Invalid electricity price: {value}")]
    InvalidPrice { value: f64 },

    #[error("Price storage failed: path={path}, reason={reason}")]
    StorageFailed { path: String, reason: String },
}

/// Serialization errors
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {reason}")]
    JsonFailed { reason: String },

    #[error("Binary serialization failed: format={format}, reason={reason}")]
    BinaryFailed { format: String, reason: String },
}

impl From<serde_json::Error> for SerializationError {
    fn from(e: serde_json::Error) -> Self {
        SerializationError::JsonFailed {
            reason: e.to_string(),
        }
    }
}

impl From<bincode::Error> for SerializationError {
    fn from(e: bincode::Error) -> Self {
        SerializationError::BinaryFailed {
            format: "bincode".to_string(),
            reason: e.to_string(),
        }
    }
}

/// Result type aliases for convenience
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
pub type ValidationResult<T> = Result<T, ValidationError>;
pub type DataResult<T> = Result<T, DataError>;
pub type ModelResult<T> = Result<T, ModelError>;
pub type ReportResult<T> = Result<T, ReportError>;
pub type PriceResult<T> = Result<T, PriceError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> AnalyzerResult<T>
    where
        F: FnOnce() -> String;

    /// Report the failure as the named backend being unavailable
    fn with_model_context(self, backend: &str) -> ModelResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: Into<AnalyzerError>,
{
    fn with_context<F>(self, f: F) -> AnalyzerResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let base_error: AnalyzerError = e.into();
            AnalyzerError::Unknown(format!("{}: {}", f(), base_error))
        })
    }

    fn with_model_context(self, backend: &str) -> ModelResult<T> {
        self.map_err(|e| {
            let base_error: AnalyzerError = e.into();
            ModelError::unavailable(backend, base_error)
        })
    }
}

/// Utility functions for error handling
pub mod utils {
    use super::*;

    /// Whether the request can still complete after this error
    pub fn is_recoverable_error(error: &AnalyzerError) -> bool {
        match error {
            AnalyzerError::Data(DataError::LocationNotFound { .. }) => true,
            AnalyzerError::Model(_) => true,
            AnalyzerError::Price(PriceError::FetchFailed { .. }) => true,
            AnalyzerError::Validation(_) => false,
            AnalyzerError::Configuration(_) => false,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn get_error_severity(error: &AnalyzerError) -> ErrorSeverity {
        match error {
            AnalyzerError::Configuration(_) => ErrorSeverity::High,
            AnalyzerError::Data(DataError::EmptyDataset) => ErrorSeverity::Critical,
            AnalyzerError::Data(DataError::LocationNotFound { .. }) => ErrorSeverity::Low,
            AnalyzerError::Model(_) => ErrorSeverity::Low,
            AnalyzerError::Validation(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_validation_errors_flatten() {
        let err = ValidationError::Multiple(vec![
            ValidationError::invalid("roof_area", "must be greater than 0"),
            ValidationError::missing("location"),
        ]);

        let fields = err.field_errors();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "roof_area");
        assert_eq!(fields[1], ("location".to_string(), "field is required".to_string()));
        assert!(err.to_string().starts_with("2 invalid field(s)"));
    }

    #[test]
    fn test_model_errors_are_recoverable() {
        let err: AnalyzerError = ModelError::Timeout {
            operation: "generate".to_string(),
            timeout_ms: 100,
        }
        .into();
        assert!(utils::is_recoverable_error(&err));
        assert_eq!(utils::get_error_severity(&err), ErrorSeverity::Low);

        let err: AnalyzerError = ValidationError::missing("location").into();
        assert!(!utils::is_recoverable_error(&err));
    }

    #[test]
    fn test_with_model_context_maps_to_unavailable() {
        let result: Result<(), DataError> = Err(DataError::EmptyDataset);
        match result.with_model_context("hashing") {
            Err(ModelError::Unavailable { backend, reason }) => {
                assert_eq!(backend, "hashing");
                assert!(reason.contains("Weather dataset is empty"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_becomes_serialization_error() {
        let err = serde_json::from_str::<Vec<f64>>("[1.0,").unwrap_err();
        let err: AnalyzerError = SerializationError::from(err).into();
        assert!(matches!(err, AnalyzerError::Serialization(SerializationError::JsonFailed { .. })));
        assert_eq!(utils::get_error_severity(&err), ErrorSeverity::Medium);
    }

    #[test]
    fn test_report_errors_name_the_failed_step() {
        let err = ReportError::from(fmt::Error);
        assert!(matches!(err, ReportError::TemplateFill { .. }));

        let err = ReportError::from(ModelError::Timeout {
            operation: "generate".to_string(),
            timeout_ms: 50,
        });
        assert!(err.to_string().starts_with("LLM tier failed: Model call timed out"));
    }
}
