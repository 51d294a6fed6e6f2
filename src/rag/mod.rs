//! Retrieval-augmented report generation
//!
//! - `policy`: policy document corpus and keyword search
//! - `embeddings` / `vector`: embedding providers and the persisted vector index
//! - `llm`: optional text generation backend
//! - `report`: prompt and template rendering
//! - `service`: tiered orchestration of the above

pub mod embeddings;
pub mod llm;
pub mod policy;
pub mod report;
pub mod service;
pub mod vector;

pub use embeddings::{build_provider, EmbeddingProvider, HashingEmbedder, OllamaEmbedder};
pub use llm::{LlmManager, OllamaGenerator, OpenAiCompatibleGenerator, TextGenerator};
pub use policy::PolicyManager;
pub use report::{ReportGenerator, ReportInput};
pub use service::{RagService, RagStatus, RefreshSummary, TierOutcome};
pub use vector::VectorManager;

use crate::models::PolicyDocument;
use serde::Serialize;

/// A piece of policy text handed to the report renderers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedSnippet {
    pub document_id: String,
    pub text: String,
    /// Cosine distance for vector hits, `None` for keyword hits
    pub distance: Option<f32>,
}

impl From<&PolicyDocument> for RetrievedSnippet {
    fn from(doc: &PolicyDocument) -> Self {
        Self {
            document_id: doc.id.clone(),
            text: doc.text.clone(),
            distance: None,
        }
    }
}
