//! Report orchestration
//!
//! Retrieval prefers the vector index and falls back to keyword search.
//! Report tiers are tried in order (LLM, enhanced template, basic template);
//! the basic template cannot fail, so a report is always produced.

use super::report::{ReportGenerator, ReportInput};
use super::{LlmManager, PolicyManager, RetrievedSnippet, VectorManager};
use crate::errors::ReportError;
use crate::logging::{log_retrieval, log_tier_degradation, report_span};
use crate::models::{FeasibilityReport, ReportTier};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Result of attempting one report tier
#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Produced(String),
    Failed(String),
}

/// Fallible tiers and the tier each one degrades to
const TIER_CHAIN: [(ReportTier, ReportTier); 2] = [
    (ReportTier::Llm, ReportTier::EnhancedTemplate),
    (ReportTier::EnhancedTemplate, ReportTier::BasicTemplate),
];

#[derive(Debug, Clone, Serialize)]
pub struct RagStatus {
    pub llm_backend: String,
    /// `None` until the backend has been probed
    pub llm_available: Option<bool>,
    pub llm_model: Option<String>,
    pub vector_available: bool,
    pub vector_index_size: usize,
    pub document_count: usize,
    pub retrieval_backend: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub documents: usize,
    pub indexed_chunks: usize,
    pub vector_available: bool,
}

pub struct RagService {
    policy: Arc<PolicyManager>,
    vector: Arc<VectorManager>,
    llm: Arc<LlmManager>,
    reports: ReportGenerator,
    retrieval_limit: usize,
    keyword_fallback: bool,
}

impl RagService {
    pub fn new(
        policy: Arc<PolicyManager>,
        vector: Arc<VectorManager>,
        llm: Arc<LlmManager>,
        retrieval_limit: usize,
    ) -> Self {
        Self {
            policy,
            vector,
            llm,
            reports: ReportGenerator::new(),
            retrieval_limit: retrieval_limit.max(1),
            keyword_fallback: true,
        }
    }

    /// With the fallback off, an unavailable vector index means no snippets
    pub fn with_keyword_fallback(mut self, enabled: bool) -> Self {
        self.keyword_fallback = enabled;
        self
    }

    pub fn policy(&self) -> &PolicyManager {
        &self.policy
    }

    /// Load or build the vector index; failure leaves keyword search in charge
    pub async fn initialize(&self) {
        let documents = self.policy.get_all_documents();
        if let Err(e) = self.vector.initialize(&documents).await {
            tracing::warn!(error = %e, "Vector index unavailable, using keyword retrieval");
        }
    }

    /// Up to `retrieval_limit` snippets and the backend that produced them
    pub async fn retrieve(&self, query: &str) -> (&'static str, Vec<RetrievedSnippet>) {
        let started = Instant::now();
        if self.vector.is_available() {
            match self.vector.similarity_search(query, self.retrieval_limit).await {
                Ok(snippets) if !snippets.is_empty() => {
                    log_retrieval("vector", query.len(), snippets.len(), started.elapsed().as_millis() as u64);
                    return ("vector", snippets);
                }
                Ok(_) => crate::rag_debug!("Vector search returned nothing"),
                Err(e) => tracing::warn!(error = %e, "Vector search failed, using keyword retrieval"),
            }
        }

        if !self.keyword_fallback {
            log_retrieval("none", query.len(), 0, started.elapsed().as_millis() as u64);
            return ("none", Vec::new());
        }

        let snippets: Vec<RetrievedSnippet> = self
            .policy
            .keyword_search(query, self.retrieval_limit)
            .iter()
            .map(RetrievedSnippet::from)
            .collect();
        log_retrieval("keyword", query.len(), snippets.len(), started.elapsed().as_millis() as u64);
        ("keyword", snippets)
    }

    /// Always returns a report; backend failures only lower the tier
    pub async fn generate_feasibility_report(&self, input: ReportInput<'_>) -> FeasibilityReport {
        let query = retrieval_query(&input);
        let (backend, snippets) = self.retrieve(&query).await;

        let span = report_span(backend, snippets.len());
        let report = self
            .run_tiers(input, &snippets)
            .instrument(span.clone())
            .await;
        span.record("tier", report.generation_tier.as_str());
        report
    }

    async fn run_tiers(&self, input: ReportInput<'_>, snippets: &[RetrievedSnippet]) -> FeasibilityReport {
        for (tier, next) in TIER_CHAIN {
            match self.try_tier(tier, input, snippets).await {
                TierOutcome::Produced(text) => return report(text, tier, snippets),
                TierOutcome::Failed(reason) => log_tier_degradation(tier, next, &reason),
            }
        }
        report(self.reports.basic_template(input), ReportTier::BasicTemplate, &[])
    }

    pub async fn try_tier(
        &self,
        tier: ReportTier,
        input: ReportInput<'_>,
        snippets: &[RetrievedSnippet],
    ) -> TierOutcome {
        match tier {
            ReportTier::Llm => {
                if !self.llm.is_available().await {
                    return TierOutcome::Failed(format!("llm backend '{}' unavailable", self.llm.backend_name()));
                }
                let prompt = self.reports.build_prompt(input, snippets);
                match self.llm.generate_response(&prompt).await {
                    Ok(text) => TierOutcome::Produced(text),
                    Err(e) => TierOutcome::Failed(ReportError::from(e).to_string()),
                }
            }
            ReportTier::EnhancedTemplate => match self.reports.enhanced_template(input, snippets) {
                Ok(text) => TierOutcome::Produced(text),
                Err(e) => TierOutcome::Failed(e.to_string()),
            },
            ReportTier::BasicTemplate => TierOutcome::Produced(self.reports.basic_template(input)),
        }
    }

    /// Availability snapshot without triggering an LLM probe
    pub fn status(&self) -> RagStatus {
        let cached = self.llm.cached_model();
        let vector_available = self.vector.is_available();
        RagStatus {
            llm_backend: self.llm.backend_name().to_string(),
            llm_available: cached.as_ref().map(|m| m.is_some()),
            llm_model: cached.flatten(),
            vector_available,
            vector_index_size: self.vector.index_size(),
            document_count: self.policy.document_count(),
            retrieval_backend: match (vector_available, self.keyword_fallback) {
                (true, _) => "vector",
                (false, true) => "keyword",
                (false, false) => "none",
            },
        }
    }

    /// Reload the documents and rebuild the vector index
    pub async fn refresh_policy_data(&self) -> RefreshSummary {
        self.policy.refresh();
        let documents = self.policy.get_all_documents();
        if let Err(e) = self.vector.rebuild(&documents).await {
            tracing::warn!(error = %e, "Vector index rebuild failed, using keyword retrieval");
            self.vector.clear();
        }
        self.llm.invalidate();

        RefreshSummary {
            documents: documents.len(),
            indexed_chunks: self.vector.index_size(),
            vector_available: self.vector.is_available(),
        }
    }
}

fn retrieval_query(input: &ReportInput<'_>) -> String {
    format!(
        "Solar installation in {} with a {:.1} kWp system: feed-in tariff, KfW financing, \
         VAT and tax rules, regional incentives and installation requirements",
        input.request.location(),
        input.solar.system_capacity_kw
    )
}

fn report(text: String, tier: ReportTier, snippets: &[RetrievedSnippet]) -> FeasibilityReport {
    let mut sources: Vec<String> = Vec::new();
    for snippet in snippets {
        if !sources.contains(&snippet.document_id) {
            sources.push(snippet.document_id.clone());
        }
    }
    FeasibilityReport {
        text,
        generation_tier: tier,
        policy_sources: sources,
    }
}
