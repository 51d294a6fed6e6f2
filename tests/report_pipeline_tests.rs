//! Report tier fallback and retrieval behaviour of the RAG service

use async_trait::async_trait;
use solar_feasibility::config::{AppConfig, FinanceConstants, SolarConstants};
use solar_feasibility::errors::{ModelError, ModelResult};
use solar_feasibility::finance::FinanceInputs;
use solar_feasibility::rag::report::format_thousands;
use solar_feasibility::rag::{
    HashingEmbedder, LlmManager, PolicyManager, RagService, ReportInput, TextGenerator, VectorManager,
};
use solar_feasibility::{
    AnalysisRequest, FinancialAnalysis, Orientation, ReportTier, RoiCalculator, SolarCalculator,
    SolarPotential, WeatherAnalysisMode, WeatherDataset,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_test::traced_test;

struct Fixture {
    request: AnalysisRequest,
    solar: SolarPotential,
    finance: FinancialAnalysis,
}

impl Fixture {
    fn hamburg() -> Self {
        let request = AnalysisRequest::new(
            "Hamburg",
            50.0,
            Orientation::South,
            WeatherAnalysisMode::Hybrid,
            None,
            Some(20_000.0),
        )
        .unwrap();
        let dataset = Arc::new(WeatherDataset::bundled("Berlin").unwrap());
        let solar = SolarCalculator::new(dataset, SolarConstants::default())
            .calculate(&request)
            .unwrap();
        let finance = RoiCalculator::new(FinanceConstants::default()).analyze(
            &solar,
            FinanceInputs {
                location: &solar.resolved_location,
                annual_consumption_kwh: request.annual_consumption(),
                budget: request.budget(),
                electricity_price: 0.34,
            },
        );
        Self {
            request,
            solar,
            finance,
        }
    }

    fn input(&self) -> ReportInput<'_> {
        ReportInput {
            request: &self.request,
            solar: &self.solar,
            finance: &self.finance,
        }
    }
}

/// Answers probes instantly, then replies or stalls on the real prompt
struct ScriptedGenerator {
    reply: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn stalling(delay: Duration) -> Self {
        Self {
            reply: Some("too late".to_string()),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn backend_name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> ModelResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .reply
            .clone()
            .ok_or_else(|| ModelError::unavailable("scripted", format!("{model} is down")))?;
        if prompt.len() > 100 && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(reply)
    }
}

fn llm_config() -> solar_feasibility::config::LlmConfig {
    AppConfig::default().llm
}

fn service(llm: LlmManager, vector: VectorManager, keyword_fallback: bool) -> RagService {
    RagService::new(
        Arc::new(PolicyManager::new("does/not/exist")),
        Arc::new(vector),
        Arc::new(llm),
        3,
    )
    .with_keyword_fallback(keyword_fallback)
}

fn no_vector(dir: &TempDir) -> VectorManager {
    VectorManager::new(None, dir.path(), 500, 50, 16)
}

fn hashing_vector(dir: &TempDir) -> VectorManager {
    VectorManager::new(
        Some(Arc::new(HashingEmbedder::new("hashing-test", 256))),
        dir.path(),
        500,
        50,
        16,
    )
}

#[tokio::test]
#[traced_test]
async fn test_both_backends_down_degrades_to_basic_template() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::hamburg();
    let llm = LlmManager::with_backend(Arc::new(ScriptedGenerator::failing()), &llm_config());
    let rag = service(llm, no_vector(&dir), false);
    rag.initialize().await;

    let report = rag.generate_feasibility_report(fixture.input()).await;

    assert_eq!(report.generation_tier, ReportTier::BasicTemplate);
    assert!(report.policy_sources.is_empty());
    let annual = format!("{} kWh", format_thousands(fixture.solar.annual_kwh));
    assert!(report.text.contains(&annual), "missing {annual}");
    let payback = format!("{}", fixture.finance.payback_period);
    assert!(report.text.contains(&payback), "missing {payback}");

    assert!(logs_contain("Report tier degraded"));
    assert!(logs_contain("enhanced_template"));
}

#[tokio::test]
async fn test_disabled_llm_uses_keyword_snippets_in_enhanced_template() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::hamburg();
    let rag = service(LlmManager::disabled(), no_vector(&dir), true);
    rag.initialize().await;

    assert_eq!(rag.status().retrieval_backend, "keyword");
    let report = rag.generate_feasibility_report(fixture.input()).await;

    assert_eq!(report.generation_tier, ReportTier::EnhancedTemplate);
    assert!(!report.policy_sources.is_empty());
    assert!(report.policy_sources.len() <= 3);
    assert!(!report.text.trim().is_empty());
}

#[tokio::test]
async fn test_working_llm_produces_llm_report() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::hamburg();
    let generator = Arc::new(ScriptedGenerator::replying("# Tailored report for Hamburg"));
    let llm = LlmManager::with_backend(generator.clone(), &llm_config());
    let rag = service(llm, hashing_vector(&dir), true);
    rag.initialize().await;

    let report = rag.generate_feasibility_report(fixture.input()).await;

    assert_eq!(report.generation_tier, ReportTier::Llm);
    assert_eq!(report.text, "# Tailored report for Hamburg");
    assert!(!report.policy_sources.is_empty());
    // one probe plus the report itself
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

    let status = rag.status();
    assert_eq!(status.llm_available, Some(true));
    assert_eq!(status.retrieval_backend, "vector");
}

#[tokio::test]
#[traced_test]
async fn test_slow_llm_times_out_and_falls_back() {
    let dir = TempDir::new().unwrap();
    let fixture = Fixture::hamburg();
    let llm = LlmManager::with_backend(
        Arc::new(ScriptedGenerator::stalling(Duration::from_secs(5))),
        &llm_config(),
    )
    .with_request_timeout(Duration::from_millis(50));
    let rag = service(llm, no_vector(&dir), true);

    let report = rag.generate_feasibility_report(fixture.input()).await;

    assert_eq!(report.generation_tier, ReportTier::EnhancedTemplate);
    assert!(logs_contain("LLM tier failed: Model call timed out"));
}

#[tokio::test]
async fn test_vector_index_is_persisted_and_reused() {
    let dir = TempDir::new().unwrap();
    let policy = PolicyManager::new("does/not/exist");
    let documents = policy.get_all_documents();

    let first = hashing_vector(&dir);
    first.initialize(&documents).await.unwrap();
    assert!(first.is_available());
    assert!(first.index_path().exists());
    let built = first.current_index().unwrap();

    let second = hashing_vector(&dir);
    second.initialize(&documents).await.unwrap();
    let loaded = second.current_index().unwrap();
    assert_eq!(loaded.fingerprint(), built.fingerprint());
    assert_eq!(loaded.built_at(), built.built_at());
    assert_eq!(loaded.len(), built.len());

    let hits = second.similarity_search("KfW 270 loan financing", 3).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn test_refresh_rebuilds_the_index() {
    let dir = TempDir::new().unwrap();
    let rag = service(LlmManager::disabled(), hashing_vector(&dir), true);
    rag.initialize().await;
    let before = rag.status();

    let summary = rag.refresh_policy_data().await;

    assert!(summary.vector_available);
    assert_eq!(summary.documents, before.document_count);
    assert_eq!(summary.indexed_chunks, before.vector_index_size);
}
