//! Process-wide application context
//!
//! Built once at startup and shared with every request handler.

use crate::config::AppConfig;
use crate::errors::{AnalyzerResult, ErrorContext};
use crate::finance::{ElectricityPriceStore, FinanceInputs, RoiCalculator};
use crate::logging::{analysis_span, PerformanceLogger};
use crate::models::{AnalysisRequest, FeasibilityReport, FinancialAnalysis, SolarPotential};
use crate::rag::{build_provider, LlmManager, PolicyManager, RagService, ReportInput, VectorManager};
use crate::solar::SolarCalculator;
use crate::weather::WeatherDataset;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;

/// Result of one complete analysis
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub request_id: String,
    pub solar_potential: SolarPotential,
    pub financial_analysis: FinancialAnalysis,
    pub feasibility_report: FeasibilityReport,
}

pub struct AppContext {
    pub config: AppConfig,
    pub weather: Arc<WeatherDataset>,
    pub solar: SolarCalculator,
    pub roi: RoiCalculator,
    pub prices: ElectricityPriceStore,
    pub rag: RagService,
    pub started_at: DateTime<Utc>,
}

impl AppContext {
    pub async fn initialize(config: AppConfig) -> AnalyzerResult<Arc<Self>> {
        let llm = Arc::new(LlmManager::from_config(&config.llm));
        Self::initialize_with_llm(config, llm).await
    }

    /// Build the context around a caller supplied LLM manager
    pub async fn initialize_with_llm(config: AppConfig, llm: Arc<LlmManager>) -> AnalyzerResult<Arc<Self>> {
        let perf = PerformanceLogger::start("context_initialize");

        let weather = Arc::new(WeatherDataset::load_or_bundled(
            Path::new(&config.data.dataset_path),
            &config.data.default_location,
        )
        .with_context(|| format!("loading weather data from {}", config.data.dataset_path))?);
        perf.log_milestone("weather_dataset");

        let solar = SolarCalculator::new(Arc::clone(&weather), config.solar.clone());
        let roi = RoiCalculator::new(config.finance.clone());
        let prices = ElectricityPriceStore::new(
            &config.data.electricity_price_path,
            config.finance.fallback_electricity_price,
        );

        let policy = Arc::new(PolicyManager::new(&config.data.policy_docs_path));
        let vector = Arc::new(VectorManager::new(
            build_provider(&config.rag.embedding),
            config.vector_db_path(),
            config.rag.chunk_size,
            config.rag.chunk_overlap,
            config.rag.query_cache_size,
        ));

        let rag = RagService::new(policy, vector, llm, config.rag.retrieval_limit)
            .with_keyword_fallback(config.rag.keyword_fallback);
        rag.initialize()
            .instrument(crate::logging::lifecycle_span("rag_initialize"))
            .await;
        perf.log_milestone("rag_service");

        let status = rag.status();
        tracing::info!(
            locations = weather.location_count(),
            documents = status.document_count,
            vector_available = status.vector_available,
            llm_backend = %status.llm_backend,
            "Application context initialized"
        );
        perf.finish();

        Ok(Arc::new(Self {
            config,
            weather,
            solar,
            roi,
            prices,
            rag,
            started_at: Utc::now(),
        }))
    }

    /// Solar estimate, financial analysis and report for one request
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalyzerResult<AnalysisOutcome> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = analysis_span(&request_id, request.location());

        self.run_analysis(request, request_id).instrument(span).await
    }

    async fn run_analysis(
        &self,
        request: &AnalysisRequest,
        request_id: String,
    ) -> AnalyzerResult<AnalysisOutcome> {
        let perf = PerformanceLogger::start("analysis");
        let solar_potential = self.solar.calculate(request)?;
        let current = tracing::Span::current();
        current.record("resolved_location", solar_potential.resolved_location.as_str());

        let financial_analysis = self.roi.analyze(
            &solar_potential,
            FinanceInputs {
                location: &solar_potential.resolved_location,
                annual_consumption_kwh: request.annual_consumption(),
                budget: request.budget(),
                electricity_price: self.prices.price(),
            },
        );
        perf.log_milestone("calculations");

        let feasibility_report = self
            .rag
            .generate_feasibility_report(ReportInput {
                request,
                solar: &solar_potential,
                finance: &financial_analysis,
            })
            .await;

        current.record("report_tier", feasibility_report.generation_tier.as_str());
        current.record("total_time_ms", perf.finish() as u64);

        Ok(AnalysisOutcome {
            request_id,
            solar_potential,
            financial_analysis,
            feasibility_report,
        })
    }
}
