//! # Solar Feasibility Analyzer
//!
//! Estimates rooftop photovoltaic potential for German locations and turns it
//! into a financial analysis and a written feasibility report.
//!
//! - **Solar calculator**: monthly production from bundled irradiance history,
//!   with latest, historical and hybrid weighting of past years
//! - **ROI calculator**: self-consumption savings, feed-in income, incentives,
//!   payback, NPV and CO2 reduction under German tariff rules
//! - **Report generation**: policy retrieval (vector index or keyword search)
//!   feeding an optional LLM, degrading to templates so a report is always produced
//! - **HTTP API**: axum endpoints for analysis, weather data, prices and policy status
//!
//! ## Usage
//!
//! ```rust,no_run
//! use solar_feasibility::{AnalysisRequest, AppConfig, AppContext, Orientation, WeatherAnalysisMode};
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let ctx = AppContext::initialize(AppConfig::default()).await?;
//!     let request = AnalysisRequest::new(
//!         "Hamburg",
//!         50.0,
//!         Orientation::South,
//!         WeatherAnalysisMode::Hybrid,
//!         None,
//!         None,
//!     )?;
//!     let outcome = ctx.analyze(&request).await?;
//!     println!("{}", outcome.feasibility_report.text);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod context;
pub mod errors;
pub mod finance;
pub mod logging;
pub mod models;
pub mod rag;
pub mod solar;
pub mod weather;

pub use config::{AppConfig, ConfigBuilder};
pub use context::{AnalysisOutcome, AppContext};
pub use errors::{
    AnalyzerError, AnalyzerResult, DataError, ErrorContext, ErrorSeverity, ModelError, ReportError,
    ValidationError,
};
pub use finance::{ElectricityPriceStore, RoiCalculator};
pub use logging::{init_logging, PerformanceLogger};
pub use models::{
    AnalysisRequest, FeasibilityReport, FinancialAnalysis, Orientation, PaybackPeriod, ReportTier,
    SolarPotential, WeatherAnalysisMode,
};
pub use rag::RagService;
pub use solar::SolarCalculator;
pub use weather::WeatherDataset;

// Version and build information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");
