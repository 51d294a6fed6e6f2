//! Solar and financial calculator properties over the bundled weather dataset

use proptest::prelude::*;
use solar_feasibility::config::{
    ConfigBuilder, EmbeddingProviderKind, FinanceConstants, LlmProviderKind, SolarConstants,
};
use solar_feasibility::finance::FinanceInputs;
use solar_feasibility::{
    AnalysisRequest, AppContext, Orientation, PaybackPeriod, ReportTier, RoiCalculator,
    SolarCalculator, WeatherAnalysisMode, WeatherDataset,
};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

fn calculator() -> &'static SolarCalculator {
    static CALCULATOR: OnceLock<SolarCalculator> = OnceLock::new();
    CALCULATOR.get_or_init(|| {
        let dataset = WeatherDataset::bundled("Berlin").expect("bundled dataset parses");
        SolarCalculator::new(Arc::new(dataset), SolarConstants::default())
    })
}

fn locations() -> Vec<String> {
    calculator()
        .dataset()
        .locations()
        .into_iter()
        .map(|l| l.name)
        .collect()
}

fn orientation_strategy() -> impl Strategy<Value = Orientation> {
    prop::sample::select(Orientation::ALL.to_vec())
}

fn mode_strategy() -> impl Strategy<Value = WeatherAnalysisMode> {
    prop::sample::select(WeatherAnalysisMode::ALL.to_vec())
}

proptest! {
    #[test]
    fn test_monthly_production_sums_to_annual(
        idx in 0usize..10,
        roof_area in 1.0f64..500.0,
        orientation in orientation_strategy(),
        mode in mode_strategy(),
    ) {
        let names = locations();
        let location = &names[idx % names.len()];
        let potential = calculator().estimate(location, roof_area, orientation, mode).unwrap();

        prop_assert_eq!(potential.monthly_production.len(), 12);
        let sum: f64 = potential.monthly_production.iter().sum();
        prop_assert!((sum - potential.annual_kwh).abs() < 0.01, "sum {} vs annual {}", sum, potential.annual_kwh);
        prop_assert!(potential.monthly_production.iter().all(|m| *m >= 0.0));
        prop_assert!(potential.annual_kwh >= 0.0);
        prop_assert!((1..=12).contains(&potential.peak_month));
    }

    #[test]
    fn test_hybrid_lies_between_latest_and_historical(
        idx in 0usize..10,
        roof_area in 1.0f64..300.0,
        orientation in orientation_strategy(),
    ) {
        let names = locations();
        let location = &names[idx % names.len()];
        let calc = calculator();
        let annual = |mode| calc.estimate(location, roof_area, orientation, mode).unwrap().annual_kwh;

        let latest = annual(WeatherAnalysisMode::Latest);
        let historical = annual(WeatherAnalysisMode::Historical);
        let hybrid = annual(WeatherAnalysisMode::Hybrid);
        let (lo, hi) = if latest < historical { (latest, historical) } else { (historical, latest) };
        // monthly rounding can push the hybrid a few hundredths outside
        prop_assert!(hybrid >= lo - 0.1 && hybrid <= hi + 0.1, "{} not in [{}, {}]", hybrid, lo, hi);
    }

    #[test]
    fn test_payback_is_never_a_raw_non_finite_number(
        roof_area in 0.5f64..400.0,
        orientation in orientation_strategy(),
        price in 0.01f64..1.0,
        consumption in 1.0f64..20_000.0,
    ) {
        let potential = calculator()
            .estimate("Berlin", roof_area, orientation, WeatherAnalysisMode::Hybrid)
            .unwrap();
        let roi = RoiCalculator::new(FinanceConstants::default());
        let analysis = roi.analyze(&potential, FinanceInputs {
            location: "Berlin",
            annual_consumption_kwh: consumption,
            budget: None,
            electricity_price: price,
        });

        match analysis.payback_period {
            PaybackPeriod::Years(years) => prop_assert!(years.is_finite() && years > 0.0),
            PaybackPeriod::NotCalculable => {}
        }
        prop_assert!(analysis.roi_percentage.is_finite());
        prop_assert!(analysis.npv.is_finite());
        let payback = serde_json::to_value(analysis.payback_period).unwrap();
        prop_assert!(payback.is_number() || payback == serde_json::json!("not_calculable"));
    }
}

#[test]
fn test_estimates_are_deterministic() {
    let calc = calculator();
    let a = calc
        .estimate("Munich", 42.0, Orientation::SouthWest, WeatherAnalysisMode::Hybrid)
        .unwrap();
    let b = calc
        .estimate("Munich", 42.0, Orientation::SouthWest, WeatherAnalysisMode::Hybrid)
        .unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_hamburg_south_roof_scenario() {
    let dir = TempDir::new().unwrap();
    let path = |name: &str| dir.path().join(name).display().to_string();
    let config = ConfigBuilder::new()
        .dataset_path(path("missing.csv"))
        .policy_docs_path(path("policies"))
        .vector_db_path(path("vector_db"))
        .electricity_price_path(path("price.json"))
        .embedding_provider(EmbeddingProviderKind::Hashing)
        .llm_provider(LlmProviderKind::Disabled)
        .build()
        .unwrap();
    let ctx = AppContext::initialize(config).await.unwrap();

    let request = AnalysisRequest::new(
        "Hamburg",
        50.0,
        Orientation::South,
        WeatherAnalysisMode::Hybrid,
        Some(3_500.0),
        Some(15_000.0),
    )
    .unwrap();
    let outcome = ctx.analyze(&request).await.unwrap();

    let solar = &outcome.solar_potential;
    assert_eq!(solar.resolved_location, "Hamburg");
    assert!(!solar.approximate);
    assert!((solar.system_capacity_kw - 10.0).abs() < 1e-9);
    assert!((solar.annual_kwh - 8_222.0).abs() < 5.0, "annual {}", solar.annual_kwh);

    let finance = &outcome.financial_analysis;
    assert_eq!(finance.total_investment, 18_000.0);
    assert_eq!(finance.electricity_price, 0.34);
    assert!(finance.annual_savings > 0.0);
    assert!(matches!(finance.payback_period, PaybackPeriod::Years(y) if y > 0.0));
    assert!(
        finance
            .recommendations
            .iter()
            .any(|r| r.contains("€15000") && r.contains("KfW 270")),
        "{:?}",
        finance.recommendations
    );

    let report = &outcome.feasibility_report;
    assert_eq!(report.generation_tier, ReportTier::EnhancedTemplate);
    assert!(report.text.contains("Hamburg"));
    assert!(!report.policy_sources.is_empty());
}

#[test]
fn test_unknown_location_uses_default_and_is_flagged() {
    let calc = calculator();
    let atlantis = calc
        .estimate("Atlantis", 30.0, Orientation::South, WeatherAnalysisMode::Historical)
        .unwrap();
    let berlin = calc
        .estimate("Berlin", 30.0, Orientation::South, WeatherAnalysisMode::Historical)
        .unwrap();

    assert!(atlantis.approximate);
    assert_eq!(atlantis.resolved_location, "Berlin");
    assert_eq!(atlantis.monthly_production, berlin.monthly_production);
    assert!(!berlin.approximate);
}

#[test]
fn test_location_aliases_resolve_to_dataset_names() {
    let calc = calculator();
    let muenchen = calc
        .estimate("München", 20.0, Orientation::East, WeatherAnalysisMode::Latest)
        .unwrap();
    assert_eq!(muenchen.resolved_location, "Munich");
    assert!(!muenchen.approximate);
}

#[test]
fn test_orientation_factor_scales_production() {
    let calc = calculator();
    let south = calc
        .estimate("Cologne", 40.0, Orientation::South, WeatherAnalysisMode::Historical)
        .unwrap();
    let north = calc
        .estimate("Cologne", 40.0, Orientation::North, WeatherAnalysisMode::Historical)
        .unwrap();
    assert!(north.annual_kwh < south.annual_kwh);
    assert!((north.annual_kwh / south.annual_kwh - 0.6).abs() < 0.01);
}
