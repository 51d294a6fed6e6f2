//! Financial analysis of a solar installation
//!
//! Incentives follow the German EEG feed-in tariff bands, the KfW 270 loan
//! programme and a flat regional incentive per kWp.

pub mod price;

pub use price::{ElectricityPriceStore, PriceSource, StoredPrice};

use crate::config::FinanceConstants;
use crate::models::{FinancialAnalysis, Incentives, PaybackPeriod, SolarPotential};

/// Inputs besides the solar estimate
#[derive(Debug, Clone, Copy)]
pub struct FinanceInputs<'a> {
    pub location: &'a str,
    pub annual_consumption_kwh: f64,
    pub budget: Option<f64>,
    pub electricity_price: f64,
}

pub struct RoiCalculator {
    constants: FinanceConstants,
}

impl RoiCalculator {
    pub fn new(constants: FinanceConstants) -> Self {
        Self { constants }
    }

    pub fn constants(&self) -> &FinanceConstants {
        &self.constants
    }

    pub fn incentives(&self, capacity_kw: f64, location: &str) -> Incentives {
        let c = &self.constants;
        let multiplier = c
            .location_factor(location)
            .map(|f| f.incentive_multiplier)
            .unwrap_or(c.default_incentive_multiplier);

        let feed_in_tariff = c.feed_in_tariff(capacity_kw) * multiplier;
        let kfw = (capacity_kw * c.kfw_benefit_per_kw).min(c.kfw_benefit_cap);
        let regional = capacity_kw * c.regional_incentive_per_kw;

        Incentives {
            feed_in_tariff_eur_per_kwh: round(feed_in_tariff, 4),
            kfw_loan_benefit_eur: round(kfw, 2),
            regional_incentive_eur: round(regional, 2),
            total_incentives_eur: round(kfw + regional, 2),
        }
    }

    pub fn analyze(&self, solar: &SolarPotential, inputs: FinanceInputs<'_>) -> FinancialAnalysis {
        let c = &self.constants;
        let annual_kwh = solar.annual_kwh.max(0.0);
        let capacity = solar.system_capacity_kw.max(0.0);

        let total_investment = capacity * c.system_cost_per_kw;
        let incentives = self.incentives(capacity, inputs.location);
        let net_investment =
            (total_investment - incentives.total_incentives_eur).max(c.minimum_net_investment);

        // 75 % of production is usable on site, capped at what the household consumes
        let usable_on_site = annual_kwh * (1.0 - c.feed_in_share);
        let self_consumed = usable_on_site.min(inputs.annual_consumption_kwh.max(0.0));
        let exported = annual_kwh - self_consumed;

        let self_consumption_savings = self_consumed * inputs.electricity_price;
        let feed_in_income = exported * incentives.feed_in_tariff_eur_per_kwh;
        let annual_savings = self_consumption_savings + feed_in_income;

        let payback_period = PaybackPeriod::from_ratio(total_investment, annual_savings);

        let (lifetime_savings, npv) = self.lifecycle(annual_savings, total_investment);
        let roi_percentage = if total_investment > 0.0 {
            (lifetime_savings - total_investment) / total_investment * 100.0
        } else {
            0.0
        };

        let co2_reduction = annual_kwh * c.grid_carbon_factor_kg_per_kwh / 1000.0;

        let mut analysis = FinancialAnalysis {
            total_investment: round(total_investment, 2),
            net_investment: round(net_investment, 2),
            annual_savings: round(annual_savings, 2),
            self_consumption_savings: round(self_consumption_savings, 2),
            feed_in_income: round(feed_in_income, 2),
            electricity_price: inputs.electricity_price,
            payback_period: match payback_period {
                PaybackPeriod::Years(y) => PaybackPeriod::Years(round(y, 1)),
                other => other,
            },
            roi_percentage: round(roi_percentage, 1),
            npv: round(npv, 2),
            lifetime_savings: round(lifetime_savings, 2),
            co2_reduction: round(co2_reduction, 2),
            incentives,
            recommendations: Vec::new(),
        };
        analysis.recommendations = recommendations(solar, &analysis, inputs);

        tracing::debug!(
            location = inputs.location,
            total_investment = analysis.total_investment,
            annual_savings = analysis.annual_savings,
            payback = %analysis.payback_period,
            "Financial analysis computed"
        );

        analysis
    }

    /// Degraded savings net of maintenance, summed plain and discounted
    fn lifecycle(&self, annual_savings: f64, investment: f64) -> (f64, f64) {
        let c = &self.constants;
        let mut lifetime = 0.0;
        let mut npv = -investment;
        for year in 1..=c.system_lifetime_years {
            let degraded = annual_savings * (1.0 - c.degradation_rate).powi(year as i32);
            let net_flow = degraded - c.maintenance_cost_per_year;
            lifetime += net_flow;
            npv += net_flow / (1.0 + c.discount_rate).powi(year as i32);
        }
        (lifetime, npv)
    }
}

/// Ordered recommendations from a fixed catalog
pub fn recommendations(
    solar: &SolarPotential,
    analysis: &FinancialAnalysis,
    inputs: FinanceInputs<'_>,
) -> Vec<String> {
    let mut out = Vec::new();

    match analysis.payback_period {
        PaybackPeriod::Years(y) if y < 10.0 => out.push(
            "Excellent investment opportunity with a payback period under 10 years".to_string(),
        ),
        PaybackPeriod::Years(y) if y < 15.0 => {
            out.push("Good investment opportunity with a reasonable payback period".to_string())
        }
        PaybackPeriod::Years(_) => out.push(
            "Consider waiting for better incentives or technology improvements".to_string(),
        ),
        PaybackPeriod::NotCalculable => out.push(
            "Savings do not cover the investment; the payback period cannot be assessed".to_string(),
        ),
    }

    if let Some(budget) = inputs.budget {
        if analysis.total_investment > budget {
            out.push(format!(
                "System cost exceeds your budget of €{:.0}; apply for KfW 270 subsidised financing",
                budget
            ));
        }
    }

    if solar.annual_kwh > inputs.annual_consumption_kwh {
        out.push(
            "Production exceeds your consumption; battery storage would raise self-consumption"
                .to_string(),
        );
    } else {
        out.push(
            "Production is below your consumption; consider energy efficiency improvements first"
                .to_string(),
        );
    }

    if analysis.annual_savings > 1000.0 {
        out.push("Significant annual savings potential; prioritise the installation".to_string());
    }

    if analysis.co2_reduction > 2.0 {
        out.push(
            "Substantial environmental impact; great for carbon footprint reduction".to_string(),
        );
    }

    out
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
