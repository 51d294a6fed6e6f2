//! Feasibility report rendering
//!
//! Three renderings in decreasing richness: an LLM prompt, an enhanced
//! template that quotes retrieved policy snippets, and a basic template
//! built from the calculations alone.

use super::RetrievedSnippet;
use crate::errors::{ReportError, ReportResult};
use crate::models::{AnalysisRequest, FinancialAnalysis, PaybackPeriod, SolarPotential};
use std::fmt::Write;

/// Everything a report is rendered from
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub request: &'a AnalysisRequest,
    pub solar: &'a SolarPotential,
    pub finance: &'a FinancialAnalysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeasibilityRating {
    Excellent,
    Good,
    Moderate,
    Challenging,
}

impl FeasibilityRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeasibilityRating::Excellent => "EXCELLENT",
            FeasibilityRating::Good => "GOOD",
            FeasibilityRating::Moderate => "MODERATE",
            FeasibilityRating::Challenging => "CHALLENGING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeasibilityAssessment {
    pub rating: FeasibilityRating,
    pub recommendation: &'static str,
    pub confidence: &'static str,
}

pub fn assess_feasibility(payback: PaybackPeriod, roi_percentage: f64) -> FeasibilityAssessment {
    let (rating, recommendation, confidence) = match payback {
        PaybackPeriod::Years(y) if y <= 10.0 && roi_percentage >= 8.0 => (
            FeasibilityRating::Excellent,
            "strongly recommend proceeding",
            "high",
        ),
        PaybackPeriod::Years(y) if y <= 15.0 && roi_percentage >= 5.0 => {
            (FeasibilityRating::Good, "recommend proceeding", "good")
        }
        PaybackPeriod::Years(y) if y <= 20.0 => (
            FeasibilityRating::Moderate,
            "suggest proceeding only after careful evaluation",
            "moderate",
        ),
        _ => (
            FeasibilityRating::Challenging,
            "suggest waiting for better conditions",
            "low",
        ),
    };
    FeasibilityAssessment {
        rating,
        recommendation,
        confidence,
    }
}

/// Round to an integer and group thousands with commas
pub fn format_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

const DEFAULT_POLICY_HIGHLIGHTS: [&str; 3] = [
    "- Zero VAT on residential solar installations since 2023",
    "- Feed-in tariff €0.082/kWh for surplus electricity",
    "- KfW financing available up to €50,000",
];

/// Snippets about financing, tax or tariffs, first three only
fn policy_highlights(snippets: &[RetrievedSnippet]) -> Vec<String> {
    let highlights: Vec<String> = snippets
        .iter()
        .take(3)
        .filter(|s| {
            let lower = s.text.to_lowercase();
            s.text.contains("KfW")
                || lower.contains("financing")
                || s.text.contains("VAT")
                || lower.contains("tax")
                || lower.contains("feed-in")
                || lower.contains("tariff")
        })
        .map(|s| format!("- {}", s.text.trim().replace('\n', "\n  ")))
        .collect();

    if highlights.is_empty() {
        DEFAULT_POLICY_HIGHLIGHTS.iter().map(|s| s.to_string()).collect()
    } else {
        highlights
    }
}

fn budget_text(budget: Option<f64>) -> String {
    budget
        .map(|b| format!("€{}", format_thousands(b)))
        .unwrap_or_else(|| "Not specified".to_string())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn build_prompt(&self, input: ReportInput<'_>, snippets: &[RetrievedSnippet]) -> String {
        let ReportInput {
            request,
            solar,
            finance,
        } = input;
        let context = snippets
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "You are an expert renewable energy consultant specializing in German solar installations.
Create a detailed, personalized solar panel investment feasibility report.

CUSTOMER PROFILE:
- Location: {}
- Roof Area: {} m²
- Roof Orientation: {}
- Available Budget: {}
- Energy Usage: {} kWh/year

TECHNICAL CALCULATIONS:
- Annual Production: {:.0} kWh
- System Capacity: {:.1} kW
- Capacity Factor: {:.1}%
- Monthly Peak Production: {:.0} kWh
- Weather basis: {} data for {}{}

FINANCIAL ANALYSIS:
- Total Investment: €{:.0}
- Net Investment after incentives: €{:.0}
- Annual Savings: €{:.0}
- Payback Period: {}
- ROI: {:.1}%
- CO2 Reduction: {:.2} tons/year

REGULATORY & MARKET CONTEXT:
{}

INSTRUCTIONS:
1. Write in a professional but accessible tone for German homeowners
2. Provide specific, actionable recommendations based on the data
3. Use the provided financial calculations exactly as given
4. Structure with clear headings and bullet points
5. Address potential concerns and risks

Cover an executive summary, technical feasibility, financial analysis, environmental impact,
regulatory considerations and incentives, recommendations and next steps, and risks.
Write approximately 800-1000 words.",
            request.location(),
            request.roof_area(),
            request.orientation(),
            budget_text(request.budget()),
            request.annual_consumption(),
            solar.annual_kwh,
            solar.system_capacity_kw,
            solar.capacity_factor,
            solar.peak_month_production,
            solar.weather_analysis,
            solar.resolved_location,
            if solar.approximate { " (approximate)" } else { "" },
            finance.total_investment,
            finance.net_investment,
            finance.annual_savings,
            finance.payback_period,
            finance.roi_percentage,
            finance.co2_reduction,
            if context.is_empty() { "No policy context available." } else { context.as_str() },
        );
        prompt
    }

    /// Template enriched with retrieved policy snippets
    pub fn enhanced_template(
        &self,
        input: ReportInput<'_>,
        snippets: &[RetrievedSnippet],
    ) -> ReportResult<String> {
        if snippets.is_empty() {
            return Err(ReportError::MissingPolicyContext);
        }

        let ReportInput {
            request,
            solar,
            finance,
        } = input;
        let assessment = assess_feasibility(finance.payback_period, finance.roi_percentage);
        let highlights = policy_highlights(snippets).join("\n");
        let annual = format_thousands(solar.annual_kwh);
        let net_profit = finance.lifetime_savings - finance.total_investment;

        let mut r = String::new();
        writeln!(r, "# Solar Panel Investment Feasibility Report")?;
        writeln!(r, "## Location: {}\n", request.location())?;
        if solar.approximate {
            writeln!(
                r,
                "> No weather record exists for {}; figures use data for {}.\n",
                request.location(),
                solar.resolved_location
            )?;
        }

        writeln!(r, "### Executive Summary")?;
        writeln!(
            r,
            "Your solar installation project shows **{}** feasibility with **{} confidence**. \
             Based on our analysis of your {} m² roof in {}, we {}.\n",
            assessment.rating.as_str(),
            assessment.confidence,
            request.roof_area(),
            request.location(),
            assessment.recommendation
        )?;
        writeln!(r, "**Key Metrics:**")?;
        writeln!(r, "- **Investment**: €{}", format_thousands(finance.total_investment))?;
        writeln!(r, "- **Annual Production**: {} kWh", annual)?;
        writeln!(r, "- **Payback Period**: {}", finance.payback_period)?;
        writeln!(r, "- **ROI**: {:.1}% over the system lifetime\n", finance.roi_percentage)?;

        writeln!(r, "### Technical Analysis")?;
        writeln!(r, "- **Annual Energy Production**: {} kWh", annual)?;
        writeln!(r, "- **System Capacity**: {:.1} kW", solar.system_capacity_kw)?;
        writeln!(r, "- **Capacity Factor**: {:.1}%", solar.capacity_factor)?;
        writeln!(
            r,
            "- **Peak Production Month**: {} kWh (month {})",
            format_thousands(solar.peak_month_production),
            solar.peak_month
        )?;
        writeln!(r, "- **Daily Average Production**: {:.1} kWh", solar.daily_average)?;
        writeln!(
            r,
            "- **Orientation**: {} (yield factor {:.2})\n",
            request.orientation(),
            solar.orientation_factor
        )?;

        writeln!(r, "### Financial Analysis")?;
        writeln!(r, "- **Total Investment**: €{}", format_thousands(finance.total_investment))?;
        writeln!(
            r,
            "- **Net Investment after incentives**: €{}",
            format_thousands(finance.net_investment)
        )?;
        writeln!(r, "- **Annual Savings**: €{}", format_thousands(finance.annual_savings))?;
        writeln!(r, "- **Payback Period**: {}", finance.payback_period)?;
        writeln!(r, "- **Return on Investment**: {:.1}%", finance.roi_percentage)?;
        writeln!(r, "- **25-Year Net Profit**: €{}", format_thousands(net_profit))?;
        writeln!(r, "- **Monthly Savings**: €{:.0}\n", finance.annual_savings / 12.0)?;

        writeln!(r, "### Environmental Impact")?;
        writeln!(r, "- **Annual CO2 Reduction**: {:.1} tons", finance.co2_reduction)?;
        writeln!(r, "- **25-Year CO2 Reduction**: {:.1} tons", finance.co2_reduction * 25.0)?;
        writeln!(
            r,
            "- **Equivalent to**: planting {} trees annually\n",
            (finance.co2_reduction * 45.0) as u64
        )?;

        writeln!(r, "### Current Policy Benefits")?;
        writeln!(r, "Based on retrieved policy data:\n{}\n", highlights)?;

        writeln!(r, "### Personalized Recommendations")?;
        writeln!(r, "1. **Installer Selection**: Get quotes from at least 3 certified installers")?;
        writeln!(
            r,
            "2. **Financing**: {}",
            if finance.total_investment > 15_000.0 {
                "Apply for a KfW loan to reduce upfront costs"
            } else {
                "Consider self-financing for a better return"
            }
        )?;
        writeln!(r, "3. **Grid Connection**: Register with the local grid operator early")?;
        writeln!(
            r,
            "4. **Battery Storage**: {}",
            if finance.annual_savings > 1500.0 {
                "Highly recommended"
            } else {
                "Consider as a future upgrade"
            }
        )?;
        for item in &finance.recommendations {
            writeln!(r, "- {}", item)?;
        }
        writeln!(r)?;

        writeln!(r, "### Risk Assessment")?;
        writeln!(
            r,
            "- **Weather Risks**: {}",
            if finance.roi_percentage > 6.0 {
                "Low, consistent German weather patterns"
            } else {
                "Moderate, consider weather insurance"
            }
        )?;
        writeln!(r, "- **Technology Risks**: Low, mature technology with 25-year warranties")?;
        let financial_risk = match finance.payback_period {
            PaybackPeriod::Years(y) if y < 15.0 => "Low",
            _ => "Moderate",
        };
        writeln!(
            r,
            "- **Financial Risks**: {}, {}",
            financial_risk,
            if finance.roi_percentage > 5.0 {
                "stable returns expected"
            } else {
                "monitor energy prices"
            }
        )?;
        writeln!(r, "- **Regulatory Risks**: Low, German solar policy is stable\n")?;

        writeln!(r, "### Next Steps")?;
        writeln!(r, "1. Contact local installers for a detailed site assessment")?;
        writeln!(r, "2. Apply for financing and permits")?;
        writeln!(r, "3. Compare detailed quotes and select an installer")?;
        writeln!(r, "4. Installation and grid connection")?;
        writeln!(r, "5. Monitor performance and maintain the system\n")?;

        writeln!(r, "### Performance Monitoring")?;
        writeln!(
            r,
            "- Expected monthly production range: {:.0}-{:.0} kWh",
            solar.annual_kwh / 12.0 * 0.3,
            solar.annual_kwh / 12.0 * 1.7
        )?;
        writeln!(r, "- Annual performance degradation: 0.5-0.8%")?;
        write!(r, "- Warranty period: 25 years (80% performance guarantee)")?;

        Ok(r)
    }

    /// Minimal summary from the calculations; cannot fail
    pub fn basic_template(&self, input: ReportInput<'_>) -> String {
        let ReportInput {
            request,
            solar,
            finance,
        } = input;
        let assessment = assess_feasibility(finance.payback_period, finance.roi_percentage);

        let mut r = String::new();
        let _ = writeln!(r, "# Solar Panel Investment Feasibility Report");
        let _ = writeln!(r, "## Location: {}\n", request.location());
        if solar.approximate {
            let _ = writeln!(
                r,
                "> No weather record exists for {}; figures use data for {}.\n",
                request.location(),
                solar.resolved_location
            );
        }

        let _ = writeln!(r, "### Executive Summary");
        let _ = writeln!(
            r,
            "Your solar installation project shows **{}** feasibility. For your {} m² roof in {}, we {}.\n",
            assessment.rating.as_str(),
            request.roof_area(),
            request.location(),
            assessment.recommendation
        );

        let _ = writeln!(r, "### Technical Analysis");
        let _ = writeln!(
            r,
            "- **Annual Energy Production**: {} kWh",
            format_thousands(solar.annual_kwh)
        );
        let _ = writeln!(r, "- **System Capacity**: {:.1} kW", solar.system_capacity_kw);
        let _ = writeln!(r, "- **Capacity Factor**: {:.1}%\n", solar.capacity_factor);

        let _ = writeln!(r, "### Financial Analysis");
        let _ = writeln!(r, "- **Total Investment**: €{}", format_thousands(finance.total_investment));
        let _ = writeln!(r, "- **Annual Savings**: €{}", format_thousands(finance.annual_savings));
        let _ = writeln!(r, "- **Payback Period**: {}", finance.payback_period);
        let _ = writeln!(r, "- **Return on Investment**: {:.1}%\n", finance.roi_percentage);

        let _ = writeln!(r, "### Environmental Impact");
        let _ = writeln!(r, "- **Annual CO2 Reduction**: {:.1} tons\n", finance.co2_reduction);

        let _ = writeln!(r, "### Key Recommendations");
        for item in &finance.recommendations {
            let _ = writeln!(r, "- {}", item);
        }
        let _ = writeln!(r);
        let _ = write!(
            r,
            "This analysis is based on current German regulations and market conditions. \
             Consult local experts for site-specific advice."
        );
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0.0), "0");
        assert_eq!(format_thousands(999.4), "999");
        assert_eq!(format_thousands(8123.6), "8,124");
        assert_eq!(format_thousands(1_234_567.0), "1,234,567");
        assert_eq!(format_thousands(-4500.0), "-4,500");
    }

    #[test]
    fn test_assessment_bands() {
        assert_eq!(
            assess_feasibility(PaybackPeriod::Years(8.0), 12.0).rating,
            FeasibilityRating::Excellent
        );
        assert_eq!(
            assess_feasibility(PaybackPeriod::Years(12.0), 6.0).rating,
            FeasibilityRating::Good
        );
        assert_eq!(
            assess_feasibility(PaybackPeriod::Years(8.0), 2.0).rating,
            FeasibilityRating::Moderate
        );
        assert_eq!(
            assess_feasibility(PaybackPeriod::Years(30.0), 50.0).rating,
            FeasibilityRating::Challenging
        );
        assert_eq!(
            assess_feasibility(PaybackPeriod::NotCalculable, 0.0).rating,
            FeasibilityRating::Challenging
        );
    }

    #[test]
    fn test_highlights_fall_back_to_defaults() {
        let snippets = vec![RetrievedSnippet {
            document_id: "tech".to_string(),
            text: "Monocrystalline panels are efficient".to_string(),
            distance: None,
        }];
        assert_eq!(policy_highlights(&snippets).len(), 3);

        let snippets = vec![RetrievedSnippet {
            document_id: "kfw".to_string(),
            text: "KfW 270 loans".to_string(),
            distance: None,
        }];
        assert_eq!(policy_highlights(&snippets), vec!["- KfW 270 loans".to_string()]);
    }
}
