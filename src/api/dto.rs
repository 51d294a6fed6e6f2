//! Request and response bodies

use crate::context::AnalysisOutcome;
use crate::errors::{ValidationError, ValidationResult};
use crate::models::{
    AnalysisRequest, FeasibilityReport, FinancialAnalysis, Orientation, ReportTier, SolarPotential,
    WeatherAnalysisMode,
};
use serde::{Deserialize, Serialize};

/// Raw `/api/analyze` body, everything optional until validated
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AnalyzeBody {
    pub location: Option<String>,
    pub roof_area: Option<f64>,
    pub orientation: Option<String>,
    pub weather_analysis: Option<String>,
    pub budget: Option<f64>,
    pub annual_consumption: Option<f64>,
}

impl AnalyzeBody {
    /// Validate every field, reporting all problems at once
    pub fn into_request(self) -> ValidationResult<AnalysisRequest> {
        let mut errors = Vec::new();

        let location = match self.location {
            Some(location) => location,
            None => {
                errors.push(ValidationError::missing("location"));
                String::new()
            }
        };
        let roof_area = self.roof_area.unwrap_or_else(|| {
            errors.push(ValidationError::missing("roof_area"));
            f64::NAN
        });
        let orientation = match self.orientation.as_deref().map(str::parse::<Orientation>) {
            Some(Ok(orientation)) => Some(orientation),
            Some(Err(e)) => {
                errors.push(e);
                None
            }
            None => {
                errors.push(ValidationError::missing("orientation"));
                None
            }
        };
        let mode = match self.weather_analysis.as_deref().map(str::parse::<WeatherAnalysisMode>) {
            Some(Ok(mode)) => mode,
            Some(Err(e)) => {
                errors.push(e);
                WeatherAnalysisMode::default()
            }
            None => WeatherAnalysisMode::default(),
        };

        // Field checks still run so one response lists every problem
        let checked = AnalysisRequest::new(
            &location,
            roof_area,
            orientation.unwrap_or(Orientation::South),
            mode,
            self.annual_consumption,
            self.budget,
        );

        match checked {
            Ok(request) if errors.is_empty() => Ok(request),
            Ok(_) => Err(collapse(errors)),
            Err(e) => {
                for err in flatten(e) {
                    if !errors.iter().any(|known| same_field(known, &err)) {
                        errors.push(err);
                    }
                }
                Err(collapse(errors))
            }
        }
    }
}

fn flatten(err: ValidationError) -> Vec<ValidationError> {
    match err {
        ValidationError::Multiple(errors) => errors.into_iter().flat_map(flatten).collect(),
        other => vec![other],
    }
}

fn field_of(err: &ValidationError) -> Option<&str> {
    match err {
        ValidationError::InvalidField { field, .. } | ValidationError::MissingField { field } => {
            Some(field.as_str())
        }
        ValidationError::Multiple(_) => None,
    }
}

fn same_field(a: &ValidationError, b: &ValidationError) -> bool {
    matches!((field_of(a), field_of(b)), (Some(x), Some(y)) if x == y)
}

fn collapse(mut errors: Vec<ValidationError>) -> ValidationError {
    if errors.len() == 1 {
        errors.remove(0)
    } else {
        ValidationError::Multiple(errors)
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub request_id: String,
    pub location: String,
    pub solar_potential: SolarPotential,
    pub financial_analysis: FinancialAnalysis,
    pub feasibility_report: FeasibilityReport,
    pub report_tier: ReportTier,
    pub recommendations: Vec<String>,
}

impl AnalyzeResponse {
    pub fn new(location: &str, outcome: AnalysisOutcome) -> Self {
        Self {
            request_id: outcome.request_id,
            location: location.to_string(),
            report_tier: outcome.feasibility_report.generation_tier,
            recommendations: outcome.financial_analysis.recommendations.clone(),
            solar_potential: outcome.solar_potential,
            financial_analysis: outcome.financial_analysis,
            feasibility_report: outcome.feasibility_report,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub build_profile: &'static str,
    pub uptime_seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceUpdateBody {
    pub price: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> AnalyzeBody {
        AnalyzeBody {
            location: Some("Hamburg".into()),
            roof_area: Some(50.0),
            orientation: Some("south".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_body_defaults_to_hybrid() {
        let request = body().into_request().unwrap();
        assert_eq!(request.location(), "Hamburg");
        assert_eq!(request.weather_analysis_mode(), WeatherAnalysisMode::Hybrid);
        assert_eq!(request.orientation(), Orientation::South);
    }

    #[test]
    fn test_short_orientation_names_are_accepted() {
        let mut b = body();
        b.orientation = Some("SW".into());
        assert_eq!(b.into_request().unwrap().orientation(), Orientation::SouthWest);
    }

    #[test]
    fn test_every_problem_is_reported() {
        let b = AnalyzeBody {
            location: Some("  ".into()),
            roof_area: Some(-3.0),
            orientation: Some("up".into()),
            weather_analysis: Some("tomorrow".into()),
            ..Default::default()
        };
        let err = b.into_request().unwrap_err();
        let fields: Vec<String> = err.field_errors().into_iter().map(|(f, _)| f).collect();
        for expected in ["location", "roof_area", "orientation", "weather_analysis"] {
            assert!(fields.iter().any(|f| f == expected), "missing {expected} in {fields:?}");
        }
    }

    #[test]
    fn test_missing_fields_are_named() {
        let err = AnalyzeBody::default().into_request().unwrap_err();
        let fields: Vec<String> = err.field_errors().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields.iter().filter(|f| *f == "location").count(), 1);
        assert!(fields.contains(&"roof_area".to_string()));
        assert!(fields.contains(&"orientation".to_string()));
    }
}
