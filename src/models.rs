//! Domain types shared by the calculators, the report pipeline and the API

use crate::errors::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Average annual consumption of a German household (kWh)
pub const DEFAULT_ANNUAL_CONSUMPTION_KWH: f64 = 3500.0;

/// Roof orientation, one per 45° compass sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Orientation {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::North,
        Orientation::NorthEast,
        Orientation::East,
        Orientation::SouthEast,
        Orientation::South,
        Orientation::SouthWest,
        Orientation::West,
        Orientation::NorthWest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::North => "north",
            Orientation::NorthEast => "northeast",
            Orientation::East => "east",
            Orientation::SouthEast => "southeast",
            Orientation::South => "south",
            Orientation::SouthWest => "southwest",
            Orientation::West => "west",
            Orientation::NorthWest => "northwest",
        }
    }

    /// Compass azimuth in degrees (0 = north, 180 = south)
    pub fn azimuth(&self) -> u16 {
        match self {
            Orientation::North => 0,
            Orientation::NorthEast => 45,
            Orientation::East => 90,
            Orientation::SouthEast => 135,
            Orientation::South => 180,
            Orientation::SouthWest => 225,
            Orientation::West => 270,
            Orientation::NorthWest => 315,
        }
    }
}

impl FromStr for Orientation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect();

        match normalized.as_str() {
            "n" | "north" => Ok(Orientation::North),
            "ne" | "northeast" => Ok(Orientation::NorthEast),
            "e" | "east" => Ok(Orientation::East),
            "se" | "southeast" => Ok(Orientation::SouthEast),
            "s" | "south" => Ok(Orientation::South),
            "sw" | "southwest" => Ok(Orientation::SouthWest),
            "w" | "west" => Ok(Orientation::West),
            "nw" | "northwest" => Ok(Orientation::NorthWest),
            _ => Err(ValidationError::invalid(
                "orientation",
                format!("unknown orientation '{}', expected one of N, NE, E, SE, S, SW, W, NW", s),
            )),
        }
    }
}

impl TryFrom<String> for Orientation {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Orientation> for String {
    fn from(o: Orientation) -> Self {
        o.as_str().to_string()
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which slice of the historical series feeds the yield estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherAnalysisMode {
    /// Most recent years only
    Latest,
    /// Average over the full history
    Historical,
    /// Weighted blend of recent and full history
    #[default]
    Hybrid,
}

impl WeatherAnalysisMode {
    pub const ALL: [WeatherAnalysisMode; 3] = [
        WeatherAnalysisMode::Latest,
        WeatherAnalysisMode::Historical,
        WeatherAnalysisMode::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherAnalysisMode::Latest => "latest",
            WeatherAnalysisMode::Historical => "historical",
            WeatherAnalysisMode::Hybrid => "hybrid",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WeatherAnalysisMode::Latest => "Most recent year of recorded irradiance",
            WeatherAnalysisMode::Historical => "Multi-year average over the full dataset",
            WeatherAnalysisMode::Hybrid => "Weighted blend of recent and historical data (recommended)",
        }
    }
}

impl FromStr for WeatherAnalysisMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" | "recent" => Ok(WeatherAnalysisMode::Latest),
            "historical" | "history" => Ok(WeatherAnalysisMode::Historical),
            "hybrid" => Ok(WeatherAnalysisMode::Hybrid),
            _ => Err(ValidationError::invalid(
                "weather_analysis",
                format!("unknown mode '{}', expected latest, historical or hybrid", s),
            )),
        }
    }
}

impl fmt::Display for WeatherAnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated analysis request
///
/// Fields are private: the only way to obtain one is through [`AnalysisRequest::new`],
/// so every instance reaching the calculators satisfies the field constraints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    location: String,
    roof_area: f64,
    orientation: Orientation,
    weather_analysis_mode: WeatherAnalysisMode,
    annual_consumption: f64,
    budget: Option<f64>,
}

impl AnalysisRequest {
    pub fn new(
        location: &str,
        roof_area: f64,
        orientation: Orientation,
        weather_analysis_mode: WeatherAnalysisMode,
        annual_consumption: Option<f64>,
        budget: Option<f64>,
    ) -> ValidationResult<Self> {
        let mut errors = Vec::new();

        let location = location.trim();
        if location.is_empty() {
            errors.push(ValidationError::missing("location"));
        } else if location.chars().count() > 100 {
            errors.push(ValidationError::invalid("location", "must be at most 100 characters"));
        }

        if let Err(e) = check_positive("roof_area", roof_area) {
            errors.push(e);
        }

        let annual_consumption = annual_consumption.unwrap_or(DEFAULT_ANNUAL_CONSUMPTION_KWH);
        if let Err(e) = check_positive("annual_consumption", annual_consumption) {
            errors.push(e);
        }

        if let Some(budget) = budget {
            if let Err(e) = check_positive("budget", budget) {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(Self {
                location: location.to_string(),
                roof_area,
                orientation,
                weather_analysis_mode,
                annual_consumption,
                budget,
            }),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn roof_area(&self) -> f64 {
        self.roof_area
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn weather_analysis_mode(&self) -> WeatherAnalysisMode {
        self.weather_analysis_mode
    }

    pub fn annual_consumption(&self) -> f64 {
        self.annual_consumption
    }

    pub fn budget(&self) -> Option<f64> {
        self.budget
    }
}

fn check_positive(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::invalid(field, "must be a finite number"));
    }
    if value <= 0.0 {
        return Err(ValidationError::invalid(field, "must be greater than 0"));
    }
    Ok(())
}

/// Estimated energy yield of a roof
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolarPotential {
    pub annual_kwh: f64,
    pub daily_average: f64,
    /// January..December
    pub monthly_production: Vec<f64>,
    /// 1-based month with the highest production
    pub peak_month: u32,
    pub peak_month_production: f64,
    pub system_capacity_kw: f64,
    /// Percent of theoretical output at full rated capacity
    pub capacity_factor: f64,
    pub orientation_factor: f64,
    pub weather_analysis: WeatherAnalysisMode,
    /// Dataset location the estimate was computed from
    pub resolved_location: String,
    /// Set when the requested location had no weather record
    pub approximate: bool,
}

/// Payback period, or an explicit marker when savings never repay the investment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaybackPeriod {
    Years(f64),
    NotCalculable,
}

impl PaybackPeriod {
    /// Build from a raw quotient, rejecting non-positive and non-finite values
    pub fn from_ratio(investment: f64, annual_savings: f64) -> Self {
        if annual_savings <= 0.0 || !annual_savings.is_finite() {
            return PaybackPeriod::NotCalculable;
        }
        let years = investment / annual_savings;
        if years.is_finite() && years > 0.0 {
            PaybackPeriod::Years(years)
        } else {
            PaybackPeriod::NotCalculable
        }
    }

    pub fn years(&self) -> Option<f64> {
        match self {
            PaybackPeriod::Years(y) => Some(*y),
            PaybackPeriod::NotCalculable => None,
        }
    }
}

impl Serialize for PaybackPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PaybackPeriod::Years(y) => serializer.serialize_f64(*y),
            PaybackPeriod::NotCalculable => serializer.serialize_str("not_calculable"),
        }
    }
}

impl fmt::Display for PaybackPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaybackPeriod::Years(y) => write!(f, "{:.1} years", y),
            PaybackPeriod::NotCalculable => f.write_str("not calculable"),
        }
    }
}

/// German subsidy breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incentives {
    pub feed_in_tariff_eur_per_kwh: f64,
    pub kfw_loan_benefit_eur: f64,
    pub regional_incentive_eur: f64,
    pub total_incentives_eur: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialAnalysis {
    /// Gross system cost (€)
    pub total_investment: f64,
    /// Cost after incentives (€)
    pub net_investment: f64,
    pub annual_savings: f64,
    pub self_consumption_savings: f64,
    pub feed_in_income: f64,
    /// Household price the savings were computed with (€/kWh)
    pub electricity_price: f64,
    pub payback_period: PaybackPeriod,
    pub roi_percentage: f64,
    pub npv: f64,
    pub lifetime_savings: f64,
    /// Tonnes of CO2 avoided per year
    pub co2_reduction: f64,
    pub incentives: Incentives,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DocumentSource {
    File(PathBuf),
    Baseline(String),
}

/// A policy text used as retrieval corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub id: String,
    pub source: DocumentSource,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTier {
    Llm,
    EnhancedTemplate,
    BasicTemplate,
}

impl ReportTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportTier::Llm => "llm",
            ReportTier::EnhancedTemplate => "enhanced_template",
            ReportTier::BasicTemplate => "basic_template",
        }
    }
}

impl fmt::Display for ReportTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeasibilityReport {
    pub text: String,
    pub generation_tier: ReportTier,
    /// Ids of the policy documents the report was grounded on
    pub policy_sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_spellings() {
        assert_eq!("S".parse::<Orientation>().unwrap(), Orientation::South);
        assert_eq!("south".parse::<Orientation>().unwrap(), Orientation::South);
        assert_eq!("South-West".parse::<Orientation>().unwrap(), Orientation::SouthWest);
        assert_eq!("nw".parse::<Orientation>().unwrap(), Orientation::NorthWest);
        assert!("up".parse::<Orientation>().is_err());
    }

    #[test]
    fn test_orientation_serde() {
        let json = serde_json::to_string(&Orientation::SouthEast).unwrap();
        assert_eq!(json, "\"southeast\"");
        let parsed: Orientation = serde_json::from_str("\"SE\"").unwrap();
        assert_eq!(parsed, Orientation::SouthEast);
    }

    #[test]
    fn test_request_collects_all_field_errors() {
        let err = AnalysisRequest::new(
            " ",
            -5.0,
            Orientation::South,
            WeatherAnalysisMode::Hybrid,
            Some(0.0),
            Some(f64::NAN),
        )
        .unwrap_err();

        let fields: Vec<String> = err.field_errors().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["location", "roof_area", "annual_consumption", "budget"]);
    }

    #[test]
    fn test_request_defaults_consumption() {
        let request = AnalysisRequest::new(
            "Hamburg",
            50.0,
            Orientation::South,
            WeatherAnalysisMode::Latest,
            None,
            None,
        )
        .unwrap();
        assert_eq!(request.annual_consumption(), DEFAULT_ANNUAL_CONSUMPTION_KWH);
        assert_eq!(request.budget(), None);
    }

    #[test]
    fn test_payback_period_guards() {
        assert_eq!(PaybackPeriod::from_ratio(1000.0, 0.0), PaybackPeriod::NotCalculable);
        assert_eq!(PaybackPeriod::from_ratio(1000.0, -5.0), PaybackPeriod::NotCalculable);
        assert_eq!(PaybackPeriod::from_ratio(1000.0, f64::NAN), PaybackPeriod::NotCalculable);
        assert_eq!(PaybackPeriod::from_ratio(1000.0, 100.0), PaybackPeriod::Years(10.0));

        let json = serde_json::to_value(PaybackPeriod::NotCalculable).unwrap();
        assert_eq!(json, serde_json::json!("not_calculable"));
        let json = serde_json::to_value(PaybackPeriod::Years(7.5)).unwrap();
        assert_eq!(json, serde_json::json!(7.5));
    }
}
