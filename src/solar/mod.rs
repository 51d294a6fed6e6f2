//! Solar yield estimation
//!
//! Pure computation over the weather dataset: monthly irradiance is scaled
//! by roof area, orientation, panel efficiency and system losses.

use crate::config::SolarConstants;
use crate::errors::{ValidationError, ValidationResult};
use crate::models::{AnalysisRequest, Orientation, SolarPotential, WeatherAnalysisMode};
use crate::weather::{days_in_month, WeatherDataset};
use ndarray::Array1;
use std::sync::Arc;

const HOURS_PER_YEAR: f64 = 8760.0;

pub struct SolarCalculator {
    dataset: Arc<WeatherDataset>,
    constants: SolarConstants,
}

impl SolarCalculator {
    pub fn new(dataset: Arc<WeatherDataset>, constants: SolarConstants) -> Self {
        Self { dataset, constants }
    }

    pub fn dataset(&self) -> &WeatherDataset {
        &self.dataset
    }

    pub fn constants(&self) -> &SolarConstants {
        &self.constants
    }

    pub fn calculate(&self, request: &AnalysisRequest) -> ValidationResult<SolarPotential> {
        self.estimate(
            request.location(),
            request.roof_area(),
            request.orientation(),
            request.weather_analysis_mode(),
        )
    }

    /// Estimate monthly and annual production for a roof
    pub fn estimate(
        &self,
        location: &str,
        roof_area: f64,
        orientation: Orientation,
        mode: WeatherAnalysisMode,
    ) -> ValidationResult<SolarPotential> {
        if !roof_area.is_finite() || roof_area <= 0.0 {
            return Err(ValidationError::invalid("roof_area", "must be greater than 0"));
        }
        if roof_area > self.constants.max_roof_area_m2 {
            return Err(ValidationError::invalid(
                "roof_area",
                format!("must be at most {} m²", self.constants.max_roof_area_m2),
            ));
        }

        let resolved = self.dataset.resolve(location);
        let irradiance = Array1::from(
            resolved
                .series
                .profile(
                    mode,
                    self.constants.latest_window_years,
                    self.constants.hybrid_latest_weight,
                )
                .to_vec(),
        );
        let days = Array1::from(days_in_month().to_vec());

        let orientation_factor = self.constants.orientation_factors.factor(orientation);
        let scale = roof_area
            * self.constants.panel_efficiency
            * self.constants.system_losses_factor
            * orientation_factor;

        let monthly: Vec<f64> = (irradiance * days * scale)
            .iter()
            .map(|kwh| round2(kwh.max(0.0)))
            .collect();
        let annual_kwh = round2(monthly.iter().sum());

        let (peak_idx, peak_month_production) = monthly
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        let system_capacity_kw = roof_area * self.constants.panel_density_kw_per_m2;
        let capacity_factor = if system_capacity_kw > 0.0 {
            annual_kwh / (system_capacity_kw * HOURS_PER_YEAR) * 100.0
        } else {
            0.0
        };

        tracing::debug!(
            location = location,
            resolved = resolved.series.name(),
            mode = mode.as_str(),
            annual_kwh = annual_kwh,
            "Solar potential estimated"
        );

        Ok(SolarPotential {
            annual_kwh,
            daily_average: round2(annual_kwh / 365.0),
            monthly_production: monthly,
            peak_month: peak_idx as u32 + 1,
            peak_month_production,
            system_capacity_kw: round2(system_capacity_kw),
            capacity_factor: round2(capacity_factor),
            orientation_factor,
            weather_analysis: mode,
            resolved_location: resolved.series.name().to_string(),
            approximate: resolved.approximate,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
