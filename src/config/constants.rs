//! Calculation constants
//!
//! Panel, market and policy assumptions for the German residential market.
//! They are configuration data rather than code so that a deployment can
//! update them from a newer domain source without a rebuild.

use serde::{Deserialize, Serialize};

use crate::models::Orientation;

/// Constants used by the solar yield calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarConstants {
    /// Module efficiency of modern monocrystalline panels
    pub panel_efficiency: f64,
    /// Remaining yield after inverter, wiring and soiling losses
    pub system_losses_factor: f64,
    /// Installed capacity per square metre of roof (kW/m²)
    pub panel_density_kw_per_m2: f64,
    /// Largest roof area accepted by the calculator (m²)
    pub max_roof_area_m2: f64,
    /// Number of most recent years averaged by the `latest` mode
    pub latest_window_years: usize,
    /// Share of the `latest` series in the `hybrid` blend
    pub hybrid_latest_weight: f64,
    /// Yield factors relative to an optimal south-facing roof
    pub orientation_factors: OrientationFactors,
}

/// Orientation yield factors, one per 45° compass sector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationFactors {
    pub north: f64,
    pub northeast: f64,
    pub east: f64,
    pub southeast: f64,
    pub south: f64,
    pub southwest: f64,
    pub west: f64,
    pub northwest: f64,
}

impl OrientationFactors {
    pub fn factor(&self, orientation: Orientation) -> f64 {
        match orientation {
            Orientation::North => self.north,
            Orientation::NorthEast => self.northeast,
            Orientation::East => self.east,
            Orientation::SouthEast => self.southeast,
            Orientation::South => self.south,
            Orientation::SouthWest => self.southwest,
            Orientation::West => self.west,
            Orientation::NorthWest => self.northwest,
        }
    }

    pub(crate) fn all(&self) -> [(Orientation, f64); 8] {
        Orientation::ALL.map(|o| (o, self.factor(o)))
    }
}

impl Default for OrientationFactors {
    fn default() -> Self {
        Self {
            north: 0.6,
            northeast: 0.75,
            east: 0.85,
            southeast: 0.95,
            south: 1.0,
            southwest: 0.95,
            west: 0.85,
            northwest: 0.75,
        }
    }
}

impl Default for SolarConstants {
    fn default() -> Self {
        Self {
            panel_efficiency: 0.20,
            system_losses_factor: 0.85,
            panel_density_kw_per_m2: 0.20,
            max_roof_area_m2: 10_000.0,
            latest_window_years: 1,
            hybrid_latest_weight: 0.3,
            orientation_factors: OrientationFactors::default(),
        }
    }
}

/// Constants used by the ROI calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceConstants {
    /// Installed system cost (€/kWp)
    pub system_cost_per_kw: f64,
    /// Insurance, cleaning and monitoring (€/year)
    pub maintenance_cost_per_year: f64,
    /// Lifecycle horizon for ROI and NPV (years)
    pub system_lifetime_years: u32,
    /// Annual yield degradation
    pub degradation_rate: f64,
    /// Discount rate for NPV
    pub discount_rate: f64,
    /// Household electricity price used when no stored price exists (€/kWh)
    pub fallback_electricity_price: f64,
    /// Share of production exported to the grid
    pub feed_in_share: f64,
    /// Grid carbon intensity (kg CO2/kWh)
    pub grid_carbon_factor_kg_per_kwh: f64,
    /// Floor for the net investment after incentives (€)
    pub minimum_net_investment: f64,
    /// KfW loan benefit per kWp (€)
    pub kfw_benefit_per_kw: f64,
    /// Cap on the KfW loan benefit (€)
    pub kfw_benefit_cap: f64,
    /// Regional incentive per kWp (€)
    pub regional_incentive_per_kw: f64,
    /// EEG feed-in tariff bands, ascending by capacity
    pub feed_in_tariffs: Vec<FeedInTariffBand>,
    /// Location specific multipliers
    pub location_factors: Vec<LocationFactor>,
    /// Default multiplier for locations not listed above
    pub default_incentive_multiplier: f64,
}

/// Feed-in tariff applicable up to a system size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedInTariffBand {
    /// Upper bound of the band (kWp); `None` for the open-ended top band
    pub max_capacity_kw: Option<f64>,
    /// Tariff (€/kWh)
    pub tariff_eur_per_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFactor {
    pub location: String,
    pub incentive_multiplier: f64,
}

impl FinanceConstants {
    /// Tariff for a system of the given size
    pub fn feed_in_tariff(&self, capacity_kw: f64) -> f64 {
        self.feed_in_tariffs
            .iter()
            .find(|band| match band.max_capacity_kw {
                Some(max) => capacity_kw <= max,
                None => true,
            })
            .or_else(|| self.feed_in_tariffs.last())
            .map(|band| band.tariff_eur_per_kwh)
            .unwrap_or(0.0)
    }

    pub fn location_factor(&self, location: &str) -> Option<&LocationFactor> {
        self.location_factors
            .iter()
            .find(|f| f.location.eq_ignore_ascii_case(location.trim()))
    }
}

impl Default for FinanceConstants {
    fn default() -> Self {
        Self {
            system_cost_per_kw: 1800.0,
            maintenance_cost_per_year: 200.0,
            system_lifetime_years: 25,
            degradation_rate: 0.005,
            discount_rate: 0.04,
            fallback_electricity_price: 0.34,
            feed_in_share: 0.25,
            grid_carbon_factor_kg_per_kwh: 0.485,
            minimum_net_investment: 500.0,
            kfw_benefit_per_kw: 200.0,
            kfw_benefit_cap: 10_000.0,
            regional_incentive_per_kw: 150.0,
            feed_in_tariffs: vec![
                FeedInTariffBand {
                    max_capacity_kw: Some(10.0),
                    tariff_eur_per_kwh: 0.082,
                },
                FeedInTariffBand {
                    max_capacity_kw: Some(40.0),
                    tariff_eur_per_kwh: 0.071,
                },
                FeedInTariffBand {
                    max_capacity_kw: None,
                    tariff_eur_per_kwh: 0.057,
                },
            ],
            location_factors: vec![
                LocationFactor {
                    location: "Berlin".to_string(),
                    incentive_multiplier: 1.0,
                },
                LocationFactor {
                    location: "Munich".to_string(),
                    incentive_multiplier: 1.15,
                },
                LocationFactor {
                    location: "Hamburg".to_string(),
                    incentive_multiplier: 1.05,
                },
            ],
            default_incentive_multiplier: 1.0,
        }
    }
}
