//! Household electricity price store
//!
//! The price is persisted as a small JSON document and can be refreshed from
//! the energy-charts day-ahead wholesale price for the DE-LU bidding zone.

use crate::errors::{PriceError, PriceResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const LIVE_PRICE_URL: &str = "https://api.energy-charts.info/price?bzn=DE-LU";

/// Wholesale to household price multiplier (grid fees, taxes, levies)
const HOUSEHOLD_MULTIPLIER: f64 = 3.5;
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    ManualUpdate,
    LiveApi,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrice {
    pub electricity_price_eur_per_kwh: f64,
    pub last_updated: Option<DateTime<Utc>>,
    pub source: PriceSource,
}

#[derive(Debug, Deserialize)]
struct EnergyChartsResponse {
    #[serde(default)]
    price: Vec<Option<f64>>,
}

/// Convert a wholesale price (€/MWh) to an estimated household price (€/kWh)
///
/// Results outside 0.20..=0.50 are replaced with a typical value on that side.
pub fn household_price_from_wholesale(eur_per_mwh: f64) -> f64 {
    let household = eur_per_mwh / 1000.0 * HOUSEHOLD_MULTIPLIER;
    let bounded = if household < 0.20 {
        0.30
    } else if household > 0.50 {
        0.40
    } else {
        household
    };
    (bounded * 10_000.0).round() / 10_000.0
}

pub struct ElectricityPriceStore {
    path: PathBuf,
    fallback_price: f64,
    api_url: String,
    client: reqwest::Client,
    cached: RwLock<Option<StoredPrice>>,
}

impl ElectricityPriceStore {
    pub fn new(path: impl AsRef<Path>, fallback_price: f64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fallback_price,
            api_url: LIVE_PRICE_URL.to_string(),
            client: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Stored price, or the fallback when nothing valid is stored
    pub fn current(&self) -> StoredPrice {
        if let Some(price) = self.cached.read().clone() {
            return price;
        }

        let loaded = match self.read_file() {
            Ok(price) => price,
            Err(e) => {
                tracing::debug!(error = %e, "Using fallback electricity price");
                StoredPrice {
                    electricity_price_eur_per_kwh: self.fallback_price,
                    last_updated: None,
                    source: PriceSource::Fallback,
                }
            }
        };
        *self.cached.write() = Some(loaded.clone());
        loaded
    }

    pub fn price(&self) -> f64 {
        self.current().electricity_price_eur_per_kwh
    }

    pub fn update_manual(&self, price: f64) -> PriceResult<StoredPrice> {
        self.store(price, PriceSource::ManualUpdate)
    }

    /// Fetch the latest wholesale price and convert it to a household price
    pub async fn fetch_live(&self) -> PriceResult<f64> {
        let response = self
            .client
            .get(&self.api_url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| PriceError::FetchFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PriceError::FetchFailed {
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body: EnergyChartsResponse =
            response.json().await.map_err(|e| PriceError::FetchFailed {
                reason: e.to_string(),
            })?;

        let wholesale = body
            .price
            .iter()
            .rev()
            .find_map(|p| *p)
            .ok_or_else(|| PriceError::FetchFailed {
                reason: "no price data in response".to_string(),
            })?;

        let household = household_price_from_wholesale(wholesale);
        tracing::info!(
            wholesale_eur_per_mwh = wholesale,
            household_eur_per_kwh = household,
            "Fetched live electricity price"
        );
        Ok(household)
    }

    pub async fn update_live(&self) -> PriceResult<StoredPrice> {
        let price = self.fetch_live().await?;
        self.store(price, PriceSource::LiveApi)
    }

    fn store(&self, price: f64, source: PriceSource) -> PriceResult<StoredPrice> {
        if !price.is_finite() || price <= 0.0 || price >= 2.0 {
            return Err(PriceError::InvalidPrice { value: price });
        }

        let stored = StoredPrice {
            electricity_price_eur_per_kwh: price,
            last_updated: Some(Utc::now()),
            source,
        };

        let storage_err = |reason: String| PriceError::StorageFailed {
            path: self.path.display().to_string(),
            reason,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| storage_err(e.to_string()))?;
            }
        }
        let json = serde_json::to_string_pretty(&stored).map_err(|e| storage_err(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| storage_err(e.to_string()))?;

        *self.cached.write() = Some(stored.clone());
        tracing::info!(price = price, source = ?source, "Electricity price updated");
        Ok(stored)
    }

    fn read_file(&self) -> PriceResult<StoredPrice> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| PriceError::StorageFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        let stored: StoredPrice =
            serde_json::from_str(&content).map_err(|e| PriceError::StorageFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        let price = stored.electricity_price_eur_per_kwh;
        if !price.is_finite() || price <= 0.0 {
            return Err(PriceError::InvalidPrice { value: price });
        }
        Ok(stored)
    }
}
