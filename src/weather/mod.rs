//! Historical weather dataset
//!
//! Monthly irradiance records keyed by location, year and month. The dataset
//! is read once at startup and never mutated afterwards.

use crate::errors::{DataError, DataResult};
use crate::models::WeatherAnalysisMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

/// Copy of the dataset shipped with the binary, used when the configured file is missing
const BUNDLED_DATASET: &str = include_str!("../../data/renewable_weather.csv");

/// Name of the synthetic series averaged over every location
pub const NATIONAL_AVERAGE: &str = "Germany (national average)";

const DAYS_IN_MONTH: [f64; 12] = [
    31.0, 28.0, 31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0,
];

/// Days in each month of a non-leap year, January first
pub fn days_in_month() -> [f64; 12] {
    DAYS_IN_MONTH
}

#[derive(Debug, Deserialize)]
struct WeatherRow {
    location: String,
    latitude: f64,
    longitude: f64,
    year: i32,
    month: u32,
    irradiance_kwh_m2_day: f64,
    sunshine_hours: f64,
    temperature_c: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRecord {
    pub year: i32,
    pub month: u32,
    /// Mean daily global horizontal irradiance (kWh/m²/day)
    pub irradiance_kwh_m2_day: f64,
    pub sunshine_hours: f64,
    pub temperature_c: f64,
}

/// All records of one location
#[derive(Debug, Clone)]
pub struct LocationSeries {
    name: String,
    latitude: f64,
    longitude: f64,
    records: BTreeMap<(i32, u32), MonthlyRecord>,
}

impl LocationSeries {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn years(&self) -> Vec<i32> {
        self.records
            .keys()
            .map(|(year, _)| *year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &MonthlyRecord> {
        self.records.values()
    }

    /// Mean daily irradiance per month over all years
    pub fn historical(&self) -> [f64; 12] {
        let mut monthly = [0.0; 12];
        for (idx, value) in monthly.iter_mut().enumerate() {
            let month = idx as u32 + 1;
            let values: Vec<f64> = self
                .records
                .values()
                .filter(|r| r.month == month)
                .map(|r| r.irradiance_kwh_m2_day)
                .collect();
            *value = mean(&values);
        }
        monthly
    }

    /// Mean daily irradiance per month over the `window` most recent years
    /// that carry a record for that month
    pub fn latest(&self, window: usize) -> [f64; 12] {
        let window = window.max(1);
        let mut monthly = [0.0; 12];
        for (idx, value) in monthly.iter_mut().enumerate() {
            let month = idx as u32 + 1;
            let values: Vec<f64> = self
                .records
                .values()
                .rev()
                .filter(|r| r.month == month)
                .take(window)
                .map(|r| r.irradiance_kwh_m2_day)
                .collect();
            *value = mean(&values);
        }
        monthly
    }

    /// Convex per-month blend of the latest and historical profiles
    pub fn hybrid(&self, window: usize, latest_weight: f64) -> [f64; 12] {
        let w = latest_weight.clamp(0.0, 1.0);
        let latest = self.latest(window);
        let historical = self.historical();
        std::array::from_fn(|i| w * latest[i] + (1.0 - w) * historical[i])
    }

    pub fn profile(&self, mode: WeatherAnalysisMode, window: usize, latest_weight: f64) -> [f64; 12] {
        match mode {
            WeatherAnalysisMode::Latest => self.latest(window),
            WeatherAnalysisMode::Historical => self.historical(),
            WeatherAnalysisMode::Hybrid => self.hybrid(window, latest_weight),
        }
    }

    fn missing_months(&self) -> Vec<u32> {
        (1..=12u32)
            .filter(|m| !self.records.values().any(|r| r.month == *m))
            .collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Outcome of matching a requested location against the dataset
#[derive(Debug, Clone, Copy)]
pub struct ResolvedLocation<'a> {
    pub series: &'a LocationSeries,
    /// True when the series is not the requested location
    pub approximate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationInfo {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub years: Vec<i32>,
}

/// Irradiance profile in every analysis mode, for the weather endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ModeAverages {
    pub latest: [f64; 12],
    pub historical: [f64; 12],
    pub hybrid: [f64; 12],
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherSummary {
    pub requested_location: String,
    pub resolved_location: String,
    pub approximate: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub years: Vec<i32>,
    pub monthly_records: Vec<MonthlyRecord>,
    pub mode_averages: ModeAverages,
}

/// The full weather dataset
#[derive(Debug, Clone)]
pub struct WeatherDataset {
    locations: Vec<LocationSeries>,
    index: HashMap<String, usize>,
    national_average: LocationSeries,
    default_location: String,
}

impl WeatherDataset {
    /// Load from a CSV file
    pub fn load(path: &Path, default_location: &str) -> DataResult<Self> {
        let file = std::fs::File::open(path).map_err(|_| DataError::DatasetNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_reader(file, default_location)
    }

    /// Load from a CSV file, or from the bundled copy when the file is missing
    pub fn load_or_bundled(path: &Path, default_location: &str) -> DataResult<Self> {
        if path.exists() {
            return Self::load(path, default_location);
        }
        tracing::warn!(
            path = %path.display(),
            "Weather dataset not found, using the bundled copy"
        );
        Self::bundled(default_location)
    }

    pub fn bundled(default_location: &str) -> DataResult<Self> {
        Self::from_reader(BUNDLED_DATASET.as_bytes(), default_location)
    }

    pub fn from_reader<R: Read>(reader: R, default_location: &str) -> DataResult<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut grouped: BTreeMap<String, LocationSeries> = BTreeMap::new();

        for result in reader.deserialize() {
            let row: WeatherRow = result.map_err(|e| DataError::ParsingFailed {
                line: e.position().map(|p| p.line()).unwrap_or(0),
                reason: e.to_string(),
            })?;

            if !(1..=12).contains(&row.month) {
                return Err(DataError::ParsingFailed {
                    line: 0,
                    reason: format!("month {} out of range for {}", row.month, row.location),
                });
            }
            if !row.irradiance_kwh_m2_day.is_finite() || row.irradiance_kwh_m2_day < 0.0 {
                return Err(DataError::ParsingFailed {
                    line: 0,
                    reason: format!(
                        "invalid irradiance {} for {} {}-{:02}",
                        row.irradiance_kwh_m2_day, row.location, row.year, row.month
                    ),
                });
            }

            let name = row.location.trim().to_string();
            let series = grouped
                .entry(normalize_location(&name))
                .or_insert_with(|| LocationSeries {
                    name: name.clone(),
                    latitude: row.latitude,
                    longitude: row.longitude,
                    records: BTreeMap::new(),
                });
            series.records.insert(
                (row.year, row.month),
                MonthlyRecord {
                    year: row.year,
                    month: row.month,
                    irradiance_kwh_m2_day: row.irradiance_kwh_m2_day,
                    sunshine_hours: row.sunshine_hours,
                    temperature_c: row.temperature_c,
                },
            );
        }

        let mut locations = Vec::with_capacity(grouped.len());
        for (_, series) in grouped {
            let missing = series.missing_months();
            if missing.is_empty() {
                locations.push(series);
            } else {
                let err = DataError::IncompleteSeries {
                    location: series.name.clone(),
                    reason: format!("no records for months {:?}", missing),
                };
                tracing::warn!(error = %err, "Skipping location");
            }
        }

        if locations.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let index = locations
            .iter()
            .enumerate()
            .map(|(i, s)| (normalize_location(&s.name), i))
            .collect();
        let national_average = national_average(&locations);

        tracing::info!(
            locations = locations.len(),
            default_location = default_location,
            "Weather dataset loaded"
        );

        Ok(Self {
            locations,
            index,
            national_average,
            default_location: default_location.to_string(),
        })
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn locations(&self) -> Vec<LocationInfo> {
        self.locations
            .iter()
            .map(|s| LocationInfo {
                name: s.name.clone(),
                latitude: s.latitude,
                longitude: s.longitude,
                years: s.years(),
            })
            .collect()
    }

    /// Exact lookup after normalization and aliasing
    pub fn find(&self, location: &str) -> DataResult<&LocationSeries> {
        let key = canonical_key(location);
        self.index
            .get(&key)
            .map(|i| &self.locations[*i])
            .ok_or_else(|| DataError::LocationNotFound {
                location: location.to_string(),
            })
    }

    /// Match a location, falling back to the default location and then to the national average
    pub fn resolve(&self, location: &str) -> ResolvedLocation<'_> {
        match self.find(location) {
            Ok(series) => ResolvedLocation {
                series,
                approximate: false,
            },
            Err(err) => {
                let series = self
                    .find(&self.default_location)
                    .unwrap_or(&self.national_average);
                crate::logging::log_location_fallback(location, &series.name, &err.to_string());
                ResolvedLocation {
                    series,
                    approximate: true,
                }
            }
        }
    }

    pub fn summary(&self, location: &str, latest_window: usize, latest_weight: f64) -> WeatherSummary {
        let resolved = self.resolve(location);
        let series = resolved.series;
        WeatherSummary {
            requested_location: location.to_string(),
            resolved_location: series.name.clone(),
            approximate: resolved.approximate,
            latitude: series.latitude,
            longitude: series.longitude,
            years: series.years(),
            monthly_records: series.records().cloned().collect(),
            mode_averages: ModeAverages {
                latest: series.latest(latest_window),
                historical: series.historical(),
                hybrid: series.hybrid(latest_window, latest_weight),
            },
        }
    }
}

fn national_average(locations: &[LocationSeries]) -> LocationSeries {
    let mut sums: BTreeMap<(i32, u32), (f64, f64, f64, usize)> = BTreeMap::new();
    for series in locations {
        for record in series.records.values() {
            let entry = sums.entry((record.year, record.month)).or_insert((0.0, 0.0, 0.0, 0));
            entry.0 += record.irradiance_kwh_m2_day;
            entry.1 += record.sunshine_hours;
            entry.2 += record.temperature_c;
            entry.3 += 1;
        }
    }

    let records = sums
        .into_iter()
        .map(|((year, month), (irr, sun, temp, n))| {
            let n = n as f64;
            (
                (year, month),
                MonthlyRecord {
                    year,
                    month,
                    irradiance_kwh_m2_day: irr / n,
                    sunshine_hours: sun / n,
                    temperature_c: temp / n,
                },
            )
        })
        .collect();

    let count = locations.len().max(1) as f64;
    LocationSeries {
        name: NATIONAL_AVERAGE.to_string(),
        latitude: locations.iter().map(|s| s.latitude).sum::<f64>() / count,
        longitude: locations.iter().map(|s| s.longitude).sum::<f64>() / count,
        records,
    }
}

/// Lower-case, trim, collapse whitespace and transliterate German characters
pub fn normalize_location(location: &str) -> String {
    let mut out = String::with_capacity(location.len());
    for c in location.trim().chars().flat_map(char::to_lowercase) {
        match c {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'ß' => out.push_str("ss"),
            c => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn canonical_key(location: &str) -> String {
    let normalized = normalize_location(location);
    let alias = match normalized.as_str() {
        "muenchen" => Some("munich"),
        "koeln" => Some("cologne"),
        "frankfurt am main" => Some("frankfurt"),
        "duesseldorf" => Some("dusseldorf"),
        _ => None,
    };
    alias.map(str::to_string).unwrap_or(normalized)
}
