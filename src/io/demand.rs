// src/io/demand.rs

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, Poisson};
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::rng::stream_rng;

/// Per-node customer demand, sampled once per period.
///
/// Samples may be negative (bad data); the retailer clips them.
pub trait DemandSource: Debug + Send + Sync {
    fn sample(&mut self, t: u32) -> i64;
}

/// The same demand every period.
#[derive(Debug, Clone, Copy)]
pub struct ConstantDemand(pub i64);

impl DemandSource for ConstantDemand {
    fn sample(&mut self, _t: u32) -> i64 {
        self.0
    }
}

/// Poisson-distributed demand with rate `lam`.
#[derive(Debug, Clone)]
pub struct PoissonDemand {
    poisson: Poisson<f64>,
    rng: StdRng,
}

impl PoissonDemand {
    /// `lam` must be strictly positive.
    pub fn new(lam: f64, rng: StdRng) -> Option<Self> {
        let poisson = Poisson::new(lam).ok()?;
        Some(Self { poisson, rng })
    }
}

impl DemandSource for PoissonDemand {
    fn sample(&mut self, _t: u32) -> i64 {
        self.poisson.sample(&mut self.rng) as i64
    }
}

/// What a series returns past the end of its data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    #[default]
    Zero,
    #[serde(alias = "ffill", alias = "forward_fill")]
    Last,
    Mean,
    Repeat,
}

/// A recorded demand series, one value per period from t = 0.
#[derive(Debug, Clone)]
pub struct SeriesDemand {
    values: Vec<i64>,
    fill: FillStrategy,
    mean: i64,
}

impl SeriesDemand {
    pub fn new(values: Vec<i64>, fill: FillStrategy) -> Self {
        let mean = if values.is_empty() {
            0
        } else {
            (values.iter().sum::<i64>() as f64 / values.len() as f64).round() as i64
        };
        Self { values, fill, mean }
    }
}

impl DemandSource for SeriesDemand {
    fn sample(&mut self, t: u32) -> i64 {
        let t = t as usize;
        if let Some(&v) = self.values.get(t) {
            return v;
        }
        match self.fill {
            FillStrategy::Zero => 0,
            FillStrategy::Last => self.values.last().copied().unwrap_or(0),
            FillStrategy::Mean => self.mean,
            FillStrategy::Repeat if !self.values.is_empty() => self.values[t % self.values.len()],
            FillStrategy::Repeat => 0,
        }
    }
}

/// Seasonal demand with an optional multiplicative trend and normal noise:
/// `initial * trend^t * factors[t % len] + noise`, rounded and floored at 0.
#[derive(Debug, Clone)]
pub struct SeasonalDemand {
    initial: f64,
    trend_factor: f64,
    seasonal_factors: Vec<f64>,
    noise: Option<Normal<f64>>,
    rng: StdRng,
}

impl SeasonalDemand {
    pub fn new(
        initial: f64,
        trend_factor: f64,
        seasonal_factors: Vec<f64>,
        noise_std: f64,
        rng: StdRng,
    ) -> std::result::Result<Self, String> {
        if seasonal_factors.is_empty() {
            return Err("seasonal_factors must not be empty".into());
        }
        let noise = if noise_std > 0.0 {
            Some(Normal::new(0.0, noise_std).map_err(|e| e.to_string())?)
        } else {
            None
        };
        Ok(Self {
            initial,
            trend_factor,
            seasonal_factors,
            noise,
            rng,
        })
    }
}

impl DemandSource for SeasonalDemand {
    fn sample(&mut self, t: u32) -> i64 {
        let trend = self.initial * self.trend_factor.powi(t as i32);
        let season = self.seasonal_factors[t as usize % self.seasonal_factors.len()];
        let mut val = trend * season;
        if let Some(noise) = &self.noise {
            val += noise.sample(&mut self.rng);
        }
        val.max(0.0).round() as i64
    }
}

/// Reads a demand series from a CSV file.
///
/// Rows are ordered by the date column (ISO dates sort correctly as text)
/// and rows sharing a date are summed, so one value maps to one period.
pub fn load_series_csv(path: &Path, date_col: &str, qty_col: &str) -> Result<Vec<i64>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| ConfigError::InvalidDemand {
                node: path.display().to_string(),
                reason: format!("missing column '{name}'"),
            })
    };
    let date_idx = column(date_col)?;
    let qty_idx = column(qty_col)?;

    let mut by_date: BTreeMap<String, f64> = BTreeMap::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let date = record.get(date_idx).unwrap_or_default().trim().to_string();
        let raw = record.get(qty_idx).unwrap_or_default().trim();
        let qty: f64 = raw.parse().map_err(|_| ConfigError::InvalidDemand {
            node: path.display().to_string(),
            reason: format!("row {}: '{raw}' is not a quantity", line + 2),
        })?;
        *by_date.entry(date).or_insert(0.0) += qty;
    }

    Ok(by_date.into_values().map(|q| q.round() as i64).collect())
}

/// Demand description as found in a network description.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DemandSpec {
    Deterministic {
        value: i64,
    },
    Poisson {
        lam: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
    Csv {
        path: PathBuf,
        #[serde(alias = "time_col")]
        date_col: String,
        #[serde(alias = "quantity_col")]
        qty_col: String,
        #[serde(default, alias = "fill_strategy")]
        strategy: FillStrategy,
    },
    Series {
        values: Vec<i64>,
        #[serde(default)]
        strategy: FillStrategy,
    },
    Seasonal {
        base_demand: f64,
        seasonal_factors: Vec<f64>,
        #[serde(default)]
        noise_std: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
    TrendSeasonal {
        initial_demand: f64,
        trend_factor: f64,
        seasonal_factors: Vec<f64>,
        #[serde(default)]
        noise_std: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl DemandSpec {
    /// Builds the source for `node`. Relative CSV paths resolve against
    /// `base_dir` when given.
    pub fn build(
        &self,
        node: &str,
        top_level_seed: Option<u64>,
        base_dir: Option<&Path>,
    ) -> Result<Box<dyn DemandSource>> {
        let invalid = |reason: String| ConfigError::InvalidDemand {
            node: node.to_string(),
            reason,
        };
        let label = format!("demand:{node}");

        let source: Box<dyn DemandSource> = match self {
            DemandSpec::Deterministic { value } => Box::new(ConstantDemand(*value)),
            DemandSpec::Poisson { lam, .. } if *lam == 0.0 => Box::new(ConstantDemand(0)),
            DemandSpec::Poisson { lam, seed } => {
                let rng = stream_rng(*seed, top_level_seed, &label);
                Box::new(
                    PoissonDemand::new(*lam, rng)
                        .ok_or_else(|| invalid(format!("poisson rate {lam} must be positive")))?,
                )
            }
            DemandSpec::Csv {
                path,
                date_col,
                qty_col,
                strategy,
            } => {
                let resolved = match base_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                let values = load_series_csv(&resolved, date_col, qty_col)?;
                Box::new(SeriesDemand::new(values, *strategy))
            }
            DemandSpec::Series { values, strategy } => {
                Box::new(SeriesDemand::new(values.clone(), *strategy))
            }
            DemandSpec::Seasonal {
                base_demand,
                seasonal_factors,
                noise_std,
                seed,
            } => {
                let rng = stream_rng(*seed, top_level_seed, &label);
                Box::new(
                    SeasonalDemand::new(*base_demand, 1.0, seasonal_factors.clone(), *noise_std, rng)
                        .map_err(invalid)?,
                )
            }
            DemandSpec::TrendSeasonal {
                initial_demand,
                trend_factor,
                seasonal_factors,
                noise_std,
                seed,
            } => {
                let rng = stream_rng(*seed, top_level_seed, &label);
                Box::new(
                    SeasonalDemand::new(
                        *initial_demand,
                        *trend_factor,
                        seasonal_factors.clone(),
                        *noise_std,
                        rng,
                    )
                    .map_err(invalid)?,
                )
            }
        };
        Ok(source)
    }
}
