// src/model/lead_time.rs

use std::fmt::Debug;

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::rng::stream_rng;

/// A source of transit times (in periods) for one route.
///
/// Any distribution plugs in; the engine only ever calls `sample`.
pub trait LeadTimeSampler: Debug + Send + Sync {
    fn sample(&mut self) -> u32;
}

/// The same lead time on every draw.
#[derive(Debug, Clone, Copy)]
pub struct DeterministicLeadTime(pub u32);

impl LeadTimeSampler for DeterministicLeadTime {
    fn sample(&mut self) -> u32 {
        self.0
    }
}

/// A normal draw rounded to the nearest period and clamped at 0.
#[derive(Debug, Clone)]
pub struct NormalIntLeadTime {
    normal: Normal<f64>,
    rng: StdRng,
}

impl NormalIntLeadTime {
    /// Fails unless `mean` is finite and `std_dev` is finite and `>= 0`.
    pub fn new(mean: f64, std_dev: f64, rng: StdRng) -> Result<Self> {
        if !mean.is_finite() || !(std_dev >= 0.0 && std_dev.is_finite()) {
            return Err(ConfigError::InvalidLeadTime(format!(
                "normal_int(mean={mean}, std={std_dev}): mean must be finite and std non-negative"
            )));
        }
        let normal = Normal::new(mean, std_dev).map_err(|e| {
            ConfigError::InvalidLeadTime(format!("normal_int(mean={mean}, std={std_dev}): {e}"))
        })?;
        Ok(Self { normal, rng })
    }
}

impl LeadTimeSampler for NormalIntLeadTime {
    fn sample(&mut self) -> u32 {
        let val = self.normal.sample(&mut self.rng).round();
        if val < 0.0 {
            0
        } else {
            val as u32
        }
    }
}

/// Lead-time description as found on an edge.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeadTimeSpec {
    Deterministic {
        value: u32,
    },
    NormalInt {
        mean: f64,
        std: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl LeadTimeSpec {
    /// `label` names the stream for seed derivation when `seed` is unset.
    pub fn build(&self, top_level_seed: Option<u64>, label: &str) -> Result<Box<dyn LeadTimeSampler>> {
        match *self {
            LeadTimeSpec::Deterministic { value } => Ok(Box::new(DeterministicLeadTime(value))),
            LeadTimeSpec::NormalInt { mean, std, seed } => {
                let rng = stream_rng(seed, top_level_seed, label);
                Ok(Box::new(NormalIntLeadTime::new(mean, std, rng)?))
            }
        }
    }

    /// The expected lead time, used as the nominal lead time of a route.
    pub fn nominal(&self) -> u32 {
        match *self {
            LeadTimeSpec::Deterministic { value } => value,
            LeadTimeSpec::NormalInt { mean, .. } => mean.round().max(0.0) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn normal_int_is_clamped_and_reproducible() {
        let spec = LeadTimeSpec::NormalInt {
            mean: 0.5,
            std: 3.0,
            seed: Some(11),
        };
        let mut a = spec.build(None, "a").unwrap();
        let mut b = spec.build(None, "b").unwrap();
        let xs: Vec<u32> = (0..50).map(|_| a.sample()).collect();
        let ys: Vec<u32> = (0..50).map(|_| b.sample()).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().any(|&x| x == 0));
    }

    #[test]
    fn negative_std_is_rejected() {
        let err = NormalIntLeadTime::new(2.0, -1.0, StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLeadTime(_)));
    }

    #[test]
    fn non_finite_parameters_are_rejected() {
        for (mean, std) in [(f64::NAN, 1.0), (2.0, f64::NAN), (f64::INFINITY, 0.0)] {
            let err = NormalIntLeadTime::new(mean, std, StdRng::seed_from_u64(1)).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidLeadTime(_)));
        }
        // Zero spread is a valid, deterministic distribution.
        let mut lt = NormalIntLeadTime::new(2.0, 0.0, StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(lt.sample(), 2);
    }

    #[test]
    fn negative_std_in_description_is_a_config_error() {
        let spec: LeadTimeSpec =
            serde_json::from_str(r#"{"type": "normal_int", "mean": 2.0, "std": -1.0}"#).unwrap();
        assert!(matches!(
            spec.build(Some(3), "lead_time:W->R#0"),
            Err(ConfigError::InvalidLeadTime(_))
        ));
    }

    #[test]
    fn spec_parses() {
        let spec: LeadTimeSpec =
            serde_json::from_str(r#"{"type": "deterministic", "value": 3}"#).unwrap();
        assert_eq!(spec.nominal(), 3);
        assert_eq!(spec.build(None, "x").unwrap().sample(), 3);
    }
}
