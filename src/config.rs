use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, env, num::NonZeroUsize, thread};

use crate::{
    errors::{CompositeError, Result},
    merge::Statistic,
};

/// Overrides [NdviConfig::max_workers].
pub const MAX_WORKERS_ENV: &str = "SENTINEL2_NDVI_MAX_PROCESSES";

/// Half the available processing units, since every worker holds several
/// full resolution bands in memory.
fn default_max_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .map(|count| (count / 2).max(1))
        .unwrap_or(1)
}

fn default_statistics() -> BTreeSet<Statistic> {
    Statistic::ALL.into_iter().collect()
}

fn default_resolution() -> f64 {
    10.
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdviConfig {
    /// Datatakes built concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Composites built when a request does not name any.
    #[serde(default = "default_statistics")]
    pub statistics: BTreeSet<Statistic>,
    /// NDVI pixel size, in metres.
    #[serde(default = "default_resolution")]
    pub resolution: f64,
}

impl Default for NdviConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            statistics: default_statistics(),
            resolution: default_resolution(),
        }
    }
}

impl NdviConfig {
    /// Defaults, with `max_workers` from [MAX_WORKERS_ENV] when set.
    pub fn from_env() -> Result<Self> {
        Self::default().with_max_workers_from(env::var(MAX_WORKERS_ENV).ok().as_deref())
    }

    fn with_max_workers_from(mut self, value: Option<&str>) -> Result<Self> {
        if let Some(value) = value {
            self.max_workers = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|workers| *workers > 0)
                .ok_or_else(|| {
                    CompositeError::InvalidConfig(format!("{MAX_WORKERS_ENV}={value}"))
                })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(CompositeError::InvalidConfig(
                "max_workers must be at least 1".into(),
            ));
        }
        if !(self.resolution.is_finite() && self.resolution > 0.) {
            return Err(CompositeError::InvalidConfig(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults() {
        let config = NdviConfig::default();
        assert!(config.max_workers >= 1);
        assert_eq!(config.statistics.len(), 4);
        assert_eq!(config.resolution, 10.);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(None, Some(NdviConfig::default().max_workers))]
    #[case(Some("3"), Some(3))]
    #[case(Some(" 8\n"), Some(8))]
    #[case(Some("0"), None)]
    #[case(Some("many"), None)]
    fn max_workers_override(#[case] value: Option<&str>, #[case] expected: Option<usize>) {
        let config = NdviConfig::default().with_max_workers_from(value);
        match expected {
            Some(workers) => assert_eq!(config.unwrap().max_workers, workers),
            None => assert!(matches!(config, Err(CompositeError::InvalidConfig(_)))),
        }
    }

    #[rstest]
    fn rejects_non_positive_resolution() {
        let config = NdviConfig {
            resolution: 0.,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
