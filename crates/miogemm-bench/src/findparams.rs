//! Configuration of a find run.

use serde::{Deserialize, Serialize};

use miogemm_core::Ver;

/// Statistic used to compare candidates across their timed iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummStat {
    /// Arithmetic mean of the timed iterations.
    Mean,
    /// Median (default).
    Median,
    /// Worst observed iteration.
    Max,
}

impl SummStat {
    /// Reduces per-iteration times (milliseconds) to the summary value.
    /// Empty input yields infinity so a failed candidate never wins.
    pub fn reduce(self, times_ms: &[f64]) -> f64 {
        if times_ms.is_empty() {
            return f64::INFINITY;
        }
        match self {
            SummStat::Mean => times_ms.iter().sum::<f64>() / times_ms.len() as f64,
            SummStat::Median => {
                let mut sorted = times_ms.to_vec();
                sorted.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 1 {
                    sorted[mid]
                } else {
                    0.5 * (sorted[mid - 1] + sorted[mid])
                }
            }
            SummStat::Max => times_ms.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Recognized options of a find run, deserializable with defaults so a
/// partial YAML or JSON document configures only what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindParams {
    /// Statistic used to compare candidates.
    #[serde(default = "default_sum_stat")]
    pub sum_stat: SummStat,
    /// Timed iterations per candidate; `None` picks the adaptive count from
    /// the problem size.
    #[serde(default)]
    pub n_runs_per_bench: Option<u32>,
    /// Reject candidates whose kernels accumulate through atomics.
    #[serde(default)]
    pub enforce_deterministic: bool,
    /// Restart from a fresh random start when a neighborhood is exhausted,
    /// instead of terminating.
    #[serde(default = "default_allow_restart")]
    pub allow_restart: bool,
    /// Required improvement in milliseconds before the best solution is
    /// replaced; 0 demands strict improvement.
    #[serde(default)]
    pub epsilon_ms: f64,
    /// Output verbosity.
    #[serde(default = "default_verbosity")]
    pub verbosity: Ver,
    /// Master PRNG seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_sum_stat() -> SummStat {
    SummStat::Median
}

fn default_allow_restart() -> bool {
    true
}

fn default_verbosity() -> Ver {
    Ver::Silent
}

fn default_seed() -> u64 {
    0x6D10_6E77_u64
}

impl Default for FindParams {
    fn default() -> Self {
        Self {
            sum_stat: default_sum_stat(),
            n_runs_per_bench: None,
            enforce_deterministic: false,
            allow_restart: default_allow_restart(),
            epsilon_ms: 0.0,
            verbosity: default_verbosity(),
            seed: default_seed(),
        }
    }
}
