//! Batch simulation configuration — ranker fan-out and policy injection.

use serde::{Deserialize, Serialize};

/// Settings for vaccination-ranking batches.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RankerConfig {
    /// Worker count for parallel execution. Default: available parallelism.
    pub workers: Option<usize>,
    /// Candidates folded into one engine call in grouped execution.
    /// Default: 100.
    pub group_size: Option<usize>,
}

impl RankerConfig {
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn effective_group_size(&self) -> usize {
        self.group_size.unwrap_or(100)
    }
}

/// Settings for capacity-injection policy simulations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Synthetic daily commit rate for the daily-rate injection model.
    /// Default: 1.0.
    pub daily_rate: Option<f64>,
    /// Days spanned by the observation window. Default: 365.
    pub window_days: Option<f64>,
}

impl PolicyConfig {
    pub fn effective_daily_rate(&self) -> f64 {
        self.daily_rate.unwrap_or(1.0)
    }

    pub fn effective_window_days(&self) -> f64 {
        self.window_days.unwrap_or(365.0)
    }
}
