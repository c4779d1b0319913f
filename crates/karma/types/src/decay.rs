use chrono::Duration;
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Time-based decay curve applied to tier balances.
///
/// The curve is a policy parameter: deployments pick the shape and rate in
/// configuration, the ledger only supplies the elapsed time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecayPolicy {
    /// Balances never decay.
    None,
    /// Exponential decay: the amount halves every `half_life_days`.
    HalfLife { half_life_days: f64 },
    /// Linear decay: `units_per_day` is removed per elapsed day.
    Linear { units_per_day: f64 },
}

impl DecayPolicy {
    /// Amount remaining after `elapsed`. Never negative; a non-positive
    /// elapsed span leaves the amount untouched.
    pub fn decay(&self, amount: f64, elapsed: Duration) -> f64 {
        let days = elapsed.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
        if days <= 0.0 {
            return amount;
        }
        let remaining = match self {
            DecayPolicy::None => amount,
            DecayPolicy::HalfLife { half_life_days } => {
                if *half_life_days <= 0.0 {
                    return amount;
                }
                amount * 0.5_f64.powf(days / half_life_days)
            }
            DecayPolicy::Linear { units_per_day } => amount - units_per_day * days,
        };
        remaining.max(0.0)
    }

    pub fn is_valid(&self) -> bool {
        match self {
            DecayPolicy::None => true,
            DecayPolicy::HalfLife { half_life_days } => {
                half_life_days.is_finite() && *half_life_days > 0.0
            }
            DecayPolicy::Linear { units_per_day } => {
                units_per_day.is_finite() && *units_per_day >= 0.0
            }
        }
    }
}

impl Default for DecayPolicy {
    fn default() -> Self {
        DecayPolicy::HalfLife {
            half_life_days: 30.0,
        }
    }
}
