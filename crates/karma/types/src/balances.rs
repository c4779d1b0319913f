//! Token families, tiers, and the typed balances document.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;

// ── Tier ─────────────────────────────────────────────────────────────

/// Severity tier name within a token family (e.g. `minor`, `medium`, `maha`).
///
/// The valid tier set is configured per family; see `config::TierConfig`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(pub String);

impl Tier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Tier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Token family ─────────────────────────────────────────────────────

/// The two tiered token families of the dual ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenFamily {
    /// Merit tokens.
    #[serde(rename = "PunyaTokens")]
    Punya,
    /// Demerit tokens.
    #[serde(rename = "PaapTokens")]
    Paap,
}

impl std::fmt::Display for TokenFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenFamily::Punya => write!(f, "PunyaTokens"),
            TokenFamily::Paap => write!(f, "PaapTokens"),
        }
    }
}

// ── Reward target ────────────────────────────────────────────────────

/// Token credited by a reward (action reward or atonement reward).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "token")]
pub enum RewardTarget {
    DharmaPoints,
    SevaPoints,
    PunyaTokens { tier: Tier },
}

impl std::fmt::Display for RewardTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewardTarget::DharmaPoints => write!(f, "DharmaPoints"),
            RewardTarget::SevaPoints => write!(f, "SevaPoints"),
            RewardTarget::PunyaTokens { tier } => write!(f, "PunyaTokens.{}", tier),
        }
    }
}

// ── Tier balances ────────────────────────────────────────────────────

/// Per-tier amounts of one token family. Missing tiers read as zero.
///
/// Amounts are never negative: debits floor at zero, and documents carrying
/// a negative or non-finite amount are rejected at deserialization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TierBalancesRepr")]
pub struct TierBalances(BTreeMap<Tier, f64>);

/// Stored shapes accepted for a token family. Pre-tier documents stored the
/// family as a single number; that amount is read into the `minor` tier.
#[derive(Deserialize)]
#[serde(untagged)]
enum TierBalancesRepr {
    Tiers(BTreeMap<Tier, f64>),
    Legacy(f64),
}

impl TryFrom<TierBalancesRepr> for TierBalances {
    type Error = String;

    fn try_from(value: TierBalancesRepr) -> Result<Self, Self::Error> {
        match value {
            TierBalancesRepr::Tiers(tiers) => {
                for (tier, amount) in &tiers {
                    if !amount.is_finite() || *amount < 0.0 {
                        return Err(format!("tier {} has invalid amount {}", tier, amount));
                    }
                }
                Ok(Self(tiers))
            }
            TierBalancesRepr::Legacy(amount) => {
                if !amount.is_finite() {
                    return Err(format!("legacy token amount {} is not finite", amount));
                }
                let mut tiers = BTreeMap::new();
                if amount > 0.0 {
                    tiers.insert(Tier::new("minor"), amount);
                }
                Ok(Self(tiers))
            }
        }
    }
}

impl TierBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount held in `tier`, zero when absent.
    pub fn get(&self, tier: &str) -> f64 {
        self.0.get(tier).copied().unwrap_or(0.0)
    }

    /// Insert or overwrite a tier amount, clamped to zero.
    pub fn set(&mut self, tier: Tier, amount: f64) {
        self.0.insert(tier, amount.max(0.0));
    }

    /// Add to a tier (initialising it to zero first). Returns the new amount.
    pub fn credit(&mut self, tier: &Tier, amount: f64) -> f64 {
        let slot = self.0.entry(tier.clone()).or_insert(0.0);
        *slot = (*slot + amount).max(0.0);
        *slot
    }

    /// Subtract from a tier, floored at zero. Returns the new amount.
    pub fn debit(&mut self, tier: &Tier, amount: f64) -> f64 {
        let slot = self.0.entry(tier.clone()).or_insert(0.0);
        *slot = (*slot - amount).max(0.0);
        *slot
    }

    /// Rewrite every tier through `f`, then drop tiers below `epsilon`.
    pub fn map_amounts(&mut self, epsilon: f64, mut f: impl FnMut(f64) -> f64) {
        for amount in self.0.values_mut() {
            *amount = f(*amount).max(0.0);
        }
        self.0.retain(|_, amount| *amount >= epsilon);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tier, f64)> {
        self.0.iter().map(|(tier, amount)| (tier, *amount))
    }

    pub fn tiers(&self) -> impl Iterator<Item = &Tier> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, f64); N]> for TierBalances {
    fn from(entries: [(&str, f64); N]) -> Self {
        let mut balances = TierBalances::new();
        for (tier, amount) in entries {
            balances.set(Tier::new(tier), amount);
        }
        balances
    }
}

// ── Balances document ────────────────────────────────────────────────

/// A user's full balance sheet: two scalar point accumulators and the two
/// tiered token families. Absent families deserialize as empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    #[serde(rename = "DharmaPoints", default)]
    pub dharma_points: f64,
    #[serde(rename = "SevaPoints", default)]
    pub seva_points: f64,
    #[serde(rename = "PunyaTokens", default)]
    pub punya_tokens: TierBalances,
    #[serde(rename = "PaapTokens", default)]
    pub paap_tokens: TierBalances,
}

impl Balances {
    pub fn family(&self, family: TokenFamily) -> &TierBalances {
        match family {
            TokenFamily::Punya => &self.punya_tokens,
            TokenFamily::Paap => &self.paap_tokens,
        }
    }

    pub fn family_mut(&mut self, family: TokenFamily) -> &mut TierBalances {
        match family {
            TokenFamily::Punya => &mut self.punya_tokens,
            TokenFamily::Paap => &mut self.paap_tokens,
        }
    }

    /// Credit a reward to its target. Scalar accumulators take signed
    /// amounts as-is; Punya tiers stay floored at zero.
    pub fn credit_reward(&mut self, target: &RewardTarget, amount: f64) {
        match target {
            RewardTarget::DharmaPoints => self.dharma_points += amount,
            RewardTarget::SevaPoints => self.seva_points += amount,
            RewardTarget::PunyaTokens { tier } => {
                self.punya_tokens.credit(tier, amount);
            }
        }
    }

    /// Fraction `rate` of every balance, dropping tiers that fall below `epsilon`.
    pub fn retained(&self, rate: f64, epsilon: f64) -> Balances {
        let mut next = self.clone();
        next.dharma_points *= rate;
        next.seva_points *= rate;
        next.punya_tokens.map_amounts(epsilon, |amount| amount * rate);
        next.paap_tokens.map_amounts(epsilon, |amount| amount * rate);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tiers_read_as_zero() {
        let tiers = TierBalances::from([("minor", 5.0)]);
        assert_eq!(tiers.get("minor"), 5.0);
        assert_eq!(tiers.get("maha"), 0.0);
    }

    #[test]
    fn debit_floors_at_zero() {
        let mut tiers = TierBalances::from([("medium", 2.0)]);
        assert_eq!(tiers.debit(&Tier::new("medium"), 5.0), 0.0);
        assert_eq!(tiers.debit(&Tier::new("maha"), 1.0), 0.0);
        assert_eq!(tiers.get("maha"), 0.0);
    }

    #[test]
    fn map_amounts_prunes_below_epsilon() {
        let mut tiers = TierBalances::from([("minor", 0.015), ("medium", 3.0)]);
        tiers.map_amounts(0.01, |amount| amount * 0.5);
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers.get("medium"), 1.5);
    }

    #[test]
    fn legacy_scalar_family_loads_as_minor_tier() {
        let json = r#"{"DharmaPoints": 10, "PaapTokens": 4.0}"#;
        let balances: Balances = serde_json::from_str(json).unwrap();
        assert_eq!(balances.paap_tokens.get("minor"), 4.0);
        assert!(balances.punya_tokens.is_empty());
        assert_eq!(balances.seva_points, 0.0);
    }

    #[test]
    fn negative_tier_amounts_are_rejected() {
        let json = r#"{"PaapTokens": {"minor": -1.0}}"#;
        assert!(serde_json::from_str::<Balances>(json).is_err());
    }

    #[test]
    fn reward_targets_round_trip_with_token_tag() {
        let target = RewardTarget::PunyaTokens {
            tier: Tier::new("major"),
        };
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, r#"{"token":"PunyaTokens","tier":"major"}"#);
        let back: RewardTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(back, target);
    }

    #[test]
    fn retained_scales_every_balance() {
        let balances = Balances {
            dharma_points: 100.0,
            seva_points: 40.0,
            punya_tokens: TierBalances::from([("minor", 20.0)]),
            paap_tokens: TierBalances::from([("minor", 4.0), ("maha", 0.02)]),
        };
        let next = balances.retained(0.25, 0.01);
        assert_eq!(next.dharma_points, 25.0);
        assert_eq!(next.seva_points, 10.0);
        assert_eq!(next.punya_tokens.get("minor"), 5.0);
        assert_eq!(next.paap_tokens.get("minor"), 1.0);
        assert!(next.paap_tokens.tiers().all(|tier| tier.as_str() != "maha"));
    }
}
