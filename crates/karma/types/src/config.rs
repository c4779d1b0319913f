//! Configuration for the KarmaChain engine.
//!
//! Every table the engine consults lives here: the ordered role sequence,
//! action classification, tier multipliers, remediation templates, reward
//! mappings, learning hyperparameters, decay policy, and lifecycle transition
//! settings. Defaults are the shipped tables; a TOML file may override any
//! section.

use crate::{DecayPolicy, ProgressMap, RewardTarget, Role, Tier, TokenFamily};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KarmaConfig {
    pub roles: RoleConfig,
    pub classification: ClassificationConfig,
    pub tiers: TierConfig,
    pub remediation: RemediationConfig,
    pub rewards: RewardConfig,
    pub learning: LearningConfig,
    pub decay: DecayConfig,
    pub transition: TransitionConfig,
}

impl KarmaConfig {
    /// Load configuration from a TOML file. A missing file (or no path)
    /// yields the shipped defaults. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            _ => KarmaConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate inline TOML.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: KarmaConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Ordered role names (value-table rows).
    pub fn role_names(&self) -> Vec<Role> {
        self.roles.sequence.iter().map(|t| t.role.clone()).collect()
    }

    /// Ordered action names (value-table columns).
    pub fn action_names(&self) -> Vec<String> {
        self.rewards.actions.iter().map(|a| a.action.clone()).collect()
    }

    pub fn action_reward(&self, action: &str) -> Option<&ActionReward> {
        self.rewards.actions.iter().find(|a| a.action == action)
    }

    /// Check cross-table consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.roles.validate()?;
        self.tiers.validate()?;

        let paap = &self.tiers.paap;
        for (action, tier) in &self.classification.paap_actions {
            if !paap.contains_key(tier) {
                return invalid(format!(
                    "action {} classifies into unknown Paap tier {}",
                    action, tier
                ));
            }
            if !self.remediation.templates.contains_key(tier) {
                return invalid(format!("no remediation template for Paap tier {}", tier));
            }
        }

        for (tier, template) in &self.remediation.templates {
            if !paap.contains_key(tier) {
                return invalid(format!("remediation template for unknown tier {}", tier));
            }
            if template.is_empty() {
                return invalid(format!("remediation template {} has no categories", tier));
            }
            if let Some((category, units)) = template.iter().find(|(_, u)| !(**u > 0.0)) {
                return invalid(format!(
                    "remediation template {} requires non-positive {} units of {}",
                    tier, units, category
                ));
            }
        }

        let mut seen = HashSet::new();
        for reward in &self.rewards.actions {
            if !seen.insert(reward.action.as_str()) {
                return invalid(format!("duplicate action {}", reward.action));
            }
            self.check_target(&reward.target)?;
        }
        for (tier, reward) in &self.rewards.atonement {
            if !paap.contains_key(tier) {
                return invalid(format!("atonement reward for unknown tier {}", tier));
            }
            self.check_target(&reward.target)?;
        }
        if self.action_reward(&self.rewards.atonement_action).is_none() {
            return invalid(format!(
                "atonement action {} is not a configured action",
                self.rewards.atonement_action
            ));
        }

        self.learning.validate()?;
        if !self.decay.policy.is_valid() {
            return invalid("decay policy has a non-positive rate".to_string());
        }
        if !(self.decay.expiry_epsilon >= 0.0) {
            return invalid("expiry epsilon must be non-negative".to_string());
        }
        self.transition.validate()
    }

    fn check_target(&self, target: &RewardTarget) -> Result<(), ConfigError> {
        if let RewardTarget::PunyaTokens { tier } = target {
            if !self.tiers.punya.contains_key(tier) {
                return invalid(format!("reward targets unknown Punya tier {}", tier));
            }
        }
        Ok(())
    }
}

fn invalid<T>(message: String) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid(message))
}

fn entries<V: Clone>(items: &[(&str, V)]) -> BTreeMap<Tier, V> {
    items
        .iter()
        .map(|(name, value)| (Tier::new(*name), value.clone()))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════
// ROLES
// ═══════════════════════════════════════════════════════════════════

/// One rung of the ordered role sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleThreshold {
    pub role: Role,
    pub min_merit: f64,
}

/// Weights of the merit score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeritWeights {
    pub dharma: f64,
    pub seva: f64,
    pub punya: f64,
}

impl Default for MeritWeights {
    fn default() -> Self {
        Self {
            dharma: 1.0,
            seva: 1.2,
            punya: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    /// Ascending by `min_merit`; the first role is the fallback state.
    pub sequence: Vec<RoleThreshold>,
    pub merit_weights: MeritWeights,
}

impl Default for RoleConfig {
    fn default() -> Self {
        let rung = |role: &str, min_merit: f64| RoleThreshold {
            role: Role::new(role),
            min_merit,
        };
        Self {
            sequence: vec![
                rung("learner", 0.0),
                rung("volunteer", 50.0),
                rung("mentor", 150.0),
                rung("guru", 400.0),
            ],
            merit_weights: MeritWeights::default(),
        }
    }
}

impl RoleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence.is_empty() {
            return invalid("role sequence is empty".to_string());
        }
        let mut seen = HashSet::new();
        for rung in &self.sequence {
            if !seen.insert(rung.role.as_str()) {
                return invalid(format!("duplicate role {}", rung.role));
            }
            if !rung.min_merit.is_finite() {
                return invalid(format!("role {} has a non-finite threshold", rung.role));
            }
        }
        if self
            .sequence
            .windows(2)
            .any(|pair| pair[1].min_merit <= pair[0].min_merit)
        {
            return invalid("role thresholds must be strictly ascending".to_string());
        }
        Ok(())
    }

    pub fn contains(&self, role: &str) -> bool {
        self.sequence.iter().any(|rung| rung.role.as_str() == role)
    }
}

// ═══════════════════════════════════════════════════════════════════
// CLASSIFICATION AND TIERS
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Action name → Paap severity tier.
    pub paap_actions: BTreeMap<String, Tier>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        let table = [
            ("false_speech", "minor"),
            ("gossip", "minor"),
            ("laziness", "minor"),
            ("cheat", "medium"),
            ("disrespect_guru", "medium"),
            ("break_promise", "medium"),
            ("harm_others", "maha"),
            ("theft", "maha"),
            ("violence", "maha"),
        ];
        Self {
            paap_actions: table
                .iter()
                .map(|(action, tier)| (action.to_string(), Tier::new(*tier)))
                .collect(),
        }
    }
}

/// Per-family tier multipliers. The key set is the family's tier set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub paap: BTreeMap<Tier, f64>,
    pub punya: BTreeMap<Tier, f64>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            paap: entries(&[("minor", 1.0), ("medium", 3.0), ("maha", 7.0)]),
            punya: entries(&[("minor", 1.0), ("medium", 3.0), ("major", 7.0)]),
        }
    }
}

impl TierConfig {
    pub fn multipliers(&self, family: TokenFamily) -> &BTreeMap<Tier, f64> {
        match family {
            TokenFamily::Paap => &self.paap,
            TokenFamily::Punya => &self.punya,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for family in [TokenFamily::Paap, TokenFamily::Punya] {
            let table = self.multipliers(family);
            if table.is_empty() {
                return invalid(format!("{} has no tiers", family));
            }
            if let Some((tier, weight)) = table.iter().find(|(_, w)| !(**w > 0.0)) {
                return invalid(format!(
                    "{} tier {} has non-positive multiplier {}",
                    family, tier, weight
                ));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════
// REMEDIATION
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    /// Paap tier → category requirements of the prescribed plan.
    pub templates: BTreeMap<Tier, ProgressMap>,
    /// Upper bound on an attached proof file.
    pub max_attachment_bytes: usize,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        let template = |items: &[(&str, f64)]| -> ProgressMap {
            items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        Self {
            templates: [
                ("minor", template(&[("Jap", 54.0), ("Bhakti", 1.0)])),
                (
                    "medium",
                    template(&[("Jap", 108.0), ("Tap", 3.0), ("Bhakti", 1.0), ("Daan", 0.05)]),
                ),
                (
                    "maha",
                    template(&[("Jap", 1008.0), ("Tap", 7.0), ("Bhakti", 3.0), ("Daan", 0.5)]),
                ),
            ]
            .into_iter()
            .map(|(tier, template)| (Tier::new(tier), template))
            .collect(),
            max_attachment_bytes: 1024 * 1024,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// REWARDS
// ═══════════════════════════════════════════════════════════════════

/// Reward for a named action; also defines a value-table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReward {
    pub action: String,
    pub value: f64,
    pub target: RewardTarget,
}

/// Reward granted when an atonement plan of a given severity completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtonementReward {
    pub value: f64,
    pub target: RewardTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Ordered: the position of an action is its value-table column.
    pub actions: Vec<ActionReward>,
    pub atonement: BTreeMap<Tier, AtonementReward>,
    /// Positive action credited in the value table on atonement completion.
    pub atonement_action: String,
}

impl Default for RewardConfig {
    fn default() -> Self {
        let reward = |action: &str, value: f64, target: RewardTarget| ActionReward {
            action: action.to_string(),
            value,
            target,
        };
        let punya = |tier: &str| RewardTarget::PunyaTokens {
            tier: Tier::new(tier),
        };
        use RewardTarget::{DharmaPoints, SevaPoints};

        Self {
            actions: vec![
                reward("completing_lessons", 5.0, DharmaPoints),
                reward("helping_peers", 3.0, SevaPoints),
                reward("solving_doubts", 2.0, punya("minor")),
                reward("selfless_service", 1.0, punya("medium")),
                reward("false_speech", -2.0, DharmaPoints),
                reward("gossip", -1.0, DharmaPoints),
                reward("laziness", -1.0, DharmaPoints),
                reward("cheat", -5.0, DharmaPoints),
                reward("disrespect_guru", -5.0, DharmaPoints),
                reward("break_promise", -4.0, DharmaPoints),
                reward("harm_others", -10.0, DharmaPoints),
                reward("theft", -10.0, DharmaPoints),
                reward("violence", -15.0, DharmaPoints),
            ],
            atonement: [
                ("minor", 5.0, SevaPoints),
                ("medium", 10.0, SevaPoints),
                ("maha", 25.0, DharmaPoints),
            ]
            .into_iter()
            .map(|(tier, value, target)| (Tier::new(tier), AtonementReward { value, target }))
            .collect(),
            atonement_action: "helping_peers".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// LEARNING, DECAY, TRANSITION
// ═══════════════════════════════════════════════════════════════════

/// Temporal-difference hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub learning_rate: f64,
    pub discount: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount: 0.9,
        }
    }
}

impl LearningConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid(format!("learning rate {} outside (0, 1]", self.learning_rate));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return invalid(format!("discount {} outside [0, 1]", self.discount));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub policy: DecayPolicy,
    /// Tiers below this amount after decay are removed.
    pub expiry_epsilon: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            policy: DecayPolicy::default(),
            expiry_epsilon: 0.01,
        }
    }
}

/// A realm bucket. Bands are ordered by descending floor; the last band
/// has no floor and catches everything below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealmBand {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_net_karma: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub realms: Vec<RealmBand>,
    /// Fraction of every balance carried into the next lifecycle.
    pub retention_rate: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        let band = |name: &str, description: &str, floor: Option<f64>| RealmBand {
            name: name.to_string(),
            description: description.to_string(),
            min_net_karma: floor,
        };
        Self {
            realms: vec![
                band("Vaikuntha", "Liberated realm of the highest merit", Some(150.0)),
                band("Swarga", "Heavenly realm of reward for good deeds", Some(50.0)),
                band("Prithvi", "Human realm of balanced karma", Some(0.0)),
                band("Preta", "Realm of restless spirits for minor demerit", Some(-50.0)),
                band("Naraka", "Realm of purification for heavy demerit", None),
            ],
            retention_rate: 0.25,
        }
    }
}

impl TransitionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let Some((floor, bounded)) = self.realms.split_last() else {
            return invalid("no realms configured".to_string());
        };
        if floor.min_net_karma.is_some() {
            return invalid(format!("last realm {} must have no floor", floor.name));
        }
        let mut previous = f64::INFINITY;
        for band in bounded {
            match band.min_net_karma {
                Some(min) if min.is_finite() && min < previous => previous = min,
                _ => {
                    return invalid(format!(
                        "realm {} must have a finite floor below the band above it",
                        band.name
                    ))
                }
            }
        }
        if !(0.0..=1.0).contains(&self.retention_rate) {
            return invalid(format!("retention rate {} outside [0, 1]", self.retention_rate));
        }
        Ok(())
    }
}
