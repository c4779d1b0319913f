//! Engine facade: wires the components over one storage handle and one
//! configuration, and hosts the request-level operations that span them.

use crate::classifier::ActionClassifier;
use crate::error::{KarmaError, KarmaResult};
use crate::ledger::TokenLedger;
use crate::remediation::RemediationWorkflow;
use crate::role::RoleEngine;
use crate::transition::TransitionEngine;
use chrono::{DateTime, Utc};
use karma_storage::KarmaStorage;
use karma_types::{
    Balances, KarmaConfig, PlanId, Role, Tier, TierBalances, TokenFamily, User, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Marker in an action note that opens an appeal right away.
pub const AUTO_APPEAL_MARKER: &str = "auto_appeal";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatus {
    pub user_id: UserId,
    pub role: Role,
    pub merit_score: f64,
    pub balances: Balances,
    pub paap_score: f64,
    pub punya_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReceipt {
    pub severity: Option<Tier>,
    pub paap_tokens: TierBalances,
    pub reward: f64,
    pub previous_role: Role,
    pub role: Role,
    /// Plan opened by an `auto_appeal` note.
    pub plan_id: Option<PlanId>,
}

pub struct KarmaEngine {
    storage: Arc<dyn KarmaStorage>,
    config: Arc<KarmaConfig>,
    classifier: ActionClassifier,
    ledger: TokenLedger,
    roles: Arc<RoleEngine>,
    remediation: RemediationWorkflow,
    transitions: TransitionEngine,
}

impl KarmaEngine {
    /// Validate `config` and restore the value table from `storage`.
    pub async fn new(storage: Arc<dyn KarmaStorage>, config: KarmaConfig) -> KarmaResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let roles = Arc::new(RoleEngine::load(storage.clone(), config.clone()).await?);

        info!(
            roles = config.roles.sequence.len(),
            actions = config.rewards.actions.len(),
            "karma engine ready"
        );
        Ok(Self {
            classifier: ActionClassifier::from_config(&config),
            ledger: TokenLedger::new(storage.clone(), config.clone()),
            remediation: RemediationWorkflow::new(storage.clone(), config.clone(), roles.clone()),
            transitions: TransitionEngine::new(storage.clone(), config.clone(), roles.clone()),
            roles,
            storage,
            config,
        })
    }

    pub fn config(&self) -> &KarmaConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ActionClassifier {
        &self.classifier
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn roles(&self) -> &RoleEngine {
        &self.roles
    }

    pub fn remediation(&self) -> &RemediationWorkflow {
        &self.remediation
    }

    pub fn transitions(&self) -> &TransitionEngine {
        &self.transitions
    }

    /// Create the user with empty balances unless they already exist.
    /// `None` starts them in the first configured role.
    pub async fn init_user(&self, user_id: &UserId, role: Option<&str>) -> KarmaResult<User> {
        let role = match role {
            Some(role) if self.config.roles.contains(role) => Role::new(role),
            Some(role) => {
                warn!(user = %user_id, role, "init rejected: unknown role");
                return Err(KarmaError::InvalidRole(role.to_string()));
            }
            None => self.roles.determine_role(f64::NEG_INFINITY),
        };

        let candidate = User::new(user_id.clone(), role, Utc::now());
        let user = self.storage.insert_user_if_absent(candidate).await?;
        info!(user = %user_id, role = %user.role, "user initialised");
        Ok(user)
    }

    /// Decay the user's tokens as of `now`, then report their standing.
    pub async fn user_status(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> KarmaResult<UserStatus> {
        let balances = self.ledger.decay_and_expiry(user_id, now).await?;
        let user = self.ledger.load_user(user_id).await?;

        Ok(UserStatus {
            merit_score: self.roles.merit_score(&balances)?,
            paap_score: self
                .ledger
                .weighted_total(TokenFamily::Paap, &balances.paap_tokens)?,
            punya_score: self
                .ledger
                .weighted_total(TokenFamily::Punya, &balances.punya_tokens)?,
            user_id: user.user_id,
            role: user.role,
            balances,
        })
    }

    /// Record an action: Paap tokens when it classifies, its configured
    /// reward, and a controller step whose resulting role is stored.
    pub async fn log_action(
        &self,
        user_id: &UserId,
        action: &str,
        note: Option<&str>,
    ) -> KarmaResult<ActionReceipt> {
        let user = self.ledger.load_user(user_id).await?;
        let previous_role = user.role.clone();

        let (severity, mut balances) = self
            .ledger
            .apply_action(&self.classifier, user_id, action, 1.0)
            .await?;

        let reward = match self.config.action_reward(action) {
            Some(spec) => {
                balances = self
                    .ledger
                    .credit_reward(user_id, &spec.target, spec.value)
                    .await?
                    .balances;
                spec.value
            }
            None => 0.0,
        };

        let outcome = self
            .roles
            .q_step_with_balances(previous_role.as_str(), action, reward, &balances)
            .await?;
        self.roles
            .settle_role(user_id, &previous_role, &outcome.role)
            .await?;

        let wants_appeal = note.is_some_and(|note| note.contains(AUTO_APPEAL_MARKER));
        let plan_id = match (&severity, wants_appeal) {
            (Some(_), true) => {
                let receipt = self
                    .remediation
                    .appeal_karma(user_id, action, note.map(str::to_string))
                    .await?;
                Some(receipt.plan.plan_id)
            }
            (None, true) => {
                warn!(user = %user_id, action, "auto appeal skipped: action not eligible");
                None
            }
            _ => None,
        };

        info!(
            user = %user_id,
            action,
            reward,
            severity = ?severity.as_ref().map(Tier::as_str),
            from = %previous_role,
            to = %outcome.role,
            "action logged"
        );
        Ok(ActionReceipt {
            severity,
            paap_tokens: balances.paap_tokens,
            reward,
            previous_role,
            role: outcome.role,
            plan_id,
        })
    }
}
