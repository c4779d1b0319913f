//! Merit scoring, role determination, and the shared value-table controller.

use crate::error::{KarmaError, KarmaResult};
use crate::ledger::TokenLedger;
use chrono::Utc;
use karma_storage::KarmaStorage;
use karma_types::config::AtonementReward;
use karma_types::{
    Balances, BalanceMutation, KarmaConfig, Role, TokenFamily, UserId, ValueTableSnapshot,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of one temporal-difference step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QStepOutcome {
    pub reward: f64,
    /// Role implied by the balances after the reward.
    pub role: Role,
    /// Updated `Q[state, action]`; `None` when the action is unknown and the
    /// table was left untouched.
    pub value: Option<f64>,
}

/// Role controller over a single shared value table.
///
/// Table writers are serialised by the inner mutex. Each update is saved
/// before it becomes visible in memory, so readers only ever see persisted
/// values.
pub struct RoleEngine {
    storage: Arc<dyn KarmaStorage>,
    config: Arc<KarmaConfig>,
    ledger: TokenLedger,
    table: Mutex<ValueTableSnapshot>,
}

impl RoleEngine {
    /// Restore the stored table, or start from zeros when none is stored or
    /// the stored shape does not match the configured roles and actions.
    pub async fn load(
        storage: Arc<dyn KarmaStorage>,
        config: Arc<KarmaConfig>,
    ) -> KarmaResult<Self> {
        let roles = config.role_names();
        let actions = config.action_names();

        let table = match storage.load_value_table().await? {
            Some(snapshot) if snapshot.matches_shape(&roles, &actions) => {
                info!(
                    roles = roles.len(),
                    actions = actions.len(),
                    "value table restored"
                );
                snapshot
            }
            Some(snapshot) => {
                warn!(
                    stored_roles = snapshot.roles.len(),
                    stored_actions = snapshot.actions.len(),
                    roles = roles.len(),
                    actions = actions.len(),
                    "stored value table does not match configuration, starting from zero"
                );
                ValueTableSnapshot::zeroed(roles, actions, Utc::now())
            }
            None => ValueTableSnapshot::zeroed(roles, actions, Utc::now()),
        };

        let ledger = TokenLedger::new(storage.clone(), config.clone());
        Ok(Self {
            storage,
            config,
            ledger,
            table: Mutex::new(table),
        })
    }

    /// `dharma·w1 + seva·w2 + weighted Punya total·w3`.
    pub fn merit_score(&self, balances: &Balances) -> KarmaResult<f64> {
        let weights = &self.config.roles.merit_weights;
        let punya = self
            .ledger
            .weighted_total(TokenFamily::Punya, &balances.punya_tokens)?;
        Ok(balances.dharma_points * weights.dharma
            + balances.seva_points * weights.seva
            + punya * weights.punya)
    }

    pub async fn merit_score_of(&self, user_id: &UserId) -> KarmaResult<f64> {
        let user = self.ledger.load_user(user_id).await?;
        self.merit_score(&user.balances)
    }

    /// Highest role whose threshold is at or below `score`. Scores below
    /// every threshold map to the first role.
    pub fn determine_role(&self, score: f64) -> Role {
        let sequence = &self.config.roles.sequence;
        sequence
            .iter()
            .rev()
            .find(|rung| rung.min_merit <= score)
            .or_else(|| sequence.first())
            .map(|rung| rung.role.clone())
            .unwrap_or_else(|| Role::new(""))
    }

    /// TD step for a user: the next state is the role implied by the user's
    /// balances once `reward` is notionally credited to the action's target.
    pub async fn q_step(
        &self,
        user_id: &UserId,
        state: &str,
        action: &str,
        reward: f64,
    ) -> KarmaResult<QStepOutcome> {
        let user = self.ledger.load_user(user_id).await?;
        let mut balances = user.balances;
        if let Some(spec) = self.config.action_reward(action) {
            balances.credit_reward(&spec.target, reward);
        }
        self.q_step_with_balances(state, action, reward, &balances)
            .await
    }

    /// TD step where `balances` already reflect the reward.
    ///
    /// An unknown `state` falls back to the first role. An unknown `action`
    /// returns `(reward, state)` and leaves the table untouched.
    pub async fn q_step_with_balances(
        &self,
        state: &str,
        action: &str,
        reward: f64,
        balances: &Balances,
    ) -> KarmaResult<QStepOutcome> {
        let state = self.resolve_state(state);
        let mut table = self.table.lock().await;

        let Some(column) = table.actions.iter().position(|a| a == action) else {
            warn!(action, state = %state, "unknown action, value table unchanged");
            return Ok(QStepOutcome {
                reward,
                role: state,
                value: None,
            });
        };

        let next_role = self.determine_role(self.merit_score(balances)?);
        let row = row_of(&table, &state);
        let next_row = row_of(&table, &next_role);

        let alpha = self.config.learning.learning_rate;
        let gamma = self.config.learning.discount;
        let current = table.values[row][column];
        let next_max = table.values[next_row]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let next_max = if next_max.is_finite() { next_max } else { 0.0 };
        let updated = current + alpha * (reward + gamma * next_max - current);

        let mut next = table.clone();
        next.values[row][column] = updated;
        next.updated_at = Utc::now();
        self.storage.save_value_table(&next).await?;
        *table = next;

        debug!(
            state = %state,
            action,
            reward,
            next_role = %next_role,
            previous = current,
            updated,
            "value table updated"
        );
        Ok(QStepOutcome {
            reward,
            role: next_role,
            value: Some(updated),
        })
    }

    /// Credit the configured atonement reward for `severity`, then run a TD
    /// step on the representative positive action.
    pub async fn atonement_q_step(
        &self,
        user_id: &UserId,
        severity: &str,
    ) -> KarmaResult<QStepOutcome> {
        let spec = self.atonement_reward(severity)?;
        let user = self
            .ledger
            .credit_reward(user_id, &spec.target, spec.value)
            .await?;
        let outcome = self
            .q_step_with_balances(
                user.role.as_str(),
                &self.config.rewards.atonement_action,
                spec.value,
                &user.balances,
            )
            .await?;
        self.settle_role(user_id, &user.role, &outcome.role).await?;

        info!(
            user = %user_id,
            severity,
            reward = spec.value,
            target = %spec.target,
            role = %outcome.role,
            "atonement reward credited"
        );
        Ok(outcome)
    }

    /// Configured reward for completing a plan of `severity`.
    pub fn atonement_reward(&self, severity: &str) -> KarmaResult<&AtonementReward> {
        self.config
            .rewards
            .atonement
            .get(severity)
            .ok_or_else(|| KarmaError::UnknownSeverity(severity.to_string()))
    }

    /// Persist `next` as the user's role when it differs from `current`.
    pub async fn settle_role(
        &self,
        user_id: &UserId,
        current: &Role,
        next: &Role,
    ) -> KarmaResult<()> {
        if current == next {
            return Ok(());
        }
        self.ledger
            .mutate(
                user_id,
                &BalanceMutation::SetRole { role: next.clone() },
                Utc::now(),
            )
            .await?;
        info!(user = %user_id, from = %current, to = %next, "role changed");
        Ok(())
    }

    /// Read-only copy of the current table.
    pub async fn value_table(&self) -> ValueTableSnapshot {
        self.table.lock().await.clone()
    }

    /// Greedy action for `role`; ties go to the earliest configured action.
    pub async fn best_action(&self, role: &str) -> KarmaResult<String> {
        if !self.config.roles.contains(role) {
            return Err(KarmaError::InvalidRole(role.to_string()));
        }
        let table = self.table.lock().await;
        let row = row_of(&table, &Role::new(role));
        let mut best: Option<(usize, f64)> = None;
        for (column, value) in table.values[row].iter().copied().enumerate() {
            if best.map_or(true, |(_, top)| value > top) {
                best = Some((column, value));
            }
        }
        best.and_then(|(column, _)| table.actions.get(column).cloned())
            .ok_or_else(|| KarmaError::InvalidRole(role.to_string()))
    }

    fn resolve_state(&self, state: &str) -> Role {
        if self.config.roles.contains(state) {
            return Role::new(state);
        }
        let fallback = self.determine_role(f64::NEG_INFINITY);
        warn!(state, fallback = %fallback, "unknown role state, using first role");
        fallback
    }
}

fn row_of(table: &ValueTableSnapshot, role: &Role) -> usize {
    table.roles.iter().position(|r| r == role).unwrap_or(0)
}
