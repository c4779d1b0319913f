//! Tiered token ledger.
//!
//! Every write goes through a single [`BalanceMutation`] so the storage
//! adapter applies it atomically; the ledger never performs a client-side
//! read-then-write. Token writes settle pending decay first, so tokens
//! credited after an idle period never absorb decay accrued before they
//! arrived.

use crate::classifier::ActionClassifier;
use crate::error::{KarmaError, KarmaResult};
use chrono::{DateTime, Utc};
use karma_storage::{KarmaStorage, StorageError};
use karma_types::{
    Balances, BalanceMutation, KarmaConfig, RewardTarget, Tier, TierBalances, TokenFamily, User,
    UserId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Severity-weighted token accounting over both families.
#[derive(Clone)]
pub struct TokenLedger {
    storage: Arc<dyn KarmaStorage>,
    config: Arc<KarmaConfig>,
}

impl TokenLedger {
    pub fn new(storage: Arc<dyn KarmaStorage>, config: Arc<KarmaConfig>) -> Self {
        Self { storage, config }
    }

    /// Multiplier for `severity` within `family`.
    pub fn severity_weight(&self, family: TokenFamily, severity: &str) -> KarmaResult<f64> {
        self.config
            .tiers
            .multipliers(family)
            .get(severity)
            .copied()
            .ok_or_else(|| KarmaError::InvalidSeverity {
                family,
                severity: severity.to_string(),
            })
    }

    /// Credit `base_value × weight(severity)` to the family tier.
    ///
    /// `None` means the triggering action did not classify; the balances are
    /// returned unchanged.
    pub async fn apply_tokens(
        &self,
        user_id: &UserId,
        family: TokenFamily,
        severity: Option<&str>,
        base_value: f64,
    ) -> KarmaResult<Balances> {
        let Some(severity) = severity else {
            return Ok(self.load_user(user_id).await?.balances);
        };
        let weight = self.severity_weight(family, severity)?;
        ensure_positive(base_value)?;

        let amount = base_value * weight;
        let user = self
            .mutate_after_decay(
                user_id,
                &BalanceMutation::Credit {
                    family,
                    tier: Tier::new(severity),
                    amount,
                },
                Utc::now(),
            )
            .await?;

        info!(
            user = %user_id,
            family = %family,
            severity,
            amount,
            balance = user.balances.family(family).get(severity),
            "tokens applied"
        );
        Ok(user.balances)
    }

    /// Apply Paap tokens for `action` when it classifies. Returns the tier
    /// credited, if any.
    pub async fn apply_action(
        &self,
        classifier: &ActionClassifier,
        user_id: &UserId,
        action: &str,
        base_value: f64,
    ) -> KarmaResult<(Option<Tier>, Balances)> {
        let severity = classifier.classify(action).cloned();
        let balances = self
            .apply_tokens(
                user_id,
                TokenFamily::Paap,
                severity.as_ref().map(Tier::as_str),
                base_value,
            )
            .await?;
        Ok((severity, balances))
    }

    /// Subtract raw `amount` from the family tier, floored at zero.
    pub async fn reduce_tokens(
        &self,
        user_id: &UserId,
        family: TokenFamily,
        severity: &str,
        amount: f64,
    ) -> KarmaResult<Balances> {
        self.severity_weight(family, severity)?;
        ensure_positive(amount)?;

        let user = self
            .mutate_after_decay(
                user_id,
                &BalanceMutation::Debit {
                    family,
                    tier: Tier::new(severity),
                    amount,
                },
                Utc::now(),
            )
            .await?;

        info!(
            user = %user_id,
            family = %family,
            severity,
            amount,
            balance = user.balances.family(family).get(severity),
            "tokens reduced"
        );
        Ok(user.balances)
    }

    /// Credit a signed reward to its target.
    pub async fn credit_reward(
        &self,
        user_id: &UserId,
        target: &RewardTarget,
        amount: f64,
    ) -> KarmaResult<User> {
        let user = self
            .mutate_after_decay(
                user_id,
                &BalanceMutation::Reward {
                    target: target.clone(),
                    amount,
                },
                Utc::now(),
            )
            .await?;
        debug!(user = %user_id, target = %target, amount, "reward credited");
        Ok(user)
    }

    /// Weighted sum of a family's tiers.
    pub fn weighted_total(&self, family: TokenFamily, tiers: &TierBalances) -> KarmaResult<f64> {
        tiers.iter().try_fold(0.0, |total, (tier, amount)| {
            Ok(total + amount * self.severity_weight(family, tier.as_str())?)
        })
    }

    /// Weighted sum of a user's family balances.
    pub async fn total_score(&self, user_id: &UserId, family: TokenFamily) -> KarmaResult<f64> {
        let user = self.load_user(user_id).await?;
        let total = self.weighted_total(family, user.balances.family(family))?;
        debug!(user = %user_id, family = %family, total, "total score");
        Ok(total)
    }

    /// Decay both families by the whole days elapsed since the user's last
    /// decay pass and drop tiers below the expiry epsilon.
    pub async fn decay_and_expiry(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> KarmaResult<Balances> {
        let user = self.mutate(user_id, &self.decay_mutation(), now).await?;
        debug!(
            user = %user_id,
            punya_tiers = user.balances.punya_tokens.len(),
            paap_tiers = user.balances.paap_tokens.len(),
            "decay applied"
        );
        Ok(user.balances)
    }

    /// Load a user and check every stored tier against the configured sets.
    pub async fn load_user(&self, user_id: &UserId) -> KarmaResult<User> {
        let user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| KarmaError::UserNotFound(user_id.clone()))?;
        self.validate_balances(&user.balances).inspect_err(|err| {
            warn!(user = %user_id, error = %err, "stored balances reference an unknown tier");
        })?;
        Ok(user)
    }

    fn validate_balances(&self, balances: &Balances) -> KarmaResult<()> {
        for family in [TokenFamily::Punya, TokenFamily::Paap] {
            for tier in balances.family(family).tiers() {
                self.severity_weight(family, tier.as_str())?;
            }
        }
        Ok(())
    }

    fn decay_mutation(&self) -> BalanceMutation {
        BalanceMutation::Decay {
            policy: self.config.decay.policy.clone(),
            epsilon: self.config.decay.expiry_epsilon,
        }
    }

    async fn mutate_after_decay(
        &self,
        user_id: &UserId,
        mutation: &BalanceMutation,
        at: DateTime<Utc>,
    ) -> KarmaResult<User> {
        self.mutate(user_id, &self.decay_mutation(), at).await?;
        self.mutate(user_id, mutation, at).await
    }

    pub(crate) async fn mutate(
        &self,
        user_id: &UserId,
        mutation: &BalanceMutation,
        at: DateTime<Utc>,
    ) -> KarmaResult<User> {
        match self.storage.apply_mutation(user_id, mutation, at).await {
            Ok(user) => Ok(user),
            Err(StorageError::NotFound(_)) => Err(KarmaError::UserNotFound(user_id.clone())),
            Err(err) => Err(err.into()),
        }
    }
}

fn ensure_positive(amount: f64) -> KarmaResult<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(KarmaError::InvalidAmount(amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karma_storage::memory::InMemoryKarmaStorage;
    use karma_storage::UserStore;
    use karma_types::Role;

    async fn ledger_with(balances: Balances) -> (TokenLedger, UserId) {
        let storage = Arc::new(InMemoryKarmaStorage::default());
        let user_id = UserId::new("u1");
        storage
            .insert_user_if_absent(
                User::new(user_id.clone(), Role::new("learner"), Utc::now())
                    .with_balances(balances),
            )
            .await
            .unwrap();
        let ledger = TokenLedger::new(storage, Arc::new(KarmaConfig::default()));
        (ledger, user_id)
    }

    fn paap(entries: TierBalances) -> Balances {
        Balances {
            paap_tokens: entries,
            ..Balances::default()
        }
    }

    #[test]
    fn weights_follow_configured_multipliers() {
        let storage = Arc::new(InMemoryKarmaStorage::default());
        let ledger = TokenLedger::new(storage, Arc::new(KarmaConfig::default()));
        assert_eq!(ledger.severity_weight(TokenFamily::Paap, "minor").unwrap(), 1.0);
        assert_eq!(ledger.severity_weight(TokenFamily::Paap, "medium").unwrap(), 3.0);
        assert_eq!(ledger.severity_weight(TokenFamily::Paap, "maha").unwrap(), 7.0);
        assert!(matches!(
            ledger.severity_weight(TokenFamily::Paap, "major"),
            Err(KarmaError::InvalidSeverity { .. })
        ));
    }

    #[tokio::test]
    async fn apply_minor_adds_one_unit() {
        let (ledger, user) =
            ledger_with(paap(TierBalances::from([("minor", 5.0), ("medium", 3.0), ("maha", 1.0)])))
                .await;
        let balances = ledger
            .apply_tokens(&user, TokenFamily::Paap, Some("minor"), 1.0)
            .await
            .unwrap();
        assert_eq!(balances.paap_tokens.get("minor"), 6.0);
        assert_eq!(balances.paap_tokens.get("medium"), 3.0);
    }

    #[tokio::test]
    async fn unclassified_apply_is_a_no_op() {
        let (ledger, user) = ledger_with(paap(TierBalances::from([("minor", 2.0)]))).await;
        let balances = ledger
            .apply_tokens(&user, TokenFamily::Paap, None, 1.0)
            .await
            .unwrap();
        assert_eq!(balances.paap_tokens, TierBalances::from([("minor", 2.0)]));
    }

    #[tokio::test]
    async fn reduce_floors_at_zero() {
        let (ledger, user) = ledger_with(paap(TierBalances::from([("medium", 1.0)]))).await;
        let balances = ledger
            .reduce_tokens(&user, TokenFamily::Paap, "medium", 5.0)
            .await
            .unwrap();
        assert_eq!(balances.paap_tokens.get("medium"), 0.0);
    }

    #[tokio::test]
    async fn total_score_weights_each_tier() {
        let (ledger, user) =
            ledger_with(paap(TierBalances::from([("minor", 5.0), ("medium", 2.0), ("maha", 1.0)])))
                .await;
        let total = ledger.total_score(&user, TokenFamily::Paap).await.unwrap();
        assert_eq!(total, 5.0 + 6.0 + 7.0);
        assert_eq!(ledger.total_score(&user, TokenFamily::Punya).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let (ledger, user) = ledger_with(Balances::default()).await;
        let err = ledger
            .apply_tokens(&user, TokenFamily::Paap, Some("minor"), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, KarmaError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let (ledger, _) = ledger_with(Balances::default()).await;
        let err = ledger
            .apply_tokens(&UserId::new("ghost"), TokenFamily::Paap, Some("minor"), 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, KarmaError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn stored_unknown_tier_fails_validation() {
        let (ledger, user) = ledger_with(paap(TierBalances::from([("cosmic", 1.0)]))).await;
        let err = ledger.load_user(&user).await.unwrap_err();
        assert!(matches!(err, KarmaError::InvalidSeverity { .. }));
    }
}
