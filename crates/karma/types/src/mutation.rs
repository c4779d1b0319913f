//! Balance mutations.
//!
//! A mutation describes one read-modify-write over a user document. Storage
//! adapters apply it as a single atomic unit (one lock acquisition, one
//! transaction, or one server-side update), so concurrent requests against
//! the same user never lose an update.

use crate::{Balances, DecayPolicy, RewardTarget, Role, Tier, TokenFamily, User};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BalanceMutation {
    /// Add `amount` to a family tier, initialising the tier to zero.
    Credit {
        family: TokenFamily,
        tier: Tier,
        amount: f64,
    },
    /// Subtract `amount` from a family tier, floored at zero.
    Debit {
        family: TokenFamily,
        tier: Tier,
        amount: f64,
    },
    /// Credit a signed reward to a scalar accumulator or Punya tier.
    Reward { target: RewardTarget, amount: f64 },
    /// Decay every tier of both families by the whole days elapsed since
    /// the last decay pass; tiers below `epsilon` are removed. The decay
    /// clock advances by the days consumed, so a partial day carries over.
    Decay { policy: DecayPolicy, epsilon: f64 },
    /// Settle a completed atonement plan: debit the Paap tier and credit
    /// the atonement reward together.
    Atone {
        severity: Tier,
        debit: f64,
        target: RewardTarget,
        reward: f64,
    },
    /// Move the user to another role.
    SetRole { role: Role },
    /// Replace balances and role wholesale (lifecycle rollover).
    Rebirth { balances: Balances, role: Role },
}

impl BalanceMutation {
    /// Apply to `user` as of `at`, stamping `updated_at`.
    pub fn apply(&self, user: &mut User, at: DateTime<Utc>) {
        match self {
            BalanceMutation::Credit {
                family,
                tier,
                amount,
            } => {
                user.balances.family_mut(*family).credit(tier, *amount);
            }
            BalanceMutation::Debit {
                family,
                tier,
                amount,
            } => {
                user.balances.family_mut(*family).debit(tier, *amount);
            }
            BalanceMutation::Reward { target, amount } => {
                user.balances.credit_reward(target, *amount);
            }
            BalanceMutation::Decay { policy, epsilon } => {
                let since = user.decay_clock();
                let days = (at - since).num_days();
                if days > 0 {
                    let elapsed = Duration::days(days);
                    for family in [TokenFamily::Punya, TokenFamily::Paap] {
                        user.balances
                            .family_mut(family)
                            .map_amounts(*epsilon, |amount| policy.decay(amount, elapsed));
                    }
                    user.decayed_at = Some(since + elapsed);
                }
            }
            BalanceMutation::Atone {
                severity,
                debit,
                target,
                reward,
            } => {
                user.balances.paap_tokens.debit(severity, *debit);
                user.balances.credit_reward(target, *reward);
            }
            BalanceMutation::SetRole { role } => {
                user.role = role.clone();
            }
            BalanceMutation::Rebirth { balances, role } => {
                user.balances = balances.clone();
                user.role = role.clone();
                user.decayed_at = Some(at);
            }
        }
        if at > user.updated_at {
            user.updated_at = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TierBalances, UserId};
    use chrono::Duration;

    fn user_at(now: DateTime<Utc>) -> User {
        User::new(UserId::new("u"), Role::new("learner"), now).with_balances(Balances {
            paap_tokens: TierBalances::from([("minor", 5.0), ("medium", 3.0), ("maha", 1.0)]),
            ..Balances::default()
        })
    }

    #[test]
    fn credit_initialises_absent_tier() {
        let now = Utc::now();
        let mut user = user_at(now);
        BalanceMutation::Credit {
            family: TokenFamily::Punya,
            tier: Tier::new("major"),
            amount: 7.0,
        }
        .apply(&mut user, now);
        assert_eq!(user.balances.punya_tokens.get("major"), 7.0);
    }

    #[test]
    fn decay_uses_time_since_last_decay() {
        let start = Utc::now();
        let mut user = user_at(start);
        let later = start + Duration::days(30);
        BalanceMutation::Decay {
            policy: DecayPolicy::HalfLife {
                half_life_days: 30.0,
            },
            epsilon: 0.6,
        }
        .apply(&mut user, later);

        assert!((user.balances.paap_tokens.get("minor") - 2.5).abs() < 1e-9);
        assert!((user.balances.paap_tokens.get("medium") - 1.5).abs() < 1e-9);
        // 0.5 < epsilon: expired
        assert_eq!(user.balances.paap_tokens.len(), 2);
        assert_eq!(user.updated_at, later);
    }

    #[test]
    fn credits_do_not_reset_the_decay_clock() {
        let start = Utc::now();
        let mut user = user_at(start);
        let later = start + Duration::days(60);
        BalanceMutation::Credit {
            family: TokenFamily::Punya,
            tier: Tier::new("minor"),
            amount: 1.0,
        }
        .apply(&mut user, later);
        assert_eq!(user.updated_at, later);
        assert_eq!(user.decay_clock(), start);

        BalanceMutation::Decay {
            policy: DecayPolicy::HalfLife {
                half_life_days: 30.0,
            },
            epsilon: 0.01,
        }
        .apply(&mut user, later);
        assert!((user.balances.paap_tokens.get("maha") - 0.25).abs() < 1e-9);
        assert_eq!(user.decay_clock(), later);
    }

    #[test]
    fn partial_days_carry_over_to_the_next_pass() {
        let start = Utc::now();
        let mut user = user_at(start);
        let decay = BalanceMutation::Decay {
            policy: DecayPolicy::Linear { units_per_day: 1.0 },
            epsilon: 0.0,
        };
        decay.apply(&mut user, start + Duration::hours(12));
        assert_eq!(user.balances.paap_tokens.get("minor"), 5.0);
        assert_eq!(user.decay_clock(), start);

        decay.apply(&mut user, start + Duration::hours(36));
        assert_eq!(user.balances.paap_tokens.get("minor"), 4.0);
        assert_eq!(user.decay_clock(), start + Duration::days(1));
    }

    #[test]
    fn atone_debits_paap_and_credits_reward() {
        let now = Utc::now();
        let mut user = user_at(now);
        BalanceMutation::Atone {
            severity: Tier::new("medium"),
            debit: 1.0,
            target: RewardTarget::SevaPoints,
            reward: 10.0,
        }
        .apply(&mut user, now);
        assert_eq!(user.balances.paap_tokens.get("medium"), 2.0);
        assert_eq!(user.balances.seva_points, 10.0);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let now = Utc::now();
        let mut user = user_at(now);
        BalanceMutation::SetRole {
            role: Role::new("volunteer"),
        }
        .apply(&mut user, now - Duration::hours(1));
        assert_eq!(user.updated_at, now);
        assert_eq!(user.role, Role::new("volunteer"));
    }
}
