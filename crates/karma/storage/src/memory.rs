//! In-memory reference implementation for KarmaChain storage traits.
//!
//! This adapter is deterministic and test-friendly. Multi-document units
//! (appeal + plan, death event + user reset) take their write locks in a
//! fixed order: users, appeals, plans, death events.

use crate::traits::{LifecycleStore, RemediationStore, UserStore, ValueTableStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karma_types::{
    Appeal, AppealId, AppealStatus, AtonementPlan, AtonementSubmission, BalanceMutation,
    DeathEvent, PlanId, PlanStatus, User, UserId, ValueTableSnapshot,
};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory KarmaChain storage adapter.
#[derive(Default)]
pub struct InMemoryKarmaStorage {
    users: RwLock<HashMap<UserId, User>>,
    appeals: RwLock<HashMap<AppealId, Appeal>>,
    plans: RwLock<HashMap<PlanId, AtonementPlan>>,
    death_events: RwLock<Vec<DeathEvent>>,
    value_table: RwLock<Option<ValueTableSnapshot>>,
}

impl InMemoryKarmaStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user document verbatim (overwrites).
    pub fn put_user(&self, user: User) -> StorageResult<()> {
        write(&self.users, "users")?.insert(user.user_id.clone(), user);
        Ok(())
    }

    /// Drop an appeal document, leaving its plan behind. Simulates a
    /// half-written pair from a non-transactional backend.
    pub fn remove_appeal(&self, appeal_id: &AppealId) -> StorageResult<Option<Appeal>> {
        Ok(write(&self.appeals, "appeals")?.remove(appeal_id))
    }

    /// Overwrite a plan document verbatim.
    pub fn put_plan(&self, plan: AtonementPlan) -> StorageResult<()> {
        write(&self.plans, "plans")?.insert(plan.plan_id.clone(), plan);
        Ok(())
    }
}

fn read<'a, T>(lock: &'a RwLock<T>, name: &str) -> StorageResult<RwLockReadGuard<'a, T>> {
    lock.read()
        .map_err(|_| StorageError::Backend(format!("{} lock poisoned", name)))
}

fn write<'a, T>(lock: &'a RwLock<T>, name: &str) -> StorageResult<RwLockWriteGuard<'a, T>> {
    lock.write()
        .map_err(|_| StorageError::Backend(format!("{} lock poisoned", name)))
}

#[async_trait]
impl UserStore for InMemoryKarmaStorage {
    async fn insert_user_if_absent(&self, user: User) -> StorageResult<User> {
        let mut guard = write(&self.users, "users")?;
        let stored = guard.entry(user.user_id.clone()).or_insert(user);
        Ok(stored.clone())
    }

    async fn get_user(&self, user_id: &UserId) -> StorageResult<Option<User>> {
        Ok(read(&self.users, "users")?.get(user_id).cloned())
    }

    async fn apply_mutation(
        &self,
        user_id: &UserId,
        mutation: &BalanceMutation,
        at: DateTime<Utc>,
    ) -> StorageResult<User> {
        let mut guard = write(&self.users, "users")?;
        let user = guard
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(format!("user {} not found", user_id)))?;
        mutation.apply(user, at);
        Ok(user.clone())
    }
}

#[async_trait]
impl RemediationStore for InMemoryKarmaStorage {
    async fn create_appeal_with_plan(
        &self,
        mut appeal: Appeal,
        plan: AtonementPlan,
    ) -> StorageResult<(Appeal, AtonementPlan)> {
        if plan.appeal_id != appeal.appeal_id {
            return Err(StorageError::InvalidInput(format!(
                "plan {} does not belong to appeal {}",
                plan.plan_id, appeal.appeal_id
            )));
        }

        let mut appeals = write(&self.appeals, "appeals")?;
        let mut plans = write(&self.plans, "plans")?;
        if appeals.contains_key(&appeal.appeal_id) {
            return Err(StorageError::Conflict(format!(
                "appeal {} already exists",
                appeal.appeal_id
            )));
        }
        if plans.contains_key(&plan.plan_id) {
            return Err(StorageError::Conflict(format!(
                "plan {} already exists",
                plan.plan_id
            )));
        }

        appeal.plan_id = Some(plan.plan_id.clone());
        appeals.insert(appeal.appeal_id.clone(), appeal.clone());
        plans.insert(plan.plan_id.clone(), plan.clone());
        Ok((appeal, plan))
    }

    async fn get_appeal(&self, appeal_id: &AppealId) -> StorageResult<Option<Appeal>> {
        Ok(read(&self.appeals, "appeals")?.get(appeal_id).cloned())
    }

    async fn get_plan(&self, plan_id: &PlanId) -> StorageResult<Option<AtonementPlan>> {
        Ok(read(&self.plans, "plans")?.get(plan_id).cloned())
    }

    async fn record_submission(
        &self,
        plan_id: &PlanId,
        submission: AtonementSubmission,
    ) -> StorageResult<AtonementPlan> {
        let mut guard = write(&self.plans, "plans")?;
        let plan = guard
            .get_mut(plan_id)
            .ok_or_else(|| StorageError::NotFound(format!("plan {} not found", plan_id)))?;
        if !plan.is_active() {
            return Err(StorageError::Conflict(format!(
                "plan {} is {:?}",
                plan_id, plan.status
            )));
        }
        plan.record(submission);
        Ok(plan.clone())
    }

    async fn complete_plan(
        &self,
        plan_id: &PlanId,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<AtonementPlan>> {
        let mut appeals = write(&self.appeals, "appeals")?;
        let mut plans = write(&self.plans, "plans")?;
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| StorageError::NotFound(format!("plan {} not found", plan_id)))?;
        if !plan.is_active() {
            return Ok(None);
        }
        let appeal = appeals.get_mut(&plan.appeal_id).ok_or_else(|| {
            StorageError::InvariantViolation(format!(
                "plan {} references missing appeal {}",
                plan_id, plan.appeal_id
            ))
        })?;

        plan.complete(at);
        if appeal.status == AppealStatus::Pending {
            appeal.resolve(at);
        }
        Ok(Some(plan.clone()))
    }

    async fn settle_plan(
        &self,
        plan_id: &PlanId,
        mutation: &BalanceMutation,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<(AtonementPlan, User)>> {
        let mut users = write(&self.users, "users")?;
        let mut plans = write(&self.plans, "plans")?;
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| StorageError::NotFound(format!("plan {} not found", plan_id)))?;
        if plan.status != PlanStatus::Completed {
            return Err(StorageError::Conflict(format!(
                "plan {} is {:?}",
                plan_id, plan.status
            )));
        }
        if plan.settled_at.is_some() {
            return Ok(None);
        }
        let user = users.get_mut(&plan.user_id).ok_or_else(|| {
            StorageError::InvariantViolation(format!(
                "plan {} references missing user {}",
                plan_id, plan.user_id
            ))
        })?;

        mutation.apply(user, at);
        plan.settle(at);
        Ok(Some((plan.clone(), user.clone())))
    }

    async fn abandon_plan(
        &self,
        plan_id: &PlanId,
        at: DateTime<Utc>,
    ) -> StorageResult<AtonementPlan> {
        let mut plans = write(&self.plans, "plans")?;
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| StorageError::NotFound(format!("plan {} not found", plan_id)))?;
        if !plan.is_active() {
            return Err(StorageError::Conflict(format!(
                "plan {} is {:?}",
                plan_id, plan.status
            )));
        }
        plan.abandon(at);
        Ok(plan.clone())
    }

    async fn reject_appeal(
        &self,
        appeal_id: &AppealId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<Appeal> {
        let mut appeals = write(&self.appeals, "appeals")?;
        let mut plans = write(&self.plans, "plans")?;
        let appeal = appeals
            .get_mut(appeal_id)
            .ok_or_else(|| StorageError::NotFound(format!("appeal {} not found", appeal_id)))?;
        if appeal.status != AppealStatus::Pending {
            return Err(StorageError::Conflict(format!(
                "appeal {} is {:?}",
                appeal_id, appeal.status
            )));
        }

        appeal.reject(reason, at);
        if let Some(plan) = appeal.plan_id.as_ref().and_then(|id| plans.get_mut(id)) {
            if plan.is_active() {
                plan.abandon(at);
            }
        }
        Ok(appeal.clone())
    }

    async fn save_appeal(&self, appeal: &Appeal) -> StorageResult<()> {
        write(&self.appeals, "appeals")?.insert(appeal.appeal_id.clone(), appeal.clone());
        Ok(())
    }

    async fn list_plans(&self, user_id: &UserId) -> StorageResult<Vec<AtonementPlan>> {
        let guard = read(&self.plans, "plans")?;
        let mut values = guard
            .values()
            .filter(|plan| &plan.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }

    async fn list_appeals(&self, user_id: &UserId) -> StorageResult<Vec<Appeal>> {
        let guard = read(&self.appeals, "appeals")?;
        let mut values = guard
            .values()
            .filter(|appeal| &appeal.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }
}

#[async_trait]
impl LifecycleStore for InMemoryKarmaStorage {
    async fn commit_rebirth(&self, event: &DeathEvent) -> StorageResult<User> {
        let mut users = write(&self.users, "users")?;
        let mut events = write(&self.death_events, "death events")?;
        let user = users.get_mut(&event.user_id).ok_or_else(|| {
            StorageError::NotFound(format!("user {} not found", event.user_id))
        })?;

        BalanceMutation::Rebirth {
            balances: event.carryover.balances.clone(),
            role: event.carryover.starting_role.clone(),
        }
        .apply(user, event.timestamp);
        events.push(event.clone());
        Ok(user.clone())
    }

    async fn list_death_events(&self, user_id: &UserId) -> StorageResult<Vec<DeathEvent>> {
        let guard = read(&self.death_events, "death events")?;
        let mut values = guard
            .iter()
            .filter(|event| &event.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(values)
    }
}

#[async_trait]
impl ValueTableStore for InMemoryKarmaStorage {
    async fn load_value_table(&self) -> StorageResult<Option<ValueTableSnapshot>> {
        Ok(read(&self.value_table, "value table")?.clone())
    }

    async fn save_value_table(&self, snapshot: &ValueTableSnapshot) -> StorageResult<()> {
        *write(&self.value_table, "value table")? = Some(snapshot.clone());
        Ok(())
    }
}
