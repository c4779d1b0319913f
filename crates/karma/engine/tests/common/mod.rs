#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karma_engine::KarmaEngine;
use karma_storage::memory::InMemoryKarmaStorage;
use karma_storage::{
    LifecycleStore, RemediationStore, StorageError, StorageResult, UserStore, ValueTableStore,
};
use karma_types::{
    Appeal, AppealId, AtonementPlan, AtonementSubmission, Balances, BalanceMutation, DeathEvent,
    KarmaConfig, PlanId, Role, User, UserId, ValueTableSnapshot,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Harness {
    pub storage: Arc<InMemoryKarmaStorage>,
    pub engine: KarmaEngine,
}

pub async fn harness() -> Harness {
    harness_with(KarmaConfig::default()).await
}

pub async fn harness_with(config: KarmaConfig) -> Harness {
    // Tests share one process; only the first install succeeds.
    karma_engine::telemetry::init_tracing("karma_engine=debug").ok();
    let storage = Arc::new(InMemoryKarmaStorage::new());
    let engine = KarmaEngine::new(storage.clone(), config).await.unwrap();
    Harness { storage, engine }
}

/// Harness whose first plan settlement fails with a transient backend
/// error; later settlements go through.
pub async fn flaky_settlement_harness() -> Harness {
    karma_engine::telemetry::init_tracing("karma_engine=debug").ok();
    let storage = Arc::new(InMemoryKarmaStorage::new());
    let flaky = Arc::new(FlakySettlement {
        inner: storage.clone(),
        tripped: AtomicBool::new(false),
    });
    let engine = KarmaEngine::new(flaky, KarmaConfig::default()).await.unwrap();
    Harness { storage, engine }
}

impl Harness {
    /// Seed a learner holding `balances`, created and last decayed at `at`.
    pub fn seed_at(&self, id: &str, balances: Balances, at: DateTime<Utc>) -> UserId {
        let user_id = UserId::new(id);
        self.storage
            .put_user(User::new(user_id.clone(), Role::new("learner"), at).with_balances(balances))
            .unwrap();
        user_id
    }

    pub fn seed(&self, id: &str, balances: Balances) -> UserId {
        self.seed_at(id, balances, Utc::now())
    }
}

/// Storage adapter whose backend is down.
pub struct FailingStorage;

fn down<T>() -> StorageResult<T> {
    Err(StorageError::Backend("connection refused".to_string()))
}

#[async_trait]
impl UserStore for FailingStorage {
    async fn insert_user_if_absent(&self, _user: User) -> StorageResult<User> {
        down()
    }

    async fn get_user(&self, _user_id: &UserId) -> StorageResult<Option<User>> {
        down()
    }

    async fn apply_mutation(
        &self,
        _user_id: &UserId,
        _mutation: &BalanceMutation,
        _at: DateTime<Utc>,
    ) -> StorageResult<User> {
        down()
    }
}

#[async_trait]
impl RemediationStore for FailingStorage {
    async fn create_appeal_with_plan(
        &self,
        _appeal: Appeal,
        _plan: AtonementPlan,
    ) -> StorageResult<(Appeal, AtonementPlan)> {
        down()
    }

    async fn get_appeal(&self, _appeal_id: &AppealId) -> StorageResult<Option<Appeal>> {
        down()
    }

    async fn get_plan(&self, _plan_id: &PlanId) -> StorageResult<Option<AtonementPlan>> {
        down()
    }

    async fn record_submission(
        &self,
        _plan_id: &PlanId,
        _submission: AtonementSubmission,
    ) -> StorageResult<AtonementPlan> {
        down()
    }

    async fn complete_plan(
        &self,
        _plan_id: &PlanId,
        _at: DateTime<Utc>,
    ) -> StorageResult<Option<AtonementPlan>> {
        down()
    }

    async fn settle_plan(
        &self,
        _plan_id: &PlanId,
        _mutation: &BalanceMutation,
        _at: DateTime<Utc>,
    ) -> StorageResult<Option<(AtonementPlan, User)>> {
        down()
    }

    async fn abandon_plan(
        &self,
        _plan_id: &PlanId,
        _at: DateTime<Utc>,
    ) -> StorageResult<AtonementPlan> {
        down()
    }

    async fn reject_appeal(
        &self,
        _appeal_id: &AppealId,
        _reason: &str,
        _at: DateTime<Utc>,
    ) -> StorageResult<Appeal> {
        down()
    }

    async fn save_appeal(&self, _appeal: &Appeal) -> StorageResult<()> {
        down()
    }

    async fn list_plans(&self, _user_id: &UserId) -> StorageResult<Vec<AtonementPlan>> {
        down()
    }

    async fn list_appeals(&self, _user_id: &UserId) -> StorageResult<Vec<Appeal>> {
        down()
    }
}

#[async_trait]
impl LifecycleStore for FailingStorage {
    async fn commit_rebirth(&self, _event: &DeathEvent) -> StorageResult<User> {
        down()
    }

    async fn list_death_events(&self, _user_id: &UserId) -> StorageResult<Vec<DeathEvent>> {
        down()
    }
}

/// The value table still loads so the engine can be constructed.
#[async_trait]
impl ValueTableStore for FailingStorage {
    async fn load_value_table(&self) -> StorageResult<Option<ValueTableSnapshot>> {
        Ok(None)
    }

    async fn save_value_table(&self, _snapshot: &ValueTableSnapshot) -> StorageResult<()> {
        down()
    }
}

/// In-memory storage that drops the first `settle_plan` call.
pub struct FlakySettlement {
    inner: Arc<InMemoryKarmaStorage>,
    tripped: AtomicBool,
}

#[async_trait]
impl UserStore for FlakySettlement {
    async fn insert_user_if_absent(&self, user: User) -> StorageResult<User> {
        self.inner.insert_user_if_absent(user).await
    }

    async fn get_user(&self, user_id: &UserId) -> StorageResult<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn apply_mutation(
        &self,
        user_id: &UserId,
        mutation: &BalanceMutation,
        at: DateTime<Utc>,
    ) -> StorageResult<User> {
        self.inner.apply_mutation(user_id, mutation, at).await
    }
}

#[async_trait]
impl RemediationStore for FlakySettlement {
    async fn create_appeal_with_plan(
        &self,
        appeal: Appeal,
        plan: AtonementPlan,
    ) -> StorageResult<(Appeal, AtonementPlan)> {
        self.inner.create_appeal_with_plan(appeal, plan).await
    }

    async fn get_appeal(&self, appeal_id: &AppealId) -> StorageResult<Option<Appeal>> {
        self.inner.get_appeal(appeal_id).await
    }

    async fn get_plan(&self, plan_id: &PlanId) -> StorageResult<Option<AtonementPlan>> {
        self.inner.get_plan(plan_id).await
    }

    async fn record_submission(
        &self,
        plan_id: &PlanId,
        submission: AtonementSubmission,
    ) -> StorageResult<AtonementPlan> {
        self.inner.record_submission(plan_id, submission).await
    }

    async fn complete_plan(
        &self,
        plan_id: &PlanId,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<AtonementPlan>> {
        self.inner.complete_plan(plan_id, at).await
    }

    async fn settle_plan(
        &self,
        plan_id: &PlanId,
        mutation: &BalanceMutation,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<(AtonementPlan, User)>> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Backend("transient".to_string()));
        }
        self.inner.settle_plan(plan_id, mutation, at).await
    }

    async fn abandon_plan(
        &self,
        plan_id: &PlanId,
        at: DateTime<Utc>,
    ) -> StorageResult<AtonementPlan> {
        self.inner.abandon_plan(plan_id, at).await
    }

    async fn reject_appeal(
        &self,
        appeal_id: &AppealId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<Appeal> {
        self.inner.reject_appeal(appeal_id, reason, at).await
    }

    async fn save_appeal(&self, appeal: &Appeal) -> StorageResult<()> {
        self.inner.save_appeal(appeal).await
    }

    async fn list_plans(&self, user_id: &UserId) -> StorageResult<Vec<AtonementPlan>> {
        self.inner.list_plans(user_id).await
    }

    async fn list_appeals(&self, user_id: &UserId) -> StorageResult<Vec<Appeal>> {
        self.inner.list_appeals(user_id).await
    }
}

#[async_trait]
impl LifecycleStore for FlakySettlement {
    async fn commit_rebirth(&self, event: &DeathEvent) -> StorageResult<User> {
        self.inner.commit_rebirth(event).await
    }

    async fn list_death_events(&self, user_id: &UserId) -> StorageResult<Vec<DeathEvent>> {
        self.inner.list_death_events(user_id).await
    }
}

#[async_trait]
impl ValueTableStore for FlakySettlement {
    async fn load_value_table(&self) -> StorageResult<Option<ValueTableSnapshot>> {
        self.inner.load_value_table().await
    }

    async fn save_value_table(&self, snapshot: &ValueTableSnapshot) -> StorageResult<()> {
        self.inner.save_value_table(snapshot).await
    }
}
