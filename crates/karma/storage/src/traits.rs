use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karma_types::{
    Appeal, AppealId, AtonementPlan, AtonementSubmission, BalanceMutation, DeathEvent, PlanId,
    User, UserId, ValueTableSnapshot,
};

/// Storage interface for user documents.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert `user` unless a document with the same id exists. Returns the
    /// stored document either way.
    async fn insert_user_if_absent(&self, user: User) -> StorageResult<User>;

    async fn get_user(&self, user_id: &UserId) -> StorageResult<Option<User>>;

    /// Apply one mutation as a single atomic read-modify-write and return
    /// the resulting document. Fails `NotFound` for an unknown user.
    async fn apply_mutation(
        &self,
        user_id: &UserId,
        mutation: &BalanceMutation,
        at: DateTime<Utc>,
    ) -> StorageResult<User>;
}

/// Storage interface for appeals and atonement plans.
#[async_trait]
pub trait RemediationStore: Send + Sync {
    /// Persist an appeal and its plan as one unit: either both documents are
    /// written or neither is. The stored appeal references the plan.
    async fn create_appeal_with_plan(
        &self,
        appeal: Appeal,
        plan: AtonementPlan,
    ) -> StorageResult<(Appeal, AtonementPlan)>;

    async fn get_appeal(&self, appeal_id: &AppealId) -> StorageResult<Option<Appeal>>;

    async fn get_plan(&self, plan_id: &PlanId) -> StorageResult<Option<AtonementPlan>>;

    /// Atomically add a submission to an active plan. Fails `Conflict` when
    /// the plan is no longer active.
    async fn record_submission(
        &self,
        plan_id: &PlanId,
        submission: AtonementSubmission,
    ) -> StorageResult<AtonementPlan>;

    /// Transition an active plan to completed and resolve its parent appeal
    /// in one unit. Returns `None` when the plan was already closed, so at
    /// most one caller ever observes the completion. Fails
    /// `InvariantViolation` when the parent appeal does not exist.
    async fn complete_plan(
        &self,
        plan_id: &PlanId,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<AtonementPlan>>;

    /// Apply a completed plan's ledger effect to its user and mark the plan
    /// settled in one unit. Returns `None` when the plan is already settled.
    /// Fails `Conflict` when the plan is not completed.
    async fn settle_plan(
        &self,
        plan_id: &PlanId,
        mutation: &BalanceMutation,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<(AtonementPlan, User)>>;

    /// Abandon an active plan without touching any appeal. Fails `Conflict`
    /// when the plan is not active.
    async fn abandon_plan(&self, plan_id: &PlanId, at: DateTime<Utc>)
        -> StorageResult<AtonementPlan>;

    /// Reject a pending appeal and abandon its still-active plan. Fails
    /// `Conflict` when the appeal is not pending.
    async fn reject_appeal(
        &self,
        appeal_id: &AppealId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<Appeal>;

    /// Overwrite an appeal document (repair path).
    async fn save_appeal(&self, appeal: &Appeal) -> StorageResult<()>;

    /// Plans for a user, newest first.
    async fn list_plans(&self, user_id: &UserId) -> StorageResult<Vec<AtonementPlan>>;

    /// Appeals for a user, newest first.
    async fn list_appeals(&self, user_id: &UserId) -> StorageResult<Vec<Appeal>>;
}

/// Storage interface for lifecycle transitions.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// Append `event` and reset the user to its carryover in one unit.
    /// Returns the reset user.
    async fn commit_rebirth(&self, event: &DeathEvent) -> StorageResult<User>;

    /// Death events for a user, newest first.
    async fn list_death_events(&self, user_id: &UserId) -> StorageResult<Vec<DeathEvent>>;
}

/// Storage interface for the value-table snapshot.
#[async_trait]
pub trait ValueTableStore: Send + Sync {
    async fn load_value_table(&self) -> StorageResult<Option<ValueTableSnapshot>>;

    /// Replace the stored snapshot (last write wins).
    async fn save_value_table(&self, snapshot: &ValueTableSnapshot) -> StorageResult<()>;
}

/// Unified storage bundle used by the engine.
pub trait KarmaStorage:
    UserStore + RemediationStore + LifecycleStore + ValueTableStore + Send + Sync
{
}

impl<T> KarmaStorage for T where
    T: UserStore + RemediationStore + LifecycleStore + ValueTableStore + Send + Sync
{
}
