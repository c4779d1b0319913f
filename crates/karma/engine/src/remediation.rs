//! Appeal and atonement workflow.
//!
//! ```text
//! appeal_karma ──► Appeal(pending) + Plan(active)
//!                       │
//!   submit_atonement ───┤ progress met ──► Plan(completed), Appeal(resolved)
//!                       │                        │ settle
//!                       │                        ▼
//!                       │                  Paap reduced, reward credited,
//!                       │                  Plan(settled), controller updated
//!   reject_appeal ──────┴──────────────► Appeal(rejected), Plan(abandoned)
//! ```
//!
//! Settlement is its own storage unit. A completed plan that failed to
//! settle is picked up again by [`RemediationWorkflow::reconcile_appeals`].

use crate::classifier::ActionClassifier;
use crate::error::{KarmaError, KarmaResult};
use crate::ledger::TokenLedger;
use crate::role::{QStepOutcome, RoleEngine};
use chrono::Utc;
use karma_storage::{KarmaStorage, StorageError};
use karma_types::{
    Appeal, AppealId, AppealStatus, AtonementPlan, AtonementSubmission, BalanceMutation,
    KarmaConfig, PlanId, PlanStatus, ProgressMap, TierBalances, TokenFamily, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reason recorded on a pending appeal whose plan no longer exists.
pub const ORPHANED_REASON: &str = "orphaned";

/// Raw Paap units removed from the plan's tier when it settles.
pub const ATONEMENT_DEBIT: f64 = 1.0;

/// Evidence accompanying an atonement submission.
#[derive(Debug, Clone, Default)]
pub struct AtonementProof {
    pub text: Option<String>,
    pub tx_hash: Option<String>,
    pub attachment: Option<Vec<u8>>,
}

impl AtonementProof {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppealReceipt {
    pub appeal: Appeal,
    pub plan: AtonementPlan,
}

/// Effects of settling a completed plan.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub reduced_by: f64,
    pub paap_tokens: TierBalances,
    pub q_step: QStepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub plan: AtonementPlan,
    /// Amount still owed per category.
    pub remaining: ProgressMap,
    /// Present only for the submission that completed and settled the plan.
    pub completion: Option<Completion>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AppealStatusReport {
    pub pending: Vec<AtonementPlan>,
    pub completed: Vec<AtonementPlan>,
    pub appeals: Vec<Appeal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub resolved: Vec<AppealId>,
    pub rejected: Vec<AppealId>,
    /// Completed plans whose settlement was applied by this pass.
    pub settled: Vec<PlanId>,
    /// Active plans abandoned because their appeal is missing.
    pub abandoned: Vec<PlanId>,
}

pub struct RemediationWorkflow {
    storage: Arc<dyn KarmaStorage>,
    config: Arc<KarmaConfig>,
    classifier: ActionClassifier,
    ledger: TokenLedger,
    roles: Arc<RoleEngine>,
}

impl RemediationWorkflow {
    pub fn new(
        storage: Arc<dyn KarmaStorage>,
        config: Arc<KarmaConfig>,
        roles: Arc<RoleEngine>,
    ) -> Self {
        Self {
            classifier: ActionClassifier::from_config(&config),
            ledger: TokenLedger::new(storage.clone(), config.clone()),
            storage,
            config,
            roles,
        }
    }

    /// Open an appeal for a demerit-bearing action and prescribe its plan.
    pub async fn appeal_karma(
        &self,
        user_id: &UserId,
        action: &str,
        context: Option<String>,
    ) -> KarmaResult<AppealReceipt> {
        self.ledger.load_user(user_id).await?;

        let Some(severity) = self.classifier.classify(action) else {
            warn!(user = %user_id, action, "appeal rejected: action not eligible");
            return Err(KarmaError::NotEligible {
                action: action.to_string(),
            });
        };
        let requirements = self
            .config
            .remediation
            .templates
            .get(severity)
            .cloned()
            .ok_or_else(|| KarmaError::InvalidSeverity {
                family: TokenFamily::Paap,
                severity: severity.to_string(),
            })?;

        let now = Utc::now();
        let appeal =
            Appeal::new(user_id.clone(), action, severity.clone(), now).with_context(context);
        let plan = AtonementPlan::new(
            appeal.appeal_id.clone(),
            user_id.clone(),
            severity.clone(),
            requirements,
            now,
        );
        let (appeal, plan) = self.storage.create_appeal_with_plan(appeal, plan).await?;

        info!(
            user = %user_id,
            appeal = %appeal.appeal_id,
            plan = %plan.plan_id,
            action,
            severity = %severity,
            "appeal opened"
        );
        Ok(AppealReceipt { appeal, plan })
    }

    /// Record progress against a plan, completing it once every requirement
    /// is met.
    pub async fn submit_atonement(
        &self,
        plan_id: &PlanId,
        category: &str,
        amount: f64,
        proof: AtonementProof,
    ) -> KarmaResult<SubmissionOutcome> {
        let plan = self.load_plan(plan_id).await?;
        if !plan.is_active() {
            return Err(KarmaError::PlanNotActive {
                plan_id: plan_id.clone(),
                status: plan.status,
            });
        }
        if !plan.requires(category) {
            warn!(plan = %plan_id, category, "submission for a category the plan does not require");
            return Err(KarmaError::InvalidCategory {
                plan_id: plan_id.clone(),
                category: category.to_string(),
            });
        }
        if !(amount.is_finite() && amount > 0.0) {
            return Err(KarmaError::InvalidAmount(amount));
        }
        let attachment_digest = self.digest_attachment(proof.attachment.as_deref())?;

        let submission = AtonementSubmission {
            category: category.to_string(),
            amount,
            proof_text: proof.text,
            tx_hash: proof.tx_hash,
            attachment_digest,
            submitted_at: Utc::now(),
        };
        let plan = match self.storage.record_submission(plan_id, submission).await {
            Ok(plan) => plan,
            Err(StorageError::Conflict(_)) => return Err(self.not_active(plan_id).await),
            Err(err) => return Err(err.into()),
        };
        debug!(
            plan = %plan_id,
            category,
            amount,
            progress = plan.progress.get(category).copied().unwrap_or(0.0),
            required = plan.requirements.get(category).copied().unwrap_or(0.0),
            "atonement progress recorded"
        );

        if !plan.is_satisfied() {
            return Ok(SubmissionOutcome {
                remaining: plan.remaining(),
                plan,
                completion: None,
            });
        }

        let Some(plan) = self.storage.complete_plan(plan_id, Utc::now()).await? else {
            // Another submission completed the plan first.
            let plan = self.load_plan(plan_id).await?;
            return Ok(SubmissionOutcome {
                remaining: plan.remaining(),
                plan,
                completion: None,
            });
        };
        info!(
            user = %plan.user_id,
            plan = %plan.plan_id,
            appeal = %plan.appeal_id,
            severity = %plan.severity,
            "atonement plan completed"
        );

        let completion = self.settle(&plan).await?;
        let plan = self.load_plan(plan_id).await?;
        Ok(SubmissionOutcome {
            remaining: plan.remaining(),
            plan,
            completion,
        })
    }

    /// Apply a completed plan's Paap reduction and atonement reward, then
    /// update the controller. Returns `None` when the plan was already
    /// settled.
    async fn settle(&self, plan: &AtonementPlan) -> KarmaResult<Option<Completion>> {
        let severity = plan.severity.as_str();
        self.ledger.severity_weight(TokenFamily::Paap, severity)?;
        let reward = self.roles.atonement_reward(severity)?;
        let mutation = BalanceMutation::Atone {
            severity: plan.severity.clone(),
            debit: ATONEMENT_DEBIT,
            target: reward.target.clone(),
            reward: reward.value,
        };

        let now = Utc::now();
        self.ledger.decay_and_expiry(&plan.user_id, now).await?;
        let Some((plan, user)) = self
            .storage
            .settle_plan(&plan.plan_id, &mutation, now)
            .await?
        else {
            return Ok(None);
        };

        let q_step = self
            .roles
            .q_step_with_balances(
                user.role.as_str(),
                &self.config.rewards.atonement_action,
                reward.value,
                &user.balances,
            )
            .await?;
        self.roles
            .settle_role(&plan.user_id, &user.role, &q_step.role)
            .await?;

        info!(
            user = %plan.user_id,
            plan = %plan.plan_id,
            severity,
            reduced_by = ATONEMENT_DEBIT,
            reward = reward.value,
            target = %reward.target,
            role = %q_step.role,
            "atonement plan settled"
        );
        Ok(Some(Completion {
            reduced_by: ATONEMENT_DEBIT,
            paap_tokens: user.balances.paap_tokens,
            q_step,
        }))
    }

    /// All plans for a user partitioned by status, plus the user's appeals.
    pub async fn appeal_status(&self, user_id: &UserId) -> KarmaResult<AppealStatusReport> {
        let mut report = AppealStatusReport {
            appeals: self.storage.list_appeals(user_id).await?,
            ..AppealStatusReport::default()
        };
        for plan in self.storage.list_plans(user_id).await? {
            match plan.status {
                PlanStatus::Active => report.pending.push(plan),
                PlanStatus::Completed => report.completed.push(plan),
                PlanStatus::Abandoned => {}
            }
        }
        Ok(report)
    }

    /// Reject a pending appeal; its active plan is abandoned.
    pub async fn reject_appeal(&self, appeal_id: &AppealId, reason: &str) -> KarmaResult<Appeal> {
        let appeal = self
            .storage
            .get_appeal(appeal_id)
            .await?
            .ok_or_else(|| KarmaError::AppealNotFound(appeal_id.clone()))?;
        if appeal.status != AppealStatus::Pending {
            return Err(KarmaError::AppealNotPending {
                appeal_id: appeal_id.clone(),
                status: appeal.status,
            });
        }

        let appeal = match self
            .storage
            .reject_appeal(appeal_id, reason, Utc::now())
            .await
        {
            Ok(appeal) => appeal,
            Err(StorageError::Conflict(_)) => {
                let status = self
                    .storage
                    .get_appeal(appeal_id)
                    .await?
                    .map_or(AppealStatus::Rejected, |a| a.status);
                return Err(KarmaError::AppealNotPending {
                    appeal_id: appeal_id.clone(),
                    status,
                });
            }
            Err(err) => return Err(err.into()),
        };
        info!(appeal = %appeal_id, user = %appeal.user_id, reason, "appeal rejected");
        Ok(appeal)
    }

    /// Repair appeal/plan pairs that drifted apart.
    ///
    /// - a pending appeal whose plan completed is resolved
    /// - a pending appeal whose plan is missing is rejected as orphaned
    /// - an active plan whose appeal is missing is abandoned
    /// - a completed plan that never settled is settled now
    pub async fn reconcile_appeals(&self, user_id: &UserId) -> KarmaResult<ReconcileReport> {
        let plans = self.storage.list_plans(user_id).await?;
        let appeals = self.storage.list_appeals(user_id).await?;
        let mut report = ReconcileReport::default();

        for appeal in &appeals {
            if appeal.status.is_terminal() {
                continue;
            }
            let plan = appeal
                .plan_id
                .as_ref()
                .and_then(|id| plans.iter().find(|plan| &plan.plan_id == id));
            match plan {
                None => {
                    self.storage
                        .reject_appeal(&appeal.appeal_id, ORPHANED_REASON, Utc::now())
                        .await?;
                    warn!(user = %user_id, appeal = %appeal.appeal_id, "orphaned appeal rejected");
                    report.rejected.push(appeal.appeal_id.clone());
                }
                Some(plan) if plan.status == PlanStatus::Completed => {
                    let mut appeal = appeal.clone();
                    appeal.resolve(plan.completed_at.unwrap_or(plan.updated_at));
                    self.storage.save_appeal(&appeal).await?;
                    warn!(user = %user_id, appeal = %appeal.appeal_id, "stale appeal resolved");
                    report.resolved.push(appeal.appeal_id);
                }
                Some(_) => {}
            }
        }

        for plan in &plans {
            let has_appeal = appeals
                .iter()
                .any(|appeal| appeal.appeal_id == plan.appeal_id);
            if plan.is_active() && !has_appeal {
                self.storage.abandon_plan(&plan.plan_id, Utc::now()).await?;
                warn!(user = %user_id, plan = %plan.plan_id, "plan without appeal abandoned");
                report.abandoned.push(plan.plan_id.clone());
            } else if plan.awaits_settlement() && self.settle(plan).await?.is_some() {
                warn!(user = %user_id, plan = %plan.plan_id, "unsettled plan settled");
                report.settled.push(plan.plan_id.clone());
            }
        }
        Ok(report)
    }

    fn digest_attachment(&self, attachment: Option<&[u8]>) -> KarmaResult<Option<String>> {
        let Some(bytes) = attachment else {
            return Ok(None);
        };
        let limit = self.config.remediation.max_attachment_bytes;
        if bytes.len() > limit {
            warn!(size = bytes.len(), limit, "proof attachment rejected");
            return Err(KarmaError::InvalidProof(format!(
                "attachment of {} bytes exceeds the {} byte limit",
                bytes.len(),
                limit
            )));
        }
        Ok(Some(blake3::hash(bytes).to_hex().to_string()))
    }

    async fn load_plan(&self, plan_id: &PlanId) -> KarmaResult<AtonementPlan> {
        self.storage
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| KarmaError::PlanNotFound(plan_id.clone()))
    }

    async fn not_active(&self, plan_id: &PlanId) -> KarmaError {
        match self.load_plan(plan_id).await {
            Ok(plan) => KarmaError::PlanNotActive {
                plan_id: plan_id.clone(),
                status: plan.status,
            },
            Err(err) => err,
        }
    }
}
