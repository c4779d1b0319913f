//! Appeal and atonement plan documents.
//!
//! An appeal and its plan are independent documents linked by id: the plan
//! may outlive review of its parent appeal.

use crate::{AppealId, PlanId, Tier, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category name → units (requirements or accumulated progress).
pub type ProgressMap = BTreeMap<String, f64>;

// ── Appeal ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealStatus {
    Pending,
    Resolved,
    Rejected,
}

impl AppealStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppealStatus::Pending)
    }
}

/// Request to remediate one classified action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appeal {
    pub appeal_id: AppealId,
    pub user_id: UserId,
    pub action: String,
    pub severity: Tier,
    pub status: AppealStatus,
    /// Weak back-reference to the plan spawned for this appeal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appeal {
    pub fn new(user_id: UserId, action: impl Into<String>, severity: Tier, now: DateTime<Utc>) -> Self {
        Self {
            appeal_id: AppealId::generate(),
            user_id,
            action: action.into(),
            severity,
            status: AppealStatus::Pending,
            plan_id: None,
            context: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.status = AppealStatus::Resolved;
        self.updated_at = at;
    }

    pub fn reject(&mut self, reason: impl Into<String>, at: DateTime<Utc>) {
        self.status = AppealStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.updated_at = at;
    }
}

// ── Atonement plan ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
    /// Closed because the parent appeal was rejected.
    Abandoned,
}

/// One accepted proof-backed progress submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtonementSubmission {
    pub category: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// blake3 hex digest of an attached proof file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_digest: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Prescribed remediation for one appeal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtonementPlan {
    pub plan_id: PlanId,
    pub appeal_id: AppealId,
    pub user_id: UserId,
    pub severity: Tier,
    pub requirements: ProgressMap,
    /// Same key set as `requirements`.
    pub progress: ProgressMap,
    pub status: PlanStatus,
    #[serde(default)]
    pub submissions: Vec<AtonementSubmission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set only on the transition to `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once the Paap debit and atonement reward of a completed plan
    /// have been applied to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl AtonementPlan {
    /// New active plan with zero progress for every required category.
    pub fn new(
        appeal_id: AppealId,
        user_id: UserId,
        severity: Tier,
        requirements: ProgressMap,
        now: DateTime<Utc>,
    ) -> Self {
        let progress = requirements.keys().map(|k| (k.clone(), 0.0)).collect();
        Self {
            plan_id: PlanId::generate(),
            appeal_id,
            user_id,
            severity,
            requirements,
            progress,
            status: PlanStatus::Active,
            submissions: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            settled_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    pub fn requires(&self, category: &str) -> bool {
        self.requirements.contains_key(category)
    }

    /// Add progress for a category. Overshoot past the requirement is kept.
    pub fn record(&mut self, submission: AtonementSubmission) {
        *self
            .progress
            .entry(submission.category.clone())
            .or_insert(0.0) += submission.amount;
        self.updated_at = submission.submitted_at;
        self.submissions.push(submission);
    }

    /// True iff every required category has met its requirement.
    pub fn is_satisfied(&self) -> bool {
        self.requirements.iter().all(|(category, required)| {
            self.progress.get(category).copied().unwrap_or(0.0) >= *required
        })
    }

    /// Units still owed per category (zero once met).
    pub fn remaining(&self) -> ProgressMap {
        self.requirements
            .iter()
            .map(|(category, required)| {
                let done = self.progress.get(category).copied().unwrap_or(0.0);
                (category.clone(), (required - done).max(0.0))
            })
            .collect()
    }

    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = PlanStatus::Completed;
        self.completed_at = Some(at);
        self.updated_at = at;
    }

    /// Completed, but the ledger effect has not been applied yet.
    pub fn awaits_settlement(&self) -> bool {
        self.status == PlanStatus::Completed && self.settled_at.is_none()
    }

    pub fn settle(&mut self, at: DateTime<Utc>) {
        self.settled_at = Some(at);
        self.updated_at = at;
    }

    pub fn abandon(&mut self, at: DateTime<Utc>) {
        self.status = PlanStatus::Abandoned;
        self.updated_at = at;
    }
}
