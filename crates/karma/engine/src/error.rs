use karma_storage::StorageError;
use karma_types::{AppealId, AppealStatus, ConfigError, PlanId, PlanStatus, TokenFamily, UserId};
use thiserror::Error;

/// Result type for engine operations.
pub type KarmaResult<T> = Result<T, KarmaError>;

/// Coarse error classes surfaced to the request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected input; nothing was mutated.
    Validation,
    /// Unknown user, plan, or appeal; nothing was mutated.
    NotFound,
    /// Operation not allowed in the document's current state.
    State,
    /// Backend failure; fatal for the current request.
    Storage,
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum KarmaError {
    #[error("action {action} is not eligible for appeal")]
    NotEligible { action: String },

    #[error("invalid {family} severity: {severity}")]
    InvalidSeverity {
        family: TokenFamily,
        severity: String,
    },

    #[error("no atonement reward configured for severity {0}")]
    UnknownSeverity(String),

    #[error("category {category} is not required by plan {plan_id}")]
    InvalidCategory { plan_id: PlanId, category: String },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(f64),

    #[error("unknown role: {0}")]
    InvalidRole(String),

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("atonement plan not found: {0}")]
    PlanNotFound(PlanId),

    #[error("appeal not found: {0}")]
    AppealNotFound(AppealId),

    #[error("atonement plan {plan_id} is not active ({status:?})")]
    PlanNotActive { plan_id: PlanId, status: PlanStatus },

    #[error("appeal {appeal_id} is not pending ({status:?})")]
    AppealNotPending {
        appeal_id: AppealId,
        status: AppealStatus,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl KarmaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KarmaError::NotEligible { .. }
            | KarmaError::InvalidSeverity { .. }
            | KarmaError::UnknownSeverity(_)
            | KarmaError::InvalidCategory { .. }
            | KarmaError::InvalidAmount(_)
            | KarmaError::InvalidRole(_)
            | KarmaError::InvalidProof(_)
            | KarmaError::InvalidConfig(_) => ErrorKind::Validation,
            KarmaError::UserNotFound(_)
            | KarmaError::PlanNotFound(_)
            | KarmaError::AppealNotFound(_) => ErrorKind::NotFound,
            KarmaError::PlanNotActive { .. } | KarmaError::AppealNotPending { .. } => {
                ErrorKind::State
            }
            KarmaError::Storage(_) => ErrorKind::Storage,
        }
    }
}
