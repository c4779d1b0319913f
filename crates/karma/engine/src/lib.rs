//! KarmaChain engine.
//!
//! A dual-ledger behavioural economy: Punya (merit) and Paap (demerit) token
//! families split into severity tiers, a role controller trained by
//! temporal-difference learning, an appeal/atonement workflow that reduces
//! demerit, and lifecycle transitions that assign a realm and carry a
//! fraction of the balances into the next lifecycle.
//!
//! All components share one [`KarmaStorage`](karma_storage::KarmaStorage)
//! handle and one validated [`KarmaConfig`](karma_types::KarmaConfig);
//! [`KarmaEngine`] wires them together.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod classifier;
mod engine;
pub mod error;
pub mod ledger;
pub mod remediation;
pub mod role;
pub mod telemetry;
pub mod transition;

pub use classifier::ActionClassifier;
pub use engine::{ActionReceipt, KarmaEngine, UserStatus, AUTO_APPEAL_MARKER};
pub use error::{ErrorKind, KarmaError, KarmaResult};
pub use ledger::TokenLedger;
pub use remediation::{
    AppealReceipt, AppealStatusReport, AtonementProof, Completion, ReconcileReport,
    RemediationWorkflow, SubmissionOutcome, ATONEMENT_DEBIT,
};
pub use role::{QStepOutcome, RoleEngine};
pub use transition::{RealmAssignment, TransitionEngine};
