//! KarmaChain domain types.
//!
//! Shared vocabulary for the dual-ledger engine:
//! - identifiers for users, appeals, atonement plans, and death events
//! - the two tiered token families (Punya merit, Paap demerit) and scalar points
//! - balance mutations applied atomically by storage adapters
//! - appeal / atonement plan documents and lifecycle (loka) records
//! - the value-table snapshot persisted by the role controller
//! - `KarmaConfig`, the full configuration surface

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod balances;
pub mod config;
mod decay;
mod ids;
mod lifecycle;
mod mutation;
mod remediation;
mod user;
mod value_table;

pub use balances::{Balances, RewardTarget, Tier, TierBalances, TokenFamily};
pub use config::{ConfigError, KarmaConfig};
pub use decay::DecayPolicy;
pub use ids::{AppealId, DeathEventId, PlanId, UserId};
pub use lifecycle::{Carryover, DeathEvent};
pub use mutation::BalanceMutation;
pub use remediation::{
    Appeal, AppealStatus, AtonementPlan, AtonementSubmission, PlanStatus, ProgressMap,
};
pub use user::{Role, User};
pub use value_table::ValueTableSnapshot;
