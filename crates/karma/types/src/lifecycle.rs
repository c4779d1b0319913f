use crate::{Balances, DeathEventId, Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Balances and role that seed the next lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Carryover {
    pub balances: Balances,
    pub starting_role: Role,
    /// Merit score of `balances`; `starting_role` is derived from it.
    pub merit: f64,
}

/// Immutable record of a lifecycle-ending event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeathEvent {
    pub event_id: DeathEventId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub net_karma: f64,
    pub realm: String,
    pub realm_description: String,
    pub carryover: Carryover,
}
