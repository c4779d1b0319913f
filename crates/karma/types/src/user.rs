use crate::{Balances, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progression level of a user; also the state variable of the value table.
///
/// The ordered role sequence lives in configuration.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User document: identity, current role, balances, timestamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub role: Role,
    #[serde(default)]
    pub balances: Balances,
    pub created_at: DateTime<Utc>,
    /// Time of the last balance or role change.
    pub updated_at: DateTime<Utc>,
    /// Time tier balances were last decayed; only a decay pass advances it.
    /// Documents written before the clock existed fall back to `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decayed_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(user_id: UserId, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            role,
            balances: Balances::default(),
            created_at: now,
            updated_at: now,
            decayed_at: Some(now),
        }
    }

    /// Start of the span whose decay has not been applied yet.
    pub fn decay_clock(&self) -> DateTime<Utc> {
        self.decayed_at.unwrap_or(self.created_at)
    }

    pub fn with_balances(mut self, balances: Balances) -> Self {
        self.balances = balances;
        self
    }
}
