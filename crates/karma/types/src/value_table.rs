use crate::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whole-table snapshot of the role × action value matrix.
///
/// Rows follow `roles`, columns follow `actions`; both are recorded so a
/// snapshot written under one configuration is not misread under another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueTableSnapshot {
    pub roles: Vec<Role>,
    pub actions: Vec<String>,
    pub values: Vec<Vec<f64>>,
    pub updated_at: DateTime<Utc>,
}

impl ValueTableSnapshot {
    /// Zero-initialised table.
    pub fn zeroed(roles: Vec<Role>, actions: Vec<String>, now: DateTime<Utc>) -> Self {
        let values = vec![vec![0.0; actions.len()]; roles.len()];
        Self {
            roles,
            actions,
            values,
            updated_at: now,
        }
    }

    /// True when the matrix is `roles × actions` and labelled identically.
    pub fn matches_shape(&self, roles: &[Role], actions: &[String]) -> bool {
        self.roles == roles
            && self.actions == actions
            && self.values.len() == roles.len()
            && self.values.iter().all(|row| row.len() == actions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_table_matches_its_own_shape() {
        let roles = vec![Role::new("learner"), Role::new("volunteer")];
        let actions = vec!["cheat".to_string()];
        let table = ValueTableSnapshot::zeroed(roles.clone(), actions.clone(), Utc::now());
        assert!(table.matches_shape(&roles, &actions));
        assert!(!table.matches_shape(&roles[..1], &actions));
    }
}
