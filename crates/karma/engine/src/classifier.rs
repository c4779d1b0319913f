//! Action classification.

use karma_types::{KarmaConfig, Tier};
use std::collections::BTreeMap;

/// Maps an action name to its Paap severity tier.
///
/// Actions absent from the table are not demerit-bearing.
#[derive(Debug, Clone)]
pub struct ActionClassifier {
    table: BTreeMap<String, Tier>,
}

impl ActionClassifier {
    pub fn new(table: BTreeMap<String, Tier>) -> Self {
        Self { table }
    }

    pub fn from_config(config: &KarmaConfig) -> Self {
        Self::new(config.classification.paap_actions.clone())
    }

    /// Severity tier of `action`, or `None` when it is not demerit-bearing.
    pub fn classify(&self, action: &str) -> Option<&Tier> {
        self.table.get(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_table_classifies_known_actions() {
        let classifier = ActionClassifier::from_config(&KarmaConfig::default());
        assert_eq!(classifier.classify("false_speech"), Some(&Tier::new("minor")));
        assert_eq!(classifier.classify("cheat"), Some(&Tier::new("medium")));
        assert_eq!(classifier.classify("disrespect_guru"), Some(&Tier::new("medium")));
        assert_eq!(classifier.classify("harm_others"), Some(&Tier::new("maha")));
    }

    #[test]
    fn unknown_actions_are_not_classified() {
        let classifier = ActionClassifier::from_config(&KarmaConfig::default());
        assert_eq!(classifier.classify("completing_lessons"), None);
        assert_eq!(classifier.classify("meditate"), None);
    }
}
