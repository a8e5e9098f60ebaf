use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Canonical module catalog. Order defines the percentage arithmetic on the
/// dashboard; access order is decided by the gate evaluator, not by position.
pub const MODULE_CATALOG: [&str; 5] = [
    "module1",
    "module2",
    "module3",
    "prayers",
    "transformation",
];

/// The numbered course modules shown on the overview cards.
pub const CORE_MODULES: [&str; 3] = ["module1", "module2", "module3"];

pub fn is_known_module(module_id: &str) -> bool {
    MODULE_CATALOG.contains(&module_id)
}

/// The only enforced transition in the course: module3 is locked until
/// module2 is completed.
pub fn prerequisite_for(module_id: &str) -> Option<&'static str> {
    match module_id {
        "module3" => Some("module2"),
        _ => None,
    }
}

/// How a module's `completed` flag is earned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionPolicy {
    /// Every item must have been opened at least once, in any order.
    AllItemsTouched,
    /// Ordered media list; the final item finishing completes the module.
    SequentialPlayThrough,
    /// Only an explicit mark-complete action finishes the module.
    ExplicitOnly,
}

impl CompletionPolicy {
    pub fn for_module(module_id: &str) -> Self {
        match module_id {
            "module1" | "module3" => Self::AllItemsTouched,
            "module2" => Self::SequentialPlayThrough,
            _ => Self::ExplicitOnly,
        }
    }

    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            "audio" | "video" => Self::SequentialPlayThrough,
            "text" => Self::AllItemsTouched,
            _ => Self::ExplicitOnly,
        }
    }
}

/// Per-user, per-module progress state. The zero value (`Default`) stands in
/// for a record that has never been persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub completed: bool,
    pub expanded_items: BTreeSet<i64>,
    pub last_completed_index: i64,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            completed: false,
            expanded_items: BTreeSet::new(),
            last_completed_index: -1,
        }
    }
}

impl ProgressRecord {
    pub fn all_items_touched(&self, item_count: usize) -> bool {
        item_count > 0 && (0..item_count as i64).all(|idx| self.expanded_items.contains(&idx))
    }
}

/// Outcome of a module-navigation gate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum GateDecision {
    Allow,
    Deny { required: String },
    Pending,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Access state of one item inside an ordered media module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemAccess {
    Locked,
    Playable,
    Played,
}

impl ItemAccess {
    pub fn is_playable(self) -> bool {
        !matches!(self, Self::Locked)
    }
}

pub fn is_admin_role(role: &str) -> bool {
    role.eq_ignore_ascii_case("admin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_lookup() {
        assert_eq!(
            CompletionPolicy::for_module("module1"),
            CompletionPolicy::AllItemsTouched
        );
        assert_eq!(
            CompletionPolicy::for_module("module2"),
            CompletionPolicy::SequentialPlayThrough
        );
        assert_eq!(
            CompletionPolicy::for_module("prayers"),
            CompletionPolicy::ExplicitOnly
        );
        assert_eq!(
            CompletionPolicy::for_module("transformation"),
            CompletionPolicy::ExplicitOnly
        );
    }

    #[test]
    fn test_policy_from_content_type() {
        assert_eq!(
            CompletionPolicy::from_content_type("audio"),
            CompletionPolicy::SequentialPlayThrough
        );
        assert_eq!(
            CompletionPolicy::from_content_type("video"),
            CompletionPolicy::SequentialPlayThrough
        );
        assert_eq!(
            CompletionPolicy::from_content_type("text"),
            CompletionPolicy::AllItemsTouched
        );
        assert_eq!(
            CompletionPolicy::from_content_type("prayer"),
            CompletionPolicy::ExplicitOnly
        );
    }

    #[test]
    fn test_all_items_touched() {
        let mut record = ProgressRecord::default();
        assert!(!record.all_items_touched(3));
        assert!(!record.all_items_touched(0));

        record.expanded_items.extend([0, 1, 2]);
        assert!(record.all_items_touched(3));
        assert!(!record.all_items_touched(4));
    }

    #[test]
    fn test_prerequisites() {
        assert_eq!(prerequisite_for("module3"), Some("module2"));
        assert_eq!(prerequisite_for("module1"), None);
        assert_eq!(prerequisite_for("prayers"), None);
    }
}
