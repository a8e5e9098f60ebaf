//! Module-navigation gate. A pure function of store state plus role; it is
//! re-evaluated on every request and keeps no state of its own.

use crate::engine::types::{is_admin_role, GateDecision, ProgressRecord};

/// Decide whether navigation past `required` is permitted.
///
/// `prerequisite_state` is the cached record for the required module, or
/// `None` while the store's initial load is still in flight. The distinction
/// matters: an in-flight load must surface as `Pending`, never as a
/// premature allow or deny.
pub fn evaluate(
    user_id: Option<&str>,
    role: &str,
    required: Option<&str>,
    prerequisite_state: Option<&ProgressRecord>,
) -> GateDecision {
    if is_admin_role(role) {
        return GateDecision::Allow;
    }

    let Some(required) = required else {
        return GateDecision::Allow;
    };

    if user_id.is_none() {
        return GateDecision::Deny {
            required: required.to_string(),
        };
    }

    match prerequisite_state {
        None => GateDecision::Pending,
        Some(record) if record.completed => GateDecision::Allow,
        Some(_) => GateDecision::Deny {
            required: required.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_record() -> ProgressRecord {
        ProgressRecord {
            completed: true,
            ..ProgressRecord::default()
        }
    }

    #[test]
    fn test_no_requirement_allows() {
        let decision = evaluate(Some("u1"), "user", None, None);
        assert_eq!(decision, GateDecision::Allow);
    }

    #[test]
    fn test_denies_until_prerequisite_complete() {
        let incomplete = ProgressRecord::default();
        let decision = evaluate(Some("u1"), "user", Some("module2"), Some(&incomplete));
        assert_eq!(
            decision,
            GateDecision::Deny {
                required: "module2".to_string()
            }
        );

        let done = completed_record();
        let decision = evaluate(Some("u1"), "user", Some("module2"), Some(&done));
        assert_eq!(decision, GateDecision::Allow);
    }

    #[test]
    fn test_admin_bypass() {
        // Admins pass regardless of completion state, even mid-load.
        assert_eq!(
            evaluate(Some("u1"), "admin", Some("module2"), None),
            GateDecision::Allow
        );
        assert_eq!(
            evaluate(Some("u1"), "ADMIN", Some("module2"), Some(&ProgressRecord::default())),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_missing_identity_denies() {
        let decision = evaluate(None, "user", Some("module2"), Some(&completed_record()));
        assert_eq!(
            decision,
            GateDecision::Deny {
                required: "module2".to_string()
            }
        );
    }

    #[test]
    fn test_pending_while_loading() {
        let decision = evaluate(Some("u1"), "user", Some("module2"), None);
        assert_eq!(decision, GateDecision::Pending);
    }
}
